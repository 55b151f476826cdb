//! XOR distance and proximity order between node identifiers.
//!
//! The distance between two ids is their bitwise XOR, compared as a
//! big-endian unsigned integer. Proximity order is a discrete logarithmic
//! scaling of that distance: the number of common leading bits in the two
//! ids. Both views are used by the peer index — proximity selects the
//! bucket, raw distance orders candidates within a lookup.

use std::{cmp::Ordering, fmt};

use crate::{NODE_ID_LENGTH, NodeId};

/// Maximum proximity order for distinct ids (one shy of the id bit width).
///
/// `proximity(a, a)` saturates at this value as well, so the result is
/// always a valid bucket index.
pub const MAX_PO: u8 = (NODE_ID_LENGTH * 8 - 1) as u8;

/// Raw XOR distance between two node ids.
///
/// Ordered as a 160-bit big-endian unsigned integer: `Distance` values for
/// the same target are totally ordered, and the derived `Ord` on the byte
/// array gives exactly that ordering.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Distance([u8; NODE_ID_LENGTH]);

impl Distance {
    /// The zero distance (an id to itself).
    pub const ZERO: Self = Self([0u8; NODE_ID_LENGTH]);

    /// Whether this is the zero distance.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

impl fmt::Debug for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Distance(0x{})", hex::encode(self.0))
    }
}

/// Compute the XOR distance between `x` and `y`.
pub fn distance(x: &NodeId, y: &NodeId) -> Distance {
    let mut out = [0u8; NODE_ID_LENGTH];
    for (i, (a, b)) in x.as_slice().iter().zip(y.as_slice()).enumerate() {
        out[i] = a ^ b;
    }
    Distance(out)
}

/// Compare `x` and `y` by their distance to `target`.
///
/// Returns `Ordering::Less` when `x` is strictly closer to `target` than
/// `y`, without materializing either distance. `Ordering::Equal` implies
/// `x == y`.
pub fn distance_cmp(target: &NodeId, x: &NodeId, y: &NodeId) -> Ordering {
    let (tb, xb, yb) = (target.as_slice(), x.as_slice(), y.as_slice());
    for i in 0..tb.len() {
        let dx = xb[i] ^ tb[i];
        let dy = yb[i] ^ tb[i];
        if dx != dy {
            return dx.cmp(&dy);
        }
    }
    Ordering::Equal
}

/// Proximity order of `x` and `y`: the number of common leading bits of
/// their ids, saturated at [`MAX_PO`].
///
/// 0 is farthest, `MAX_PO` closest.
pub fn proximity(x: &NodeId, y: &NodeId) -> u8 {
    for (i, (a, b)) in x.as_slice().iter().zip(y.as_slice()).enumerate() {
        let xor = a ^ b;
        if xor != 0 {
            return ((i as u32 * 8) + xor.leading_zeros()).min(MAX_PO as u32) as u8;
        }
    }
    MAX_PO
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn id_from_byte(b: u8) -> NodeId {
        let mut bytes = [0u8; NODE_ID_LENGTH];
        bytes[0] = b;
        NodeId::new(bytes)
    }

    #[test]
    fn test_proximity_leading_bits() {
        let base = id_from_byte(0x00);
        let cases = [
            (0x80u8, 0u8),
            (0x40, 1),
            (0x20, 2),
            (0x10, 3),
            (0x08, 4),
            (0x04, 5),
            (0x02, 6),
            (0x01, 7),
        ];
        for (byte, po) in cases {
            assert_eq!(proximity(&base, &id_from_byte(byte)), po);
            assert_eq!(proximity(&id_from_byte(byte), &base), po);
        }
        // Differing only in the second byte
        let mut bytes = [0u8; NODE_ID_LENGTH];
        bytes[1] = 0x80;
        assert_eq!(proximity(&base, &NodeId::new(bytes)), 8);
    }

    #[test]
    fn test_proximity_saturates_on_equal() {
        let id = NodeId::new([0x5a; NODE_ID_LENGTH]);
        assert_eq!(proximity(&id, &id), MAX_PO);
    }

    #[test]
    fn test_distance_cmp_orders_by_target() {
        let target = id_from_byte(0x00);
        let near = id_from_byte(0x01);
        let far = id_from_byte(0x80);
        assert_eq!(distance_cmp(&target, &near, &far), Ordering::Less);
        assert_eq!(distance_cmp(&target, &far, &near), Ordering::Greater);
        assert_eq!(distance_cmp(&target, &near, &near), Ordering::Equal);
    }

    proptest! {
        #[test]
        fn prop_distance_symmetric(a: [u8; NODE_ID_LENGTH], b: [u8; NODE_ID_LENGTH]) {
            let (a, b) = (NodeId::new(a), NodeId::new(b));
            prop_assert_eq!(distance(&a, &b), distance(&b, &a));
        }

        #[test]
        fn prop_distance_zero_iff_equal(a: [u8; NODE_ID_LENGTH], b: [u8; NODE_ID_LENGTH]) {
            let (a, b) = (NodeId::new(a), NodeId::new(b));
            prop_assert_eq!(distance(&a, &b).is_zero(), a == b);
        }

        #[test]
        fn prop_cmp_agrees_with_distance(
            t: [u8; NODE_ID_LENGTH],
            x: [u8; NODE_ID_LENGTH],
            y: [u8; NODE_ID_LENGTH],
        ) {
            let (t, x, y) = (NodeId::new(t), NodeId::new(x), NodeId::new(y));
            prop_assert_eq!(
                distance_cmp(&t, &x, &y),
                distance(&t, &x).cmp(&distance(&t, &y))
            );
        }
    }
}
