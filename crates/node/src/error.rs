//! Node errors.

/// Errors surfaced by the node to its host process.
///
/// Nothing inside the dissemination core is process-fatal; only startup
/// misconfiguration (no reachable tracker) propagates out of the reactor.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// No tracker could be reached during bootstrap.
    #[error("no reachable tracker after {0} attempts")]
    Bootstrap(usize),
    /// The node reactor is no longer running.
    #[error("node reactor stopped")]
    Stopped,
}
