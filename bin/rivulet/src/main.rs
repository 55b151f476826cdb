//! Rivulet network binary.

mod cli;
mod simulate;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    cli::run().await
}
