use clap::Parser;
use whisper_app::cli::{self, Cli};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    cli::run(Cli::parse()).await
}
