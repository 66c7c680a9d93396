use clap::Parser;
use rag_response_cache::cli::{self, Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Replay(args) => cli::replay::run(args).await,
    }
}
