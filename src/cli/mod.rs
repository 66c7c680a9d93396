//! CLI module for the RAG response cache
//!
//! Provides subcommands:
//! - `replay`: run a recorded query workload through the cache and report statistics

pub mod replay;

use clap::{Parser, Subcommand};

/// RAG response cache - exact and semantic answer reuse for RAG pipelines
#[derive(Parser)]
#[command(name = "rag-cache")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Replay a JSONL workload and print cache statistics
    Replay(replay::ReplayArgs),
}
