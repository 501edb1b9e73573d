use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "bringup")]
#[command(about = "Bringup - Initialize infrastructure resources in dependency order")]
pub struct Cli {
    /// Config file path (defaults to bringup.yaml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Working directory
    #[arg(short, long)]
    pub workdir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate configuration without touching any resource
    Validate,
    /// Print the initialization order
    Order {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate configuration and test connections, without initializing
    Check {
        /// Units to check (defaults to all)
        units: Vec<String>,
    },
    /// Initialize units and everything they depend on
    Up {
        /// Units to initialize (defaults to all)
        units: Vec<String>,

        /// Initialize one unit at a time instead of layer by layer
        #[arg(long)]
        sequential: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
