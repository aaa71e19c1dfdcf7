use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "boltd")]
#[command(about = "Container lifecycle daemon with an asynchronous operations API")]
#[command(version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, env = "BOLTD_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the daemon and serve the REST API
    Serve {
        /// Bind address, overrides the configuration file
        #[arg(long)]
        bind: Option<String>,

        /// Port, overrides the configuration file
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Probe host capabilities and print them as JSON
    Probe,
}
