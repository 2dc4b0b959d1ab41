// crates/locus-server/src/cli/mod.rs
// Command-line interface

pub mod serve;
pub mod tool;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "locus",
    version,
    about = "Tool-dispatch broker between MCP hosts and genome-browser clients"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the MCP broker: JSON-RPC on stdio plus the HTTP/WebSocket
    /// endpoint for interactive clients (default)
    Serve,
    /// Execute one tool and print its result as JSON
    Tool {
        /// Tool name, e.g. compute_gc
        name: String,
        /// JSON argument object (defaults to {})
        args: Option<String>,
    },
    /// List the tool catalogue
    Tools {
        /// Restrict to one category
        #[arg(long)]
        category: Option<String>,
    },
    /// Show the effective configuration
    Config,
}
