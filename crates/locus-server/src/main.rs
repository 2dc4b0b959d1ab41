// crates/locus-server/src/main.rs
// Locus - tool-dispatch broker for genome workspaces

mod cli;

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env from ~/.locus/.env only (never from CWD - a hostile
    // working directory could override credentials)
    if let Some(home) = dirs::home_dir()
        && let Err(e) = dotenvy::from_path(home.join(".locus/.env"))
    {
        tracing::debug!("No global .env file loaded: {}", e);
    }

    let cli = Cli::parse();

    // Quiet by default: when serving, stdout belongs to JSON-RPC and logs
    // must stay on stderr. LOCUS_LOG overrides the level.
    let level = std::env::var("LOCUS_LOG")
        .ok()
        .and_then(|raw| raw.parse::<Level>().ok())
        .unwrap_or(match &cli.command {
            None | Some(Commands::Serve) => Level::WARN,
            Some(Commands::Tool { .. }) => Level::WARN,
            Some(Commands::Tools { .. }) | Some(Commands::Config) => Level::WARN,
        });
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    match cli.command {
        None | Some(Commands::Serve) => {
            let code = cli::serve::run().await?;
            if code != 0 {
                std::process::exit(code);
            }
        }
        Some(Commands::Tool { name, args }) => {
            cli::tool::run_tool(name, args).await?;
        }
        Some(Commands::Tools { category }) => {
            cli::tool::run_tools(category)?;
        }
        Some(Commands::Config) => {
            cli::tool::run_config()?;
        }
    }

    Ok(())
}
