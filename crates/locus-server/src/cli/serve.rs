// crates/locus-server/src/cli/serve.rs
// Broker initialization and the serve loop

use anyhow::Result;
use tracing::{error, warn};

use locus::config::{BrokerConfig, EnvConfig};
use locus::core::Core;
use locus::{mcp, web};

/// Run the broker: MCP over stdio, HTTP/WebSocket for interactive clients.
/// Returns the process exit code per the stdio contract.
pub async fn run() -> Result<i32> {
    let env = EnvConfig::load();
    let config = BrokerConfig::load();

    let core = match Core::new(config, env).await {
        Ok(core) => core,
        Err(e) => {
            // Fatal startup error: bad catalogue or unreadable state.
            error!(error = %e, "Startup failed");
            return Ok(mcp::EXIT_STARTUP);
        }
    };

    // The downstream endpoint is best-effort: a busy port must not take
    // down the stdio transport.
    {
        let core = core.clone();
        tokio::spawn(async move {
            if let Err(e) = web::serve(core).await {
                warn!(error = %e, "Downstream HTTP endpoint unavailable");
            }
        });
    }

    let code = mcp::run(core).await?;
    Ok(code)
}
