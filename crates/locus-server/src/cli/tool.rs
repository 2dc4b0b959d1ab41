// crates/locus-server/src/cli/tool.rs
// One-shot tool execution and catalogue listing

use anyhow::{Context, Result, bail};

use locus::config::{BrokerConfig, EnvConfig};
use locus::core::Core;
use locus::dispatch::Origin;
use locus::registry::{ListFilter, ToolCategory, ToolRegistry};

/// `locus tool <name> [json]`: dispatch once and print the result.
pub async fn run_tool(name: String, args: Option<String>) -> Result<()> {
    let arguments: serde_json::Value = match args {
        Some(raw) => serde_json::from_str(&raw).context("arguments must be a JSON object")?,
        None => serde_json::json!({}),
    };

    let core = Core::new(BrokerConfig::load(), EnvConfig::load()).await?;
    match core.dispatcher.dispatch(&name, arguments, Origin::Internal).await {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(e) => {
            println!("{}", serde_json::to_string_pretty(&e.to_failure_value())?);
            bail!("tool `{name}` failed: {e}")
        }
    }
}

/// `locus tools [--category c]`: print the catalogue.
pub fn run_tools(category: Option<String>) -> Result<()> {
    let registry = ToolRegistry::load_catalog()?;
    let filter = match category.as_deref() {
        Some(raw) => {
            let Some(parsed) = ToolCategory::parse(raw) else {
                bail!("unknown category `{raw}`");
            };
            Some(ListFilter {
                category: Some(parsed),
                query: None,
            })
        }
        None => None,
    };

    for desc in registry.list(filter.as_ref()) {
        println!(
            "{:32} [{:12}] {}",
            desc.name,
            desc.category.as_str(),
            desc.description
        );
    }
    Ok(())
}

/// `locus config`: show the effective configuration.
pub fn run_config() -> Result<()> {
    let config = BrokerConfig::load();
    println!("config file: {}", BrokerConfig::config_path().display());
    println!("max_concurrent_tasks    = {}", config.max_concurrent_tasks);
    println!("max_retries             = {}", config.max_retries);
    println!("default_timeout_ms      = {}", config.default_timeout_ms);
    println!("queue_limit             = {}", config.queue_limit);
    println!("enable_cache            = {}", config.enable_cache);
    println!("enable_persistence      = {}", config.enable_persistence);
    println!("http_port               = {}", config.http_port);
    println!("ws_port                 = {}", config.ws_port);
    println!("auto_open_visualization = {}", config.auto_open_visualization);
    Ok(())
}
