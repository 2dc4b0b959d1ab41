// crates/locus-server/src/registry/catalog/coordination.rs
// Client-coordination tools: state snapshots, visualization, notifications

use serde_json::json;

use crate::error::Result;
use crate::registry::schema::ParamType;
use crate::registry::{ToolCategory, ToolRegistry, ToolSpec};

pub fn register(reg: &mut ToolRegistry) -> Result<()> {
    reg.register(
        ToolSpec::server("list_clients", ToolCategory::Coordination)
            .describe("List connected interactive clients and their capabilities")
            .keywords(&["clients", "connected", "list", "capabilities"])
            .no_cache(),
    )?;

    reg.register(
        ToolSpec::server("get_client_state", ToolCategory::Coordination)
            .describe("Return the last UI-state snapshot pushed by a client")
            .keywords(&["state", "snapshot", "view", "current"])
            .priority(6)
            .no_cache()
            .optional("clientId", ParamType::String, "Target client id"),
    )?;

    reg.register(
        ToolSpec::client("open_visualization", ToolCategory::Coordination)
            .describe("Open a result visualization panel in the client")
            .keywords(&["visualization", "open", "panel", "display"])
            .required("tool", ParamType::String, "Tool whose result is being shown")
            .required("result", ParamType::Object, "Result payload to visualize"),
    )?;

    reg.register(
        ToolSpec::server("notify_clients", ToolCategory::Coordination)
            .describe("Broadcast a notification event to every connected client")
            .keywords(&["notify", "broadcast", "message", "event"])
            .no_cache()
            .required("event", ParamType::String, "Event name")
            .optional_default("payload", ParamType::Object, "Event payload", json!({})),
    )?;

    reg.register(
        ToolSpec::client("ping_client", ToolCategory::Coordination)
            .describe("Round-trip liveness check against one client")
            .keywords(&["ping", "liveness", "check"]),
    )?;

    Ok(())
}
