// crates/locus-server/src/registry/catalog/plugin.rs
// Plugin-management tools forwarded to the client UI

use crate::error::Result;
use crate::registry::schema::ParamType;
use crate::registry::{ToolCategory, ToolRegistry, ToolSpec};

pub fn register(reg: &mut ToolRegistry) -> Result<()> {
    reg.register(
        ToolSpec::client("list_plugins", ToolCategory::PluginMgmt)
            .describe("List plugins installed in the client")
            .keywords(&["plugin", "list", "installed", "extensions"]),
    )?;

    reg.register(
        ToolSpec::client("install_plugin", ToolCategory::PluginMgmt)
            .describe("Install a plugin from an identifier or URL")
            .keywords(&["plugin", "install", "add"])
            .required("source", ParamType::String, "Plugin identifier or URL"),
    )?;

    reg.register(
        ToolSpec::client("enable_plugin", ToolCategory::PluginMgmt)
            .describe("Enable an installed plugin")
            .keywords(&["plugin", "enable", "activate"])
            .required("plugin_id", ParamType::String, "Plugin identifier"),
    )?;

    reg.register(
        ToolSpec::client("disable_plugin", ToolCategory::PluginMgmt)
            .describe("Disable an installed plugin")
            .keywords(&["plugin", "disable", "deactivate"])
            .required("plugin_id", ParamType::String, "Plugin identifier"),
    )?;

    reg.register(
        ToolSpec::client("get_plugin_status", ToolCategory::PluginMgmt)
            .describe("Report the status of one installed plugin")
            .keywords(&["plugin", "status", "state"])
            .required("plugin_id", ParamType::String, "Plugin identifier"),
    )?;

    Ok(())
}
