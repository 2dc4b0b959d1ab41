// crates/locus-server/src/registry/catalog/mod.rs
// Declarative tool catalogue, one module per category

mod action;
mod ai_gen;
mod coordination;
mod data;
mod database;
mod external;
mod navigation;
mod pathway;
mod plugin;
mod protein;
mod sequence;

use crate::error::Result;
use crate::registry::ToolRegistry;

/// Register every category module into the registry.
pub fn register_all(registry: &mut ToolRegistry) -> Result<()> {
    navigation::register(registry)?;
    sequence::register(registry)?;
    data::register(registry)?;
    protein::register(registry)?;
    database::register(registry)?;
    ai_gen::register(registry)?;
    pathway::register(registry)?;
    action::register(registry)?;
    plugin::register(registry)?;
    coordination::register(registry)?;
    external::register(registry)?;
    Ok(())
}
