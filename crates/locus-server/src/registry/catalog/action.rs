// crates/locus-server/src/registry/catalog/action.rs
// Staged sequence-edit tools backed by the per-client action ledger
//
// These run server-side (the broker owns the clipboard and the staged queue)
// but commit through the owning client, so none of them are cacheable.

use serde_json::json;

use crate::error::Result;
use crate::registry::schema::ParamType;
use crate::registry::{ToolCategory, ToolRegistry, ToolSpec};

const STATUSES: [&str; 4] = ["pending", "committed", "failed", "undone"];

pub fn register(reg: &mut ToolRegistry) -> Result<()> {
    let statuses: Vec<serde_json::Value> = STATUSES.iter().map(|s| json!(s)).collect();

    reg.register(
        ToolSpec::server("copy_sequence", ToolCategory::Action)
            .describe("Copy a region's sequence to the client's clipboard")
            .keywords(&["copy", "clipboard", "region", "sequence"])
            .priority(7)
            .no_cache()
            .required("chromosome", ParamType::String, "Chromosome name")
            .required("start", ParamType::Number, "Region start (1-based)")
            .required("end", ParamType::Number, "Region end (inclusive)")
            .enumerated("strand", "Strand to copy", &[json!("+"), json!("-")], Some(json!("+")))
            .optional(
                "sequence",
                ParamType::String,
                "Sequence content, when already known to the caller",
            )
            .optional("clientId", ParamType::String, "Target client id"),
    )?;

    reg.register(
        ToolSpec::server("cut_sequence", ToolCategory::Action)
            .describe("Copy a region to the clipboard and stage its deletion")
            .keywords(&["cut", "clipboard", "delete", "region"])
            .no_cache()
            .required("chromosome", ParamType::String, "Chromosome name")
            .required("start", ParamType::Number, "Region start (1-based)")
            .required("end", ParamType::Number, "Region end (inclusive)")
            .enumerated("strand", "Strand to cut", &[json!("+"), json!("-")], Some(json!("+")))
            .optional(
                "sequence",
                ParamType::String,
                "Sequence content, when already known to the caller",
            )
            .optional("clientId", ParamType::String, "Target client id"),
    )?;

    reg.register(
        ToolSpec::server("paste_sequence", ToolCategory::Action)
            .describe("Stage an insertion of the clipboard content at a position")
            .keywords(&["paste", "clipboard", "insert"])
            .no_cache()
            .required("chromosome", ParamType::String, "Chromosome name")
            .required("position", ParamType::Number, "Insertion point (1-based)")
            .optional("clientId", ParamType::String, "Target client id"),
    )?;

    reg.register(
        ToolSpec::server("delete_region", ToolCategory::Action)
            .describe("Stage the deletion of a region")
            .keywords(&["delete", "remove", "region", "edit"])
            .no_cache()
            .required("chromosome", ParamType::String, "Chromosome name")
            .required("start", ParamType::Number, "Region start (1-based)")
            .required("end", ParamType::Number, "Region end (inclusive)")
            .optional(
                "sequence",
                ParamType::String,
                "The region's sequence; enables undo of the deletion",
            )
            .optional("clientId", ParamType::String, "Target client id"),
    )?;

    reg.register(
        ToolSpec::server("insert_sequence", ToolCategory::Action)
            .describe("Stage an insertion of a literal sequence at a position")
            .keywords(&["insert", "sequence", "edit", "add"])
            .no_cache()
            .required("chromosome", ParamType::String, "Chromosome name")
            .required("position", ParamType::Number, "Insertion point (1-based)")
            .required("sequence", ParamType::String, "Sequence to insert, [ATCGN]+")
            .optional("clientId", ParamType::String, "Target client id"),
    )?;

    reg.register(
        ToolSpec::server("replace_region", ToolCategory::Action)
            .describe("Stage replacement of a region with a literal sequence")
            .keywords(&["replace", "substitute", "region", "edit"])
            .no_cache()
            .required("chromosome", ParamType::String, "Chromosome name")
            .required("start", ParamType::Number, "Region start (1-based)")
            .required("end", ParamType::Number, "Region end (inclusive)")
            .required("sequence", ParamType::String, "Replacement sequence, [ATCGN]+")
            .optional("clientId", ParamType::String, "Target client id"),
    )?;

    reg.register(
        ToolSpec::server("get_action_list", ToolCategory::Action)
            .describe("List staged and historical actions, optionally by status")
            .keywords(&["action", "list", "pending", "staged"])
            .no_cache()
            .enumerated("status", "Filter by status", &statuses, None)
            .optional("clientId", ParamType::String, "Target client id"),
    )?;

    reg.register(
        ToolSpec::server("execute_actions", ToolCategory::Action)
            .describe("Commit all pending actions on the client, in submission order")
            .keywords(&["execute", "commit", "apply", "actions", "batch"])
            .priority(7)
            .no_cache()
            .optional("clientId", ParamType::String, "Target client id"),
    )?;

    reg.register(
        ToolSpec::server("clear_actions", ToolCategory::Action)
            .describe("Remove staged actions with a given status")
            .keywords(&["clear", "actions", "discard"])
            .no_cache()
            .enumerated(
                "status",
                "Status to clear",
                &statuses,
                Some(json!("pending")),
            )
            .optional("clientId", ParamType::String, "Target client id"),
    )?;

    reg.register(
        ToolSpec::server("undo_last_action", ToolCategory::Action)
            .describe("Re-issue the inverse of the most recently committed action")
            .keywords(&["undo", "revert", "rollback"])
            .no_cache()
            .optional("clientId", ParamType::String, "Target client id"),
    )?;

    Ok(())
}
