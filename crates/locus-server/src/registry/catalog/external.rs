// crates/locus-server/src/registry/catalog/external.rs
// External-service tools (BLAST and upstream diagnostics)

use serde_json::json;

use crate::error::Result;
use crate::registry::schema::ParamType;
use crate::registry::{ToolCategory, ToolRegistry, ToolSpec};

pub fn register(reg: &mut ToolRegistry) -> Result<()> {
    reg.register(
        ToolSpec::server("blast_search", ToolCategory::External)
            .describe("Submit a BLAST search against an NCBI database and await hits")
            .keywords(&["blast", "alignment", "homology", "hits", "search"])
            .priority(8)
            .long_running()
            .required("sequence", ParamType::String, "Query sequence")
            .enumerated(
                "program",
                "BLAST program",
                &[json!("blastn"), json!("blastp"), json!("blastx")],
                Some(json!("blastn")),
            )
            .optional_default("database", ParamType::String, "Target database", json!("nt"))
            .optional_default("limit", ParamType::Number, "Maximum hits returned", json!(10)),
    )?;

    reg.register(
        ToolSpec::server("blast_get_results", ToolCategory::External)
            .describe("Poll a previously submitted BLAST request by RID")
            .keywords(&["blast", "results", "poll", "rid"])
            .required("rid", ParamType::String, "BLAST request identifier"),
    )?;

    reg.register(
        ToolSpec::server("check_upstream_status", ToolCategory::External)
            .describe("Probe the configured upstream services and report reachability")
            .keywords(&["status", "upstream", "health", "services"])
            .no_cache(),
    )?;

    Ok(())
}
