// crates/locus-server/src/registry/catalog/pathway.rs
// Pathway lookups via UniProt cross-references and local enrichment

use serde_json::json;

use crate::error::Result;
use crate::registry::schema::ParamType;
use crate::registry::{ToolCategory, ToolRegistry, ToolSpec};

pub fn register(reg: &mut ToolRegistry) -> Result<()> {
    reg.register(
        ToolSpec::server("find_pathways_for_gene", ToolCategory::Pathway)
            .describe("List pathways a gene participates in, via UniProt cross-references")
            .keywords(&["pathway", "gene", "reactome", "kegg", "participates"])
            .priority(6)
            .required("gene", ParamType::String, "Gene symbol or UniProt accession")
            .optional_default("limit", ParamType::Number, "Maximum pathways", json!(20)),
    )?;

    reg.register(
        ToolSpec::server("get_pathway_genes", ToolCategory::Pathway)
            .describe("List the genes annotated to a pathway")
            .keywords(&["pathway", "genes", "members"])
            .required("pathway_id", ParamType::String, "Pathway identifier")
            .optional_default("limit", ParamType::Number, "Maximum genes", json!(50)),
    )?;

    reg.register(
        ToolSpec::server("pathway_enrichment", ToolCategory::Pathway)
            .describe("Rank pathways over-represented in a gene list")
            .keywords(&["enrichment", "pathway", "overrepresentation", "gene", "set"])
            .long_running()
            .required("genes", ParamType::Array, "Gene symbols to test")
            .optional_default(
                "max_results",
                ParamType::Number,
                "Maximum enriched pathways returned",
                json!(10),
            ),
    )?;

    Ok(())
}
