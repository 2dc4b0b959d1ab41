// crates/locus-server/src/registry/catalog/database.rs
// NCBI Entrez E-utilities tools

use serde_json::json;

use crate::error::Result;
use crate::registry::schema::ParamType;
use crate::registry::{ToolCategory, ToolRegistry, ToolSpec};

pub fn register(reg: &mut ToolRegistry) -> Result<()> {
    reg.register(
        ToolSpec::server("ncbi_search", ToolCategory::Database)
            .describe("Search an NCBI Entrez database")
            .keywords(&["ncbi", "entrez", "search", "nucleotide", "gene"])
            .priority(8)
            .required("query", ParamType::String, "Entrez query string")
            .optional_default(
                "database",
                ParamType::String,
                "Entrez database name",
                json!("nucleotide"),
            )
            .optional_default("limit", ParamType::Number, "Maximum results", json!(10)),
    )?;

    reg.register(
        ToolSpec::server("fetch_genbank_record", ToolCategory::Database)
            .describe("Fetch a GenBank nucleotide record by accession")
            .keywords(&["genbank", "fetch", "record", "accession", "nucleotide"])
            .required("accession", ParamType::String, "Nucleotide accession")
            .enumerated(
                "rettype",
                "Record format",
                &[json!("gb"), json!("fasta")],
                Some(json!("gb")),
            ),
    )?;

    reg.register(
        ToolSpec::server("fetch_protein_record", ToolCategory::Database)
            .describe("Fetch an NCBI protein record by accession")
            .keywords(&["protein", "fetch", "record", "ncbi"])
            .required("accession", ParamType::String, "Protein accession"),
    )?;

    reg.register(
        ToolSpec::server("ncbi_gene_summary", ToolCategory::Database)
            .describe("Fetch the Entrez Gene summary for a gene id or symbol")
            .keywords(&["gene", "summary", "entrez", "description"])
            .required("gene", ParamType::String, "Gene id or symbol")
            .optional_default(
                "organism",
                ParamType::String,
                "Organism filter for symbol lookups",
                json!("Homo sapiens"),
            ),
    )?;

    reg.register(
        ToolSpec::server("get_gene_info", ToolCategory::Database)
            .describe("Resolve a gene symbol to location, aliases and description")
            .keywords(&["gene", "info", "symbol", "location", "alias"])
            .priority(7)
            .required("symbol", ParamType::String, "Gene symbol")
            .optional_default(
                "organism",
                ParamType::String,
                "Organism name",
                json!("Homo sapiens"),
            ),
    )?;

    reg.register(
        ToolSpec::server("pubmed_search", ToolCategory::Database)
            .describe("Search PubMed for literature")
            .keywords(&["pubmed", "literature", "papers", "publication"])
            .required("query", ParamType::String, "PubMed query string")
            .optional_default("limit", ParamType::Number, "Maximum results", json!(10)),
    )?;

    reg.register(
        ToolSpec::server("taxonomy_lookup", ToolCategory::Database)
            .describe("Look up an organism in the NCBI taxonomy")
            .keywords(&["taxonomy", "organism", "species", "lineage"])
            .required("name", ParamType::String, "Organism name or taxonomy id"),
    )?;

    Ok(())
}
