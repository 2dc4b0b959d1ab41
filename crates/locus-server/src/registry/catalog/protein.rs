// crates/locus-server/src/registry/catalog/protein.rs
// Protein tools fronting UniProt, InterPro, PDB and AlphaFold

use serde_json::json;

use crate::error::Result;
use crate::registry::schema::ParamType;
use crate::registry::{ToolCategory, ToolRegistry, ToolSpec};

pub fn register(reg: &mut ToolRegistry) -> Result<()> {
    reg.register(
        ToolSpec::server("uniprot_search", ToolCategory::Protein)
            .describe("Search UniProtKB by free text, gene or organism")
            .keywords(&["uniprot", "protein", "search", "swissprot"])
            .priority(8)
            .required("query", ParamType::String, "UniProt query string")
            .optional_default("limit", ParamType::Number, "Maximum results", json!(10))
            .optional_default(
                "reviewed_only",
                ParamType::Boolean,
                "Restrict to reviewed (Swiss-Prot) entries",
                json!(true),
            ),
    )?;

    reg.register(
        ToolSpec::server("get_uniprot_entry", ToolCategory::Protein)
            .describe("Fetch one UniProtKB entry by accession")
            .keywords(&["uniprot", "entry", "accession", "protein"])
            .required("accession", ParamType::String, "UniProt accession, e.g. P38398"),
    )?;

    reg.register(
        ToolSpec::server("get_protein_sequence", ToolCategory::Protein)
            .describe("Fetch the amino-acid sequence for a UniProt accession")
            .keywords(&["protein", "sequence", "fasta", "uniprot"])
            .required("accession", ParamType::String, "UniProt accession"),
    )?;

    reg.register(
        ToolSpec::server("analyze_interpro_domains", ToolCategory::Protein)
            .describe("Analyze a protein sequence for InterPro domains and families")
            .keywords(&["interpro", "domain", "family", "analyze", "scan"])
            .priority(8)
            .long_running()
            .required("sequence", ParamType::String, "Amino-acid sequence")
            .optional_default(
                "include_families",
                ParamType::Boolean,
                "Include family classifications in the result",
                json!(true),
            ),
    )?;

    reg.register(
        ToolSpec::server("get_interpro_entry", ToolCategory::Protein)
            .describe("Fetch one InterPro entry by identifier")
            .keywords(&["interpro", "entry", "domain"])
            .required("entry_id", ParamType::String, "InterPro identifier, e.g. IPR000001"),
    )?;

    reg.register(
        ToolSpec::server("get_protein_structure", ToolCategory::Protein)
            .describe("Fetch experimental structure metadata from PDB")
            .keywords(&["structure", "pdb", "experimental", "crystal"])
            .required("pdb_id", ParamType::String, "PDB identifier, e.g. 1TUP"),
    )?;

    reg.register(
        ToolSpec::server("get_alphafold_structure", ToolCategory::Protein)
            .describe("Fetch an AlphaFold predicted structure for a UniProt accession")
            .keywords(&["alphafold", "structure", "predicted", "model"])
            .required("accession", ParamType::String, "UniProt accession"),
    )?;

    reg.register(
        ToolSpec::server("predict_protein_properties", ToolCategory::Protein)
            .local()
            .describe("Compute molecular weight, composition and hydropathy locally")
            .keywords(&["protein", "properties", "weight", "hydropathy", "pi"])
            .required("sequence", ParamType::String, "Amino-acid sequence"),
    )?;

    Ok(())
}
