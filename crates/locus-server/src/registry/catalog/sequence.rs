// crates/locus-server/src/registry/catalog/sequence.rs
// Sequence retrieval and pure-local sequence analysis

use serde_json::json;

use crate::error::Result;
use crate::registry::schema::ParamType;
use crate::registry::{ToolCategory, ToolRegistry, ToolSpec};

pub fn register(reg: &mut ToolRegistry) -> Result<()> {
    reg.register(
        ToolSpec::client("get_sequence_region", ToolCategory::Sequence)
            .describe("Read the DNA sequence of a region from the loaded genome")
            .keywords(&["sequence", "region", "extract", "dna", "fetch"])
            .priority(9)
            .required("chromosome", ParamType::String, "Chromosome name")
            .required("start", ParamType::Number, "Region start (1-based)")
            .required("end", ParamType::Number, "Region end (inclusive)")
            .enumerated(
                "strand",
                "Strand to read",
                &[json!("+"), json!("-")],
                Some(json!("+")),
            ),
    )?;

    reg.register(
        ToolSpec::server("compute_gc", ToolCategory::Sequence)
            .local()
            .describe("Compute GC content of a DNA sequence as a percentage")
            .keywords(&["gc", "content", "composition", "percentage"])
            .priority(8)
            .required("sequence", ParamType::String, "DNA sequence")
            .optional_default(
                "window",
                ParamType::Number,
                "Sliding window size; 0 computes a single global value",
                json!(0),
            ),
    )?;

    reg.register(
        ToolSpec::server("translate_dna", ToolCategory::Sequence)
            .local()
            .describe("Translate a DNA sequence to protein in a given reading frame")
            .keywords(&["translate", "protein", "codon", "frame", "amino"])
            .priority(8)
            .required("dna", ParamType::String, "DNA sequence to translate")
            .optional_default("frame", ParamType::Number, "Reading frame (0, 1 or 2)", json!(0))
            .optional_default(
                "stop_at_stop",
                ParamType::Boolean,
                "Stop translation at the first stop codon",
                json!(false),
            ),
    )?;

    reg.register(
        ToolSpec::server("reverse_complement", ToolCategory::Sequence)
            .local()
            .describe("Reverse-complement a DNA sequence")
            .keywords(&["reverse", "complement", "revcomp", "strand"])
            .priority(8)
            .required("sequence", ParamType::String, "DNA sequence"),
    )?;

    reg.register(
        ToolSpec::server("transcribe_dna", ToolCategory::Sequence)
            .local()
            .describe("Transcribe a DNA sequence to RNA")
            .keywords(&["transcribe", "rna", "transcript"])
            .required("sequence", ParamType::String, "DNA sequence"),
    )?;

    reg.register(
        ToolSpec::server("find_orfs", ToolCategory::Sequence)
            .local()
            .describe("Scan all six frames for open reading frames")
            .keywords(&["orf", "open", "reading", "frame", "scan"])
            .priority(7)
            .required("sequence", ParamType::String, "DNA sequence")
            .optional_default(
                "min_length",
                ParamType::Number,
                "Minimum ORF length in nucleotides",
                json!(90),
            ),
    )?;

    reg.register(
        ToolSpec::server("codon_usage", ToolCategory::Sequence)
            .local()
            .describe("Tabulate codon usage for a coding sequence")
            .keywords(&["codon", "usage", "bias", "table"])
            .required("sequence", ParamType::String, "Coding DNA sequence")
            .optional_default("frame", ParamType::Number, "Reading frame (0, 1 or 2)", json!(0)),
    )?;

    reg.register(
        ToolSpec::server("sequence_similarity", ToolCategory::Sequence)
            .local()
            .describe("Score pairwise similarity between two sequences")
            .keywords(&["similarity", "identity", "align", "compare", "pairwise"])
            .required("query", ParamType::String, "Query sequence")
            .required("subject", ParamType::String, "Subject sequence"),
    )?;

    reg.register(
        ToolSpec::server("find_motif", ToolCategory::Sequence)
            .local()
            .describe("Find all occurrences of a motif, IUPAC codes allowed")
            .keywords(&["motif", "pattern", "search", "iupac", "site"])
            .required("sequence", ParamType::String, "Sequence to scan")
            .required("motif", ParamType::String, "Motif, e.g. GAATTC or RGGNCC")
            .optional_default(
                "both_strands",
                ParamType::Boolean,
                "Also scan the reverse complement",
                json!(true),
            ),
    )?;

    reg.register(
        ToolSpec::server("validate_sequence", ToolCategory::Sequence)
            .local()
            .describe("Check a sequence for invalid characters and report composition")
            .keywords(&["validate", "check", "alphabet", "composition"])
            .required("sequence", ParamType::String, "Sequence to validate")
            .enumerated(
                "alphabet",
                "Expected alphabet",
                &[json!("dna"), json!("rna"), json!("protein")],
                Some(json!("dna")),
            ),
    )?;

    Ok(())
}
