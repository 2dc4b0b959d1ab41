// crates/locus-server/src/registry/catalog/ai_gen.rs
// Generative sequence tools (EVO2 inference + local design helpers)

use serde_json::json;

use crate::error::Result;
use crate::registry::schema::ParamType;
use crate::registry::{ToolCategory, ToolRegistry, ToolSpec};

pub fn register(reg: &mut ToolRegistry) -> Result<()> {
    reg.register(
        ToolSpec::server("evo2_generate_sequence", ToolCategory::AiGen)
            .describe("Generate a DNA sequence from a prompt with the EVO2 model")
            .keywords(&["evo2", "generate", "model", "design", "synthetic"])
            .priority(7)
            .long_running()
            .required("prompt", ParamType::String, "Seed sequence or natural-language prompt")
            .optional_default("length", ParamType::Number, "Target length in bases", json!(500))
            .optional_default(
                "temperature",
                ParamType::Number,
                "Sampling temperature",
                json!(0.8),
            ),
    )?;

    reg.register(
        ToolSpec::server("evo2_score_variant", ToolCategory::AiGen)
            .describe("Score the functional impact of a variant with EVO2 likelihoods")
            .keywords(&["evo2", "variant", "score", "impact", "pathogenic"])
            .long_running()
            .required("sequence", ParamType::String, "Reference sequence context")
            .required("position", ParamType::Number, "Variant position within the context")
            .required("alt", ParamType::String, "Alternate base(s)"),
    )?;

    reg.register(
        ToolSpec::server("evo2_complete_sequence", ToolCategory::AiGen)
            .describe("Continue a DNA sequence with EVO2")
            .keywords(&["evo2", "complete", "continue", "extend"])
            .long_running()
            .required("sequence", ParamType::String, "Sequence prefix to continue")
            .optional_default("length", ParamType::Number, "Bases to append", json!(200)),
    )?;

    reg.register(
        ToolSpec::server("design_primers", ToolCategory::AiGen)
            .local()
            .describe("Design PCR primer pairs for a target region")
            .keywords(&["primer", "pcr", "design", "amplicon"])
            .required("sequence", ParamType::String, "Template sequence")
            .optional_default(
                "product_size",
                ParamType::Number,
                "Desired product size in bases",
                json!(400),
            )
            .optional_default(
                "primer_length",
                ParamType::Number,
                "Primer length in bases",
                json!(20),
            ),
    )?;

    reg.register(
        ToolSpec::server("optimize_codons", ToolCategory::AiGen)
            .describe("Recode a coding sequence for a host organism's codon preferences")
            .keywords(&["codon", "optimize", "expression", "recode", "host"])
            .long_running()
            .required("sequence", ParamType::String, "Coding DNA sequence")
            .enumerated(
                "host",
                "Expression host",
                &[json!("e_coli"), json!("s_cerevisiae"), json!("h_sapiens")],
                Some(json!("e_coli")),
            ),
    )?;

    Ok(())
}
