// crates/locus-server/src/registry/catalog/data.rs
// Track and annotation tools executed by the browser client

use serde_json::json;

use crate::error::Result;
use crate::registry::schema::ParamType;
use crate::registry::{ToolCategory, ToolRegistry, ToolSpec};

pub fn register(reg: &mut ToolRegistry) -> Result<()> {
    reg.register(
        ToolSpec::client("load_track", ToolCategory::Data)
            .describe("Load a data track from a file or URL into the browser")
            .keywords(&["track", "load", "open", "bigwig", "bed", "vcf", "bam"])
            .priority(8)
            .required("source", ParamType::String, "File path or URL")
            .optional("name", ParamType::String, "Display name for the track")
            .optional("format", ParamType::String, "Track format hint, e.g. bed"),
    )?;

    reg.register(
        ToolSpec::client("list_tracks", ToolCategory::Data)
            .describe("List the tracks currently loaded in the browser")
            .keywords(&["track", "list", "loaded"]),
    )?;

    reg.register(
        ToolSpec::client("toggle_track_visibility", ToolCategory::Data)
            .describe("Show or hide a loaded track")
            .keywords(&["track", "toggle", "show", "hide", "visibility"])
            .required("track", ParamType::String, "Track name or identifier")
            .optional("visible", ParamType::Boolean, "Explicit visibility state"),
    )?;

    reg.register(
        ToolSpec::client("remove_track", ToolCategory::Data)
            .describe("Remove a loaded track from the browser")
            .keywords(&["track", "remove", "close", "unload"])
            .required("track", ParamType::String, "Track name or identifier"),
    )?;

    reg.register(
        ToolSpec::client("get_track_features", ToolCategory::Data)
            .describe("Read the features of a track within a region")
            .keywords(&["track", "features", "region", "annotations"])
            .required("track", ParamType::String, "Track name or identifier")
            .required("chromosome", ParamType::String, "Chromosome name")
            .required("start", ParamType::Number, "Region start")
            .required("end", ParamType::Number, "Region end")
            .optional_default("limit", ParamType::Number, "Maximum features returned", json!(100)),
    )?;

    reg.register(
        ToolSpec::client("search_features", ToolCategory::Data)
            .describe("Search loaded annotation tracks by feature name")
            .keywords(&["search", "feature", "annotation", "find"])
            .priority(7)
            .required("query", ParamType::String, "Feature name or prefix")
            .optional_default("limit", ParamType::Number, "Maximum results", json!(20)),
    )?;

    reg.register(
        ToolSpec::client("describe_feature", ToolCategory::Data)
            .describe("Return full details for one feature")
            .keywords(&["feature", "details", "describe", "attributes"])
            .required("feature_id", ParamType::String, "Feature identifier"),
    )?;

    reg.register(
        ToolSpec::client("export_visible_region", ToolCategory::Data)
            .describe("Export the visible region's data in a chosen format")
            .keywords(&["export", "save", "download", "fasta", "bed"])
            .enumerated(
                "format",
                "Export format",
                &[json!("fasta"), json!("bed"), json!("gff3")],
                Some(json!("fasta")),
            ),
    )?;

    reg.register(
        ToolSpec::client("create_annotation", ToolCategory::Data)
            .describe("Create a user annotation on a region")
            .keywords(&["annotation", "create", "note", "label"])
            .required("chromosome", ParamType::String, "Chromosome name")
            .required("start", ParamType::Number, "Region start")
            .required("end", ParamType::Number, "Region end")
            .required("label", ParamType::String, "Annotation text")
            .optional("color", ParamType::String, "CSS color"),
    )?;

    reg.register(
        ToolSpec::client("delete_annotation", ToolCategory::Data)
            .describe("Delete a user annotation")
            .keywords(&["annotation", "delete", "remove"])
            .required("annotation_id", ParamType::String, "Annotation identifier"),
    )?;

    Ok(())
}
