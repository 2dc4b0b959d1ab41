// crates/locus-server/src/registry/catalog/navigation.rs
// View-control tools executed by the connected browser client

use serde_json::json;

use crate::error::Result;
use crate::registry::schema::ParamType;
use crate::registry::{ToolCategory, ToolRegistry, ToolSpec};

pub fn register(reg: &mut ToolRegistry) -> Result<()> {
    reg.register(
        ToolSpec::client("navigate_to_position", ToolCategory::Navigation)
            .describe("Move the browser view to a genomic region")
            .keywords(&["navigate", "goto", "position", "region", "jump", "view"])
            .priority(10)
            .required("chromosome", ParamType::String, "Chromosome name, e.g. chr1")
            .required("start", ParamType::Number, "Region start (1-based, inclusive)")
            .required("end", ParamType::Number, "Region end (inclusive)"),
    )?;

    reg.register(
        ToolSpec::client("jump_to_gene", ToolCategory::Navigation)
            .describe("Center the view on a named gene")
            .keywords(&["gene", "jump", "locate", "symbol"])
            .priority(9)
            .required("gene", ParamType::String, "Gene symbol or identifier"),
    )?;

    reg.register(
        ToolSpec::client("zoom_in", ToolCategory::Navigation)
            .describe("Zoom the view in around its center")
            .keywords(&["zoom", "magnify", "closer"])
            .optional_default("factor", ParamType::Number, "Zoom factor", json!(2)),
    )?;

    reg.register(
        ToolSpec::client("zoom_out", ToolCategory::Navigation)
            .describe("Zoom the view out around its center")
            .keywords(&["zoom", "wider", "out"])
            .optional_default("factor", ParamType::Number, "Zoom factor", json!(2)),
    )?;

    reg.register(
        ToolSpec::client("set_zoom_level", ToolCategory::Navigation)
            .describe("Set an absolute zoom level in bases per pixel")
            .keywords(&["zoom", "level", "scale", "resolution"])
            .required("bases_per_pixel", ParamType::Number, "Bases rendered per pixel"),
    )?;

    reg.register(
        ToolSpec::client("pan_left", ToolCategory::Navigation)
            .describe("Pan the view towards lower coordinates")
            .keywords(&["pan", "left", "scroll", "upstream"])
            .optional_default(
                "fraction",
                ParamType::Number,
                "Fraction of the visible width to pan",
                json!(0.5),
            ),
    )?;

    reg.register(
        ToolSpec::client("pan_right", ToolCategory::Navigation)
            .describe("Pan the view towards higher coordinates")
            .keywords(&["pan", "right", "scroll", "downstream"])
            .optional_default(
                "fraction",
                ParamType::Number,
                "Fraction of the visible width to pan",
                json!(0.5),
            ),
    )?;

    reg.register(
        ToolSpec::client("highlight_region", ToolCategory::Navigation)
            .describe("Highlight a region in the current view")
            .keywords(&["highlight", "mark", "emphasize", "region"])
            .required("chromosome", ParamType::String, "Chromosome name")
            .required("start", ParamType::Number, "Highlight start")
            .required("end", ParamType::Number, "Highlight end")
            .optional("color", ParamType::String, "CSS color for the highlight"),
    )?;

    reg.register(
        ToolSpec::client("clear_highlights", ToolCategory::Navigation)
            .describe("Remove all highlights from the view")
            .keywords(&["highlight", "clear", "reset"]),
    )?;

    reg.register(
        ToolSpec::client("bookmark_region", ToolCategory::Navigation)
            .describe("Bookmark the current or a named region")
            .keywords(&["bookmark", "save", "remember", "region"])
            .optional("name", ParamType::String, "Bookmark label")
            .optional("chromosome", ParamType::String, "Chromosome name")
            .optional("start", ParamType::Number, "Region start")
            .optional("end", ParamType::Number, "Region end"),
    )?;

    reg.register(
        ToolSpec::client("goto_bookmark", ToolCategory::Navigation)
            .describe("Navigate to a previously saved bookmark")
            .keywords(&["bookmark", "goto", "restore"])
            .required("name", ParamType::String, "Bookmark label"),
    )?;

    reg.register(
        ToolSpec::client("scroll_to_feature", ToolCategory::Navigation)
            .describe("Scroll the view to the next feature of a given type")
            .keywords(&["scroll", "feature", "next", "exon", "variant"])
            .required("feature_type", ParamType::String, "Feature type to find")
            .enumerated(
                "direction",
                "Search direction from the view center",
                &[json!("forward"), json!("backward")],
                Some(json!("forward")),
            ),
    )?;

    Ok(())
}
