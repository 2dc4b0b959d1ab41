// crates/locus-server/src/handlers/uniprot.rs
// UniProtKB REST handlers

use std::sync::Arc;

use serde_json::{Value, json};

use crate::error::Result;

use super::{HandlerMap, ToolContext, bool_arg, limit_arg, str_arg};

const UNIPROT_BASE: &str = "https://rest.uniprot.org/uniprotkb";

pub fn register(map: &mut HandlerMap) {
    map.insert("uniprot_search", |args, ctx| Box::pin(search(args, ctx)));
    map.insert("get_uniprot_entry", |args, ctx| Box::pin(entry(args, ctx)));
    map.insert("get_protein_sequence", |args, ctx| {
        Box::pin(sequence(args, ctx))
    });
}

async fn search(args: Value, ctx: Arc<ToolContext>) -> Result<Value> {
    let query = str_arg(&args, "query")?;
    let limit = limit_arg(&args, 10);
    let reviewed_only = bool_arg(&args, "reviewed_only", true);

    let full_query = if reviewed_only {
        format!("({query}) AND (reviewed:true)")
    } else {
        query.to_string()
    };

    let url = format!("{UNIPROT_BASE}/search");
    let body = ctx
        .http
        .get_json(
            &url,
            &[
                ("query", full_query),
                ("size", limit.to_string()),
                (
                    "fields",
                    "accession,protein_name,gene_names,organism_name,length".to_string(),
                ),
            ],
        )
        .await?;

    let results: Vec<Value> = body["results"]
        .as_array()
        .map(|entries| entries.iter().map(summarize_entry).collect())
        .unwrap_or_default();

    Ok(json!({
        "success": true,
        "query": query,
        "count": results.len(),
        "results": results,
    }))
}

async fn entry(args: Value, ctx: Arc<ToolContext>) -> Result<Value> {
    let accession = str_arg(&args, "accession")?;
    let url = format!("{UNIPROT_BASE}/{}", urlencoding::encode(accession));
    let body = ctx.http.get_json(&url, &[]).await?;

    Ok(json!({
        "success": true,
        "accession": accession,
        "entry": summarize_entry(&body),
        "crossReferences": cross_reference_summary(&body),
    }))
}

async fn sequence(args: Value, ctx: Arc<ToolContext>) -> Result<Value> {
    let accession = str_arg(&args, "accession")?;
    let url = format!("{UNIPROT_BASE}/{}", urlencoding::encode(accession));
    let body = ctx
        .http
        .get_json(&url, &[("fields", "accession,sequence".to_string())])
        .await?;

    let sequence = body["sequence"]["value"].as_str().unwrap_or_default();
    Ok(json!({
        "success": true,
        "accession": accession,
        "sequence": sequence,
        "length": sequence.len(),
    }))
}

/// Pull the fields clients care about out of a raw UniProt entry.
fn summarize_entry(entry: &Value) -> Value {
    let accession = entry["primaryAccession"].as_str().unwrap_or_default();
    let name = entry["proteinDescription"]["recommendedName"]["fullName"]["value"]
        .as_str()
        .or_else(|| {
            entry["proteinDescription"]["submissionNames"][0]["fullName"]["value"].as_str()
        })
        .unwrap_or_default();
    let gene = entry["genes"][0]["geneName"]["value"].as_str().unwrap_or_default();
    let organism = entry["organism"]["scientificName"].as_str().unwrap_or_default();
    let length = entry["sequence"]["length"].as_i64();

    json!({
        "accession": accession,
        "proteinName": name,
        "gene": gene,
        "organism": organism,
        "length": length,
    })
}

/// Group cross-references by database, keeping ids only.
fn cross_reference_summary(entry: &Value) -> Value {
    let mut grouped = serde_json::Map::new();
    if let Some(refs) = entry["uniProtKBCrossReferences"].as_array() {
        for reference in refs {
            let database = reference["database"].as_str().unwrap_or_default();
            let id = reference["id"].as_str().unwrap_or_default();
            if database.is_empty() || id.is_empty() {
                continue;
            }
            if let Some(ids) = grouped
                .entry(database.to_string())
                .or_insert_with(|| Value::Array(Vec::new()))
                .as_array_mut()
            {
                ids.push(json!(id));
            }
        }
    }
    Value::Object(grouped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_summary_extracts_fields() {
        let raw = json!({
            "primaryAccession": "P38398",
            "proteinDescription": {
                "recommendedName": {"fullName": {"value": "BRCA1"}}
            },
            "genes": [{"geneName": {"value": "BRCA1"}}],
            "organism": {"scientificName": "Homo sapiens"},
            "sequence": {"length": 1863}
        });
        let summary = summarize_entry(&raw);
        assert_eq!(summary["accession"], "P38398");
        assert_eq!(summary["gene"], "BRCA1");
        assert_eq!(summary["length"], 1863);
    }

    #[test]
    fn cross_references_group_by_database() {
        let raw = json!({
            "uniProtKBCrossReferences": [
                {"database": "PDB", "id": "1JM7"},
                {"database": "PDB", "id": "1T15"},
                {"database": "Reactome", "id": "R-HSA-5685942"}
            ]
        });
        let grouped = cross_reference_summary(&raw);
        assert_eq!(grouped["PDB"].as_array().unwrap().len(), 2);
        assert_eq!(grouped["Reactome"][0], "R-HSA-5685942");
    }
}
