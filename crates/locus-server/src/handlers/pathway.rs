// crates/locus-server/src/handlers/pathway.rs
// Pathway lookups via UniProt cross-references and local enrichment

use std::sync::Arc;

use serde_json::{Value, json};

use crate::error::{BrokerError, Result};

use super::{HandlerMap, ToolContext, limit_arg, opt_int_arg, str_arg};

const UNIPROT_BASE: &str = "https://rest.uniprot.org/uniprotkb";

pub fn register(map: &mut HandlerMap) {
    map.insert("find_pathways_for_gene", |args, ctx| {
        Box::pin(pathways_for_gene(args, ctx))
    });
    map.insert("get_pathway_genes", |args, ctx| {
        Box::pin(pathway_genes(args, ctx))
    });
    map.insert("pathway_enrichment", |args, ctx| {
        Box::pin(enrichment(args, ctx))
    });
}

/// Reactome/KEGG cross-references of a UniProt entry.
fn pathway_refs(entry: &Value, limit: i64) -> Vec<Value> {
    let mut pathways = Vec::new();
    if let Some(refs) = entry["uniProtKBCrossReferences"].as_array() {
        for reference in refs {
            let database = reference["database"].as_str().unwrap_or_default();
            if database != "Reactome" && database != "KEGG" {
                continue;
            }
            let name = reference["properties"]
                .as_array()
                .and_then(|props| {
                    props
                        .iter()
                        .find(|p| p["key"] == "PathwayName")
                        .and_then(|p| p["value"].as_str())
                })
                .unwrap_or_default();
            pathways.push(json!({
                "id": reference["id"],
                "database": database,
                "name": name,
            }));
            if pathways.len() as i64 >= limit {
                break;
            }
        }
    }
    pathways
}

async fn pathways_for_gene(args: Value, ctx: Arc<ToolContext>) -> Result<Value> {
    let gene = str_arg(&args, "gene")?;
    let limit = limit_arg(&args, 20);

    // Accept either an accession or a gene symbol.
    let query = if gene.len() >= 6 && gene.chars().next().is_some_and(|c| c.is_ascii_uppercase())
        && gene.chars().skip(1).any(|c| c.is_ascii_digit())
    {
        format!("accession:{gene}")
    } else {
        format!("gene_exact:{gene} AND reviewed:true")
    };

    let body = ctx
        .http
        .get_json(
            &format!("{UNIPROT_BASE}/search"),
            &[
                ("query", query),
                ("size", "1".to_string()),
                ("fields", "accession,xref_reactome,xref_kegg".to_string()),
            ],
        )
        .await?;

    let entry = body["results"]
        .as_array()
        .and_then(|r| r.first())
        .ok_or_else(|| BrokerError::Upstream(format!("no UniProt entry for {gene}")))?;

    let pathways = pathway_refs(entry, limit);
    Ok(json!({
        "success": true,
        "gene": gene,
        "accession": entry["primaryAccession"],
        "count": pathways.len(),
        "pathways": pathways,
    }))
}

async fn pathway_genes(args: Value, ctx: Arc<ToolContext>) -> Result<Value> {
    let pathway_id = str_arg(&args, "pathway_id")?;
    let limit = limit_arg(&args, 50);

    let body = ctx
        .http
        .get_json(
            &format!("{UNIPROT_BASE}/search"),
            &[
                ("query", format!("xref:reactome-{pathway_id} AND reviewed:true")),
                ("size", limit.to_string()),
                ("fields", "accession,gene_names".to_string()),
            ],
        )
        .await?;

    let genes: Vec<Value> = body["results"]
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .map(|e| {
                    json!({
                        "accession": e["primaryAccession"],
                        "gene": e["genes"][0]["geneName"]["value"],
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(json!({
        "success": true,
        "pathwayId": pathway_id,
        "count": genes.len(),
        "genes": genes,
    }))
}

async fn enrichment(args: Value, ctx: Arc<ToolContext>) -> Result<Value> {
    let genes: Vec<String> = args
        .get("genes")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|g| g.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default();
    if genes.is_empty() {
        return Err(BrokerError::InvalidArguments(
            "genes must be a non-empty array of symbols".to_string(),
        ));
    }
    let max_results = opt_int_arg(&args, "max_results").unwrap_or(10).clamp(1, 100) as usize;

    let total = genes.len();
    let mut tally: std::collections::HashMap<String, (String, u64)> =
        std::collections::HashMap::new();

    for (index, gene) in genes.iter().enumerate() {
        ctx.checkpoint()?;
        let pct = (index * 90 / total) as u8;
        ctx.progress(pct, &format!("collecting pathways for {gene}")).await?;

        let found = pathways_for_gene(json!({"gene": gene, "limit": 50}), ctx.clone()).await;
        let Ok(result) = found else {
            // Unknown genes reduce coverage but do not fail the analysis.
            continue;
        };
        if let Some(pathways) = result["pathways"].as_array() {
            for pathway in pathways {
                let id = pathway["id"].as_str().unwrap_or_default().to_string();
                let name = pathway["name"].as_str().unwrap_or_default().to_string();
                if id.is_empty() {
                    continue;
                }
                let entry = tally.entry(id).or_insert((name, 0));
                entry.1 += 1;
            }
        }
    }

    ctx.progress(95, "ranking pathways").await?;
    let mut ranked: Vec<(String, String, u64)> = tally
        .into_iter()
        .map(|(id, (name, count))| (id, name, count))
        .collect();
    ranked.sort_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(&b.0)));
    let results: Vec<Value> = ranked
        .into_iter()
        .take(max_results)
        .map(|(id, name, count)| {
            json!({
                "pathwayId": id,
                "name": name,
                "geneHits": count,
                "coverage": (count as f64 / total as f64 * 1000.0).round() / 1000.0,
            })
        })
        .collect();

    ctx.progress(100, "enrichment complete").await?;
    Ok(json!({
        "success": true,
        "genesTested": total,
        "results": results,
    }))
}
