// crates/locus-server/src/handlers/ncbi.rs
// NCBI Entrez E-utilities handlers

use std::sync::Arc;

use serde_json::{Value, json};

use crate::error::{BrokerError, Result};

use super::{HandlerMap, ToolContext, limit_arg, opt_str_arg, str_arg};

const EUTILS_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

pub fn register(map: &mut HandlerMap) {
    map.insert("ncbi_search", |args, ctx| Box::pin(search(args, ctx)));
    map.insert("fetch_genbank_record", |args, ctx| {
        Box::pin(fetch_genbank(args, ctx))
    });
    map.insert("fetch_protein_record", |args, ctx| {
        Box::pin(fetch_protein(args, ctx))
    });
    map.insert("ncbi_gene_summary", |args, ctx| {
        Box::pin(gene_summary(args, ctx))
    });
    map.insert("get_gene_info", |args, ctx| Box::pin(gene_info(args, ctx)));
    map.insert("pubmed_search", |args, ctx| Box::pin(pubmed(args, ctx)));
    map.insert("taxonomy_lookup", |args, ctx| Box::pin(taxonomy(args, ctx)));
}

/// Common query parameters for every E-utilities request.
fn base_params(ctx: &ToolContext) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("retmode", "json".to_string()),
        ("tool", "locus".to_string()),
    ];
    if let Some(key) = ctx.upstream_key("ncbi") {
        params.push(("api_key", key));
    }
    params
}

async fn esearch(ctx: &ToolContext, db: &str, term: &str, limit: i64) -> Result<Vec<String>> {
    let mut params = base_params(ctx);
    params.push(("db", db.to_string()));
    params.push(("term", term.to_string()));
    params.push(("retmax", limit.to_string()));
    let body = ctx
        .http
        .get_json(&format!("{EUTILS_BASE}/esearch.fcgi"), &params)
        .await?;
    Ok(body["esearchresult"]["idlist"]
        .as_array()
        .map(|ids| {
            ids.iter()
                .filter_map(|id| id.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default())
}

async fn esummary(ctx: &ToolContext, db: &str, ids: &[String]) -> Result<Value> {
    let mut params = base_params(ctx);
    params.push(("db", db.to_string()));
    params.push(("id", ids.join(",")));
    ctx.http
        .get_json(&format!("{EUTILS_BASE}/esummary.fcgi"), &params)
        .await
}

/// Collect per-id summary documents from an esummary response.
fn summary_docs(body: &Value, ids: &[String]) -> Vec<Value> {
    ids.iter()
        .filter_map(|id| {
            let doc = &body["result"][id];
            if doc.is_null() { None } else { Some(doc.clone()) }
        })
        .collect()
}

async fn search(args: Value, ctx: Arc<ToolContext>) -> Result<Value> {
    let query = str_arg(&args, "query")?;
    let database = opt_str_arg(&args, "database").unwrap_or("nucleotide");
    let limit = limit_arg(&args, 10);

    let ids = esearch(&ctx, database, query, limit).await?;
    if ids.is_empty() {
        return Ok(json!({
            "success": true,
            "database": database,
            "count": 0,
            "results": [],
        }));
    }
    let summaries = esummary(&ctx, database, &ids).await?;
    let results: Vec<Value> = summary_docs(&summaries, &ids)
        .into_iter()
        .map(|doc| {
            json!({
                "id": doc["uid"],
                "title": doc["title"],
                "accession": doc["accessionversion"],
                "length": doc["slen"],
                "organism": doc["organism"],
            })
        })
        .collect();

    Ok(json!({
        "success": true,
        "database": database,
        "count": results.len(),
        "results": results,
    }))
}

async fn efetch_text(
    ctx: &ToolContext,
    db: &str,
    accession: &str,
    rettype: &str,
) -> Result<String> {
    let mut params: Vec<(&str, String)> = vec![
        ("db", db.to_string()),
        ("id", accession.to_string()),
        ("rettype", rettype.to_string()),
        ("retmode", "text".to_string()),
        ("tool", "locus".to_string()),
    ];
    if let Some(key) = ctx.upstream_key("ncbi") {
        params.push(("api_key", key));
    }
    ctx.http
        .get_text(&format!("{EUTILS_BASE}/efetch.fcgi"), &params)
        .await
}

async fn fetch_genbank(args: Value, ctx: Arc<ToolContext>) -> Result<Value> {
    let accession = str_arg(&args, "accession")?;
    let rettype = opt_str_arg(&args, "rettype").unwrap_or("gb");
    let record = efetch_text(&ctx, "nucleotide", accession, rettype).await?;
    if record.trim().is_empty() {
        return Err(BrokerError::Upstream(format!(
            "empty record for accession {accession}"
        )));
    }
    Ok(json!({
        "success": true,
        "accession": accession,
        "format": rettype,
        "record": record,
    }))
}

async fn fetch_protein(args: Value, ctx: Arc<ToolContext>) -> Result<Value> {
    let accession = str_arg(&args, "accession")?;
    let record = efetch_text(&ctx, "protein", accession, "fasta").await?;
    if record.trim().is_empty() {
        return Err(BrokerError::Upstream(format!(
            "empty record for accession {accession}"
        )));
    }
    Ok(json!({
        "success": true,
        "accession": accession,
        "format": "fasta",
        "record": record,
    }))
}

async fn resolve_gene_id(ctx: &ToolContext, gene: &str, organism: &str) -> Result<String> {
    if gene.chars().all(|c| c.is_ascii_digit()) {
        return Ok(gene.to_string());
    }
    let term = format!("{gene}[sym] AND {organism}[orgn]");
    let ids = esearch(ctx, "gene", &term, 1).await?;
    ids.into_iter()
        .next()
        .ok_or_else(|| BrokerError::Upstream(format!("no gene found for symbol {gene}")))
}

async fn gene_summary(args: Value, ctx: Arc<ToolContext>) -> Result<Value> {
    let gene = str_arg(&args, "gene")?;
    let organism = opt_str_arg(&args, "organism").unwrap_or("Homo sapiens");
    let gene_id = resolve_gene_id(&ctx, gene, organism).await?;
    let summaries = esummary(&ctx, "gene", std::slice::from_ref(&gene_id)).await?;
    let doc = &summaries["result"][&gene_id];

    Ok(json!({
        "success": true,
        "geneId": gene_id,
        "symbol": doc["name"],
        "description": doc["description"],
        "summary": doc["summary"],
        "organism": doc["organism"]["scientificname"],
    }))
}

async fn gene_info(args: Value, ctx: Arc<ToolContext>) -> Result<Value> {
    let symbol = str_arg(&args, "symbol")?;
    let organism = opt_str_arg(&args, "organism").unwrap_or("Homo sapiens");
    let gene_id = resolve_gene_id(&ctx, symbol, organism).await?;
    let summaries = esummary(&ctx, "gene", std::slice::from_ref(&gene_id)).await?;
    let doc = &summaries["result"][&gene_id];
    let location = &doc["genomicinfo"][0];

    Ok(json!({
        "success": true,
        "geneId": gene_id,
        "symbol": doc["name"],
        "description": doc["description"],
        "aliases": doc["otheraliases"],
        "chromosome": doc["chromosome"],
        "location": {
            "accession": location["chraccver"],
            "start": location["chrstart"],
            "end": location["chrstop"],
        },
        "mapLocation": doc["maplocation"],
    }))
}

async fn pubmed(args: Value, ctx: Arc<ToolContext>) -> Result<Value> {
    let query = str_arg(&args, "query")?;
    let limit = limit_arg(&args, 10);
    let ids = esearch(&ctx, "pubmed", query, limit).await?;
    if ids.is_empty() {
        return Ok(json!({"success": true, "count": 0, "results": []}));
    }
    let summaries = esummary(&ctx, "pubmed", &ids).await?;
    let results: Vec<Value> = summary_docs(&summaries, &ids)
        .into_iter()
        .map(|doc| {
            json!({
                "pmid": doc["uid"],
                "title": doc["title"],
                "journal": doc["fulljournalname"],
                "pubDate": doc["pubdate"],
            })
        })
        .collect();
    Ok(json!({"success": true, "count": results.len(), "results": results}))
}

async fn taxonomy(args: Value, ctx: Arc<ToolContext>) -> Result<Value> {
    let name = str_arg(&args, "name")?;
    let tax_id = if name.chars().all(|c| c.is_ascii_digit()) {
        name.to_string()
    } else {
        let ids = esearch(&ctx, "taxonomy", name, 1).await?;
        ids.into_iter().next().ok_or_else(|| {
            BrokerError::Upstream(format!("no taxonomy entry found for {name}"))
        })?
    };
    let summaries = esummary(&ctx, "taxonomy", std::slice::from_ref(&tax_id)).await?;
    let doc = &summaries["result"][&tax_id];

    Ok(json!({
        "success": true,
        "taxId": tax_id,
        "scientificName": doc["scientificname"],
        "commonName": doc["commonname"],
        "rank": doc["rank"],
        "division": doc["division"],
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_docs_skips_missing_ids() {
        let body = json!({
            "result": {
                "1": {"uid": "1", "title": "first"},
                "uids": ["1"]
            }
        });
        let docs = summary_docs(&body, &["1".to_string(), "2".to_string()]);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["title"], "first");
    }
}
