// crates/locus-server/src/handlers/external.rs
// NCBI BLAST URL API and upstream diagnostics

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};

use crate::error::{BrokerError, Result};

use super::{HandlerMap, ToolContext, limit_arg, opt_str_arg, str_arg};

const BLAST_BASE: &str = "https://blast.ncbi.nlm.nih.gov/Blast.cgi";

pub fn register(map: &mut HandlerMap) {
    map.insert("blast_search", |args, ctx| Box::pin(blast_search(args, ctx)));
    map.insert("blast_get_results", |args, ctx| {
        Box::pin(blast_get_results(args, ctx))
    });
    map.insert("check_upstream_status", |args, ctx| {
        Box::pin(upstream_status(args, ctx))
    });
}

/// Pull a named token out of the QBlastInfo comment block.
fn qblast_field<'a>(body: &'a str, field: &str) -> Option<&'a str> {
    body.lines()
        .map(str::trim)
        .find(|line| line.starts_with(field))
        .and_then(|line| line.split('=').nth(1))
        .map(str::trim)
}

async fn blast_search(args: Value, ctx: Arc<ToolContext>) -> Result<Value> {
    let sequence = str_arg(&args, "sequence")?;
    let program = opt_str_arg(&args, "program").unwrap_or("blastn");
    let database = opt_str_arg(&args, "database").unwrap_or("nt");
    let limit = limit_arg(&args, 10);

    ctx.progress(0, "submitting BLAST request").await?;
    let submit = ctx
        .http
        .get_text(
            BLAST_BASE,
            &[
                ("CMD", "Put".to_string()),
                ("PROGRAM", program.to_string()),
                ("DATABASE", database.to_string()),
                ("QUERY", sequence.to_string()),
            ],
        )
        .await?;

    let rid = qblast_field(&submit, "RID")
        .ok_or_else(|| BrokerError::Upstream("BLAST submission returned no RID".to_string()))?
        .to_string();
    ctx.progress(20, "request accepted, polling").await?;

    // Poll until ready. The task-level timeout bounds the total wait.
    let mut waited = 0u64;
    loop {
        ctx.checkpoint()?;
        tokio::time::sleep(Duration::from_secs(10)).await;
        waited += 10;
        let status = ctx
            .http
            .get_text(
                BLAST_BASE,
                &[
                    ("CMD", "Get".to_string()),
                    ("RID", rid.clone()),
                    ("FORMAT_OBJECT", "SearchInfo".to_string()),
                ],
            )
            .await?;
        match qblast_field(&status, "Status") {
            Some("READY") => break,
            Some("WAITING") | None => {
                let pct = 20 + (waited.min(600) * 60 / 600) as u8;
                ctx.progress(pct, "BLAST search running").await?;
            }
            Some(other) => {
                return Err(BrokerError::Upstream(format!(
                    "BLAST search ended with status {other}"
                )));
            }
        }
    }

    ctx.progress(90, "fetching alignments").await?;
    let results = fetch_blast_hits(&ctx, &rid, limit).await?;
    ctx.progress(100, "BLAST complete").await?;
    Ok(json!({
        "success": true,
        "rid": rid,
        "program": program,
        "database": database,
        "hits": results,
    }))
}

async fn fetch_blast_hits(ctx: &ToolContext, rid: &str, limit: i64) -> Result<Vec<Value>> {
    let body = ctx
        .http
        .get_json(
            BLAST_BASE,
            &[
                ("CMD", "Get".to_string()),
                ("RID", rid.to_string()),
                ("FORMAT_TYPE", "JSON2_S".to_string()),
                ("ALIGNMENTS", limit.to_string()),
            ],
        )
        .await?;

    let hits = body["BlastOutput2"][0]["report"]["results"]["search"]["hits"]
        .as_array()
        .map(|hits| {
            hits.iter()
                .take(limit as usize)
                .map(|hit| {
                    let hsp = &hit["hsps"][0];
                    json!({
                        "id": hit["description"][0]["id"],
                        "title": hit["description"][0]["title"],
                        "bitScore": hsp["bit_score"],
                        "evalue": hsp["evalue"],
                        "identity": hsp["identity"],
                        "alignLen": hsp["align_len"],
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    Ok(hits)
}

async fn blast_get_results(args: Value, ctx: Arc<ToolContext>) -> Result<Value> {
    let rid = str_arg(&args, "rid")?;
    let limit = limit_arg(&args, 10);

    let status = ctx
        .http
        .get_text(
            BLAST_BASE,
            &[
                ("CMD", "Get".to_string()),
                ("RID", rid.to_string()),
                ("FORMAT_OBJECT", "SearchInfo".to_string()),
            ],
        )
        .await?;
    match qblast_field(&status, "Status") {
        Some("READY") => {
            let hits = fetch_blast_hits(&ctx, rid, limit).await?;
            Ok(json!({"success": true, "rid": rid, "status": "ready", "hits": hits}))
        }
        Some("WAITING") => Ok(json!({"success": true, "rid": rid, "status": "waiting"})),
        other => Err(BrokerError::Upstream(format!(
            "BLAST request {rid} has status {}",
            other.unwrap_or("UNKNOWN")
        ))),
    }
}

/// Probe each configured upstream with a cheap request.
async fn upstream_status(_args: Value, ctx: Arc<ToolContext>) -> Result<Value> {
    let probes: [(&str, &str); 4] = [
        ("uniprot", "https://rest.uniprot.org/uniprotkb/search?query=insulin&size=1"),
        ("interpro", "https://www.ebi.ac.uk/interpro/api/entry/interpro/IPR000001"),
        ("ncbi", "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/einfo.fcgi?retmode=json"),
        ("pdb", "https://data.rcsb.org/rest/v1/holdings/current/entry_ids"),
    ];

    let mut services = serde_json::Map::new();
    for (name, url) in probes {
        let reachable = ctx.http.get_text(url, &[]).await.is_ok();
        services.insert(name.to_string(), json!({"reachable": reachable}));
    }
    services.insert(
        "evo2".to_string(),
        json!({
            "configured": ctx.env.api_keys.has_evo2(),
        }),
    );

    Ok(json!({"success": true, "services": Value::Object(services)}))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qblast_parsing() {
        let body = "\n    RID = ABC123\n    RTOE = 25\n";
        assert_eq!(qblast_field(body, "RID"), Some("ABC123"));
        assert_eq!(qblast_field(body, "RTOE"), Some("25"));
        assert_eq!(qblast_field(body, "Status"), None);
    }
}
