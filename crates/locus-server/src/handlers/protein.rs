// crates/locus-server/src/handlers/protein.rs
// Structure lookups (PDB, AlphaFold) and local protein properties

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Value, json};

use crate::error::{BrokerError, Result};

use super::{HandlerMap, ToolContext, str_arg};

const PDB_BASE: &str = "https://data.rcsb.org/rest/v1/core/entry";
const ALPHAFOLD_BASE: &str = "https://alphafold.ebi.ac.uk/api/prediction";

pub fn register(map: &mut HandlerMap) {
    map.insert("get_protein_structure", |args, ctx| {
        Box::pin(pdb_structure(args, ctx))
    });
    map.insert("get_alphafold_structure", |args, ctx| {
        Box::pin(alphafold_structure(args, ctx))
    });
    map.insert("predict_protein_properties", |args, ctx| {
        Box::pin(properties(args, ctx))
    });
}

async fn pdb_structure(args: Value, ctx: Arc<ToolContext>) -> Result<Value> {
    let pdb_id = str_arg(&args, "pdb_id")?.to_uppercase();
    let url = format!("{PDB_BASE}/{}", urlencoding::encode(&pdb_id));
    let body = ctx.http.get_json(&url, &[]).await?;

    Ok(json!({
        "success": true,
        "pdbId": pdb_id,
        "title": body["struct"]["title"],
        "method": body["exptl"][0]["method"],
        "resolution": body["rcsb_entry_info"]["resolution_combined"][0],
        "releaseDate": body["rcsb_accession_info"]["initial_release_date"],
        "downloadUrl": format!("https://files.rcsb.org/download/{pdb_id}.pdb"),
    }))
}

async fn alphafold_structure(args: Value, ctx: Arc<ToolContext>) -> Result<Value> {
    let accession = str_arg(&args, "accession")?;
    let url = format!("{ALPHAFOLD_BASE}/{}", urlencoding::encode(accession));
    let body = ctx.http.get_json(&url, &[]).await?;

    let prediction = body
        .as_array()
        .and_then(|models| models.first())
        .ok_or_else(|| {
            BrokerError::Upstream(format!("no AlphaFold model for {accession}"))
        })?;

    Ok(json!({
        "success": true,
        "accession": accession,
        "modelId": prediction["entryId"],
        "meanPlddt": prediction["globalMetricValue"],
        "pdbUrl": prediction["pdbUrl"],
        "cifUrl": prediction["cifUrl"],
    }))
}

/// Average residue masses in Daltons (monoisotopic masses are overkill here).
fn residue_mass(aa: char) -> Option<f64> {
    let mass = match aa {
        'A' => 71.08,
        'R' => 156.19,
        'N' => 114.10,
        'D' => 115.09,
        'C' => 103.14,
        'E' => 129.12,
        'Q' => 128.13,
        'G' => 57.05,
        'H' => 137.14,
        'I' => 113.16,
        'L' => 113.16,
        'K' => 128.17,
        'M' => 131.19,
        'F' => 147.18,
        'P' => 97.12,
        'S' => 87.08,
        'T' => 101.10,
        'W' => 186.21,
        'Y' => 163.18,
        'V' => 99.13,
        _ => return None,
    };
    Some(mass)
}

/// Kyte-Doolittle hydropathy index.
fn hydropathy(aa: char) -> f64 {
    match aa {
        'I' => 4.5,
        'V' => 4.2,
        'L' => 3.8,
        'F' => 2.8,
        'C' => 2.5,
        'M' => 1.9,
        'A' => 1.8,
        'G' => -0.4,
        'T' => -0.7,
        'S' => -0.8,
        'W' => -0.9,
        'Y' => -1.3,
        'P' => -1.6,
        'H' => -3.2,
        'E' | 'Q' => -3.5,
        'D' | 'N' => -3.5,
        'K' => -3.9,
        'R' => -4.5,
        _ => 0.0,
    }
}

async fn properties(args: Value, _ctx: Arc<ToolContext>) -> Result<Value> {
    let sequence: String = str_arg(&args, "sequence")?
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if sequence.is_empty() {
        return Err(BrokerError::InvalidArguments(
            "sequence must not be empty".to_string(),
        ));
    }

    let mut weight = 18.02; // one water for the chain termini
    let mut composition: BTreeMap<String, u64> = BTreeMap::new();
    let mut gravy_sum = 0.0;
    let mut unknown = 0u64;
    for aa in sequence.chars() {
        match residue_mass(aa) {
            Some(mass) => {
                weight += mass;
                *composition.entry(aa.to_string()).or_insert(0) += 1;
                gravy_sum += hydropathy(aa);
            }
            None => unknown += 1,
        }
    }
    let known = (sequence.len() as u64 - unknown).max(1);

    Ok(json!({
        "success": true,
        "length": sequence.len(),
        "molecularWeight": (weight * 100.0).round() / 100.0,
        "gravy": (gravy_sum / known as f64 * 1000.0).round() / 1000.0,
        "composition": composition,
        "unknownResidues": unknown,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::seq::tests::test_ctx;

    #[tokio::test]
    async fn properties_of_glycine_chain() {
        let out = properties(json!({"sequence": "GGGG"}), test_ctx()).await.unwrap();
        assert_eq!(out["length"], 4);
        // 4 * 57.05 + water
        let weight = out["molecularWeight"].as_f64().unwrap();
        assert!((weight - 246.22).abs() < 0.01, "got {weight}");
        assert_eq!(out["composition"]["G"], 4);
    }

    #[tokio::test]
    async fn unknown_residues_are_counted() {
        let out = properties(json!({"sequence": "GGZZ"}), test_ctx()).await.unwrap();
        assert_eq!(out["unknownResidues"], 2);
    }

    #[tokio::test]
    async fn empty_sequence_rejected() {
        let err = properties(json!({"sequence": "  "}), test_ctx()).await.unwrap_err();
        assert!(matches!(err, BrokerError::InvalidArguments(_)));
    }
}
