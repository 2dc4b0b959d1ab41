// crates/locus-server/src/handlers/seq.rs
// Pure-local sequence computation: deterministic, no network, no retries

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Value, json};

use crate::error::{BrokerError, Result};

use super::{HandlerMap, ToolContext, bool_arg, int_arg, opt_int_arg, str_arg};

pub fn register(map: &mut HandlerMap) {
    map.insert("compute_gc", |args, ctx| Box::pin(compute_gc(args, ctx)));
    map.insert("translate_dna", |args, ctx| Box::pin(translate_dna(args, ctx)));
    map.insert("reverse_complement", |args, ctx| {
        Box::pin(reverse_complement(args, ctx))
    });
    map.insert("transcribe_dna", |args, ctx| Box::pin(transcribe_dna(args, ctx)));
    map.insert("find_orfs", |args, ctx| Box::pin(find_orfs(args, ctx)));
    map.insert("codon_usage", |args, ctx| Box::pin(codon_usage(args, ctx)));
    map.insert("sequence_similarity", |args, ctx| {
        Box::pin(sequence_similarity(args, ctx))
    });
    map.insert("find_motif", |args, ctx| Box::pin(find_motif(args, ctx)));
    map.insert("validate_sequence", |args, ctx| {
        Box::pin(validate_sequence(args, ctx))
    });
}

/// Render a ratio as a JSON number, as an integer when it is whole.
fn pct_value(pct: f64) -> Value {
    let rounded = (pct * 100.0).round() / 100.0;
    if rounded.fract() == 0.0 {
        json!(rounded as i64)
    } else {
        json!(rounded)
    }
}

fn clean_dna(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

async fn compute_gc(args: Value, _ctx: Arc<ToolContext>) -> Result<Value> {
    let sequence = clean_dna(str_arg(&args, "sequence")?);
    if sequence.is_empty() {
        return Err(BrokerError::InvalidArguments(
            "sequence must not be empty".to_string(),
        ));
    }
    let window = opt_int_arg(&args, "window").unwrap_or(0).max(0) as usize;

    let gc = |chunk: &str| {
        let hits = chunk.chars().filter(|c| matches!(c, 'G' | 'C')).count();
        hits as f64 / chunk.len() as f64 * 100.0
    };

    let mut out = json!({
        "success": true,
        "gcContent": pct_value(gc(&sequence)),
        "length": sequence.len(),
    });
    if window > 0 && sequence.len() >= window {
        let windows: Vec<Value> = sequence
            .as_bytes()
            .windows(window)
            .step_by(window)
            .enumerate()
            .map(|(i, chunk)| {
                let chunk = std::str::from_utf8(chunk).unwrap_or_default();
                json!({"start": i * window + 1, "gc": pct_value(gc(chunk))})
            })
            .collect();
        out["windows"] = Value::Array(windows);
    }
    Ok(out)
}

const CODON_TABLE: [(&str, char); 64] = [
    ("TTT", 'F'), ("TTC", 'F'), ("TTA", 'L'), ("TTG", 'L'),
    ("CTT", 'L'), ("CTC", 'L'), ("CTA", 'L'), ("CTG", 'L'),
    ("ATT", 'I'), ("ATC", 'I'), ("ATA", 'I'), ("ATG", 'M'),
    ("GTT", 'V'), ("GTC", 'V'), ("GTA", 'V'), ("GTG", 'V'),
    ("TCT", 'S'), ("TCC", 'S'), ("TCA", 'S'), ("TCG", 'S'),
    ("CCT", 'P'), ("CCC", 'P'), ("CCA", 'P'), ("CCG", 'P'),
    ("ACT", 'T'), ("ACC", 'T'), ("ACA", 'T'), ("ACG", 'T'),
    ("GCT", 'A'), ("GCC", 'A'), ("GCA", 'A'), ("GCG", 'A'),
    ("TAT", 'Y'), ("TAC", 'Y'), ("TAA", '*'), ("TAG", '*'),
    ("CAT", 'H'), ("CAC", 'H'), ("CAA", 'Q'), ("CAG", 'Q'),
    ("AAT", 'N'), ("AAC", 'N'), ("AAA", 'K'), ("AAG", 'K'),
    ("GAT", 'D'), ("GAC", 'D'), ("GAA", 'E'), ("GAG", 'E'),
    ("TGT", 'C'), ("TGC", 'C'), ("TGA", '*'), ("TGG", 'W'),
    ("CGT", 'R'), ("CGC", 'R'), ("CGA", 'R'), ("CGG", 'R'),
    ("AGT", 'S'), ("AGC", 'S'), ("AGA", 'R'), ("AGG", 'R'),
    ("GGT", 'G'), ("GGC", 'G'), ("GGA", 'G'), ("GGG", 'G'),
];

pub(crate) fn codon_to_aa(codon: &str) -> char {
    CODON_TABLE
        .iter()
        .find(|(c, _)| *c == codon)
        .map(|(_, aa)| *aa)
        .unwrap_or('X')
}

/// Translate one frame of an uppercase DNA string.
fn translate(dna: &str, frame: usize, stop_at_stop: bool) -> String {
    let mut protein = String::new();
    let bytes = dna.as_bytes();
    let mut i = frame;
    while i + 3 <= bytes.len() {
        let codon = &dna[i..i + 3];
        let aa = codon_to_aa(codon);
        if aa == '*' && stop_at_stop {
            break;
        }
        protein.push(aa);
        i += 3;
    }
    protein
}

async fn translate_dna(args: Value, _ctx: Arc<ToolContext>) -> Result<Value> {
    let dna = clean_dna(str_arg(&args, "dna")?);
    let frame = opt_int_arg(&args, "frame").unwrap_or(0);
    if !(0..=2).contains(&frame) {
        return Err(BrokerError::InvalidArguments(
            "frame must be 0, 1 or 2".to_string(),
        ));
    }
    let stop_at_stop = bool_arg(&args, "stop_at_stop", false);
    let protein = translate(&dna, frame as usize, stop_at_stop);
    Ok(json!({
        "success": true,
        "protein": protein,
        "frame": frame,
        "codons": protein.len(),
    }))
}

fn complement_base(base: char) -> char {
    match base {
        'A' => 'T',
        'T' => 'A',
        'C' => 'G',
        'G' => 'C',
        'U' => 'A',
        'R' => 'Y',
        'Y' => 'R',
        'S' => 'S',
        'W' => 'W',
        'K' => 'M',
        'M' => 'K',
        'B' => 'V',
        'V' => 'B',
        'D' => 'H',
        'H' => 'D',
        other => other,
    }
}

fn revcomp(dna: &str) -> String {
    dna.chars().rev().map(complement_base).collect()
}

async fn reverse_complement(args: Value, _ctx: Arc<ToolContext>) -> Result<Value> {
    let sequence = clean_dna(str_arg(&args, "sequence")?);
    Ok(json!({
        "success": true,
        "sequence": revcomp(&sequence),
        "length": sequence.len(),
    }))
}

async fn transcribe_dna(args: Value, _ctx: Arc<ToolContext>) -> Result<Value> {
    let sequence = clean_dna(str_arg(&args, "sequence")?);
    let rna: String = sequence
        .chars()
        .map(|c| if c == 'T' { 'U' } else { c })
        .collect();
    Ok(json!({"success": true, "rna": rna, "length": rna.len()}))
}

/// One open reading frame hit.
fn orfs_in_frame(dna: &str, frame: usize, strand: &str, min_length: usize) -> Vec<Value> {
    let mut hits = Vec::new();
    let bytes = dna.as_bytes();
    let mut i = frame;
    while i + 3 <= bytes.len() {
        if &dna[i..i + 3] == "ATG" {
            let mut j = i + 3;
            while j + 3 <= bytes.len() {
                let codon = &dna[j..j + 3];
                if matches!(codon, "TAA" | "TAG" | "TGA") {
                    let length = j + 3 - i;
                    if length >= min_length {
                        hits.push(json!({
                            "strand": strand,
                            "frame": frame,
                            "start": i + 1,
                            "end": j + 3,
                            "length": length,
                            "protein": translate(&dna[i..j], 0, false),
                        }));
                    }
                    break;
                }
                j += 3;
            }
            // Continue scanning after this start; nested starts are separate ORFs.
        }
        i += 3;
    }
    hits
}

async fn find_orfs(args: Value, _ctx: Arc<ToolContext>) -> Result<Value> {
    let sequence = clean_dna(str_arg(&args, "sequence")?);
    let min_length = opt_int_arg(&args, "min_length").unwrap_or(90).max(6) as usize;

    let mut orfs = Vec::new();
    let reverse = revcomp(&sequence);
    for frame in 0..3 {
        orfs.extend(orfs_in_frame(&sequence, frame, "+", min_length));
        orfs.extend(orfs_in_frame(&reverse, frame, "-", min_length));
    }
    orfs.sort_by_key(|o| std::cmp::Reverse(o["length"].as_i64().unwrap_or(0)));

    Ok(json!({
        "success": true,
        "count": orfs.len(),
        "min_length": min_length,
        "orfs": orfs,
    }))
}

async fn codon_usage(args: Value, _ctx: Arc<ToolContext>) -> Result<Value> {
    let sequence = clean_dna(str_arg(&args, "sequence")?);
    let frame = opt_int_arg(&args, "frame").unwrap_or(0).clamp(0, 2) as usize;

    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    let mut total = 0u64;
    let mut i = frame;
    while i + 3 <= sequence.len() {
        let codon = &sequence[i..i + 3];
        if codon.chars().all(|c| matches!(c, 'A' | 'T' | 'C' | 'G')) {
            *counts.entry(codon.to_string()).or_insert(0) += 1;
            total += 1;
        }
        i += 3;
    }

    let codons: BTreeMap<String, Value> = counts
        .into_iter()
        .map(|(codon, count)| {
            let aa = codon_to_aa(&codon).to_string();
            let frequency = count as f64 / total.max(1) as f64;
            (
                codon,
                json!({
                    "count": count,
                    "aminoAcid": aa,
                    "frequency": (frequency * 10_000.0).round() / 10_000.0,
                }),
            )
        })
        .collect();

    Ok(json!({
        "success": true,
        "totalCodons": total,
        "codons": codons,
    }))
}

/// Levenshtein distance, O(n*m) with a rolling row.
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            current[j + 1] = (prev[j] + cost)
                .min(prev[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut prev, &mut current);
    }
    prev[b.len()]
}

async fn sequence_similarity(args: Value, _ctx: Arc<ToolContext>) -> Result<Value> {
    let query = clean_dna(str_arg(&args, "query")?);
    let subject = clean_dna(str_arg(&args, "subject")?);
    if query.is_empty() || subject.is_empty() {
        return Err(BrokerError::InvalidArguments(
            "query and subject must not be empty".to_string(),
        ));
    }

    let distance = edit_distance(&query, &subject);
    let longest = query.len().max(subject.len());
    let identity = 1.0 - distance as f64 / longest as f64;

    Ok(json!({
        "success": true,
        "identity": (identity * 10_000.0).round() / 10_000.0,
        "editDistance": distance,
        "queryLength": query.len(),
        "subjectLength": subject.len(),
    }))
}

/// Does an IUPAC code match a concrete base?
fn iupac_matches(code: char, base: char) -> bool {
    let expansion = match code {
        'A' => "A",
        'C' => "C",
        'G' => "G",
        'T' => "T",
        'R' => "AG",
        'Y' => "CT",
        'S' => "GC",
        'W' => "AT",
        'K' => "GT",
        'M' => "AC",
        'B' => "CGT",
        'D' => "AGT",
        'H' => "ACT",
        'V' => "ACG",
        'N' => "ACGT",
        _ => return false,
    };
    expansion.contains(base)
}

fn scan_motif(sequence: &str, motif: &str) -> Vec<usize> {
    let seq: Vec<char> = sequence.chars().collect();
    let pat: Vec<char> = motif.chars().collect();
    if pat.is_empty() || pat.len() > seq.len() {
        return Vec::new();
    }
    (0..=seq.len() - pat.len())
        .filter(|&start| {
            pat.iter()
                .enumerate()
                .all(|(i, &code)| iupac_matches(code, seq[start + i]))
        })
        .map(|start| start + 1)
        .collect()
}

async fn find_motif(args: Value, _ctx: Arc<ToolContext>) -> Result<Value> {
    let sequence = clean_dna(str_arg(&args, "sequence")?);
    let motif = clean_dna(str_arg(&args, "motif")?);
    if motif.is_empty() {
        return Err(BrokerError::InvalidArguments(
            "motif must not be empty".to_string(),
        ));
    }
    let both_strands = bool_arg(&args, "both_strands", true);

    let forward = scan_motif(&sequence, &motif);
    let mut matches: Vec<Value> = forward
        .iter()
        .map(|&pos| json!({"position": pos, "strand": "+"}))
        .collect();
    if both_strands {
        for pos in scan_motif(&sequence, &revcomp(&motif)) {
            matches.push(json!({"position": pos, "strand": "-"}));
        }
    }

    Ok(json!({
        "success": true,
        "motif": motif,
        "count": matches.len(),
        "matches": matches,
    }))
}

async fn validate_sequence(args: Value, _ctx: Arc<ToolContext>) -> Result<Value> {
    let raw = str_arg(&args, "sequence")?;
    let alphabet = args
        .get("alphabet")
        .and_then(|v| v.as_str())
        .unwrap_or("dna");
    let allowed: &str = match alphabet {
        "dna" => "ACGTN",
        "rna" => "ACGUN",
        "protein" => "ACDEFGHIKLMNPQRSTVWYX*",
        other => {
            return Err(BrokerError::InvalidArguments(format!(
                "unknown alphabet `{other}`"
            )));
        }
    };

    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    let mut counts: BTreeMap<char, u64> = BTreeMap::new();
    let mut invalid: Vec<String> = Vec::new();
    for c in cleaned.chars() {
        if allowed.contains(c) {
            *counts.entry(c).or_insert(0) += 1;
        } else if !invalid.iter().any(|s| s == &c.to_string()) {
            invalid.push(c.to_string());
        }
    }

    let composition: BTreeMap<String, u64> =
        counts.into_iter().map(|(c, n)| (c.to_string(), n)).collect();
    Ok(json!({
        "success": true,
        "valid": invalid.is_empty(),
        "alphabet": alphabet,
        "length": cleaned.len(),
        "invalidCharacters": invalid,
        "composition": composition,
    }))
}
