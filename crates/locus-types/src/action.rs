// crates/locus-types/src/action.rs
// Staged sequence-edit actions and the per-client clipboard

use serde::{Deserialize, Serialize};

/// Which strand a region refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Strand {
    #[default]
    #[serde(rename = "+")]
    Forward,
    #[serde(rename = "-")]
    Reverse,
}

/// Kind of a staged sequence edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Copy,
    Cut,
    Paste,
    Delete,
    Insert,
    Replace,
}

/// Lifecycle status of a staged action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Committed,
    Failed,
    Undone,
}

/// One staged sequence-edit intent.
///
/// Region edits (`delete`, `replace`) use `chromosome` + `start..=end`;
/// point edits (`insert`) use `chromosome` + `position`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub action_id: String,
    pub kind: ActionKind,
    pub chromosome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<String>,
    #[serde(default)]
    pub strand: Strand,
    pub status: ActionStatus,
    /// Original sequence reported by the client when a `replace` commits.
    /// Needed to construct the inverse action for undo.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaced_sequence: Option<String>,
}

impl Action {
    /// True when every character is one of `A`, `T`, `C`, `G`, `N`
    /// (case-insensitive) and the string is non-empty.
    pub fn is_valid_sequence(seq: &str) -> bool {
        !seq.is_empty()
            && seq
                .chars()
                .all(|c| matches!(c.to_ascii_uppercase(), 'A' | 'T' | 'C' | 'G' | 'N'))
    }

    /// Validate the structural invariants for this action's kind.
    ///
    /// Returns a human-readable description of the first violation.
    pub fn validate(&self) -> Result<(), String> {
        if let (Some(start), Some(end)) = (self.start, self.end)
            && start > end
        {
            return Err(format!("start {start} is after end {end}"));
        }
        match self.kind {
            ActionKind::Insert | ActionKind::Paste => {
                if self.position.is_none() {
                    return Err("insert requires a position".to_string());
                }
                match self.sequence.as_deref() {
                    Some(seq) if Self::is_valid_sequence(seq) => Ok(()),
                    Some(_) => Err("sequence must match [ATCGN]+".to_string()),
                    None => Err("insert requires a sequence".to_string()),
                }
            }
            ActionKind::Replace => {
                if self.start.is_none() || self.end.is_none() {
                    return Err("replace requires start and end".to_string());
                }
                match self.sequence.as_deref() {
                    Some(seq) if Self::is_valid_sequence(seq) => Ok(()),
                    Some(_) => Err("sequence must match [ATCGN]+".to_string()),
                    None => Err("replace requires a sequence".to_string()),
                }
            }
            ActionKind::Delete | ActionKind::Copy | ActionKind::Cut => {
                if self.start.is_none() || self.end.is_none() {
                    return Err("region actions require start and end".to_string());
                }
                Ok(())
            }
        }
    }
}

/// Where a clipboard sequence came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    pub chromosome: String,
    pub start: i64,
    pub end: i64,
    #[serde(default)]
    pub strand: Strand,
}

/// Per-client clipboard: a sequence plus its provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clipboard {
    pub sequence: String,
    pub provenance: Provenance,
}
