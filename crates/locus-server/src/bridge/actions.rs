// crates/locus-server/src/bridge/actions.rs
// Per-client clipboard and staged sequence-edit ledger

use locus_types::{Action, ActionKind, ActionStatus, Clipboard};

use crate::error::{BrokerError, Result};

/// Clipboard plus staged/committed sequence edits for one client.
///
/// Owned by the client bridge; mutated only in response to tool executions
/// targeting the same client. There is no cross-client clipboard.
#[derive(Debug, Default)]
pub struct ActionLedger {
    clipboard: Option<Clipboard>,
    /// Staged actions awaiting `execute_actions`, in submission order.
    queue: Vec<Action>,
    /// Committed actions, newest first. Head is the undo candidate.
    history: Vec<Action>,
}

impl ActionLedger {
    pub fn clipboard(&self) -> Option<&Clipboard> {
        self.clipboard.as_ref()
    }

    pub fn set_clipboard(&mut self, clipboard: Clipboard) {
        self.clipboard = Some(clipboard);
    }

    /// Stage a new pending action after validating its invariants.
    pub fn stage(&mut self, action: Action) -> Result<()> {
        action
            .validate()
            .map_err(BrokerError::InvalidArguments)?;
        debug_assert_eq!(action.status, ActionStatus::Pending);
        self.queue.push(action);
        Ok(())
    }

    /// Staged + historical actions, optionally filtered by status.
    pub fn list(&self, status: Option<ActionStatus>) -> Vec<Action> {
        self.queue
            .iter()
            .chain(self.history.iter())
            .filter(|a| status.is_none_or(|s| a.status == s))
            .cloned()
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.queue
            .iter()
            .filter(|a| a.status == ActionStatus::Pending)
            .count()
    }

    /// Remove and return the pending batch, in submission order.
    pub fn take_pending(&mut self) -> Vec<Action> {
        let mut batch = Vec::new();
        let mut kept = Vec::new();
        for action in self.queue.drain(..) {
            if action.status == ActionStatus::Pending {
                batch.push(action);
            } else {
                kept.push(action);
            }
        }
        self.queue = kept;
        batch
    }

    /// Record a committed action at the head of history.
    pub fn commit(&mut self, mut action: Action, replaced_sequence: Option<String>) {
        action.status = ActionStatus::Committed;
        if replaced_sequence.is_some() {
            action.replaced_sequence = replaced_sequence;
        }
        self.history.insert(0, action);
    }

    /// Record a failed action (kept in the queue for inspection/clearing).
    pub fn fail(&mut self, mut action: Action) {
        action.status = ActionStatus::Failed;
        self.queue.push(action);
    }

    /// Remove queue entries with the given status. Returns how many.
    pub fn clear(&mut self, status: ActionStatus) -> usize {
        let before = self.queue.len();
        self.queue.retain(|a| a.status != status);
        before - self.queue.len()
    }

    /// Update one action's status by id (from `action_progress` frames).
    pub fn update_status(&mut self, action_id: &str, status: ActionStatus) -> bool {
        for action in self.queue.iter_mut().chain(self.history.iter_mut()) {
            if action.action_id == action_id {
                action.status = status;
                return true;
            }
        }
        false
    }

    /// The most recently committed action, if any.
    pub fn undo_candidate(&self) -> Option<&Action> {
        self.history
            .iter()
            .find(|a| a.status == ActionStatus::Committed)
    }

    /// Mark a history entry as undone.
    pub fn mark_undone(&mut self, action_id: &str) {
        for action in self.history.iter_mut() {
            if action.action_id == action_id {
                action.status = ActionStatus::Undone;
                return;
            }
        }
    }

    /// Construct the inverse of a committed action.
    ///
    /// insert <-> delete; replace <-> replace-with-original. Fails with
    /// `UndoNotSupported` when the inverse cannot be constructed (a delete
    /// whose sequence was never captured, a replace without the original).
    pub fn build_inverse(action: &Action, new_id: String) -> Result<Action> {
        let inverse = match action.kind {
            ActionKind::Insert | ActionKind::Paste => {
                let sequence = action.sequence.as_deref().ok_or_else(|| {
                    BrokerError::UndoNotSupported(
                        "inserted sequence is unknown".to_string(),
                    )
                })?;
                let position = action.position.ok_or_else(|| {
                    BrokerError::UndoNotSupported("insert position is unknown".to_string())
                })?;
                Action {
                    action_id: new_id,
                    kind: ActionKind::Delete,
                    chromosome: action.chromosome.clone(),
                    start: Some(position),
                    end: Some(position + sequence.len() as i64 - 1),
                    position: None,
                    sequence: Some(sequence.to_string()),
                    strand: action.strand,
                    status: ActionStatus::Pending,
                    replaced_sequence: None,
                }
            }
            ActionKind::Delete | ActionKind::Cut => {
                let sequence = action.sequence.clone().ok_or_else(|| {
                    BrokerError::UndoNotSupported(
                        "deleted sequence was not captured".to_string(),
                    )
                })?;
                let start = action.start.ok_or_else(|| {
                    BrokerError::UndoNotSupported("deleted region is unknown".to_string())
                })?;
                Action {
                    action_id: new_id,
                    kind: ActionKind::Insert,
                    chromosome: action.chromosome.clone(),
                    start: None,
                    end: None,
                    position: Some(start),
                    sequence: Some(sequence),
                    strand: action.strand,
                    status: ActionStatus::Pending,
                    replaced_sequence: None,
                }
            }
            ActionKind::Replace => {
                let original = action.replaced_sequence.clone().ok_or_else(|| {
                    BrokerError::UndoNotSupported(
                        "original sequence of the replace was not captured".to_string(),
                    )
                })?;
                let start = action.start.ok_or_else(|| {
                    BrokerError::UndoNotSupported("replaced region is unknown".to_string())
                })?;
                Action {
                    action_id: new_id,
                    kind: ActionKind::Replace,
                    chromosome: action.chromosome.clone(),
                    start: Some(start),
                    // The region now holds the replacement; the inverse spans it.
                    end: Some(start + action.sequence.as_deref().map_or(0, |s| s.len() as i64) - 1),
                    position: None,
                    sequence: Some(original),
                    strand: action.strand,
                    status: ActionStatus::Pending,
                    replaced_sequence: action.sequence.clone(),
                }
            }
            ActionKind::Copy => {
                return Err(BrokerError::UndoNotSupported(
                    "copy does not mutate the sequence".to_string(),
                ));
            }
        };
        Ok(inverse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use locus_types::{Provenance, Strand};

    fn insert(id: &str, position: i64, seq: &str) -> Action {
        Action {
            action_id: id.to_string(),
            kind: ActionKind::Insert,
            chromosome: "chr1".to_string(),
            start: None,
            end: None,
            position: Some(position),
            sequence: Some(seq.to_string()),
            strand: Strand::Forward,
            status: ActionStatus::Pending,
            replaced_sequence: None,
        }
    }

    fn delete(id: &str, start: i64, end: i64, seq: Option<&str>) -> Action {
        Action {
            action_id: id.to_string(),
            kind: ActionKind::Delete,
            chromosome: "chr1".to_string(),
            start: Some(start),
            end: Some(end),
            position: None,
            sequence: seq.map(|s| s.to_string()),
            strand: Strand::Forward,
            status: ActionStatus::Pending,
            replaced_sequence: None,
        }
    }

    #[test]
    fn stage_validates() {
        let mut ledger = ActionLedger::default();
        let mut bad = insert("a1", 10, "ATCG");
        bad.sequence = Some("XYZ".to_string());
        assert!(ledger.stage(bad).is_err());
        assert!(ledger.stage(insert("a2", 10, "ATCG")).is_ok());
        assert_eq!(ledger.pending_count(), 1);
    }

    #[test]
    fn take_pending_preserves_order() {
        let mut ledger = ActionLedger::default();
        ledger.stage(insert("a1", 10, "AT")).unwrap();
        ledger.stage(delete("a2", 5, 9, None)).unwrap();
        let batch = ledger.take_pending();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].action_id, "a1");
        assert_eq!(batch[1].action_id, "a2");
        assert_eq!(ledger.pending_count(), 0);
    }

    #[test]
    fn commit_puts_newest_first() {
        let mut ledger = ActionLedger::default();
        ledger.commit(insert("a1", 1, "A"), None);
        ledger.commit(insert("a2", 2, "T"), None);
        let candidate = ledger.undo_candidate().unwrap();
        assert_eq!(candidate.action_id, "a2");
    }

    #[test]
    fn list_filters_by_status() {
        let mut ledger = ActionLedger::default();
        ledger.stage(insert("a1", 1, "A")).unwrap();
        ledger.commit(insert("a2", 2, "T"), None);
        assert_eq!(ledger.list(Some(ActionStatus::Pending)).len(), 1);
        assert_eq!(ledger.list(Some(ActionStatus::Committed)).len(), 1);
        assert_eq!(ledger.list(None).len(), 2);
    }

    #[test]
    fn clear_removes_only_matching() {
        let mut ledger = ActionLedger::default();
        ledger.stage(insert("a1", 1, "A")).unwrap();
        ledger.fail(insert("a2", 2, "T"));
        assert_eq!(ledger.clear(ActionStatus::Failed), 1);
        assert_eq!(ledger.pending_count(), 1);
    }

    #[test]
    fn inverse_of_insert_is_delete() {
        let action = {
            let mut a = insert("a1", 100, "ATCG");
            a.status = ActionStatus::Committed;
            a
        };
        let inverse = ActionLedger::build_inverse(&action, "u1".to_string()).unwrap();
        assert_eq!(inverse.kind, ActionKind::Delete);
        assert_eq!(inverse.start, Some(100));
        assert_eq!(inverse.end, Some(103));
    }

    #[test]
    fn inverse_of_delete_requires_sequence() {
        let blind = delete("a1", 5, 8, None);
        let err = ActionLedger::build_inverse(&blind, "u1".to_string()).unwrap_err();
        assert!(matches!(err, BrokerError::UndoNotSupported(_)));

        let captured = delete("a2", 5, 8, Some("ATCG"));
        let inverse = ActionLedger::build_inverse(&captured, "u2".to_string()).unwrap();
        assert_eq!(inverse.kind, ActionKind::Insert);
        assert_eq!(inverse.position, Some(5));
        assert_eq!(inverse.sequence.as_deref(), Some("ATCG"));
    }

    #[test]
    fn inverse_of_replace_uses_original() {
        let mut action = delete("a1", 10, 13, Some("GGGG"));
        action.kind = ActionKind::Replace;
        action.replaced_sequence = Some("AAAA".to_string());
        let inverse = ActionLedger::build_inverse(&action, "u1".to_string()).unwrap();
        assert_eq!(inverse.kind, ActionKind::Replace);
        assert_eq!(inverse.sequence.as_deref(), Some("AAAA"));
    }

    #[test]
    fn clipboard_round_trip() {
        let mut ledger = ActionLedger::default();
        assert!(ledger.clipboard().is_none());
        ledger.set_clipboard(Clipboard {
            sequence: "ATCG".to_string(),
            provenance: Provenance {
                chromosome: "chr1".to_string(),
                start: 1,
                end: 4,
                strand: Strand::Forward,
            },
        });
        assert_eq!(ledger.clipboard().unwrap().sequence, "ATCG");
    }
}
