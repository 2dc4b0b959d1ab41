// crates/locus-server/src/tasks/persist.rs
// Durable state: line-delimited task log and append-only result cache

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use locus_types::TaskState;

use crate::error::Result;

/// One task state transition, as persisted to the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskTransition {
    pub task_id: String,
    pub tool: String,
    pub state: TaskState,
    pub attempts: u32,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    pub at: DateTime<Utc>,
}

/// Append-only, line-delimited JSON log of task state transitions.
pub struct TaskLog {
    path: PathBuf,
    writer: Mutex<()>,
}

impl TaskLog {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            writer: Mutex::new(()),
        }
    }

    /// Append one transition. Failures are logged, never propagated; the
    /// log is advisory and must not affect task outcomes.
    pub async fn append(&self, transition: &TaskTransition) {
        let line = match serde_json::to_string(transition) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Failed to serialize task transition");
                return;
            }
        };
        let _guard = self.writer.lock().await;
        if let Err(e) = append_line(&self.path, &line).await {
            warn!(path = %self.path.display(), error = %e, "Failed to append to task log");
        }
    }

    /// Scan the log for tasks whose last recorded state is non-terminal and
    /// append a `failed` (interrupted) transition for each. Returns how many
    /// tasks were marked. Called once at startup.
    pub async fn mark_interrupted(&self) -> Result<usize> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut last: HashMap<String, TaskTransition> = HashMap::new();
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<TaskTransition>(line) {
                Ok(t) => {
                    last.insert(t.task_id.clone(), t);
                }
                Err(e) => {
                    debug!(error = %e, "Skipping malformed task log line");
                }
            }
        }

        let interrupted: Vec<TaskTransition> = last
            .into_values()
            .filter(|t| !t.state.is_terminal())
            .collect();
        let count = interrupted.len();
        for stale in interrupted {
            self.append(&TaskTransition {
                state: TaskState::Failed,
                error_kind: Some("Interrupted".to_string()),
                at: Utc::now(),
                ..stale
            })
            .await;
        }
        Ok(count)
    }
}

/// One record in the append-only cache file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRecord {
    pub cache_key: String,
    pub result: Value,
    pub stored_at: DateTime<Utc>,
    /// Seconds; `None` means valid until superseded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
}

impl CacheRecord {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.ttl {
            Some(secs) => now.signed_duration_since(self.stored_at).num_seconds() >= secs as i64,
            None => false,
        }
    }
}

/// Append-only spill file for the task result cache.
///
/// Compacted on load: expired entries are dropped and later writers win.
pub struct CacheFile {
    path: PathBuf,
    writer: Mutex<()>,
}

impl CacheFile {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            writer: Mutex::new(()),
        }
    }

    /// Load surviving entries and rewrite the file without the dead ones.
    pub async fn load_compacted(&self) -> Result<HashMap<String, Value>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(e.into()),
        };

        let now = Utc::now();
        let mut live: HashMap<String, CacheRecord> = HashMap::new();
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<CacheRecord>(line) {
                // Last writer wins.
                Ok(record) if !record.is_expired(now) => {
                    live.insert(record.cache_key.clone(), record);
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(error = %e, "Skipping malformed cache line");
                }
            }
        }

        let _guard = self.writer.lock().await;
        let mut rewritten = String::new();
        for record in live.values() {
            rewritten.push_str(&serde_json::to_string(record)?);
            rewritten.push('\n');
        }
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, rewritten).await?;

        Ok(live
            .into_iter()
            .map(|(key, record)| (key, record.result))
            .collect())
    }

    /// Append one cache entry. Advisory; failures are logged only.
    pub async fn append(&self, cache_key: &str, result: &Value, ttl: Option<u64>) {
        let record = CacheRecord {
            cache_key: cache_key.to_string(),
            result: result.clone(),
            stored_at: Utc::now(),
            ttl,
        };
        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Failed to serialize cache record");
                return;
            }
        };
        let _guard = self.writer.lock().await;
        if let Err(e) = append_line(&self.path, &line).await {
            warn!(path = %self.path.display(), error = %e, "Failed to append to cache file");
        }
    }
}

async fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.write_all(b"\n").await?;
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn transition(task_id: &str, state: TaskState) -> TaskTransition {
        TaskTransition {
            task_id: task_id.to_string(),
            tool: "blast_search".to_string(),
            state,
            attempts: 0,
            progress: 0,
            error_kind: None,
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn interrupted_tasks_are_marked_failed() {
        let dir = TempDir::new().unwrap();
        let log = TaskLog::new(dir.path().join("tasks.jsonl"));

        log.append(&transition("t1", TaskState::Queued)).await;
        log.append(&transition("t1", TaskState::Running)).await;
        log.append(&transition("t2", TaskState::Running)).await;
        log.append(&transition("t2", TaskState::Succeeded)).await;

        let marked = log.mark_interrupted().await.unwrap();
        assert_eq!(marked, 1, "only t1 was non-terminal");

        // A second scan finds nothing left to mark.
        assert_eq!(log.mark_interrupted().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn cache_compaction_drops_expired_and_superseded() {
        let dir = TempDir::new().unwrap();
        let cache = CacheFile::new(dir.path().join("cache.jsonl"));

        cache.append("k1", &json!({"v": 1}), None).await;
        cache.append("k1", &json!({"v": 2}), None).await;
        cache.append("k2", &json!({"v": 3}), Some(0)).await;

        let loaded = cache.load_compacted().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["k1"], json!({"v": 2}), "last writer wins");

        // The rewritten file contains only the surviving entry.
        let contents = tokio::fs::read_to_string(dir.path().join("cache.jsonl"))
            .await
            .unwrap();
        assert_eq!(contents.lines().count(), 1);
    }

    #[tokio::test]
    async fn missing_files_load_empty() {
        let dir = TempDir::new().unwrap();
        let cache = CacheFile::new(dir.path().join("absent.jsonl"));
        assert!(cache.load_compacted().await.unwrap().is_empty());

        let log = TaskLog::new(dir.path().join("absent-log.jsonl"));
        assert_eq!(log.mark_interrupted().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.jsonl");
        tokio::fs::write(&path, "not json\n").await.unwrap();
        let cache = CacheFile::new(path);
        cache.append("k1", &json!(1), None).await;
        let loaded = cache.load_compacted().await.unwrap();
        assert_eq!(loaded.len(), 1);
    }
}
