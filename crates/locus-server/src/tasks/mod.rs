// crates/locus-server/src/tasks/mod.rs
// Task manager: priority queue, bounded workers, progress, cancellation,
// retries, result cache, optional persistence

pub mod persist;

use std::collections::{BinaryHeap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, Notify, broadcast, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use locus_types::TaskState;

use crate::config::BrokerConfig;
use crate::error::{BrokerError, ErrorKind, Result};
use persist::{CacheFile, TaskLog, TaskTransition};

/// The retryable future run by a worker for each attempt.
pub type TaskFuture = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;

/// Factory invoked once per attempt; receives the progress reporter wired
/// to this task (also the cancellation observation point).
pub type TaskRunner = Arc<dyn Fn(ProgressReporter) -> TaskFuture + Send + Sync>;

/// Task manager configuration, derived from the broker config.
#[derive(Debug, Clone)]
pub struct TaskConfig {
    pub max_concurrent: usize,
    pub max_retries: u32,
    pub default_timeout: Duration,
    pub queue_limit: usize,
    pub cache_enabled: bool,
}

impl From<&BrokerConfig> for TaskConfig {
    fn from(config: &BrokerConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent_tasks,
            max_retries: config.max_retries,
            default_timeout: config.default_task_timeout(),
            queue_limit: config.queue_limit,
            cache_enabled: config.enable_cache,
        }
    }
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self::from(&BrokerConfig::default())
    }
}

/// Terminal error info carried on a task record.
#[derive(Debug, Clone, Serialize)]
pub struct TaskError {
    pub kind: String,
    pub message: String,
}

/// Serializable snapshot of one managed task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub tool: String,
    pub args: Value,
    pub priority: i32,
    pub attempts: u32,
    pub max_retries: u32,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_message: Option<String>,
    pub state: TaskState,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,
}

/// Definition of a task to submit.
pub struct TaskSpec {
    pub tool: String,
    pub args: Value,
    pub priority: i32,
    pub timeout: Option<Duration>,
    /// Present only for cacheable tools.
    pub cache_key: Option<String>,
    pub runner: TaskRunner,
}

/// Outcome of `submit`: the task id plus a receiver resolved with the
/// terminal record.
#[derive(Debug)]
pub struct Submitted {
    pub task_id: String,
    pub done: oneshot::Receiver<TaskRecord>,
    pub cached: bool,
}

/// Events emitted on the broadcast channel for transports to forward.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    Progress {
        task_id: String,
        tool: String,
        progress: u8,
        message: Option<String>,
    },
    StateChanged {
        task_id: String,
        tool: String,
        state: TaskState,
    },
}

/// Handed to each task attempt. `update` is both the progress channel and a
/// cancellation observation point.
#[derive(Clone)]
pub struct ProgressReporter {
    task_id: String,
    manager: Arc<TaskManager>,
    cancel: CancellationToken,
}

impl ProgressReporter {
    /// Report progress (0..=100). Fails with `Cancelled` once the task has
    /// been cancelled; the worker must stop mutating after that.
    pub async fn update(&self, progress: u8, message: &str) -> Result<()> {
        self.checkpoint()?;
        self.manager
            .update_progress(&self.task_id, progress, message)
            .await;
        Ok(())
    }

    /// Cancellation observation point for I/O boundaries.
    pub fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(BrokerError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }
}

struct TaskEntry {
    record: TaskRecord,
    /// None for cache-hit tasks, which never run.
    runner: Option<TaskRunner>,
    cancel: CancellationToken,
    timeout: Duration,
    waiters: Vec<oneshot::Sender<TaskRecord>>,
    progress_seen: bool,
}

/// Heap entry: highest priority first, FIFO within a priority.
struct QueueEntry {
    priority: i32,
    seq: u64,
    task_id: String,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl Eq for QueueEntry {}
impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Max-heap: higher priority wins; older submission wins ties.
        self.priority
            .cmp(&other.priority)
            .then(other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct Inner {
    queue: BinaryHeap<QueueEntry>,
    entries: HashMap<String, TaskEntry>,
    running: usize,
    seq: u64,
}

enum RunOutcome {
    Finished(Result<Value>),
    Cancelled,
    TimedOut,
}

struct Job {
    task_id: String,
    runner: TaskRunner,
    cancel: CancellationToken,
    timeout: Duration,
}

/// Owns the queue, the worker pool, and the result cache.
pub struct TaskManager {
    cfg: TaskConfig,
    inner: Mutex<Inner>,
    cache: Mutex<HashMap<String, Value>>,
    events_tx: broadcast::Sender<TaskEvent>,
    notify: Notify,
    log: Option<TaskLog>,
    cache_file: Option<CacheFile>,
}

impl TaskManager {
    /// Create the manager and start its scheduler loop.
    pub fn spawn(
        cfg: TaskConfig,
        log: Option<TaskLog>,
        cache_file: Option<CacheFile>,
        preloaded_cache: HashMap<String, Value>,
    ) -> Arc<Self> {
        let (events_tx, _) = broadcast::channel(256);
        let manager = Arc::new(Self {
            cfg,
            inner: Mutex::new(Inner::default()),
            cache: Mutex::new(preloaded_cache),
            events_tx,
            notify: Notify::new(),
            log,
            cache_file,
        });
        tokio::spawn(Self::scheduler(manager.clone()));
        manager
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.events_tx.subscribe()
    }

    /// Submit a task. Serves cache hits without consuming a worker; fails
    /// `QueueFull` above the soft queue limit.
    pub async fn submit(&self, spec: TaskSpec) -> Result<Submitted> {
        let task_id = uuid::Uuid::new_v4().to_string();
        let (done_tx, done_rx) = oneshot::channel();

        // Cache short-circuit. The guard is released before taking the
        // inner lock.
        if self.cfg.cache_enabled
            && let Some(key) = &spec.cache_key
        {
            let hit = self.cache.lock().await.get(key).cloned();
            if let Some(result) = hit {
                debug!(tool = %spec.tool, "Task served from result cache");
                let record = TaskRecord {
                    task_id: task_id.clone(),
                    tool: spec.tool,
                    args: spec.args,
                    priority: spec.priority,
                    attempts: 0,
                    max_retries: self.cfg.max_retries,
                    progress: 0,
                    progress_message: None,
                    state: TaskState::Succeeded,
                    created_at: Utc::now(),
                    started_at: None,
                    completed_at: Some(Utc::now()),
                    result: Some(result),
                    error: None,
                    cache_key: spec.cache_key,
                };
                let entry = TaskEntry {
                    record: record.clone(),
                    runner: None,
                    cancel: CancellationToken::new(),
                    timeout: Duration::ZERO,
                    waiters: Vec::new(),
                    progress_seen: false,
                };
                self.inner.lock().await.entries.insert(task_id.clone(), entry);
                let _ = done_tx.send(record);
                return Ok(Submitted {
                    task_id,
                    done: done_rx,
                    cached: true,
                });
            }
        }

        let record = {
            let mut inner = self.inner.lock().await;
            if inner.queue.len() >= self.cfg.queue_limit {
                return Err(BrokerError::QueueFull);
            }
            inner.seq += 1;
            let seq = inner.seq;
            let record = TaskRecord {
                task_id: task_id.clone(),
                tool: spec.tool,
                args: spec.args,
                priority: spec.priority,
                attempts: 0,
                max_retries: self.cfg.max_retries,
                progress: 0,
                progress_message: None,
                state: TaskState::Queued,
                created_at: Utc::now(),
                started_at: None,
                completed_at: None,
                result: None,
                error: None,
                cache_key: spec.cache_key,
            };
            inner.entries.insert(
                task_id.clone(),
                TaskEntry {
                    record: record.clone(),
                    runner: Some(spec.runner),
                    cancel: CancellationToken::new(),
                    timeout: spec.timeout.unwrap_or(self.cfg.default_timeout),
                    waiters: vec![done_tx],
                    progress_seen: false,
                },
            );
            inner.queue.push(QueueEntry {
                priority: record.priority,
                seq,
                task_id: task_id.clone(),
            });
            record
        };

        self.emit_transition(&record).await;
        self.notify.notify_one();
        Ok(Submitted {
            task_id,
            done: done_rx,
            cached: false,
        })
    }

    /// Cancel a task. Queued tasks transition immediately; running tasks
    /// are signalled and observe cancellation cooperatively.
    pub async fn cancel(&self, task_id: &str) -> bool {
        let (terminal_record, signalled) = {
            let mut inner = self.inner.lock().await;
            let Some(entry) = inner.entries.get_mut(task_id) else {
                return false;
            };
            match entry.record.state {
                TaskState::Queued => {
                    entry.record.state = TaskState::Cancelled;
                    entry.record.completed_at = Some(Utc::now());
                    entry.record.error = Some(TaskError {
                        kind: ErrorKind::Cancelled.as_str().to_string(),
                        message: "cancelled before start".to_string(),
                    });
                    let record = entry.record.clone();
                    let waiters = std::mem::take(&mut entry.waiters);
                    for waiter in waiters {
                        let _ = waiter.send(record.clone());
                    }
                    (Some(record), true)
                }
                TaskState::Running => {
                    entry.cancel.cancel();
                    (None, true)
                }
                _ => (None, false),
            }
        };
        if let Some(record) = terminal_record {
            self.emit_transition(&record).await;
        }
        signalled
    }

    /// Record task progress. Advisory: ignored unless the task is running;
    /// progress is clamped monotonically non-decreasing.
    pub async fn update_progress(&self, task_id: &str, progress: u8, message: &str) {
        let event = {
            let mut inner = self.inner.lock().await;
            let Some(entry) = inner.entries.get_mut(task_id) else {
                return;
            };
            if entry.record.state != TaskState::Running {
                return;
            }
            let clamped = progress.min(100).max(entry.record.progress);
            entry.record.progress = clamped;
            entry.record.progress_message = Some(message.to_string());
            entry.progress_seen = true;
            TaskEvent::Progress {
                task_id: task_id.to_string(),
                tool: entry.record.tool.clone(),
                progress: clamped,
                message: Some(message.to_string()),
            }
        };
        let _ = self.events_tx.send(event);
    }

    /// Snapshot of one task.
    pub async fn get(&self, task_id: &str) -> Option<TaskRecord> {
        self.inner
            .lock()
            .await
            .entries
            .get(task_id)
            .map(|e| e.record.clone())
    }

    /// Snapshot of every known task, newest first.
    pub async fn snapshot(&self) -> Vec<TaskRecord> {
        let inner = self.inner.lock().await;
        let mut records: Vec<TaskRecord> =
            inner.entries.values().map(|e| e.record.clone()).collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }

    /// How many tasks are currently running (diagnostics + tests).
    pub async fn running_count(&self) -> usize {
        self.inner.lock().await.running
    }

    async fn scheduler(manager: Arc<TaskManager>) {
        loop {
            while let Some(job) = manager.try_start().await {
                let manager = manager.clone();
                tokio::spawn(async move { Self::execute(&manager, job).await });
            }
            manager.notify.notified().await;
        }
    }

    /// Pop the highest-priority runnable task if a worker slot is free.
    async fn try_start(&self) -> Option<Job> {
        let (job, record) = {
            let mut inner = self.inner.lock().await;
            if inner.running >= self.cfg.max_concurrent {
                return None;
            }
            loop {
                let candidate = inner.queue.pop()?;
                let Some(entry) = inner.entries.get_mut(&candidate.task_id) else {
                    continue;
                };
                // Skip stale heap entries (cancelled while queued).
                if entry.record.state != TaskState::Queued {
                    continue;
                }
                let Some(runner) = entry.runner.clone() else {
                    continue;
                };
                entry.record.state = TaskState::Running;
                entry.record.started_at = Some(Utc::now());
                let job = Job {
                    task_id: candidate.task_id.clone(),
                    runner,
                    cancel: entry.cancel.clone(),
                    timeout: entry.timeout,
                };
                let record = entry.record.clone();
                inner.running += 1;
                break (job, record);
            }
        };
        self.emit_transition(&record).await;
        Some(job)
    }

    async fn execute(manager: &Arc<TaskManager>, job: Job) {
        let reporter = ProgressReporter {
            task_id: job.task_id.clone(),
            manager: manager.clone(),
            cancel: job.cancel.clone(),
        };
        let work = (job.runner)(reporter);
        let outcome = tokio::select! {
            _ = job.cancel.cancelled() => RunOutcome::Cancelled,
            _ = tokio::time::sleep(job.timeout) => RunOutcome::TimedOut,
            result = work => match result {
                Err(BrokerError::Cancelled) => RunOutcome::Cancelled,
                other => RunOutcome::Finished(other),
            },
        };
        manager.complete(&job.task_id, outcome).await;
    }

    async fn complete(self: &Arc<Self>, task_id: &str, outcome: RunOutcome) {
        enum Post {
            Terminal {
                record: TaskRecord,
                waiters: Vec<oneshot::Sender<TaskRecord>>,
                cache_insert: Option<(String, Value)>,
            },
            Requeue {
                record: TaskRecord,
                priority: i32,
                attempt: u32,
            },
        }

        let post = {
            let mut inner = self.inner.lock().await;
            inner.running = inner.running.saturating_sub(1);
            let Some(entry) = inner.entries.get_mut(task_id) else {
                return;
            };
            if entry.record.state != TaskState::Running {
                // Already driven terminal elsewhere; nothing to record.
                return;
            }

            let now = Utc::now();
            match outcome {
                RunOutcome::Finished(Ok(result)) => {
                    entry.record.state = TaskState::Succeeded;
                    entry.record.completed_at = Some(now);
                    if entry.progress_seen {
                        entry.record.progress = 100;
                    }
                    entry.record.result = Some(result.clone());
                    let cache_insert = if self.cfg.cache_enabled {
                        entry
                            .record
                            .cache_key
                            .clone()
                            .map(|key| (key, result))
                    } else {
                        None
                    };
                    Post::Terminal {
                        record: entry.record.clone(),
                        waiters: std::mem::take(&mut entry.waiters),
                        cache_insert,
                    }
                }
                RunOutcome::Finished(Err(err)) => {
                    entry.record.attempts += 1;
                    let kind = err.kind();
                    if kind.is_retryable() && entry.record.attempts <= entry.record.max_retries {
                        entry.record.state = TaskState::Queued;
                        Post::Requeue {
                            record: entry.record.clone(),
                            priority: entry.record.priority,
                            attempt: entry.record.attempts,
                        }
                    } else {
                        entry.record.state = TaskState::Failed;
                        entry.record.completed_at = Some(now);
                        entry.record.error = Some(TaskError {
                            kind: kind.as_str().to_string(),
                            message: err.to_string(),
                        });
                        Post::Terminal {
                            record: entry.record.clone(),
                            waiters: std::mem::take(&mut entry.waiters),
                            cache_insert: None,
                        }
                    }
                }
                RunOutcome::Cancelled => {
                    entry.record.state = TaskState::Cancelled;
                    entry.record.completed_at = Some(now);
                    entry.record.error = Some(TaskError {
                        kind: ErrorKind::Cancelled.as_str().to_string(),
                        message: "cancelled".to_string(),
                    });
                    Post::Terminal {
                        record: entry.record.clone(),
                        waiters: std::mem::take(&mut entry.waiters),
                        cache_insert: None,
                    }
                }
                RunOutcome::TimedOut => {
                    entry.record.state = TaskState::TimedOut;
                    entry.record.completed_at = Some(now);
                    entry.record.error = Some(TaskError {
                        kind: ErrorKind::TimedOut.as_str().to_string(),
                        message: format!("exceeded {:?}", entry.timeout),
                    });
                    Post::Terminal {
                        record: entry.record.clone(),
                        waiters: std::mem::take(&mut entry.waiters),
                        cache_insert: None,
                    }
                }
            }
        };

        match post {
            Post::Terminal {
                record,
                waiters,
                cache_insert,
            } => {
                if let Some((key, value)) = cache_insert {
                    self.cache.lock().await.insert(key.clone(), value.clone());
                    if let Some(file) = &self.cache_file {
                        file.append(&key, &value, None).await;
                    }
                }
                for waiter in waiters {
                    let _ = waiter.send(record.clone());
                }
                self.emit_transition(&record).await;
                self.notify.notify_one();
            }
            Post::Requeue {
                record,
                priority,
                attempt,
            } => {
                self.emit_transition(&record).await;
                // The worker slot is already free; wake the scheduler now.
                self.notify.notify_one();
                let delay = retry_backoff(attempt);
                warn!(
                    task_id = %record.task_id,
                    tool = %record.tool,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Task failed with a retryable error, re-queueing"
                );
                let manager = self.clone();
                let task_id = record.task_id.clone();
                tokio::spawn(async move {
                    manager.requeue_after(task_id, priority, delay).await;
                });
            }
        }
    }

    async fn requeue_after(&self, task_id: String, priority: i32, delay: Duration) {
        tokio::time::sleep(delay).await;
        {
            let mut inner = self.inner.lock().await;
            inner.seq += 1;
            let seq = inner.seq;
            // The task may have been cancelled during backoff.
            let still_queued = inner
                .entries
                .get(&task_id)
                .is_some_and(|e| e.record.state == TaskState::Queued);
            if still_queued {
                inner.queue.push(QueueEntry {
                    priority,
                    seq,
                    task_id,
                });
            }
        }
        self.notify.notify_one();
    }

    async fn emit_transition(&self, record: &TaskRecord) {
        let _ = self.events_tx.send(TaskEvent::StateChanged {
            task_id: record.task_id.clone(),
            tool: record.tool.clone(),
            state: record.state,
        });
        if let Some(log) = &self.log {
            log.append(&TaskTransition {
                task_id: record.task_id.clone(),
                tool: record.tool.clone(),
                state: record.state,
                attempts: record.attempts,
                progress: record.progress,
                error_kind: record.error.as_ref().map(|e| e.kind.clone()),
                at: Utc::now(),
            })
            .await;
        }
    }
}

/// Content-addressed cache key: tool name + canonicalized arguments.
pub fn cache_key(tool: &str, args: &Value) -> String {
    format!("{tool}:{}", canonical_json(args))
}

/// Serialize with object keys sorted at every level.
fn canonical_json(value: &Value) -> String {
    fn normalize(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: std::collections::BTreeMap<String, Value> = map
                    .iter()
                    .map(|(k, v)| (k.clone(), normalize(v)))
                    .collect();
                serde_json::to_value(sorted).unwrap_or(Value::Null)
            }
            Value::Array(items) => Value::Array(items.iter().map(normalize).collect()),
            other => other.clone(),
        }
    }
    normalize(value).to_string()
}

/// Backoff before a retry attempt: 500ms * 2^(attempt-1), +/-20% jitter.
fn retry_backoff(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(8);
    let base = 500u64.saturating_mul(1 << exp);
    let jitter = rand::rng().random_range(0.8..=1.2);
    Duration::from_millis((base as f64 * jitter) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn manager(cfg: TaskConfig) -> Arc<TaskManager> {
        TaskManager::spawn(cfg, None, None, HashMap::new())
    }

    fn spec(tool: &str, priority: i32, runner: TaskRunner) -> TaskSpec {
        TaskSpec {
            tool: tool.to_string(),
            args: json!({}),
            priority,
            timeout: None,
            cache_key: None,
            runner,
        }
    }

    fn ok_runner(value: Value) -> TaskRunner {
        Arc::new(move |_reporter| {
            let value = value.clone();
            Box::pin(async move { Ok(value) })
        })
    }

    #[tokio::test]
    async fn task_runs_to_success() {
        let manager = manager(TaskConfig::default());
        let submitted = manager
            .submit(spec("compute", 5, ok_runner(json!({"done": true}))))
            .await
            .unwrap();
        let record = submitted.done.await.unwrap();
        assert_eq!(record.state, TaskState::Succeeded);
        assert_eq!(record.result.unwrap()["done"], true);
    }

    #[tokio::test]
    async fn cache_hit_skips_the_worker() {
        let manager = manager(TaskConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));

        let runner: TaskRunner = {
            let calls = calls.clone();
            Arc::new(move |_reporter| {
                calls.fetch_add(1, Ordering::SeqCst);
                Box::pin(async move { Ok(json!({"value": 42})) })
            })
        };

        let mut first = spec("analyze", 5, runner.clone());
        first.cache_key = Some("analyze:{}".to_string());
        let first = manager.submit(first).await.unwrap();
        let first_record = first.done.await.unwrap();
        assert!(!first.cached);

        let mut second = spec("analyze", 5, runner);
        second.cache_key = Some("analyze:{}".to_string());
        let second = manager.submit(second).await.unwrap();
        assert!(second.cached);
        let second_record = second.done.await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // Bit-identical result on the hit path.
        assert_eq!(first_record.result, second_record.result);
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let cfg = TaskConfig {
            max_concurrent: 2,
            ..TaskConfig::default()
        };
        let manager = manager(cfg);
        let gate = Arc::new(Notify::new());

        let mut receivers = Vec::new();
        for i in 0..4 {
            let gate = gate.clone();
            let runner: TaskRunner = Arc::new(move |_reporter| {
                let gate = gate.clone();
                Box::pin(async move {
                    gate.notified().await;
                    Ok(json!({}))
                })
            });
            let submitted = manager.submit(spec(&format!("t{i}"), 5, runner)).await.unwrap();
            receivers.push(submitted.done);
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(manager.running_count().await, 2);

        // Keep releasing the gate until every task has drained through.
        let releaser = {
            let gate = gate.clone();
            tokio::spawn(async move {
                loop {
                    gate.notify_waiters();
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
            })
        };
        for done in receivers {
            let record = done.await.unwrap();
            assert_eq!(record.state, TaskState::Succeeded);
        }
        releaser.abort();
    }

    #[tokio::test]
    async fn priority_order_with_fifo_ties() {
        let cfg = TaskConfig {
            max_concurrent: 1,
            ..TaskConfig::default()
        };
        let manager = manager(cfg);
        let gate = Arc::new(Notify::new());
        let order = Arc::new(Mutex::new(Vec::<String>::new()));

        // Occupy the single worker slot.
        let blocker: TaskRunner = {
            let gate = gate.clone();
            Arc::new(move |_reporter| {
                let gate = gate.clone();
                Box::pin(async move {
                    gate.notified().await;
                    Ok(json!({}))
                })
            })
        };
        let blocker = manager.submit(spec("blocker", 100, blocker)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut dones = Vec::new();
        for (name, priority) in [("low", 1), ("first_high", 9), ("second_high", 9)] {
            let order = order.clone();
            let tool_name = name.to_string();
            let recording: TaskRunner = Arc::new(move |_reporter| {
                let order = order.clone();
                let tool_name = tool_name.clone();
                Box::pin(async move {
                    order.lock().await.push(tool_name);
                    Ok(json!({}))
                })
            });
            dones.push(
                manager
                    .submit(spec(name, priority, recording))
                    .await
                    .unwrap()
                    .done,
            );
        }

        gate.notify_waiters();
        let _ = blocker.done.await.unwrap();
        for done in dones {
            let _ = done.await.unwrap();
        }

        let seen = order.lock().await.clone();
        assert_eq!(seen, vec!["first_high", "second_high", "low"]);
    }

    #[tokio::test]
    async fn cancel_queued_task_is_immediate() {
        let cfg = TaskConfig {
            max_concurrent: 1,
            ..TaskConfig::default()
        };
        let manager = manager(cfg);
        let gate = Arc::new(Notify::new());

        let blocker: TaskRunner = {
            let gate = gate.clone();
            Arc::new(move |_reporter| {
                let gate = gate.clone();
                Box::pin(async move {
                    gate.notified().await;
                    Ok(json!({}))
                })
            })
        };
        let _blocker = manager.submit(spec("blocker", 10, blocker)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let queued = manager
            .submit(spec("queued", 1, ok_runner(json!({}))))
            .await
            .unwrap();
        assert!(manager.cancel(&queued.task_id).await);

        let record = queued.done.await.unwrap();
        assert_eq!(record.state, TaskState::Cancelled);
        gate.notify_waiters();
    }

    #[tokio::test]
    async fn cancel_running_task_is_cooperative() {
        let manager = manager(TaskConfig::default());
        let runner: TaskRunner = Arc::new(|reporter| {
            Box::pin(async move {
                for pct in [10u8, 20, 30, 40, 50, 60, 70, 80, 90] {
                    reporter.update(pct, "working").await?;
                    tokio::time::sleep(Duration::from_millis(30)).await;
                }
                Ok(json!({"finished": true}))
            })
        });
        let submitted = manager.submit(spec("slow", 5, runner)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(manager.cancel(&submitted.task_id).await);

        let record = submitted.done.await.unwrap();
        assert_eq!(record.state, TaskState::Cancelled);
        assert!(record.result.is_none(), "no mutations after cancellation");
    }

    #[tokio::test]
    async fn retryable_failures_are_retried() {
        let manager = manager(TaskConfig::default());
        let attempts = Arc::new(AtomicUsize::new(0));
        let runner: TaskRunner = {
            let attempts = attempts.clone();
            Arc::new(move |_reporter| {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                Box::pin(async move {
                    if n == 0 {
                        Err(BrokerError::Upstream("503 from upstream".to_string()))
                    } else {
                        Ok(json!({"attempt": n}))
                    }
                })
            })
        };
        let submitted = manager.submit(spec("flaky", 5, runner)).await.unwrap();
        let record = submitted.done.await.unwrap();
        assert_eq!(record.state, TaskState::Succeeded);
        assert_eq!(record.attempts, 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_retryable_failures_are_terminal() {
        let manager = manager(TaskConfig::default());
        let runner: TaskRunner = Arc::new(|_reporter| {
            Box::pin(async move {
                Err(BrokerError::InvalidArguments("bad".to_string()))
            })
        });
        let submitted = manager.submit(spec("broken", 5, runner)).await.unwrap();
        let record = submitted.done.await.unwrap();
        assert_eq!(record.state, TaskState::Failed);
        assert_eq!(record.error.unwrap().kind, "InvalidArguments");
    }

    #[tokio::test]
    async fn timeout_produces_timed_out() {
        let manager = manager(TaskConfig::default());
        let runner: TaskRunner = Arc::new(|_reporter| {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(json!({}))
            })
        });
        let mut slow = spec("sleepy", 5, runner);
        slow.timeout = Some(Duration::from_millis(50));
        let submitted = manager.submit(slow).await.unwrap();
        let record = submitted.done.await.unwrap();
        assert_eq!(record.state, TaskState::TimedOut);
    }

    #[tokio::test]
    async fn queue_limit_fails_fast() {
        let cfg = TaskConfig {
            max_concurrent: 1,
            queue_limit: 1,
            ..TaskConfig::default()
        };
        let manager = manager(cfg);
        let gate = Arc::new(Notify::new());
        let blocker: TaskRunner = {
            let gate = gate.clone();
            Arc::new(move |_reporter| {
                let gate = gate.clone();
                Box::pin(async move {
                    gate.notified().await;
                    Ok(json!({}))
                })
            })
        };
        let _running = manager.submit(spec("running", 5, blocker)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let _queued = manager
            .submit(spec("queued", 5, ok_runner(json!({}))))
            .await
            .unwrap();
        let err = manager
            .submit(spec("rejected", 5, ok_runner(json!({}))))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::QueueFull));
        gate.notify_waiters();
    }

    #[tokio::test]
    async fn progress_is_monotonic_and_finishes_at_100() {
        let manager = manager(TaskConfig::default());
        let runner: TaskRunner = Arc::new(|reporter| {
            Box::pin(async move {
                reporter.update(40, "forward").await?;
                reporter.update(20, "backwards is clamped").await?;
                reporter.update(70, "forward again").await?;
                Ok(json!({}))
            })
        });
        let submitted = manager.submit(spec("progressive", 5, runner)).await.unwrap();
        let record = submitted.done.await.unwrap();
        assert_eq!(record.state, TaskState::Succeeded);
        assert_eq!(record.progress, 100, "forced to 100 after progress events");

        let snapshot = manager.get(&submitted.task_id).await.unwrap();
        assert_eq!(snapshot.progress, 100);
    }

    #[test]
    fn cache_key_is_order_insensitive() {
        let a = cache_key("tool", &json!({"b": 1, "a": {"y": 2, "x": 1}}));
        let b = cache_key("tool", &json!({"a": {"x": 1, "y": 2}, "b": 1}));
        assert_eq!(a, b);
    }

    #[test]
    fn queue_entry_ordering() {
        let mut heap = BinaryHeap::new();
        heap.push(QueueEntry {
            priority: 1,
            seq: 1,
            task_id: "low".to_string(),
        });
        heap.push(QueueEntry {
            priority: 9,
            seq: 3,
            task_id: "high_late".to_string(),
        });
        heap.push(QueueEntry {
            priority: 9,
            seq: 2,
            task_id: "high_early".to_string(),
        });
        assert_eq!(heap.pop().unwrap().task_id, "high_early");
        assert_eq!(heap.pop().unwrap().task_id, "high_late");
        assert_eq!(heap.pop().unwrap().task_id, "low");
    }
}
