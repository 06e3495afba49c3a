//! Task registry, FIFO worker, and retention cleanup for the conversion job
//! server. One worker thread drains the queue in enqueue order; each
//! conversion runs on its own short-lived thread so the worker can abandon it
//! when the deadline passes.

use ahash::AHashMap as HashMap;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use log::{error, info, warn};
use railchess_converter::convert::{convert_descriptor, Cancelled};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

const CONVERSION_DEADLINE: Duration = Duration::from_secs(15);
const CANCEL_GRACE: Duration = Duration::from_millis(500);
const RETENTION: i64 = 24;
const TIMEOUT_MESSAGE: &str = "Conversion took longer than 15 seconds";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Timeout,
}

impl TaskStatus {
    fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Timeout => "timeout",
        }
    }

    fn is_finished(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Timeout
        )
    }
}

#[derive(Debug)]
pub struct Task {
    pub status: TaskStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancel: Arc<AtomicBool>,
    aarc: Value,
    config: Value,
}

pub struct TaskServer {
    tasks: Mutex<HashMap<String, Task>>,
    queue: Mutex<VecDeque<String>>,
    queue_cv: Condvar,
    running: AtomicBool,
}

pub fn generate_key() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

impl TaskServer {
    pub fn new() -> Arc<TaskServer> {
        Arc::new(TaskServer {
            tasks: Mutex::new(HashMap::new()),
            queue: Mutex::new(VecDeque::new()),
            queue_cv: Condvar::new(),
            running: AtomicBool::new(true),
        })
    }

    /// Registers a new pending task and wakes the worker. Returns the task
    /// key handed back to the client.
    pub fn submit(&self, aarc: Value, config: Value) -> String {
        let key = generate_key();
        let task = Task {
            status: TaskStatus::Pending,
            result: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
            cancel: Arc::new(AtomicBool::new(false)),
            aarc,
            config,
        };
        self.tasks.lock().unwrap().insert(key.clone(), task);
        self.queue.lock().unwrap().push_back(key.clone());
        self.queue_cv.notify_one();
        key
    }

    /// The `/get` response body for a key, or None when the key is unknown.
    pub fn status_json(&self, key: &str) -> Option<Value> {
        let tasks = self.tasks.lock().unwrap();
        let task = tasks.get(key)?;
        let mut body = json!({ "key": key, "status": task.status.as_str() });
        match task.status {
            TaskStatus::Completed => {
                body["result"] = task.result.clone().unwrap_or(Value::Null);
            }
            TaskStatus::Failed | TaskStatus::Timeout => {
                body["error"] = json!(task.error.clone().unwrap_or_default());
            }
            _ => {}
        }
        Some(body)
    }

    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.queue_cv.notify_all();
    }

    /// Worker loop: pops tasks in strict FIFO order and processes them one at
    /// a time. Blocks on the queue condvar while idle.
    pub fn run_worker(&self) {
        loop {
            let key = {
                let mut queue = self.queue.lock().unwrap();
                loop {
                    if let Some(key) = queue.pop_front() {
                        break Some(key);
                    }
                    if !self.running.load(Ordering::SeqCst) {
                        break None;
                    }
                    queue = self.queue_cv.wait(queue).unwrap();
                }
            };
            let Some(key) = key else {
                return;
            };
            self.process(&key);
        }
    }

    fn set_finished(&self, key: &str, status: TaskStatus, result: Option<Value>, error: Option<String>) {
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(task) = tasks.get_mut(key) {
            task.status = status;
            task.result = result;
            task.error = error;
            task.completed_at = Some(Utc::now());
        }
    }

    pub fn process(&self, key: &str) {
        let (aarc, config, cancel) = {
            let mut tasks = self.tasks.lock().unwrap();
            let Some(task) = tasks.get_mut(key) else {
                warn!("queued task {} no longer exists", key);
                return;
            };
            task.status = TaskStatus::Processing;
            (task.aarc.clone(), task.config.clone(), task.cancel.clone())
        };

        let (tx, rx) = mpsc::channel();
        let converter_cancel = cancel.clone();
        thread::spawn(move || {
            let outcome = convert_descriptor(&aarc, &config, &converter_cancel)
                .map(|rcmap| rcmap.to_json());
            // the receiver may already have given up on us
            let _ = tx.send(outcome);
        });

        match rx.recv_timeout(CONVERSION_DEADLINE) {
            Ok(Ok(result)) => {
                self.set_finished(key, TaskStatus::Completed, Some(result), None);
                info!("task {} completed", key);
            }
            Ok(Err(err)) => {
                if err.is::<Cancelled>() {
                    self.set_finished(key, TaskStatus::Timeout, None, Some(err.to_string()));
                } else {
                    warn!("task {} failed: {:#}", key, err);
                    self.set_finished(key, TaskStatus::Failed, None, Some(err.to_string()));
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                cancel.store(true, Ordering::SeqCst);
                // give the converter a moment to notice before abandoning it
                let _ = rx.recv_timeout(CANCEL_GRACE);
                self.set_finished(
                    key,
                    TaskStatus::Timeout,
                    None,
                    Some(TIMEOUT_MESSAGE.to_string()),
                );
                warn!("task {} timed out", key);
            }
            Err(RecvTimeoutError::Disconnected) => {
                // the converter thread died without reporting (panic)
                error!("task {} conversion thread terminated unexpectedly", key);
                self.set_finished(
                    key,
                    TaskStatus::Failed,
                    None,
                    Some("conversion terminated unexpectedly".to_string()),
                );
            }
        }
    }

    /// Drops finished tasks whose completion is older than the retention
    /// window.
    pub fn cleanup_pass(&self) {
        let cutoff = Utc::now() - ChronoDuration::hours(RETENTION);
        let mut tasks = self.tasks.lock().unwrap();
        let before = tasks.len();
        tasks.retain(|_, task| {
            !(task.status.is_finished()
                && task.completed_at.map(|t| t < cutoff).unwrap_or(false))
        });
        let dropped = before - tasks.len();
        if dropped > 0 {
            info!("cleanup removed {} expired task(s)", dropped);
        }
    }

    /// Hourly retention daemon. Never panics the process; a failing pass is
    /// logged and retried next hour.
    pub fn run_cleanup(&self) {
        while self.running.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_secs(3600));
            self.cleanup_pass();
        }
    }
}
