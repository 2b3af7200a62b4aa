//! Asynchronous confirmation record creation
//!
//! Decouples ledger-confirmation latency from caller-facing latency: callers
//! enqueue a task and the drain loop creates the record against the registry
//! under a concurrency ceiling, retrying failures with exponential backoff.

use super::{ConfirmationRegistry, ConfirmationStatus, TransferDetails};
use crate::clock::Clock;
use crate::config::ConfirmationConfig;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Task priority; higher priorities drain first, stable within a band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    High,
    Medium,
    Low,
}

impl TaskPriority {
    fn rank(&self) -> u8 {
        match self {
            TaskPriority::High => 0,
            TaskPriority::Medium => 1,
            TaskPriority::Low => 2,
        }
    }
}

/// A queued confirmation-creation unit of work
#[derive(Debug, Clone)]
pub struct ConfirmationTask {
    pub id: String,
    pub transfer: TransferDetails,
    pub status: ConfirmationStatus,
    pub ledger_tx_hash: Option<String>,
    pub priority: TaskPriority,
    pub retry_count: u32,
    pub max_retries: u32,
    pub enqueued_at: DateTime<Utc>,
}

/// Point-in-time processor statistics
#[derive(Debug, Clone)]
pub struct ProcessorMetrics {
    pub queue_depth: usize,
    pub active_count: usize,
    pub completed_count: u64,
    pub failed_count: u64,
    pub avg_processing_ms: f64,
    pub drain_active: bool,
}

struct Inner {
    registry: Arc<ConfirmationRegistry>,
    config: ConfirmationConfig,
    clock: Arc<dyn Clock>,
    queue: Mutex<VecDeque<ConfirmationTask>>,
    semaphore: Arc<Semaphore>,
    drain_active: AtomicBool,
    shutting_down: AtomicBool,
    active: AtomicUsize,
    completed: AtomicU64,
    failed: AtomicU64,
    total_processing_ms: AtomicU64,
    /// Terminal failures by task ID; recorded, never re-raised
    failures: DashMap<String, String>,
}

impl Inner {
    /// Insert keeping priority order: before the first strictly-lower
    /// priority task, after everything at the same or higher priority.
    fn enqueue(&self, task: ConfirmationTask) {
        let mut queue = self.queue.lock().expect("queue lock poisoned");
        let position = queue
            .iter()
            .position(|t| t.priority.rank() > task.priority.rank())
            .unwrap_or(queue.len());
        queue.insert(position, task);
    }

    fn pop_batch(&self, max: usize) -> Vec<ConfirmationTask> {
        let mut queue = self.queue.lock().expect("queue lock poisoned");
        let take = max.min(queue.len());
        queue.drain(..take).collect()
    }

    fn queue_depth(&self) -> usize {
        self.queue.lock().expect("queue lock poisoned").len()
    }
}

/// Priority queue plus a bounded pool of in-flight confirmation tasks
pub struct ConfirmationTaskProcessor {
    inner: Arc<Inner>,
}

impl ConfirmationTaskProcessor {
    pub fn new(
        registry: Arc<ConfirmationRegistry>,
        clock: Arc<dyn Clock>,
        config: ConfirmationConfig,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent));
        Self {
            inner: Arc::new(Inner {
                registry,
                config,
                clock,
                queue: Mutex::new(VecDeque::new()),
                semaphore,
                drain_active: AtomicBool::new(false),
                shutting_down: AtomicBool::new(false),
                active: AtomicUsize::new(0),
                completed: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                total_processing_ms: AtomicU64::new(0),
                failures: DashMap::new(),
            }),
        }
    }

    /// Enqueue a confirmation task and start the drain loop if idle.
    /// Returns the task ID.
    pub fn add_confirmation_task(
        &self,
        transfer: TransferDetails,
        status: ConfirmationStatus,
        ledger_tx_hash: Option<String>,
        priority: TaskPriority,
    ) -> String {
        let task = ConfirmationTask {
            id: Uuid::new_v4().to_string(),
            transfer,
            status,
            ledger_tx_hash,
            priority,
            retry_count: 0,
            max_retries: self.inner.config.max_retries,
            enqueued_at: self.inner.clock.now(),
        };
        let task_id = task.id.clone();

        debug!("Enqueued confirmation task {} ({:?})", task_id, priority);
        self.inner.enqueue(task);
        crate::metrics::record_confirmation_task_enqueued();
        Self::ensure_drain(self.inner.clone());

        task_id
    }

    /// Terminal failure reason for a task, if it exhausted its retries
    pub fn failure_reason(&self, task_id: &str) -> Option<String> {
        self.inner.failures.get(task_id).map(|r| r.clone())
    }

    pub fn metrics(&self) -> ProcessorMetrics {
        let completed = self.inner.completed.load(Ordering::Relaxed);
        let total_ms = self.inner.total_processing_ms.load(Ordering::Relaxed);
        ProcessorMetrics {
            queue_depth: self.inner.queue_depth(),
            active_count: self.inner.active.load(Ordering::Relaxed),
            completed_count: completed,
            failed_count: self.inner.failed.load(Ordering::Relaxed),
            avg_processing_ms: if completed > 0 {
                total_ms as f64 / completed as f64
            } else {
                0.0
            },
            drain_active: self.inner.drain_active.load(Ordering::SeqCst),
        }
    }

    fn ensure_drain(inner: Arc<Inner>) {
        if inner.shutting_down.load(Ordering::SeqCst) {
            return;
        }
        if inner.drain_active.swap(true, Ordering::SeqCst) {
            return;
        }
        tokio::spawn(Self::drain(inner));
    }

    /// Fill available concurrency slots from the head of the queue. Blocks
    /// only on the concurrency ceiling, never on individual completions.
    async fn drain(inner: Arc<Inner>) {
        loop {
            if inner.shutting_down.load(Ordering::SeqCst) {
                inner.drain_active.store(false, Ordering::SeqCst);
                return;
            }

            let batch = inner.pop_batch(inner.config.batch_size);
            if batch.is_empty() {
                inner.drain_active.store(false, Ordering::SeqCst);
                // A task may have been enqueued between the pop and the flag
                // store; reclaim the drain if so.
                if inner.queue_depth() > 0
                    && !inner.drain_active.swap(true, Ordering::SeqCst)
                {
                    continue;
                }
                return;
            }

            for task in batch {
                let permit = match inner.semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    // Semaphore closed only at teardown
                    Err(_) => return,
                };
                let inner = inner.clone();
                tokio::spawn(async move {
                    Self::process_task(inner, task).await;
                    drop(permit);
                });
            }
        }
    }

    async fn process_task(inner: Arc<Inner>, task: ConfirmationTask) {
        inner.active.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();

        let result = inner
            .registry
            .create_confirmation_record(&task.transfer, task.status, task.ledger_tx_hash.clone())
            .await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        inner.active.fetch_sub(1, Ordering::SeqCst);

        match result {
            Ok(record) => {
                inner.completed.fetch_add(1, Ordering::Relaxed);
                inner
                    .total_processing_ms
                    .fetch_add(elapsed_ms, Ordering::Relaxed);
                crate::metrics::record_confirmation_task_completed(elapsed_ms as f64 / 1000.0);
                debug!(
                    "Confirmation task {} produced record {} in {}ms",
                    task.id, record.id, elapsed_ms
                );
            }
            Err(e) if task.retry_count < task.max_retries => {
                let delay_ms =
                    inner.config.retry_base_delay_ms * 2u64.pow(task.retry_count);
                warn!(
                    "Confirmation task {} failed (attempt {}): {}; retrying in {}ms",
                    task.id,
                    task.retry_count + 1,
                    e,
                    delay_ms
                );

                let mut retry = task;
                retry.retry_count += 1;
                // Back off outside this task so the concurrency slot frees
                // immediately; a waiting retry must not starve fresh work.
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    inner.enqueue(retry);
                    Self::ensure_drain(inner);
                });
            }
            Err(e) => {
                warn!(
                    "Confirmation task {} exhausted {} retries: {}",
                    task.id, task.max_retries, e
                );
                inner.failed.fetch_add(1, Ordering::Relaxed);
                inner.failures.insert(task.id.clone(), e.to_string());
                crate::metrics::record_confirmation_task_failed();
            }
        }
    }

    /// Stop accepting new drains and wait, bounded by the configured grace
    /// period, for in-flight tasks to finish.
    pub async fn shutdown(&self) {
        self.inner.shutting_down.store(true, Ordering::SeqCst);
        info!("Confirmation processor shutdown initiated");

        let deadline = Instant::now() + Duration::from_secs(self.inner.config.shutdown_grace_secs);
        while self.inner.active.load(Ordering::SeqCst) > 0 {
            if Instant::now() >= deadline {
                warn!(
                    "Confirmation processor shutdown timed out with {} tasks in flight and {} queued",
                    self.inner.active.load(Ordering::SeqCst),
                    self.inner.queue_depth()
                );
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let leftover = self.inner.queue_depth();
        if leftover > 0 {
            warn!(
                "Confirmation processor stopped with {} tasks still queued",
                leftover
            );
        } else {
            info!("Confirmation processor drained cleanly");
        }
    }
}
