use crate::error::ExecutionError;
use crate::mirror::Executor;
use configuration::ClientSettings;
use core_types::{TradeId, TradeRecord};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How one dispatched record ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Placed { order_id: String },
    /// Never sent to the broker (asset unavailable, unsupported duration).
    Skipped { reason: String },
    Failed { reason: String },
}

#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub trade_id: TradeId,
    pub asset: String,
    pub outcome: ExecutionOutcome,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub workers: usize,
    pub queue_capacity: usize,
    /// Deadline for a single order, asset lookup included.
    pub timeout: Duration,
}

impl From<&ClientSettings> for PoolSettings {
    fn from(settings: &ClientSettings) -> Self {
        Self {
            workers: settings.workers,
            queue_capacity: settings.queue_capacity,
            timeout: settings.execution_timeout,
        }
    }
}

/// A fixed set of worker tasks draining a bounded queue of records.
///
/// Each record is executed once under the configured deadline. When the
/// cancellation token fires, in-flight orders are dropped and workers exit.
pub struct ExecutionPool {
    queue: mpsc::Sender<TradeRecord>,
    workers: Vec<JoinHandle<()>>,
}

impl ExecutionPool {
    /// Starts the workers. Reports arrive on the returned receiver in completion order.
    pub fn spawn(
        executor: Arc<dyn Executor>,
        settings: PoolSettings,
        cancel: CancellationToken,
    ) -> (Self, mpsc::UnboundedReceiver<ExecutionReport>) {
        let (queue, jobs) = mpsc::channel(settings.queue_capacity.max(1));
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();
        let jobs = Arc::new(Mutex::new(jobs));

        let workers = (0..settings.workers.max(1))
            .map(|worker_id| {
                tokio::spawn(run_worker(
                    worker_id,
                    Arc::clone(&executor),
                    Arc::clone(&jobs),
                    reports_tx.clone(),
                    settings.timeout,
                    cancel.clone(),
                ))
            })
            .collect();

        (Self { queue, workers }, reports_rx)
    }

    /// Queues a record, waiting for room when every worker is busy and the queue is full.
    pub async fn submit(&self, record: TradeRecord) -> Result<(), ExecutionError> {
        self.queue
            .send(record)
            .await
            .map_err(|_| ExecutionError::QueueClosed)
    }

    /// Stops accepting work and waits for the workers to finish what is queued.
    /// After cancellation, queued records are reported as cancelled instead.
    pub async fn shutdown(self) {
        drop(self.queue);
        for worker in self.workers {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "Execution worker panicked");
            }
        }
    }
}

async fn run_worker(
    worker_id: usize,
    executor: Arc<dyn Executor>,
    jobs: Arc<Mutex<mpsc::Receiver<TradeRecord>>>,
    reports: mpsc::UnboundedSender<ExecutionReport>,
    timeout: Duration,
    cancel: CancellationToken,
) {
    loop {
        let next = {
            let mut jobs = jobs.lock().await;
            tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                job = jobs.recv() => job,
            }
        };
        let Some(record) = next else {
            break;
        };

        let started = Instant::now();
        let result = tokio::select! {
            () = cancel.cancelled() => Err(ExecutionError::Cancelled),
            res = tokio::time::timeout(timeout, executor.execute(&record)) => {
                res.unwrap_or(Err(ExecutionError::Timeout(timeout)))
            }
        };
        let outcome = match result {
            Ok(placed) => {
                tracing::info!(
                    worker_id,
                    trade_id = record.id,
                    order_id = %placed.order_id,
                    "Order placed successfully"
                );
                ExecutionOutcome::Placed {
                    order_id: placed.order_id,
                }
            }
            Err(e) if e.is_skip() => {
                tracing::warn!(worker_id, trade_id = record.id, reason = %e, "Skipping order");
                ExecutionOutcome::Skipped {
                    reason: e.to_string(),
                }
            }
            Err(e) => {
                tracing::error!(worker_id, trade_id = record.id, error = %e, "Failed to place order");
                ExecutionOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        send_report(&reports, record, outcome, started);
    }

    if cancel.is_cancelled() {
        // Nothing queued will run any more; account for it before exiting.
        let mut jobs = jobs.lock().await;
        jobs.close();
        while let Ok(record) = jobs.try_recv() {
            tracing::warn!(worker_id, trade_id = record.id, "Dropping queued order on shutdown");
            let outcome = ExecutionOutcome::Failed {
                reason: ExecutionError::Cancelled.to_string(),
            };
            send_report(&reports, record, outcome, Instant::now());
        }
    }
    tracing::debug!(worker_id, "Execution worker stopped");
}

fn send_report(
    reports: &mpsc::UnboundedSender<ExecutionReport>,
    record: TradeRecord,
    outcome: ExecutionOutcome,
    started: Instant,
) {
    let report = ExecutionReport {
        trade_id: record.id,
        asset: record.asset,
        outcome,
        elapsed: started.elapsed(),
    };
    // The receiver going away only means nobody is collecting reports.
    let _ = reports.send(report);
}
