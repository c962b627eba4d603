use crate::dedup::DedupSet;
use crate::error::EngineError;
use core_types::{Clock, TradeRecord};
use events::LogCursor;
use executor::ExecutionPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// What one dispatch cycle found in the log.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Well-formed records read this cycle.
    pub read: usize,
    pub malformed: usize,
    pub admitted: usize,
    /// Records whose ID was already dispatched.
    pub duplicate: usize,
    /// Records older than the admission window; they are never dispatched.
    pub stale: usize,
}

/// The client side of the pipeline: tails the event log and hands each new,
/// fresh record to the execution pool exactly once.
pub struct Dispatcher {
    cursor: LogCursor,
    dedup: DedupSet,
    clock: Arc<dyn Clock>,
    window: Duration,
}

impl Dispatcher {
    pub fn new(cursor: LogCursor, clock: Arc<dyn Clock>, window: Duration) -> Self {
        Self {
            cursor,
            dedup: DedupSet::new(),
            clock,
            window,
        }
    }

    pub fn dedup(&self) -> &DedupSet {
        &self.dedup
    }

    /// Reads the log and returns the records admitted for execution.
    ///
    /// Admitted IDs are in the dedup set when this returns, before anything is
    /// executed.
    pub async fn admit(&mut self) -> Result<(Vec<TradeRecord>, DispatchSummary), EngineError> {
        let batch = self.cursor.read_new().await?;
        let now = self.clock.now();
        let mut summary = DispatchSummary {
            read: batch.records.len(),
            malformed: batch.malformed,
            ..DispatchSummary::default()
        };

        let mut admitted = Vec::new();
        for record in batch.records {
            if self.dedup.contains(record.id) {
                summary.duplicate += 1;
                continue;
            }
            if !record.is_fresh(now, self.window) {
                debug!(trade_id = record.id, age_ms = record.age_millis(now), "Skipping stale record");
                summary.stale += 1;
                continue;
            }
            self.dedup.insert(record.id);
            admitted.push(record);
        }
        summary.admitted = admitted.len();
        Ok((admitted, summary))
    }

    /// One full cycle: admit new records and queue each for execution.
    pub async fn dispatch_cycle(
        &mut self,
        pool: &ExecutionPool,
    ) -> Result<DispatchSummary, EngineError> {
        let (admitted, summary) = self.admit().await?;
        let mut pending = admitted.into_iter();
        while let Some(record) = pending.next() {
            let trade_id = record.id;
            info!(
                trade_id,
                asset = %record.asset,
                direction = %record.direction,
                "New order dispatched"
            );
            if let Err(e) = pool.submit(record).await {
                // Admitted IDs stay in the dedup set, so these are never retried.
                let dropped: Vec<_> = std::iter::once(trade_id)
                    .chain(pending.map(|r| r.id))
                    .collect();
                error!(?dropped, error = %e, "Execution queue closed; admitted records dropped");
                return Err(e.into());
            }
        }
        Ok(summary)
    }
}
