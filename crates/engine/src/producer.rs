use crate::dedup::DedupSet;
use crate::error::EngineError;
use api_client::BrokerSession;
use configuration::LateTradePolicy;
use core_types::{Clock, OpenPosition, SymbolConvention, TradeRecord, normalize_trade_id};
use events::EventLog;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// What one producer cycle did with the positions it saw.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollSummary {
    /// Open positions reported by the session.
    pub observed: usize,
    pub recorded: usize,
    /// First seen after the admission window and dropped.
    pub stale: usize,
    /// First seen after the admission window and recorded anyway.
    pub late: usize,
    /// Positions that could not be turned into a record.
    pub invalid: usize,
    pub append_failures: usize,
}

/// The master side of the pipeline: turns newly opened positions into log lines.
pub struct Producer {
    session: Arc<dyn BrokerSession>,
    log: EventLog,
    dedup: DedupSet,
    clock: Arc<dyn Clock>,
    window: Duration,
    late_trades: LateTradePolicy,
    symbols: SymbolConvention,
}

impl Producer {
    pub fn new(
        session: Arc<dyn BrokerSession>,
        log: EventLog,
        clock: Arc<dyn Clock>,
        window: Duration,
        late_trades: LateTradePolicy,
        symbols: SymbolConvention,
    ) -> Self {
        Self {
            session,
            log,
            dedup: DedupSet::new(),
            clock,
            window,
            late_trades,
            symbols,
        }
    }

    pub fn dedup(&self) -> &DedupSet {
        &self.dedup
    }

    /// Queries the session once and appends a line for every position not seen
    /// before and still inside the admission window.
    ///
    /// A position's ID is marked as seen the first time it shows up, whatever
    /// happens to it afterwards, so it is never recorded twice. A failed query
    /// is returned to the caller and nothing is marked.
    pub async fn poll_once(&mut self) -> Result<PollSummary, EngineError> {
        let positions = self.session.list_open_positions().await?;
        let now = self.clock.now();
        let mut summary = PollSummary {
            observed: positions.len(),
            ..PollSummary::default()
        };

        for position in positions {
            let Some(id) = normalize_trade_id(&position.raw_id) else {
                warn!(raw_id = %position.raw_id, "Position ID has no digits; skipping");
                summary.invalid += 1;
                continue;
            };
            if !self.dedup.insert(id) {
                continue;
            }

            let fresh = position.is_fresh(now, self.window);
            if !fresh && self.late_trades == LateTradePolicy::Discard {
                debug!(trade_id = id, age_ms = position.age_millis(now), "Ignoring trade opened before the admission window");
                summary.stale += 1;
                continue;
            }

            let record = match self.to_record(id, &position, now.timestamp()) {
                Ok(record) => record,
                Err(reason) => {
                    warn!(trade_id = id, raw_id = %position.raw_id, %reason, "Cannot record position");
                    summary.invalid += 1;
                    continue;
                }
            };
            if !fresh {
                warn!(trade_id = id, age_ms = position.age_millis(now), "Recording late trade");
                summary.late += 1;
            }

            match self.log.append(&record).await {
                Ok(()) => {
                    summary.recorded += 1;
                    info!(
                        trade_id = id,
                        asset = %record.asset,
                        amount = %record.amount,
                        direction = %record.direction,
                        duration = record.duration,
                        "New trade detected and logged"
                    );
                    if let Err(e) = self.session.acknowledge_position(&position.raw_id).await {
                        warn!(trade_id = id, error = %e, "Failed to acknowledge position");
                    }
                }
                Err(e) => {
                    error!(trade_id = id, error = %e, "Failed to append trade to event log");
                    summary.append_failures += 1;
                }
            }
        }

        Ok(summary)
    }

    fn to_record(
        &self,
        id: u64,
        position: &OpenPosition,
        stamp: i64,
    ) -> Result<TradeRecord, core_types::CoreError> {
        TradeRecord::new(
            stamp,
            id,
            self.symbols.to_canonical(&position.asset),
            position.amount,
            position.direction,
            position.duration_secs,
        )
    }
}
