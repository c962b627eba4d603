use crate::error::EngineError;
use api_client::BrokerSession;
use configuration::Config;
use core_types::Clock;
use events::{EventLog, LogCursor};
use executor::{ExecutionOutcome, ExecutionPool, ExecutionReport, Executor, PoolSettings};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub mod dedup;
pub mod dispatcher;
pub mod error;
pub mod producer;
pub mod supervisor;

pub use dedup::DedupSet;
pub use dispatcher::{DispatchSummary, Dispatcher};
pub use producer::{PollSummary, Producer};
pub use supervisor::{ReconnectionSupervisor, SessionState};

/// The master process: watches one account and records every new trade.
pub struct MasterEngine {
    producer: Producer,
    supervisor: ReconnectionSupervisor,
    poll_interval: Duration,
    error_backoff: Duration,
}

impl MasterEngine {
    pub fn new(config: &Config, session: Arc<dyn BrokerSession>, clock: Arc<dyn Clock>) -> Self {
        let producer = Producer::new(
            Arc::clone(&session),
            EventLog::new(&config.event_log.path),
            clock,
            config.admission.window,
            config.admission.late_trade_policy,
            config.master.broker.symbols(),
        );
        Self {
            producer,
            supervisor: ReconnectionSupervisor::new(session, config.supervisor.clone()),
            poll_interval: config.master.poll_interval,
            error_backoff: config.master.error_backoff,
        }
    }

    /// Connects, then polls until `cancel` fires.
    ///
    /// Only a failed cold start ends the loop with an error; everything after
    /// that is logged and retried.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), EngineError> {
        self.supervisor.connect_with_retry(&cancel).await?;
        info!(broker = self.supervisor.session().name(), "Watching master account for new trades");

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Positions open on the account hold back scheduled health checks.
        let mut busy = false;

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if !self.supervisor.on_cycle(busy, &cancel).await {
                continue;
            }

            match self.producer.poll_once().await {
                Ok(summary) => {
                    busy = summary.observed > 0;
                    if summary != PollSummary::default() {
                        debug!(?summary, "Producer cycle");
                    }
                }
                Err(e) => {
                    // A failing poll says nothing about open positions.
                    busy = false;
                    warn!(error = %e, "Failed to query open positions");
                    if e.is_session_error() {
                        self.supervisor.request_health_check();
                    }
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(self.error_backoff) => {}
                    }
                }
            }
        }

        self.supervisor.session().disconnect().await;
        info!(recorded = self.producer.dedup().len(), "Master stopped");
        Ok(())
    }
}

/// The client process: tails the event log and mirrors each fresh record once.
pub struct ClientEngine {
    dispatcher: Dispatcher,
    supervisor: ReconnectionSupervisor,
    executor: Arc<dyn Executor>,
    pool_settings: PoolSettings,
    poll_interval: Duration,
}

#[derive(Debug, Default)]
struct ReportTally {
    placed: usize,
    skipped: usize,
    failed: usize,
}

impl ReportTally {
    fn record(&mut self, report: &ExecutionReport) {
        match &report.outcome {
            ExecutionOutcome::Placed { .. } => self.placed += 1,
            ExecutionOutcome::Skipped { .. } => self.skipped += 1,
            ExecutionOutcome::Failed { .. } => self.failed += 1,
        }
        debug!(
            trade_id = report.trade_id,
            asset = %report.asset,
            outcome = ?report.outcome,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Execution finished"
        );
    }
}

impl ClientEngine {
    pub fn new(
        config: &Config,
        session: Arc<dyn BrokerSession>,
        executor: Arc<dyn Executor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            dispatcher: Dispatcher::new(
                LogCursor::new(&config.event_log.path),
                clock,
                config.admission.window,
            ),
            supervisor: ReconnectionSupervisor::new(session, config.supervisor.clone()),
            executor,
            pool_settings: PoolSettings::from(&config.client),
            poll_interval: config.client.poll_interval,
        }
    }

    /// Connects, starts the execution pool and dispatches until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), EngineError> {
        self.supervisor.connect_with_retry(&cancel).await?;

        let (pool, mut reports) =
            ExecutionPool::spawn(Arc::clone(&self.executor), self.pool_settings, cancel.child_token());
        info!(
            broker = self.supervisor.session().name(),
            workers = self.pool_settings.workers,
            "Mirroring event log onto client account"
        );

        let mut tally = ReportTally::default();
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                Some(report) = reports.recv() => {
                    tally.record(&report);
                    continue;
                }
                _ = ticker.tick() => {}
            }
            if !self.supervisor.on_cycle(false, &cancel).await {
                continue;
            }

            let dispatched = tokio::select! {
                () = cancel.cancelled() => break,
                result = self.dispatcher.dispatch_cycle(&pool) => result,
            };
            match dispatched {
                Ok(summary) => {
                    if summary.admitted > 0 || summary.malformed > 0 {
                        debug!(?summary, "Dispatch cycle");
                    }
                }
                Err(e) => warn!(error = %e, "Dispatch cycle failed"),
            }
        }

        pool.shutdown().await;
        while let Ok(report) = reports.try_recv() {
            tally.record(&report);
        }
        self.supervisor.session().disconnect().await;
        info!(
            dispatched = self.dispatcher.dedup().len(),
            placed = tally.placed,
            skipped = tally.skipped,
            failed = tally.failed,
            "Client stopped"
        );
        Ok(())
    }
}
