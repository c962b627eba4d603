use crate::error::ConfigError;
use core_types::SymbolConvention;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// The root configuration structure for both the master and the client process.
///
/// Every section is optional in the file; missing values fall back to the
/// defaults below.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub event_log: EventLogSettings,
    pub admission: AdmissionSettings,
    pub master: MasterSettings,
    pub client: ClientSettings,
    pub supervisor: SupervisorSettings,
    pub credentials: CredentialSettings,
    pub logging: LoggingSettings,
}

impl Config {
    /// Rejects values that would make a loop spin or a pool never run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.admission.window.is_zero() {
            return Err(ConfigError::ValidationError(
                "admission.window must be greater than zero".to_string(),
            ));
        }
        if self.client.workers == 0 {
            return Err(ConfigError::ValidationError(
                "client.workers must be at least 1".to_string(),
            ));
        }
        if self.client.queue_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "client.queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.supervisor.health_check_every == 0 {
            return Err(ConfigError::ValidationError(
                "supervisor.health_check_every must be at least 1".to_string(),
            ));
        }
        if self.supervisor.startup_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "supervisor.startup_attempts must be at least 1".to_string(),
            ));
        }
        if let DurationPolicy::MinuteBuckets { buckets, .. } = &self.client.duration_policy {
            if buckets.is_empty() || buckets.contains(&0) {
                return Err(ConfigError::ValidationError(
                    "client.duration_policy.buckets must list positive minute values".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Location of the shared trade event log.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EventLogSettings {
    pub path: PathBuf,
}

impl Default for EventLogSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("orders.log"),
        }
    }
}

/// What the producer does with a trade first seen after the admission window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum LateTradePolicy {
    /// Mark the trade as seen and never record it.
    #[default]
    Discard,
    /// Record it anyway, stamped with the detection time.
    Record,
}

/// The freshness rules shared by producer and consumer.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdmissionSettings {
    /// Maximum age a trade may have and still be recorded or dispatched.
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    pub late_trade_policy: LateTradePolicy,
}

impl Default for AdmissionSettings {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(15),
            late_trade_policy: LateTradePolicy::Discard,
        }
    }
}

/// Settings of the process watching the master account.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MasterSettings {
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Pause after a failed position query before the next cycle.
    #[serde(with = "humantime_serde")]
    pub error_backoff: Duration,
    pub broker: BrokerSettings,
}

impl Default for MasterSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            error_backoff: Duration::from_millis(500),
            broker: BrokerSettings::default(),
        }
    }
}

/// Settings of the process mirroring onto a client account.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Upper bound on a single order placement, asset lookup included.
    #[serde(with = "humantime_serde")]
    pub execution_timeout: Duration,
    /// Number of concurrent execution workers.
    pub workers: usize,
    /// Orders that may wait for a free worker before dispatch applies backpressure.
    pub queue_capacity: usize,
    pub duration_policy: DurationPolicy,
    pub broker: BrokerSettings,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(300),
            execution_timeout: Duration::from_secs(60),
            workers: 8,
            queue_capacity: 64,
            duration_policy: DurationPolicy::Seconds,
            broker: BrokerSettings::default(),
        }
    }
}

/// How a client broker wants contract durations expressed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DurationPolicy {
    /// Any duration in seconds is accepted as is.
    #[default]
    Seconds,
    /// Only whole-minute expiries from `buckets` are offered; anything up to
    /// `blitz_max_secs` is placed as a blitz contract instead.
    MinuteBuckets {
        buckets: Vec<u32>,
        #[serde(default)]
        blitz_max_secs: u32,
    },
}

/// Reconnection behaviour shared by both processes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SupervisorSettings {
    /// A health check runs every this many poll cycles.
    pub health_check_every: u32,
    /// Fixed pause between reconnect attempts in the long-running loop.
    #[serde(with = "humantime_serde")]
    pub reconnect_delay: Duration,
    /// Attempts allowed at cold start before the process gives up.
    pub startup_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub startup_retry_delay: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            health_check_every: 30,
            reconnect_delay: Duration::from_millis(500),
            startup_attempts: 5,
            startup_retry_delay: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CredentialSettings {
    /// Line-indexed credential file.
    pub path: PathBuf,
}

impl Default for CredentialSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("settings/accounts.json"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    /// When set, logs are also written to a daily-rolling file in this directory.
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            file_prefix: "copytrader.log".to_string(),
        }
    }
}

/// Which broker integration a process talks to.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BrokerSettings {
    Paper(PaperSettings),
    Deriv(DerivSettings),
}

impl Default for BrokerSettings {
    fn default() -> Self {
        BrokerSettings::Paper(PaperSettings::default())
    }
}

impl BrokerSettings {
    pub fn kind(&self) -> &'static str {
        match self {
            BrokerSettings::Paper(_) => "paper",
            BrokerSettings::Deriv(_) => "deriv",
        }
    }

    pub fn symbols(&self) -> SymbolConvention {
        match self {
            BrokerSettings::Paper(p) => p.symbols,
            BrokerSettings::Deriv(d) => d.symbols,
        }
    }
}

/// An in-memory account that accepts every order. Used for dry runs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PaperSettings {
    pub symbols: SymbolConvention,
    /// When set, only these native symbols resolve as tradeable.
    pub tradeable_assets: Option<Vec<String>>,
    #[serde(with = "humantime_serde")]
    pub order_latency: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DerivSettings {
    #[serde(default = "default_deriv_app_id")]
    pub app_id: u32,
    #[serde(default = "default_deriv_endpoint")]
    pub endpoint: String,
    /// Line of the credential file holding the API token.
    pub token_line: usize,
    /// Account currency; taken from the authorization reply when absent.
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default = "default_deriv_symbols")]
    pub symbols: SymbolConvention,
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
}

fn default_deriv_app_id() -> u32 {
    1089
}

fn default_deriv_endpoint() -> String {
    "wss://ws.derivws.com/websockets/v3".to_string()
}

fn default_deriv_symbols() -> SymbolConvention {
    SymbolConvention::FrxPrefix
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}
