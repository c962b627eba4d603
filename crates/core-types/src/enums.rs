use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The side of a binary-option style contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Call,
    Put,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Call => "CALL",
            Direction::Put => "PUT",
        }
    }

    /// Reads the direction word of an event line. Anything that is not `call`,
    /// in any case, is a put.
    pub fn from_log_word(word: &str) -> Self {
        if word.eq_ignore_ascii_case("call") {
            Direction::Call
        } else {
            Direction::Put
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = CoreError;

    /// Brokers report the side in their own casing (`call`, `CALL`, `Call`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("call") {
            Ok(Direction::Call)
        } else if s.eq_ignore_ascii_case("put") {
            Ok(Direction::Put)
        } else {
            Err(CoreError::UnknownDirection(s.to_string()))
        }
    }
}

/// How a broker expects the contract term to be expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractKind {
    /// A regular contract whose duration is one of the broker's expiry buckets.
    Standard,
    /// A sub-minute style contract placed with the exact duration in seconds.
    Blitz,
}

/// The symbol naming scheme a broker session uses.
///
/// The event log always carries canonical symbols (`EURUSD`, `EURUSD_otc`); each
/// session converts at its own boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolConvention {
    /// The broker already speaks canonical symbols.
    #[default]
    Canonical,
    /// OTC markets are suffixed `-OTC` and some instruments carry an `-op` marker.
    DashOtc,
    /// Forex pairs are prefixed `frx` (e.g. `frxEURUSD`).
    FrxPrefix,
}

impl SymbolConvention {
    /// Converts a broker-native symbol into the canonical form written to the log.
    pub fn to_canonical(&self, native: &str) -> String {
        match self {
            SymbolConvention::Canonical => native.to_string(),
            SymbolConvention::DashOtc => native.replace("-OTC", "_otc").replace("-op", ""),
            SymbolConvention::FrxPrefix => native
                .strip_prefix("frx")
                .unwrap_or(native)
                .to_string(),
        }
    }

    /// Converts a canonical symbol into the form the broker expects.
    ///
    /// `FrxPrefix` brokers are searched by canonical name through
    /// `resolve_asset`, so the symbol is passed through unchanged.
    pub fn to_native(&self, canonical: &str) -> String {
        match self {
            SymbolConvention::Canonical | SymbolConvention::FrxPrefix => canonical.to_string(),
            SymbolConvention::DashOtc => canonical.replace("_otc", "-OTC"),
        }
    }
}
