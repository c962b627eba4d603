use crate::structs::TradeId;

/// Number of trailing digits of a broker order ID kept as the mirrored trade ID.
pub const TRADE_ID_DIGITS: usize = 8;

/// Derives the log-level trade ID from a broker-native order identifier.
///
/// Broker IDs come as UUID-like strings, large integers or composite keys. Only
/// the digits are kept and the last eight of them form the ID. Returns `None`
/// when the identifier contains no digit at all.
pub fn normalize_trade_id(raw: &str) -> Option<TradeId> {
    let digits: Vec<char> = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let start = digits.len().saturating_sub(TRADE_ID_DIGITS);
    let tail: String = digits[start..].iter().collect();
    tail.parse().ok()
}

/// Asset symbols must survive the log grammar as a single token.
pub fn is_valid_asset_token(symbol: &str) -> bool {
    !symbol.is_empty()
        && symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '#' | '.' | '-'))
}
