use crate::error::EventLogError;
use chrono::DateTime;
use core_types::{Direction, TradeRecord};
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::OnceLock;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Renders a record as one log line, without the trailing newline.
pub fn format_line(record: &TradeRecord) -> String {
    let time = DateTime::from_timestamp(record.stamp, 0)
        .map(|t| t.format(TIME_FORMAT).to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "- Time: {} Stamp: {} ID: {} Asset: {} Amount: {} Direction: {} Duration: {}",
        time,
        record.stamp,
        record.id,
        record.asset,
        record.amount.normalize(),
        record.direction,
        record.duration,
    )
}

#[allow(clippy::expect_used)] // Regex is compile-time constant; expect() is safe here
fn line_regex() -> &'static Regex {
    static LINE_REGEX: OnceLock<Regex> = OnceLock::new();
    LINE_REGEX.get_or_init(|| {
        // Numeric fields other than Amount may carry a fraction that is truncated.
        Regex::new(concat!(
            r"Stamp:\s*(\d+)(?:\.\d*)?\s+",
            r"ID:\s*(\d+)(?:\.\d*)?\s+",
            r"Asset:\s*([A-Za-z0-9_#.\-]+)\s+",
            r"Amount:\s*(\d+(?:\.\d+)?)\s+",
            r"Direction:\s*(\w+)\s+",
            r"Duration:\s*(\d+)(?:\.\d*)?",
        ))
        .expect("event line regex is valid")
    })
}

/// Parses the first grammar match found anywhere in `line`.
pub fn parse_line(line: &str) -> Result<TradeRecord, EventLogError> {
    let caps = line_regex()
        .captures(line)
        .ok_or_else(|| EventLogError::Malformed("no record fields found".to_string()))?;
    let field = |i: usize| caps.get(i).map(|m| m.as_str()).unwrap_or_default();

    let stamp = field(1)
        .parse::<i64>()
        .map_err(|_| malformed("Stamp", field(1)))?;
    let id = field(2)
        .parse::<u64>()
        .map_err(|_| malformed("ID", field(2)))?;
    let amount = Decimal::from_str(field(4)).map_err(|_| malformed("Amount", field(4)))?;
    let direction = Direction::from_log_word(field(5));
    if !field(5).eq_ignore_ascii_case(direction.as_str()) {
        tracing::warn!(trade_id = id, word = field(5), "Unrecognised direction; treating it as PUT");
    }
    let duration = field(6)
        .parse::<u32>()
        .map_err(|_| malformed("Duration", field(6)))?;

    TradeRecord::new(stamp, id, field(3), amount, direction, duration)
        .map_err(|e| EventLogError::Malformed(e.to_string()))
}

fn malformed(field: &str, value: &str) -> EventLogError {
    EventLogError::Malformed(format!("invalid {field} '{value}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn record() -> TradeRecord {
        TradeRecord::new(1_714_564_803, 42, "EURUSD_otc", dec!(12.50), Direction::Put, 60).unwrap()
    }

    #[test]
    fn formatted_line_parses_back() {
        let line = format_line(&record());
        assert!(line.starts_with("- Time: 2024-05-01 12:00:03 Stamp: 1714564803 ID: 42"));
        assert_eq!(parse_line(&line).unwrap(), record());
    }

    #[test]
    fn tolerates_prefix_whitespace_and_fractions() {
        let line = "[master] noise   Stamp: 1714564803.927  ID: 42 Asset: EURUSD_otc \
                    Amount: 12.5 Direction: put Duration: 60.9 trailing";
        let parsed = parse_line(line).unwrap();
        assert_eq!(parsed.stamp, 1_714_564_803);
        assert_eq!(parsed.direction, Direction::Put);
        assert_eq!(parsed.duration, 60);
        assert_eq!(parsed.amount, dec!(12.5));
    }

    #[test]
    fn records_with_varied_fields_parse_back() {
        let records = [
            TradeRecord::new(1_714_564_803, 1, "EURUSD", dec!(0.123456789), Direction::Call, 30),
            TradeRecord::new(0, 99_999_999, "US#30.cash", dec!(1000), Direction::Put, 3600),
            TradeRecord::new(1_700_000_000, 7, "EURUSD-OTC", dec!(2.50), Direction::Call, 1),
            TradeRecord::new(1_700_000_001, 8, "R_100", dec!(12345.0001), Direction::Put, 900),
        ];
        for record in records {
            let record = record.unwrap();
            assert_eq!(parse_line(&format_line(&record)).unwrap(), record);
        }
    }

    #[test]
    fn direction_words_other_than_call_read_as_put() {
        let call = "Stamp: 1 ID: 1 Asset: X Amount: 1 Direction: Call Duration: 5";
        assert_eq!(parse_line(call).unwrap().direction, Direction::Call);

        let other = "Stamp: 1 ID: 1 Asset: X Amount: 1 Direction: HIGHER Duration: 5";
        assert_eq!(parse_line(other).unwrap().direction, Direction::Put);
    }

    #[test]
    fn rejects_incomplete_and_invalid_lines() {
        assert!(parse_line("").is_err());
        assert!(parse_line("Stamp: 1 ID: 1 Asset: X Amount: 1 Direction: CALL").is_err());
        assert!(parse_line("Stamp: 1 ID: 1 Asset: X Amount: 0 Direction: CALL Duration: 5").is_err());
        assert!(parse_line("Stamp: 1 ID: 1 Asset: X Amount: 1 Direction: CALL Duration: 0.4").is_err());
    }
}
