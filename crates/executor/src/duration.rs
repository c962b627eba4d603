use crate::error::ExecutionError;
use configuration::DurationPolicy;
use core_types::ContractKind;

/// Fits a duration in seconds to what the client broker can trade.
///
/// With minute buckets, anything up to `blitz_max_secs` goes out unchanged as a
/// blitz contract; longer durations are rounded up to the smallest bucket that
/// covers them.
pub fn fold_duration(
    policy: &DurationPolicy,
    duration_secs: u32,
) -> Result<(u32, ContractKind), ExecutionError> {
    match policy {
        DurationPolicy::Seconds => Ok((duration_secs, ContractKind::Standard)),
        DurationPolicy::MinuteBuckets {
            buckets,
            blitz_max_secs,
        } => {
            if duration_secs <= *blitz_max_secs {
                return Ok((duration_secs, ContractKind::Blitz));
            }
            let minutes = duration_secs.div_ceil(60);
            buckets
                .iter()
                .copied()
                .filter(|bucket| *bucket >= minutes)
                .min()
                .map(|bucket| (bucket * 60, ContractKind::Standard))
                .ok_or(ExecutionError::UnsupportedDuration(duration_secs))
        }
    }
}
