use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Builds a `SystemTime` from the unix seconds/nanoseconds pair a NetFlow header carries.
pub(crate) fn build_unix_time(secs: u32, n_secs: u32) -> SystemTime {
    SystemTime::UNIX_EPOCH
        + Duration::from_secs(secs.into())
        + Duration::from_nanos(n_secs.into())
}

/// Current absolute unix time in seconds, used for prefix-cache expiry
/// bookkeeping.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
