use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Time elapsed since the UNIX epoch; zero if the clock is set before it.
pub(crate) fn get_duration_since_epoch() -> Duration {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default()
}

/// Wall-clock milliseconds, used for znode ctime/mtime and session id seeding
pub(crate) fn timestamp_millis() -> u64 {
    get_duration_since_epoch().as_millis() as u64
}
