//! Wall-clock helpers.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{ProtocolError, Result};

/// Seconds since the Unix epoch.
///
/// # Errors
/// Returns a `ProtocolError::Custom` if the system time is earlier than UNIX_EPOCH
pub fn unix_seconds() -> Result<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| ProtocolError::Custom("System time error: time went backwards".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_seconds_is_recent() {
        // 2020-01-01
        assert!(matches!(unix_seconds(), Ok(secs) if secs > 1_577_836_800));
    }
}
