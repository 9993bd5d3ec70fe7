//! Default deadlines and deadline-bounded waits.

use std::future::Future;
use std::time::Duration;

use crate::error::{ProtocolError, Result};

/// Deadline for a correlated response.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Lower bound of the keepalive interval (inclusive).
pub const KEEPALIVE_MIN: Duration = Duration::from_secs(20);

/// Upper bound of the keepalive interval (exclusive).
pub const KEEPALIVE_MAX: Duration = Duration::from_secs(90);

/// Granularity at which the driver polls the keepalive schedule.
pub const KEEPALIVE_TICK: Duration = Duration::from_secs(1);

/// Await `fut`, failing with [`ProtocolError::TimedOut`] once `deadline` elapses.
///
/// `None` waits without a deadline.
pub async fn with_deadline<F, T>(deadline: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = T>,
{
    match deadline {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| ProtocolError::TimedOut),
        None => Ok(fut.await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_elapses() {
        let result = with_deadline(Some(Duration::from_secs(1)), std::future::pending::<()>()).await;
        assert!(matches!(result, Err(ProtocolError::TimedOut)));
    }

    #[tokio::test]
    async fn test_ready_future_passes_through() {
        let result = with_deadline(Some(Duration::from_secs(1)), async { 7 }).await;
        assert!(matches!(result, Ok(7)));
        assert!(matches!(with_deadline(None, async { 8 }).await, Ok(8)));
    }
}
