//! Operation deadlines.

use std::time::Duration;

use opp_core::error::{OppError, OppResult};

/// Run `operation` with a deadline. Dropping the future on expiry aborts
/// any store work it had not yet committed.
pub async fn within<T>(
    limit: Duration,
    operation: impl Future<Output = OppResult<T>>,
) -> OppResult<T> {
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result,
        Err(_) => Err(OppError::DeadlineExceeded {
            millis: limit.as_millis() as u64,
        }),
    }
}
