//! Optional deadlines around single I/O steps.

use std::future::Future;
use std::time::Duration;

use ferry_core::TransferError;

/// Run `fut`, failing with `TimedOut` if `limit` elapses first.
/// `None` waits forever.
pub(crate) async fn within<F, T>(
    limit: Option<Duration>,
    stage: &'static str,
    fut: F,
) -> Result<T, TransferError>
where
    F: Future<Output = Result<T, TransferError>>,
{
    match limit {
        Some(timeout) => tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| TransferError::TimedOut { stage, timeout })?,
        None => fut.await,
    }
}
