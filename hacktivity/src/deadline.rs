use std::future::Future;
use std::time::Duration;

use anyhow::{anyhow, Result};

/// Await `fut`, failing if it does not finish within `limit`.
pub(crate) async fn within<T, F>(limit: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(anyhow!("{what} timed out after {}s", limit.as_secs_f64())),
    }
}
