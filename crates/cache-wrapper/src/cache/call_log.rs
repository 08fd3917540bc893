//! Per-call debug logging shared by every facade operation.

use std::fmt::Debug;
use std::future::Future;

use crate::error::Result;

/// Target used for call records, so they can be filtered on their own.
pub const TARGET: &str = "cache_wrapper::call_log";

/// Await `call` and record one debug event with its method, arguments and
/// outcome. Formatting only happens when the event is enabled, and nothing
/// here can turn a successful call into a failed one.
pub async fn logged<T, Fut>(method: &'static str, arguments: impl Debug, call: Fut) -> Result<T>
where
    T: Debug,
    Fut: Future<Output = Result<T>>,
{
    let outcome = call.await;
    match &outcome {
        Ok(result) => tracing::debug!(
            target: TARGET,
            method,
            arguments = ?arguments,
            result = ?result,
            "redis call"
        ),
        Err(error) => tracing::debug!(
            target: TARGET,
            method,
            arguments = ?arguments,
            %error,
            "redis call failed"
        ),
    }
    outcome
}
