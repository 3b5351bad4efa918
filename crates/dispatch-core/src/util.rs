//! Internal retry and write helpers.

use crate::DispatchError;
use dispatch_store::{OrderChanges, OrderExpectation, OrderStoreService, StoreError};
use dispatch_types::Order;
use std::future::Future;
use std::time::Duration;

/// Runs a conditional update under the request-scoped timeout.
///
/// A timeout means the outcome is unknown: the write may or may not have
/// landed, and the caller must re-read order state rather than resubmit.
pub(crate) async fn timed_conditional_update(
	store: &OrderStoreService,
	timeout: Duration,
	order_id: &str,
	expected: OrderExpectation,
	changes: OrderChanges,
) -> Result<Order, DispatchError> {
	match tokio::time::timeout(timeout, store.conditional_update(order_id, expected, changes))
		.await
	{
		Ok(Ok(order)) => Ok(order),
		Ok(Err(StoreError::Stale)) => Err(DispatchError::StaleState),
		Ok(Err(StoreError::NotFound)) => Err(DispatchError::OrderNotFound(order_id.to_string())),
		Ok(Err(e)) => Err(DispatchError::Store(e.to_string())),
		Err(_) => Err(DispatchError::OutcomeUnknown),
	}
}

/// Retries an idempotent read operation with exponential backoff.
///
/// Only reads and subscribes go through this; writes are never blindly
/// retried since a conditional update of unknown outcome must be resolved
/// by re-reading state.
pub(crate) async fn retry_read<T, F, Fut>(
	op: &'static str,
	attempts: usize,
	mut f: F,
) -> Result<T, StoreError>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, StoreError>>,
{
	let mut delay = Duration::from_millis(200);
	let mut attempt = 1;
	loop {
		match f().await {
			Ok(value) => return Ok(value),
			Err(e) if attempt < attempts => {
				tracing::warn!(
					operation = op,
					attempt,
					error = %e,
					"Read failed, retrying with backoff"
				);
				tokio::time::sleep(delay).await;
				delay = (delay * 2).min(Duration::from_secs(10));
				attempt += 1;
			}
			Err(e) => return Err(e),
		}
	}
}
