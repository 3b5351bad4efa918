//! Store response protocol handler.
//!
//! Records a store's accept/decline commitment for an order currently
//! assigned to it. First response wins: a repeat of the identical decision
//! is a no-op success, while an attempt to flip a recorded response is
//! rejected so a store cannot accept and then silently back out after
//! downstream work has started. A decline requeues the order into the
//! assignable pool in the same write.

use crate::event_bus::EventBus;
use crate::util::timed_conditional_update;
use crate::DispatchError;
use dispatch_store::{OrderChanges, OrderExpectation, OrderStoreService, StoreError};
use dispatch_types::{
	current_timestamp, truncate_id, DispatchEvent, Order, OrderStatus, ResponseEvent,
	ResponseOutcome, StoreResponseStatus,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Handler for the store accept/decline protocol.
pub struct ResponseHandler {
	order_store: Arc<OrderStoreService>,
	event_bus: EventBus,
	request_timeout: Duration,
}

impl ResponseHandler {
	pub fn new(
		order_store: Arc<OrderStoreService>,
		event_bus: EventBus,
		request_timeout: Duration,
	) -> Self {
		Self {
			order_store,
			event_bus,
			request_timeout,
		}
	}

	/// Records a store's decision for an order assigned to it.
	///
	/// `reason` is mandatory when declining and validated before any
	/// write. On decline the order goes straight back to `pending` with
	/// the assignment cleared; the next sweep or a manual assignment
	/// picks it up with no separate requeue step.
	#[instrument(skip(self, reason), fields(order_id = %truncate_id(order_id), store_id = %truncate_id(store_id), decision = %decision))]
	pub async fn respond(
		&self,
		order_id: &str,
		store_id: &str,
		decision: StoreResponseStatus,
		reason: Option<&str>,
	) -> Result<ResponseOutcome, DispatchError> {
		let reason = reason.map(str::trim).filter(|r| !r.is_empty());
		if decision == StoreResponseStatus::Unavailable && reason.is_none() {
			return Err(DispatchError::Validation(
				"a rejection reason is required when declining an order".to_string(),
			));
		}

		let order = match self.order_store.get_order(order_id).await {
			Ok(order) => order,
			Err(StoreError::NotFound) => {
				return Err(DispatchError::OrderNotFound(order_id.to_string()))
			}
			Err(e) => return Err(DispatchError::Store(e.to_string())),
		};

		if order.is_terminal() {
			return Err(DispatchError::AlreadyTerminal);
		}

		// Idempotent repeat of an identical, already-recorded decision.
		if self.is_repeat(&order, store_id, decision) {
			return Ok(ResponseOutcome {
				order,
				already_recorded: true,
			});
		}

		// A store that declined cannot flip to available afterwards, even
		// though the decline already released its assignment.
		if decision == StoreResponseStatus::Available
			&& order.response_status == Some(StoreResponseStatus::Unavailable)
			&& order.declined_by.as_deref() == Some(store_id)
		{
			return Err(DispatchError::AlreadyResponded);
		}

		if order.assigned_store_id.as_deref() != Some(store_id) {
			return Err(DispatchError::NotAssignedToCaller);
		}

		if order.response_status.is_some() {
			return Err(DispatchError::AlreadyResponded);
		}

		let expected = OrderExpectation::status_in([OrderStatus::Assigned])
			.with_assigned_store(Some(store_id.to_string()))
			.with_response(None);

		let changes = match decision {
			StoreResponseStatus::Available => OrderChanges {
				response_status: Some(Some(StoreResponseStatus::Available)),
				response_at: Some(Some(current_timestamp())),
				..Default::default()
			},
			StoreResponseStatus::Unavailable => OrderChanges {
				// Requeue in the same atomic write that records the decline.
				status: Some(OrderStatus::Pending),
				assigned_store_id: Some(None),
				response_status: Some(Some(StoreResponseStatus::Unavailable)),
				response_at: Some(Some(current_timestamp())),
				rejection_reason: Some(reason.map(str::to_string)),
				declined_by: Some(Some(store_id.to_string())),
				..Default::default()
			},
		};

		let updated = timed_conditional_update(
			&self.order_store,
			self.request_timeout,
			order_id,
			expected,
			changes,
		)
		.await?;

		match decision {
			StoreResponseStatus::Available => {
				tracing::info!("Store confirmed availability");
				self.event_bus
					.publish(DispatchEvent::Response(ResponseEvent::Confirmed {
						order_id: order_id.to_string(),
						store_id: store_id.to_string(),
					}))
					.ok();
			}
			StoreResponseStatus::Unavailable => {
				tracing::info!("Store declined, order requeued");
				self.event_bus
					.publish(DispatchEvent::Response(ResponseEvent::Declined {
						order_id: order_id.to_string(),
						store_id: store_id.to_string(),
						reason: reason.unwrap_or_default().to_string(),
					}))
					.ok();
			}
		}

		Ok(ResponseOutcome {
			order: updated,
			already_recorded: false,
		})
	}

	/// Returns true when the call repeats a decision this store already
	/// recorded. A decline clears the assignment, so repeat declines are
	/// recognized through the `declined_by` audit field instead.
	fn is_repeat(&self, order: &Order, store_id: &str, decision: StoreResponseStatus) -> bool {
		match decision {
			StoreResponseStatus::Available => {
				order.response_status == Some(StoreResponseStatus::Available)
					&& order.assigned_store_id.as_deref() == Some(store_id)
			}
			StoreResponseStatus::Unavailable => {
				order.response_status == Some(StoreResponseStatus::Unavailable)
					&& order.declined_by.as_deref() == Some(store_id)
			}
		}
	}
}
