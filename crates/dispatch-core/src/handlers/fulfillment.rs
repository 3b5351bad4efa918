//! Fulfillment status handler.
//!
//! Moves a confirmed order into one of the terminal fulfillment states.
//! Only the assigned store may report fulfillment, and only after it has
//! recorded an available response; an order can never skip the acceptance
//! step on its way out of the lifecycle. Terminal states keep the
//! assignment so the record shows which store handled the order.

use crate::event_bus::EventBus;
use crate::util::timed_conditional_update;
use crate::DispatchError;
use dispatch_store::{OrderChanges, OrderExpectation, OrderStoreService, StoreError};
use dispatch_types::{
	truncate_id, DispatchEvent, FulfillmentEvent, Order, OrderStatus, StoreResponseStatus,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Handler for terminal fulfillment transitions.
pub struct FulfillmentHandler {
	order_store: Arc<OrderStoreService>,
	event_bus: EventBus,
	request_timeout: Duration,
}

impl FulfillmentHandler {
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

	/// Marks an accepted order as delivered by its assigned store.
	#[instrument(skip(self), fields(order_id = %truncate_id(order_id), store_id = %truncate_id(store_id)))]
	pub async fn mark_delivered(
		&self,
		order_id: &str,
		store_id: &str,
	) -> Result<Order, DispatchError> {
		let changes = OrderChanges {
			status: Some(OrderStatus::Delivered),
			..Default::default()
		};
		let updated = self.finalize(order_id, store_id, changes).await?;

		tracing::info!("Order delivered");
		self.event_bus
			.publish(DispatchEvent::Fulfillment(FulfillmentEvent::Delivered {
				order_id: order_id.to_string(),
				store_id: store_id.to_string(),
			}))
			.ok();
		Ok(updated)
	}

	/// Marks an accepted order as returned, with a mandatory reason.
	#[instrument(skip(self, reason), fields(order_id = %truncate_id(order_id), store_id = %truncate_id(store_id)))]
	pub async fn mark_returned(
		&self,
		order_id: &str,
		store_id: &str,
		reason: &str,
	) -> Result<Order, DispatchError> {
		let reason = reason.trim();
		if reason.is_empty() {
			return Err(DispatchError::Validation(
				"a return reason is required when marking an order returned".to_string(),
			));
		}

		let changes = OrderChanges {
			status: Some(OrderStatus::Returned),
			return_reason: Some(Some(reason.to_string())),
			..Default::default()
		};
		let updated = self.finalize(order_id, store_id, changes).await?;

		tracing::info!(reason, "Order returned");
		self.event_bus
			.publish(DispatchEvent::Fulfillment(FulfillmentEvent::Returned {
				order_id: order_id.to_string(),
				store_id: store_id.to_string(),
				reason: reason.to_string(),
			}))
			.ok();
		Ok(updated)
	}

	/// Shared precondition checks and conditional write for both terminal
	/// transitions. The assignment stays in place on the terminal record.
	async fn finalize(
		&self,
		order_id: &str,
		store_id: &str,
		changes: OrderChanges,
	) -> Result<Order, DispatchError> {
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
		if order.assigned_store_id.as_deref() != Some(store_id) {
			return Err(DispatchError::NotAssignedToCaller);
		}
		if order.response_status != Some(StoreResponseStatus::Available) {
			return Err(DispatchError::PreconditionFailed(
				"order has no recorded available response from the assigned store".to_string(),
			));
		}

		let expected = OrderExpectation::status_in([OrderStatus::Assigned])
			.with_assigned_store(Some(store_id.to_string()))
			.with_response(Some(StoreResponseStatus::Available));

		timed_conditional_update(
			&self.order_store,
			self.request_timeout,
			order_id,
			expected,
			changes,
		)
		.await
	}
}
