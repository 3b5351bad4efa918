//! Dispatcher facade and run loop.
//!
//! Bundles the assignment engine, the store response and fulfillment
//! handlers, and the change relay behind one surface, and drives the
//! periodic auto-assignment sweep when run as a service.

use crate::assignment::AssignmentEngine;
use crate::event_bus::EventBus;
use crate::handlers::{FulfillmentHandler, ResponseHandler};
use crate::relay::ChangeRelay;
use crate::DispatchError;
use dispatch_config::Config;
use dispatch_store::{OrderStoreService, StoreError};
use dispatch_types::{
	truncate_id, AssignmentEvent, DispatchEvent, FulfillmentEvent, Order, ResponseEvent,
	ResponseOutcome, StoreResponseStatus, SweepSummary,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Entry point for all dispatch operations.
pub struct Dispatcher {
	config: Config,
	order_store: Arc<OrderStoreService>,
	engine: AssignmentEngine,
	response_handler: ResponseHandler,
	fulfillment_handler: FulfillmentHandler,
	relay: Arc<ChangeRelay>,
	event_bus: EventBus,
}

impl Dispatcher {
	#[allow(clippy::too_many_arguments)]
	pub(crate) fn new(
		config: Config,
		order_store: Arc<OrderStoreService>,
		engine: AssignmentEngine,
		response_handler: ResponseHandler,
		fulfillment_handler: FulfillmentHandler,
		relay: Arc<ChangeRelay>,
		event_bus: EventBus,
	) -> Self {
		Self {
			config,
			order_store,
			engine,
			response_handler,
			fulfillment_handler,
			relay,
			event_bus,
		}
	}

	/// Assigns an order to a specific store on behalf of an administrator.
	pub async fn assign_manual(
		&self,
		order_id: &str,
		store_id: &str,
	) -> Result<Order, DispatchError> {
		self.engine.assign_manual(order_id, store_id).await
	}

	/// Runs one auto-assignment sweep over the assignable pool.
	pub async fn auto_assign_batch(
		&self,
		deadline: Option<Duration>,
	) -> Result<SweepSummary, DispatchError> {
		self.engine.auto_assign_batch(deadline).await
	}

	/// Records a store's accept/decline decision for an order.
	pub async fn respond(
		&self,
		order_id: &str,
		store_id: &str,
		decision: StoreResponseStatus,
		reason: Option<&str>,
	) -> Result<ResponseOutcome, DispatchError> {
		self.response_handler
			.respond(order_id, store_id, decision, reason)
			.await
	}

	/// Marks an accepted order as delivered by its assigned store.
	pub async fn mark_delivered(
		&self,
		order_id: &str,
		store_id: &str,
	) -> Result<Order, DispatchError> {
		self.fulfillment_handler
			.mark_delivered(order_id, store_id)
			.await
	}

	/// Marks an accepted order as returned by its assigned store.
	pub async fn mark_returned(
		&self,
		order_id: &str,
		store_id: &str,
		reason: &str,
	) -> Result<Order, DispatchError> {
		self.fulfillment_handler
			.mark_returned(order_id, store_id, reason)
			.await
	}

	/// Inserts a new order row. Orders are created by the intake layer in
	/// `pending`; this exists for seeding and tests.
	pub async fn insert_order(&self, order: Order) -> Result<(), DispatchError> {
		self.order_store
			.insert_order(order)
			.await
			.map_err(|e| DispatchError::Store(e.to_string()))
	}

	/// Point read of a single order.
	pub async fn get_order(&self, order_id: &str) -> Result<Order, DispatchError> {
		match self.order_store.get_order(order_id).await {
			Ok(order) => Ok(order),
			Err(StoreError::NotFound) => Err(DispatchError::OrderNotFound(order_id.to_string())),
			Err(e) => Err(DispatchError::Store(e.to_string())),
		}
	}

	/// Subscribes to the admin stream of material order changes.
	pub fn subscribe_admin(&self) -> broadcast::Receiver<Order> {
		self.relay.subscribe_admin()
	}

	/// Subscribes to the change stream for one store's assigned orders.
	pub async fn subscribe_store(&self, store_id: &str) -> broadcast::Receiver<Order> {
		self.relay.subscribe_store(store_id).await
	}

	/// Subscribes to internal lifecycle events.
	pub fn subscribe_events(&self) -> broadcast::Receiver<DispatchEvent> {
		self.event_bus.subscribe()
	}

	/// Runs the dispatcher until interrupted.
	///
	/// Drives the relay and the periodic sweep. Each sweep gets the full
	/// interval as its deadline so a slow directory cannot stack sweeps on
	/// top of each other.
	pub async fn run(&self) -> Result<(), DispatchError> {
		let interval = Duration::from_secs(self.config.service.sweep_interval_seconds);
		tracing::info!(
			service_id = %self.config.service.id,
			sweep_interval_seconds = interval.as_secs(),
			"Dispatcher starting"
		);

		let relay_task = tokio::spawn(self.relay.clone().run(self.order_store.clone()));

		let mut events = self.event_bus.subscribe();
		let mut ticker = tokio::time::interval(interval);
		ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

		loop {
			tokio::select! {
				_ = ticker.tick() => {
					match self.engine.auto_assign_batch(Some(interval)).await {
						Ok(summary) => {
							if summary.processed() > 0 {
								tracing::info!(
									assigned = summary.assigned,
									unmatched = summary.unmatched,
									errors = summary.errors,
									"Sweep completed"
								);
							}
						}
						Err(e) => tracing::error!(error = %e, "Sweep failed"),
					}
				}
				event = events.recv() => {
					match event {
						Ok(event) => log_event(&event),
						Err(broadcast::error::RecvError::Lagged(missed)) => {
							tracing::warn!(missed, "Event log subscriber lagged");
						}
						Err(broadcast::error::RecvError::Closed) => break,
					}
				}
				_ = tokio::signal::ctrl_c() => {
					tracing::info!("Shutdown signal received");
					break;
				}
			}
		}

		relay_task.abort();
		Ok(())
	}
}

fn log_event(event: &DispatchEvent) {
	match event {
		DispatchEvent::Assignment(AssignmentEvent::Assigned {
			order_id,
			store_id,
			manual,
		}) => {
			tracing::info!(
				order_id = %truncate_id(order_id),
				store_id = %truncate_id(store_id),
				manual,
				"Order assigned"
			);
		}
		DispatchEvent::Assignment(AssignmentEvent::SweepCompleted { .. }) => {}
		DispatchEvent::Response(ResponseEvent::Confirmed { order_id, store_id }) => {
			tracing::info!(
				order_id = %truncate_id(order_id),
				store_id = %truncate_id(store_id),
				"Store confirmed order"
			);
		}
		DispatchEvent::Response(ResponseEvent::Declined {
			order_id,
			store_id,
			reason,
		}) => {
			tracing::info!(
				order_id = %truncate_id(order_id),
				store_id = %truncate_id(store_id),
				reason,
				"Store declined order"
			);
		}
		DispatchEvent::Fulfillment(FulfillmentEvent::Delivered { order_id, store_id }) => {
			tracing::info!(
				order_id = %truncate_id(order_id),
				store_id = %truncate_id(store_id),
				"Order delivered"
			);
		}
		DispatchEvent::Fulfillment(FulfillmentEvent::Returned {
			order_id,
			store_id,
			reason,
		}) => {
			tracing::info!(
				order_id = %truncate_id(order_id),
				store_id = %truncate_id(store_id),
				reason,
				"Order returned"
			);
		}
	}
}
