//! Assignment engine.
//!
//! Orchestrates manual and automatic assignment of orders to fulfillment
//! stores. Only orders in the assignable pool (`pending`, or the transient
//! `rejected` label) may be assigned, and the assign transition is a single
//! conditional write so that concurrent manual assignments and sweep
//! iterations cannot both claim the same order.

use crate::event_bus::EventBus;
use crate::matcher::{match_preferred_store, MatchOutcome};
use crate::util::{retry_read, timed_conditional_update};
use crate::DispatchError;
use dispatch_store::{
	DirectoryService, OrderChanges, OrderExpectation, OrderStoreService, StoreError,
};
use dispatch_types::{
	truncate_id, AssignmentEvent, DispatchEvent, Order, OrderStatus, Store, SweepSummary,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::instrument;

/// Number of attempts for the sweep's idempotent directory/listing reads.
const READ_ATTEMPTS: usize = 3;

/// Engine for manual and automatic order assignment.
#[derive(Clone)]
pub struct AssignmentEngine {
	order_store: Arc<OrderStoreService>,
	directory: Arc<DirectoryService>,
	event_bus: EventBus,
	request_timeout: Duration,
	sweep_concurrency: usize,
}

/// Per-order verdict of a sweep iteration.
enum SweepVerdict {
	Assigned,
	Unmatched,
	Error,
}

impl AssignmentEngine {
	pub fn new(
		order_store: Arc<OrderStoreService>,
		directory: Arc<DirectoryService>,
		event_bus: EventBus,
		request_timeout: Duration,
		sweep_concurrency: usize,
	) -> Self {
		Self {
			order_store,
			directory,
			event_bus,
			request_timeout,
			sweep_concurrency,
		}
	}

	/// Assigns an order to a specific store on behalf of an administrator.
	///
	/// Fails with `NotEligible` when the order is outside the assignable
	/// pool, and with `StaleState` when a concurrent actor claimed the
	/// order between the read and the conditional write.
	#[instrument(skip(self), fields(order_id = %truncate_id(order_id), store_id = %truncate_id(store_id)))]
	pub async fn assign_manual(
		&self,
		order_id: &str,
		store_id: &str,
	) -> Result<Order, DispatchError> {
		let order = match self.order_store.get_order(order_id).await {
			Ok(order) => order,
			Err(StoreError::NotFound) => {
				return Err(DispatchError::OrderNotFound(order_id.to_string()))
			}
			Err(e) => return Err(DispatchError::Store(e.to_string())),
		};

		if !order.is_assignable() {
			return Err(DispatchError::NotEligible {
				order_id: order.id,
				status: order.status,
			});
		}

		let store = match self.directory.get_store(store_id).await {
			Ok(store) => store,
			Err(StoreError::NotFound) => {
				return Err(DispatchError::StoreNotFound(store_id.to_string()))
			}
			Err(e) => return Err(DispatchError::Store(e.to_string())),
		};

		self.commit_assignment(order_id, &store.id, true).await
	}

	/// Sweeps the assignable pool, matching each order's preferred store
	/// name against the directory and assigning on a match.
	///
	/// Best-effort: per-order conditional-write losses are counted as
	/// `errors`, unmatched names as `unmatched`, and neither aborts the
	/// batch. Orders not reached before the deadline are omitted from the
	/// summary and stay eligible for the next sweep.
	#[instrument(skip_all)]
	pub async fn auto_assign_batch(
		&self,
		deadline: Option<Duration>,
	) -> Result<SweepSummary, DispatchError> {
		let deadline = deadline.map(|d| Instant::now() + d);

		let orders = retry_read("list_orders", READ_ATTEMPTS, || {
			self.order_store.list_orders()
		})
		.await
		.map_err(|e| DispatchError::Store(e.to_string()))?;

		let stores: Arc<Vec<Store>> = Arc::new(
			retry_read("list_stores", READ_ATTEMPTS, || self.directory.list_stores())
				.await
				.map_err(|e| DispatchError::Store(e.to_string()))?,
		);

		let semaphore = Arc::new(Semaphore::new(self.sweep_concurrency));
		let mut tasks: JoinSet<SweepVerdict> = JoinSet::new();
		let mut summary = SweepSummary::default();

		for order in orders.into_iter().filter(Order::is_assignable) {
			if let Some(deadline) = deadline {
				if Instant::now() >= deadline {
					tracing::debug!("Sweep deadline reached, leaving remaining orders for the next sweep");
					break;
				}
			}

			let permit = match semaphore.clone().acquire_owned().await {
				Ok(permit) => permit,
				Err(e) => {
					tracing::error!(error = %e, "Failed to acquire sweep permit");
					break;
				}
			};

			let engine = self.clone();
			let stores = stores.clone();
			tasks.spawn(async move {
				let _permit = permit;
				engine.sweep_one(order, &stores).await
			});
		}

		while let Some(joined) = tasks.join_next().await {
			match joined {
				Ok(SweepVerdict::Assigned) => summary.assigned += 1,
				Ok(SweepVerdict::Unmatched) => summary.unmatched += 1,
				Ok(SweepVerdict::Error) => summary.errors += 1,
				Err(e) => {
					tracing::error!(error = %e, "Sweep task panicked");
					summary.errors += 1;
				}
			}
		}

		self.event_bus
			.publish(DispatchEvent::Assignment(AssignmentEvent::SweepCompleted {
				summary,
			}))
			.ok();

		Ok(summary)
	}

	/// Processes a single order during a sweep.
	async fn sweep_one(&self, order: Order, stores: &[Store]) -> SweepVerdict {
		let preferred = match order.preferred_store_name.as_deref() {
			Some(name) if !name.trim().is_empty() => name,
			_ => return SweepVerdict::Unmatched,
		};

		match match_preferred_store(preferred, stores) {
			MatchOutcome::Matched(store) => {
				match self.commit_assignment(&order.id, &store.id, false).await {
					Ok(_) => SweepVerdict::Assigned,
					Err(e) => {
						tracing::debug!(
							order_id = %truncate_id(&order.id),
							store_id = %truncate_id(&store.id),
							error = %e,
							"Sweep assignment failed"
						);
						SweepVerdict::Error
					}
				}
			}
			MatchOutcome::NotFound => SweepVerdict::Unmatched,
			MatchOutcome::Ambiguous { candidates } => {
				tracing::warn!(
					order_id = %truncate_id(&order.id),
					preferred_store_name = preferred,
					candidates,
					"Preferred store name is ambiguous, leaving order unassigned"
				);
				SweepVerdict::Unmatched
			}
		}
	}

	/// Atomically claims an assignable order for a store.
	///
	/// Clears any stale response fields from a prior assignment cycle;
	/// `declined_by` survives as an audit trail of the last decline.
	async fn commit_assignment(
		&self,
		order_id: &str,
		store_id: &str,
		manual: bool,
	) -> Result<Order, DispatchError> {
		let expected =
			OrderExpectation::status_in([OrderStatus::Pending, OrderStatus::Rejected]);
		let changes = OrderChanges {
			status: Some(OrderStatus::Assigned),
			assigned_store_id: Some(Some(store_id.to_string())),
			response_status: Some(None),
			response_at: Some(None),
			rejection_reason: Some(None),
			..Default::default()
		};

		let order = timed_conditional_update(
			&self.order_store,
			self.request_timeout,
			order_id,
			expected,
			changes,
		)
		.await?;

		tracing::info!(
			order_id = %truncate_id(order_id),
			store_id = %truncate_id(store_id),
			manual,
			"Assigned order to store"
		);
		self.event_bus
			.publish(DispatchEvent::Assignment(AssignmentEvent::Assigned {
				order_id: order_id.to_string(),
				store_id: store_id.to_string(),
				manual,
			}))
			.ok();

		Ok(order)
	}
}
