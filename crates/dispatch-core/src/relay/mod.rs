//! Change propagation relay.
//!
//! Consumes the order store's change feed and fans updates out to dashboard
//! subscribers: admin subscribers see every material change, store
//! subscribers see only orders currently (or until just now) assigned to
//! them. A store whose assignment is taken away still receives that final
//! update so its dashboard can drop the row. Immaterial writes, payload
//! edits and bare timestamp bumps, are suppressed against a bounded cache
//! of last-relayed snapshots; a cache miss always relays, so an evicted
//! order costs at most one duplicate notification.

mod cache;

use crate::util::retry_read;
use cache::{OrderSnapshot, SnapshotCache};
use dispatch_store::OrderStoreService;
use dispatch_types::{truncate_id, Order};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};

/// Fans filtered order changes out to admin and per-store subscribers.
pub struct ChangeRelay {
	cache: Mutex<SnapshotCache>,
	admin: broadcast::Sender<Order>,
	stores: RwLock<HashMap<String, broadcast::Sender<Order>>>,
	channel_capacity: usize,
}

impl ChangeRelay {
	pub fn new(snapshot_cache_capacity: usize, channel_capacity: usize) -> Self {
		let (admin, _) = broadcast::channel(channel_capacity.max(1));
		Self {
			cache: Mutex::new(SnapshotCache::new(snapshot_cache_capacity)),
			admin,
			stores: RwLock::new(HashMap::new()),
			channel_capacity: channel_capacity.max(1),
		}
	}

	/// Subscribes to the admin stream, which carries every material change.
	pub fn subscribe_admin(&self) -> broadcast::Receiver<Order> {
		self.admin.subscribe()
	}

	/// Subscribes to the stream for one store's assigned orders.
	pub async fn subscribe_store(&self, store_id: &str) -> broadcast::Receiver<Order> {
		let mut stores = self.stores.write().await;
		stores
			.entry(store_id.to_string())
			.or_insert_with(|| broadcast::channel(self.channel_capacity).0)
			.subscribe()
	}

	/// Runs the relay until the task is aborted.
	///
	/// Resubscribes with backoff when the change feed drops, so a backend
	/// restart degrades to a gap plus duplicate notifications rather than a
	/// dead dashboard.
	pub async fn run(self: Arc<Self>, order_store: Arc<OrderStoreService>) {
		let mut delay = Duration::from_millis(200);
		loop {
			let (tx, mut rx) = mpsc::unbounded_channel();
			if let Err(e) = retry_read("subscribe", 3, || order_store.subscribe(tx.clone())).await {
				tracing::error!(error = %e, "Failed to subscribe to order change feed");
			} else {
				delay = Duration::from_millis(200);
				tracing::info!("Relay subscribed to order change feed");
				drop(tx);
				while let Some(order) = rx.recv().await {
					self.handle_change(order).await;
				}
				tracing::warn!("Order change feed closed, resubscribing");
			}
			tokio::time::sleep(delay).await;
			delay = (delay * 2).min(Duration::from_secs(10));
		}
	}

	/// Processes one change-feed row: suppress if immaterial, otherwise
	/// fan out to the admin stream, the assigned store, and the store that
	/// just lost the assignment.
	pub async fn handle_change(&self, order: Order) {
		let snapshot = OrderSnapshot::of(&order);
		let prior = {
			let mut cache = self.cache.lock().await;
			let prior = cache.get(&order.id);
			cache.put(order.id.clone(), snapshot.clone());
			prior
		};

		if let Some(prior) = &prior {
			if !prior.materially_differs(&snapshot) {
				tracing::debug!(
					order_id = %truncate_id(&order.id),
					"Suppressed immaterial order change"
				);
				return;
			}
		}

		self.admin.send(order.clone()).ok();

		let prior_store = prior.and_then(|p| p.assigned_store_id);
		let stores = self.stores.read().await;
		if let Some(current) = &order.assigned_store_id {
			if let Some(sender) = stores.get(current) {
				sender.send(order.clone()).ok();
			}
		}
		if let Some(prior_store) = prior_store {
			if order.assigned_store_id.as_deref() != Some(prior_store.as_str()) {
				if let Some(sender) = stores.get(&prior_store) {
					sender.send(order.clone()).ok();
				}
			}
		}
	}
}

/// Client-side merge of relayed order updates.
///
/// Change-feed delivery is ordered per row but a reconnect can replay rows;
/// the view keeps whichever version carries the newest `updated_at` so a
/// replayed stale row never overwrites fresher state.
#[derive(Default)]
pub struct OrderView {
	orders: HashMap<String, Order>,
}

impl OrderView {
	pub fn new() -> Self {
		Self::default()
	}

	/// Merges an incoming update, last-writer-wins by `updated_at`.
	/// Returns true when the view changed.
	pub fn apply(&mut self, order: Order) -> bool {
		match self.orders.get(&order.id) {
			Some(existing) if existing.updated_at > order.updated_at => false,
			_ => {
				self.orders.insert(order.id.clone(), order);
				true
			}
		}
	}

	pub fn get(&self, order_id: &str) -> Option<&Order> {
		self.orders.get(order_id)
	}

	pub fn len(&self) -> usize {
		self.orders.len()
	}

	pub fn is_empty(&self) -> bool {
		self.orders.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use dispatch_types::{current_timestamp, OrderStatus, StoreResponseStatus};

	fn order(id: &str, status: OrderStatus, assigned: Option<&str>) -> Order {
		Order {
			id: id.to_string(),
			order_code: None,
			status,
			preferred_store_name: None,
			assigned_store_id: assigned.map(str::to_string),
			response_status: None,
			response_at: None,
			rejection_reason: None,
			return_reason: None,
			declined_by: None,
			payload: serde_json::Value::Null,
			created_at: current_timestamp(),
			updated_at: current_timestamp(),
		}
	}

	#[tokio::test]
	async fn admin_sees_every_material_change() {
		let relay = ChangeRelay::new(64, 64);
		let mut admin = relay.subscribe_admin();

		relay.handle_change(order("o1", OrderStatus::Pending, None)).await;
		relay
			.handle_change(order("o1", OrderStatus::Assigned, Some("s1")))
			.await;

		assert_eq!(admin.recv().await.unwrap().status, OrderStatus::Pending);
		assert_eq!(admin.recv().await.unwrap().status, OrderStatus::Assigned);
	}

	#[tokio::test]
	async fn store_stream_is_filtered_to_its_assignments() {
		let relay = ChangeRelay::new(64, 64);
		let mut s1 = relay.subscribe_store("s1").await;
		let mut s2 = relay.subscribe_store("s2").await;

		relay
			.handle_change(order("o1", OrderStatus::Assigned, Some("s1")))
			.await;

		assert_eq!(s1.recv().await.unwrap().id, "o1");
		assert!(matches!(
			s2.try_recv(),
			Err(broadcast::error::TryRecvError::Empty)
		));
	}

	#[tokio::test]
	async fn prior_store_sees_the_reassignment() {
		let relay = ChangeRelay::new(64, 64);
		let mut s1 = relay.subscribe_store("s1").await;

		relay
			.handle_change(order("o1", OrderStatus::Assigned, Some("s1")))
			.await;
		relay
			.handle_change(order("o1", OrderStatus::Assigned, Some("s2")))
			.await;

		assert_eq!(s1.recv().await.unwrap().assigned_store_id.as_deref(), Some("s1"));
		// The reassignment itself still reaches the store that lost it.
		assert_eq!(s1.recv().await.unwrap().assigned_store_id.as_deref(), Some("s2"));
	}

	#[tokio::test]
	async fn requeue_reaches_the_declining_store() {
		let relay = ChangeRelay::new(64, 64);
		let mut s1 = relay.subscribe_store("s1").await;

		relay
			.handle_change(order("o1", OrderStatus::Assigned, Some("s1")))
			.await;
		let mut requeued = order("o1", OrderStatus::Pending, None);
		requeued.response_status = Some(StoreResponseStatus::Unavailable);
		relay.handle_change(requeued).await;

		s1.recv().await.unwrap();
		let last = s1.recv().await.unwrap();
		assert_eq!(last.status, OrderStatus::Pending);
		assert!(last.assigned_store_id.is_none());
	}

	#[tokio::test]
	async fn immaterial_changes_are_suppressed() {
		let relay = ChangeRelay::new(64, 64);
		let mut admin = relay.subscribe_admin();

		let first = order("o1", OrderStatus::Pending, None);
		let mut bumped = first.clone();
		bumped.updated_at += 30;

		relay.handle_change(first).await;
		relay.handle_change(bumped).await;
		relay
			.handle_change(order("o1", OrderStatus::Assigned, Some("s1")))
			.await;

		assert_eq!(admin.recv().await.unwrap().status, OrderStatus::Pending);
		// The timestamp bump was dropped; the next delivery is the assignment.
		assert_eq!(admin.recv().await.unwrap().status, OrderStatus::Assigned);
	}

	#[tokio::test]
	async fn first_sighting_always_relays() {
		let relay = ChangeRelay::new(64, 64);
		let mut admin = relay.subscribe_admin();

		relay
			.handle_change(order("o1", OrderStatus::Delivered, Some("s1")))
			.await;
		assert_eq!(admin.recv().await.unwrap().id, "o1");
	}

	#[tokio::test]
	async fn eviction_costs_one_duplicate_not_a_lost_update() {
		let relay = ChangeRelay::new(1, 64);
		let mut admin = relay.subscribe_admin();

		relay.handle_change(order("o1", OrderStatus::Pending, None)).await;
		// Pushes o1 out of the single-slot cache.
		relay.handle_change(order("o2", OrderStatus::Pending, None)).await;
		// Unchanged, but no snapshot survives to prove it.
		relay.handle_change(order("o1", OrderStatus::Pending, None)).await;

		assert_eq!(admin.recv().await.unwrap().id, "o1");
		assert_eq!(admin.recv().await.unwrap().id, "o2");
		assert_eq!(admin.recv().await.unwrap().id, "o1");
	}

	#[test]
	fn view_keeps_the_newest_version() {
		let mut view = OrderView::new();

		let mut fresh = order("o1", OrderStatus::Assigned, Some("s1"));
		fresh.updated_at += 100;
		let stale = order("o1", OrderStatus::Pending, None);

		assert!(view.apply(fresh.clone()));
		assert!(!view.apply(stale));
		assert_eq!(view.get("o1").unwrap().status, OrderStatus::Assigned);
		assert_eq!(view.len(), 1);
	}

	#[test]
	fn view_applies_equal_timestamps_in_arrival_order() {
		let mut view = OrderView::new();
		let a = order("o1", OrderStatus::Pending, None);
		let mut b = a.clone();
		b.status = OrderStatus::Assigned;
		b.assigned_store_id = Some("s1".to_string());
		b.updated_at = a.updated_at;

		assert!(view.apply(a));
		assert!(view.apply(b));
		assert_eq!(view.get("o1").unwrap().status, OrderStatus::Assigned);
	}
}
