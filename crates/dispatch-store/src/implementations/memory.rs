//! In-memory order store backend.
//!
//! This module provides a memory-based implementation of the
//! OrderStoreInterface trait, useful for testing, development, and
//! single-process deployments where persistence is not required. The
//! compare-and-set discipline and change feed behave exactly as a
//! relational backend would, which is what the dispatch core's race
//! handling relies on.

use crate::{OrderChanges, OrderExpectation, OrderStoreFactory, OrderStoreInterface, StoreError};
use async_trait::async_trait;
use dispatch_types::{
	current_timestamp, ConfigSchema, ImplementationRegistry, Order, Schema, ValidationError,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// In-memory order store implementation.
///
/// Rows live in a HashMap behind a read-write lock; conditional updates
/// check the expectation and apply the changes under a single write guard,
/// which gives the same atomicity as a row-level conditional UPDATE.
pub struct MemoryOrderStore {
	inner: Arc<RwLock<Inner>>,
}

struct Inner {
	orders: HashMap<String, Order>,
	subscribers: Vec<mpsc::UnboundedSender<Order>>,
}

impl MemoryOrderStore {
	/// Creates a new empty MemoryOrderStore instance.
	pub fn new() -> Self {
		Self {
			inner: Arc::new(RwLock::new(Inner {
				orders: HashMap::new(),
				subscribers: Vec::new(),
			})),
		}
	}
}

impl Default for MemoryOrderStore {
	fn default() -> Self {
		Self::new()
	}
}

impl Inner {
	/// Emits the new row to all live feed subscribers, pruning closed ones.
	fn notify(&mut self, order: &Order) {
		self.subscribers
			.retain(|tx| tx.send(order.clone()).is_ok());
	}
}

#[async_trait]
impl OrderStoreInterface for MemoryOrderStore {
	async fn get_order(&self, id: &str) -> Result<Order, StoreError> {
		let inner = self.inner.read().await;
		inner.orders.get(id).cloned().ok_or(StoreError::NotFound)
	}

	async fn list_orders(&self) -> Result<Vec<Order>, StoreError> {
		let inner = self.inner.read().await;
		Ok(inner.orders.values().cloned().collect())
	}

	async fn insert_order(&self, order: Order) -> Result<(), StoreError> {
		let mut inner = self.inner.write().await;
		if inner.orders.contains_key(&order.id) {
			return Err(StoreError::Backend(format!(
				"order {} already exists",
				order.id
			)));
		}
		inner.orders.insert(order.id.clone(), order.clone());
		inner.notify(&order);
		Ok(())
	}

	async fn conditional_update(
		&self,
		id: &str,
		expected: OrderExpectation,
		changes: OrderChanges,
	) -> Result<Order, StoreError> {
		let mut inner = self.inner.write().await;
		let current = inner.orders.get(id).ok_or(StoreError::NotFound)?;

		if !expected.matches(current) {
			return Err(StoreError::Stale);
		}

		let mut updated = current.clone();
		changes.apply(&mut updated);
		updated.updated_at = current_timestamp();

		inner.orders.insert(id.to_string(), updated.clone());
		inner.notify(&updated);
		Ok(updated)
	}

	async fn subscribe(&self, tx: mpsc::UnboundedSender<Order>) -> Result<(), StoreError> {
		let mut inner = self.inner.write().await;
		inner.subscribers.push(tx);
		Ok(())
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryOrderStoreSchema)
	}
}

/// Configuration schema for MemoryOrderStore.
pub struct MemoryOrderStoreSchema;

impl ConfigSchema for MemoryOrderStoreSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		// Memory storage has no required configuration
		let schema = Schema::new(vec![], vec![]);
		schema.validate(config)
	}
}

/// Registry entry for the memory order store.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = OrderStoreFactory;

	fn factory() -> Self::Factory {
		create_order_store
	}
}

impl crate::OrderStoreRegistry for Registry {}

/// Factory function to create a memory order store from configuration.
///
/// Configuration parameters:
/// - None required for memory storage
pub fn create_order_store(
	_config: &toml::Value,
) -> Result<Box<dyn OrderStoreInterface>, StoreError> {
	Ok(Box::new(MemoryOrderStore::new()))
}

#[cfg(test)]
mod tests {
	use super::*;
	use dispatch_types::{OrderStatus, StoreResponseStatus};

	fn pending_order(id: &str) -> Order {
		Order {
			id: id.to_string(),
			order_code: None,
			status: OrderStatus::Pending,
			preferred_store_name: None,
			assigned_store_id: None,
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

	fn assign_changes(store_id: &str) -> OrderChanges {
		OrderChanges {
			status: Some(OrderStatus::Assigned),
			assigned_store_id: Some(Some(store_id.to_string())),
			..Default::default()
		}
	}

	#[tokio::test]
	async fn insert_and_get() {
		let store = MemoryOrderStore::new();
		store.insert_order(pending_order("o1")).await.unwrap();

		let row = store.get_order("o1").await.unwrap();
		assert_eq!(row.status, OrderStatus::Pending);

		let result = store.get_order("missing").await;
		assert!(matches!(result, Err(StoreError::NotFound)));
	}

	#[tokio::test]
	async fn duplicate_insert_rejected() {
		let store = MemoryOrderStore::new();
		store.insert_order(pending_order("o1")).await.unwrap();
		let result = store.insert_order(pending_order("o1")).await;
		assert!(matches!(result, Err(StoreError::Backend(_))));
	}

	#[tokio::test]
	async fn conditional_update_succeeds_on_expected_state() {
		let store = MemoryOrderStore::new();
		store.insert_order(pending_order("o1")).await.unwrap();

		let updated = store
			.conditional_update(
				"o1",
				OrderExpectation::status_in([OrderStatus::Pending]),
				assign_changes("s1"),
			)
			.await
			.unwrap();

		assert_eq!(updated.status, OrderStatus::Assigned);
		assert_eq!(updated.assigned_store_id.as_deref(), Some("s1"));
	}

	#[tokio::test]
	async fn conditional_update_stale_on_changed_state() {
		let store = MemoryOrderStore::new();
		store.insert_order(pending_order("o1")).await.unwrap();

		// First writer wins.
		store
			.conditional_update(
				"o1",
				OrderExpectation::status_in([OrderStatus::Pending]),
				assign_changes("s1"),
			)
			.await
			.unwrap();

		// Second writer observes a stale pre-state.
		let result = store
			.conditional_update(
				"o1",
				OrderExpectation::status_in([OrderStatus::Pending]),
				assign_changes("s2"),
			)
			.await;
		assert!(matches!(result, Err(StoreError::Stale)));

		// The losing writer did not clobber the assignment.
		let row = store.get_order("o1").await.unwrap();
		assert_eq!(row.assigned_store_id.as_deref(), Some("s1"));
	}

	#[tokio::test]
	async fn expectation_on_response_fields() {
		let store = MemoryOrderStore::new();
		store.insert_order(pending_order("o1")).await.unwrap();
		store
			.conditional_update(
				"o1",
				OrderExpectation::status_in([OrderStatus::Pending]),
				assign_changes("s1"),
			)
			.await
			.unwrap();

		// Expecting no response yet succeeds.
		store
			.conditional_update(
				"o1",
				OrderExpectation::status_in([OrderStatus::Assigned]).with_response(None),
				OrderChanges {
					response_status: Some(Some(StoreResponseStatus::Available)),
					response_at: Some(Some(current_timestamp())),
					..Default::default()
				},
			)
			.await
			.unwrap();

		// A repeat expecting no response is now stale.
		let result = store
			.conditional_update(
				"o1",
				OrderExpectation::status_in([OrderStatus::Assigned]).with_response(None),
				OrderChanges::default(),
			)
			.await;
		assert!(matches!(result, Err(StoreError::Stale)));
	}

	#[tokio::test]
	async fn change_feed_emits_every_write_in_order() {
		let store = MemoryOrderStore::new();
		let (tx, mut rx) = mpsc::unbounded_channel();
		store.subscribe(tx).await.unwrap();

		store.insert_order(pending_order("o1")).await.unwrap();
		store
			.conditional_update(
				"o1",
				OrderExpectation::default(),
				assign_changes("s1"),
			)
			.await
			.unwrap();

		let first = rx.recv().await.unwrap();
		assert_eq!(first.status, OrderStatus::Pending);
		let second = rx.recv().await.unwrap();
		assert_eq!(second.status, OrderStatus::Assigned);
	}
}
