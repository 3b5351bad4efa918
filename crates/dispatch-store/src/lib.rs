//! Order store and store directory abstractions for the dispatch system.
//!
//! This module provides the interfaces the dispatch core consumes: a
//! transactional order store with conditional (compare-and-set) updates and
//! a change-notification feed, and a read-mostly directory of fulfillment
//! stores. Backends are pluggable; an in-memory implementation of each is
//! provided for tests, development, and single-process deployments.

use async_trait::async_trait;
use dispatch_types::{
	ConfigSchema, ImplementationRegistry, Order, OrderStatus, Store, StoreResponseStatus,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod directory;
	pub mod memory;
}

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
	/// Error that occurs when a requested row is not found.
	#[error("Not found")]
	NotFound,
	/// Error that occurs when a conditional update observes a row whose
	/// state no longer matches the expected pre-state.
	#[error("Stale state: row changed since it was read")]
	Stale,
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend or its transport.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Expected pre-state for a conditional update.
///
/// Every transition in the lifecycle is framed as "only if still in the
/// expected prior state"; an empty expectation matches any row. Fields use
/// a double-`Option` where the outer layer means "check this field" and the
/// inner layer is the expected value (including expected-absent).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderExpectation {
	/// Statuses the row must currently be in, if set.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub status_in: Option<Vec<OrderStatus>>,
	/// Exact expected assignment, if set.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub assigned_store_id: Option<Option<String>>,
	/// Exact expected store response, if set.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub response_status: Option<Option<StoreResponseStatus>>,
}

impl OrderExpectation {
	/// Expectation on the lifecycle status only.
	pub fn status_in(statuses: impl Into<Vec<OrderStatus>>) -> Self {
		Self {
			status_in: Some(statuses.into()),
			..Default::default()
		}
	}

	/// Adds an expectation on the current assignment.
	pub fn with_assigned_store(mut self, store_id: Option<String>) -> Self {
		self.assigned_store_id = Some(store_id);
		self
	}

	/// Adds an expectation on the current store response.
	pub fn with_response(mut self, response: Option<StoreResponseStatus>) -> Self {
		self.response_status = Some(response);
		self
	}

	/// Returns true when the given row satisfies this expectation.
	pub fn matches(&self, order: &Order) -> bool {
		if let Some(statuses) = &self.status_in {
			if !statuses.contains(&order.status) {
				return false;
			}
		}
		if let Some(expected) = &self.assigned_store_id {
			if expected != &order.assigned_store_id {
				return false;
			}
		}
		if let Some(expected) = &self.response_status {
			if expected != &order.response_status {
				return false;
			}
		}
		true
	}
}

/// Field changes applied by a conditional update.
///
/// Only the lifecycle fields are writable through this contract; identity
/// and payload fields are immutable to the dispatch core. Each field uses
/// the same double-`Option` convention as [`OrderExpectation`]: the outer
/// layer means "write this field", the inner layer is the new value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderChanges {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub status: Option<OrderStatus>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub assigned_store_id: Option<Option<String>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub response_status: Option<Option<StoreResponseStatus>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub response_at: Option<Option<u64>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub rejection_reason: Option<Option<String>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub return_reason: Option<Option<String>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub declined_by: Option<Option<String>>,
}

impl OrderChanges {
	/// Applies the changes to a row in place. The caller is responsible
	/// for bumping `updated_at`.
	pub fn apply(&self, order: &mut Order) {
		if let Some(status) = self.status {
			order.status = status;
		}
		if let Some(assigned) = &self.assigned_store_id {
			order.assigned_store_id = assigned.clone();
		}
		if let Some(response) = &self.response_status {
			order.response_status = *response;
		}
		if let Some(at) = &self.response_at {
			order.response_at = *at;
		}
		if let Some(reason) = &self.rejection_reason {
			order.rejection_reason = reason.clone();
		}
		if let Some(reason) = &self.return_reason {
			order.return_reason = reason.clone();
		}
		if let Some(store) = &self.declined_by {
			order.declined_by = store.clone();
		}
	}
}

/// Trait defining the low-level interface for order store backends.
///
/// This is the single source of truth for the order lifecycle. The dispatch
/// core never locks rows; every transition goes through `conditional_update`
/// so that concurrent writers are serialized at the data layer.
#[async_trait]
pub trait OrderStoreInterface: Send + Sync {
	/// Point read of a single order row.
	async fn get_order(&self, id: &str) -> Result<Order, StoreError>;

	/// Returns all order rows. Used by the sweep; a real backend would
	/// filter by status server-side.
	async fn list_orders(&self) -> Result<Vec<Order>, StoreError>;

	/// Inserts a new order row. Orders are created externally in
	/// `pending`; this exists for seeding and tests.
	async fn insert_order(&self, order: Order) -> Result<(), StoreError>;

	/// Atomically applies `changes` to the row iff `expected` still
	/// matches it, returning the new row. Fails with [`StoreError::Stale`]
	/// when the row changed since it was read.
	async fn conditional_update(
		&self,
		id: &str,
		expected: OrderExpectation,
		changes: OrderChanges,
	) -> Result<Order, StoreError>;

	/// Registers a change-feed subscriber. Every successful write emits
	/// the full new row to all live subscribers, in write order per row.
	async fn subscribe(&self, tx: mpsc::UnboundedSender<Order>) -> Result<(), StoreError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

/// Trait defining the read-only directory of fulfillment stores.
#[async_trait]
pub trait DirectoryInterface: Send + Sync {
	/// Returns all stores, active or not.
	async fn list_stores(&self) -> Result<Vec<Store>, StoreError>;

	/// Point read of a single store.
	async fn get_store(&self, id: &str) -> Result<Store, StoreError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

/// Type alias for order store factory functions.
pub type OrderStoreFactory =
	fn(&toml::Value) -> Result<Box<dyn OrderStoreInterface>, StoreError>;

/// Type alias for directory factory functions.
pub type DirectoryFactory = fn(&toml::Value) -> Result<Box<dyn DirectoryInterface>, StoreError>;

/// Registry trait for order store implementations.
pub trait OrderStoreRegistry: ImplementationRegistry<Factory = OrderStoreFactory> {}

/// Registry trait for directory implementations.
pub trait DirectoryRegistry: ImplementationRegistry<Factory = DirectoryFactory> {}

/// Get all registered order store implementations.
pub fn all_order_store_implementations() -> Vec<(&'static str, OrderStoreFactory)> {
	use implementations::memory;

	vec![(memory::Registry::NAME, memory::Registry::factory())]
}

/// Get all registered directory implementations.
pub fn all_directory_implementations() -> Vec<(&'static str, DirectoryFactory)> {
	use implementations::directory;

	vec![(directory::Registry::NAME, directory::Registry::factory())]
}

/// High-level order store service consumed by the dispatch core.
///
/// Wraps a backend implementation behind a stable surface so the engine and
/// handlers do not depend on a concrete backend type.
pub struct OrderStoreService {
	backend: Box<dyn OrderStoreInterface>,
}

impl OrderStoreService {
	/// Creates a new OrderStoreService with the specified backend.
	pub fn new(backend: Box<dyn OrderStoreInterface>) -> Self {
		Self { backend }
	}

	/// Point read of a single order row.
	pub async fn get_order(&self, id: &str) -> Result<Order, StoreError> {
		self.backend.get_order(id).await
	}

	/// Returns all order rows.
	pub async fn list_orders(&self) -> Result<Vec<Order>, StoreError> {
		self.backend.list_orders().await
	}

	/// Inserts a new order row.
	pub async fn insert_order(&self, order: Order) -> Result<(), StoreError> {
		self.backend.insert_order(order).await
	}

	/// Conditionally updates a row; see [`OrderStoreInterface::conditional_update`].
	pub async fn conditional_update(
		&self,
		id: &str,
		expected: OrderExpectation,
		changes: OrderChanges,
	) -> Result<Order, StoreError> {
		self.backend.conditional_update(id, expected, changes).await
	}

	/// Registers a change-feed subscriber.
	pub async fn subscribe(&self, tx: mpsc::UnboundedSender<Order>) -> Result<(), StoreError> {
		self.backend.subscribe(tx).await
	}
}

/// High-level directory service consumed by the dispatch core.
pub struct DirectoryService {
	backend: Box<dyn DirectoryInterface>,
}

impl DirectoryService {
	/// Creates a new DirectoryService with the specified backend.
	pub fn new(backend: Box<dyn DirectoryInterface>) -> Self {
		Self { backend }
	}

	/// Returns all stores.
	pub async fn list_stores(&self) -> Result<Vec<Store>, StoreError> {
		self.backend.list_stores().await
	}

	/// Point read of a single store.
	pub async fn get_store(&self, id: &str) -> Result<Store, StoreError> {
		self.backend.get_store(id).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use dispatch_types::current_timestamp;

	fn order(status: OrderStatus, assigned: Option<&str>) -> Order {
		Order {
			id: "ord-1".to_string(),
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

	#[test]
	fn empty_expectation_matches_anything() {
		let expectation = OrderExpectation::default();
		assert!(expectation.matches(&order(OrderStatus::Pending, None)));
		assert!(expectation.matches(&order(OrderStatus::Delivered, Some("s1"))));
	}

	#[test]
	fn status_and_assignment_expectations() {
		let expectation = OrderExpectation::status_in([OrderStatus::Pending, OrderStatus::Rejected])
			.with_assigned_store(None);

		assert!(expectation.matches(&order(OrderStatus::Pending, None)));
		assert!(!expectation.matches(&order(OrderStatus::Assigned, Some("s1"))));
		assert!(!expectation.matches(&order(OrderStatus::Pending, Some("s1"))));
	}

	#[test]
	fn changes_apply_only_selected_fields() {
		let mut row = order(OrderStatus::Pending, None);
		let changes = OrderChanges {
			status: Some(OrderStatus::Assigned),
			assigned_store_id: Some(Some("s1".to_string())),
			..Default::default()
		};
		changes.apply(&mut row);

		assert_eq!(row.status, OrderStatus::Assigned);
		assert_eq!(row.assigned_store_id.as_deref(), Some("s1"));
		assert!(row.response_status.is_none());
	}

	#[test]
	fn changes_can_clear_fields() {
		let mut row = order(OrderStatus::Assigned, Some("s1"));
		row.response_status = Some(StoreResponseStatus::Unavailable);

		let changes = OrderChanges {
			status: Some(OrderStatus::Pending),
			assigned_store_id: Some(None),
			response_status: Some(None),
			..Default::default()
		};
		changes.apply(&mut row);

		assert_eq!(row.status, OrderStatus::Pending);
		assert!(row.assigned_store_id.is_none());
		assert!(row.response_status.is_none());
	}
}
