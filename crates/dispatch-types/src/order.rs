//! Order lifecycle types for the dispatch system.
//!
//! This module defines the central `Order` entity together with its lifecycle
//! status and the store response states that drive the assignment protocol.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A customer order routed through the assignment and fulfillment lifecycle.
///
/// The order row is the single source of truth for the lifecycle: the
/// assignment engine and the response/fulfillment handlers are its only
/// writers, and every transition is expressed as a conditional update
/// against the fields below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
	/// Unique identifier for this order.
	pub id: String,
	/// Human-facing order code shown on dashboards.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub order_code: Option<String>,
	/// Current lifecycle status.
	pub status: OrderStatus,
	/// Free-text store name hint used by the auto-assignment matcher.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub preferred_store_name: Option<String>,
	/// Store currently holding the live assignment, if any.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub assigned_store_id: Option<String>,
	/// The assigned store's accept/decline commitment for this cycle.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub response_status: Option<StoreResponseStatus>,
	/// Timestamp of the store response, unix seconds.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub response_at: Option<u64>,
	/// Reason supplied by a store that declined the order.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub rejection_reason: Option<String>,
	/// Reason supplied when the order was returned after delivery attempt.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub return_reason: Option<String>,
	/// Store that most recently declined this order, kept as an audit
	/// trail across requeues since the live assignment is cleared.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub declined_by: Option<String>,
	/// Customer and line-item payload, passed through untouched.
	#[serde(default)]
	pub payload: serde_json::Value,
	/// Timestamp when this order was created.
	pub created_at: u64,
	/// Timestamp when this order was last updated.
	pub updated_at: u64,
}

impl Order {
	/// Returns true if the order is in a terminal state that permits no
	/// further writes to status, assignment, or response fields.
	pub fn is_terminal(&self) -> bool {
		self.status.is_terminal()
	}

	/// Returns true if the order is eligible for (re)assignment.
	///
	/// `Rejected` is a transient label meaning "was assigned, store
	/// declined, back in the pool" and counts as assignable.
	pub fn is_assignable(&self) -> bool {
		matches!(self.status, OrderStatus::Pending | OrderStatus::Rejected)
	}

	/// Checks the assignment consistency invariant: the order carries an
	/// assigned store exactly when its status implies one.
	pub fn assignment_consistent(&self) -> bool {
		match self.status {
			OrderStatus::Pending => self.assigned_store_id.is_none(),
			OrderStatus::Assigned
			| OrderStatus::Delivered
			| OrderStatus::Returned
			| OrderStatus::Rejected => self.assigned_store_id.is_some(),
		}
	}
}

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
	/// Order is in the pool, awaiting assignment.
	Pending,
	/// Order is assigned to a store, awaiting its response.
	Assigned,
	/// Order was delivered to the customer (terminal).
	Delivered,
	/// Order came back after a delivery attempt (terminal).
	Returned,
	/// A store declined the order; equivalent to `Pending` for
	/// re-assignment purposes. The engine itself requeues straight to
	/// `Pending`, but external writers may still produce this label.
	Rejected,
}

impl OrderStatus {
	/// Returns true for states that permit no further lifecycle writes.
	pub fn is_terminal(&self) -> bool {
		matches!(self, OrderStatus::Delivered | OrderStatus::Returned)
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			OrderStatus::Pending => write!(f, "pending"),
			OrderStatus::Assigned => write!(f, "assigned"),
			OrderStatus::Delivered => write!(f, "delivered"),
			OrderStatus::Returned => write!(f, "returned"),
			OrderStatus::Rejected => write!(f, "rejected"),
		}
	}
}

/// A store's binary commitment to an order it has been assigned.
///
/// Legacy rows used `accepted`/`rejected` as synonyms for the same
/// concept; the serde aliases translate them at the boundary so the rest
/// of the system only ever sees the normalized pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreResponseStatus {
	/// The store confirmed it can fulfill the order.
	#[serde(alias = "accepted")]
	Available,
	/// The store declined the order.
	#[serde(alias = "rejected")]
	Unavailable,
}

impl fmt::Display for StoreResponseStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			StoreResponseStatus::Available => write!(f, "available"),
			StoreResponseStatus::Unavailable => write!(f, "unavailable"),
		}
	}
}
