//! Core dispatch engine for the order assignment and fulfillment lifecycle.
//!
//! This crate orchestrates the lifecycle of customer orders: the assignment
//! engine routes pending orders to fulfillment stores (manually or by
//! matching a preferred store name), the response handler records each
//! store's accept/decline commitment (a decline requeues the order), the
//! fulfillment handler applies the terminal delivered/returned transitions,
//! and the change propagation relay fans filtered order updates out to
//! dashboard subscribers. All state lives in the order store; every
//! transition is a conditional write so concurrent actors are serialized at
//! the data layer rather than by in-process locking.

use dispatch_types::OrderStatus;
use thiserror::Error;

pub mod assignment;
pub mod builder;
pub mod dispatcher;
pub mod event_bus;
pub mod handlers;
pub mod matcher;
pub mod relay;
mod util;

pub use assignment::AssignmentEngine;
pub use builder::DispatchBuilder;
pub use dispatcher::Dispatcher;
pub use handlers::{FulfillmentHandler, ResponseHandler};
pub use matcher::{match_preferred_store, MatchOutcome};
pub use relay::{ChangeRelay, OrderView};

/// Errors returned by dispatch operations.
///
/// Every handler call surfaces one of these; `kind()` gives the
/// machine-readable taxonomy and the Display impl the human-readable
/// reason, so the UI layer can render both without parsing.
#[derive(Debug, Error)]
pub enum DispatchError {
	/// Bad input, rejected before any write.
	#[error("Validation error: {0}")]
	Validation(String),
	/// The order does not exist.
	#[error("Order not found: {0}")]
	OrderNotFound(String),
	/// The target store does not exist.
	#[error("Store not found: {0}")]
	StoreNotFound(String),
	/// The order is not in the assignable pool.
	#[error("Order {order_id} is not eligible for assignment (status: {status})")]
	NotEligible { order_id: String, status: OrderStatus },
	/// A store tried to act on an order not currently assigned to it.
	#[error("Order is not assigned to the calling store")]
	NotAssignedToCaller,
	/// First response wins; a recorded response cannot be flipped.
	#[error("Order already has a recorded store response")]
	AlreadyResponded,
	/// The order reached a terminal state; no further writes permitted.
	#[error("Order is already in a terminal state")]
	AlreadyTerminal,
	/// A fulfillment precondition does not hold.
	#[error("Precondition failed: {0}")]
	PreconditionFailed(String),
	/// Optimistic-concurrency conflict; the caller should refetch and
	/// decide whether to retry.
	#[error("Stale state: order changed since it was read, refetch and retry")]
	StaleState,
	/// A write timed out with unknown outcome; the caller must re-read
	/// order state instead of resubmitting.
	#[error("Write outcome unknown after timeout, re-read order state")]
	OutcomeUnknown,
	/// Error from the order store or directory backend.
	#[error("Store error: {0}")]
	Store(String),
	/// Error while building the dispatcher from configuration.
	#[error("Configuration error: {0}")]
	Config(String),
}

impl DispatchError {
	/// Machine-readable error kind for the dashboard layer.
	pub fn kind(&self) -> &'static str {
		match self {
			DispatchError::Validation(_) => "validation",
			DispatchError::OrderNotFound(_) => "order_not_found",
			DispatchError::StoreNotFound(_) => "store_not_found",
			DispatchError::NotEligible { .. } => "not_eligible",
			DispatchError::NotAssignedToCaller => "not_assigned_to_caller",
			DispatchError::AlreadyResponded => "already_responded",
			DispatchError::AlreadyTerminal => "already_terminal",
			DispatchError::PreconditionFailed(_) => "precondition_failed",
			DispatchError::StaleState => "stale_state",
			DispatchError::OutcomeUnknown => "outcome_unknown",
			DispatchError::Store(_) => "store",
			DispatchError::Config(_) => "config",
		}
	}
}
