//! Event types for inter-service communication.
//!
//! This module defines the event system used by the dispatcher for
//! asynchronous communication between components. Events flow through an
//! event bus allowing the run loop and observers to react to lifecycle
//! changes without coupling to the handlers that produced them.

use crate::SweepSummary;
use serde::{Deserialize, Serialize};

/// Main event type encompassing all dispatch events.
///
/// Events are categorized by the component that produces them, allowing
/// consumers to filter and handle specific event types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DispatchEvent {
	/// Events from the assignment engine.
	Assignment(AssignmentEvent),
	/// Events from the store response handler.
	Response(ResponseEvent),
	/// Events from the fulfillment handler.
	Fulfillment(FulfillmentEvent),
}

/// Events related to order assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AssignmentEvent {
	/// An order has been assigned to a store.
	Assigned {
		order_id: String,
		store_id: String,
		/// True for admin-initiated assignments, false for sweep matches.
		manual: bool,
	},
	/// An auto-assignment sweep has completed.
	SweepCompleted { summary: SweepSummary },
}

/// Events related to store responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResponseEvent {
	/// The assigned store confirmed availability.
	Confirmed { order_id: String, store_id: String },
	/// The assigned store declined; the order is back in the pool.
	Declined {
		order_id: String,
		store_id: String,
		reason: String,
	},
}

/// Events related to terminal fulfillment transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FulfillmentEvent {
	/// The order was delivered to the customer.
	Delivered { order_id: String, store_id: String },
	/// The order came back after a delivery attempt.
	Returned {
		order_id: String,
		store_id: String,
		reason: String,
	},
}
