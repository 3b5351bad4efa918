//! Event bus for inter-component communication.
//!
//! Provides a broadcast channel that dispatch components publish lifecycle
//! events to. Consumers subscribe independently; a slow consumer lags and
//! drops events rather than blocking publishers.

use dispatch_types::DispatchEvent;
use tokio::sync::broadcast;

/// Broadcast-based event bus carrying [`DispatchEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
	sender: broadcast::Sender<DispatchEvent>,
}

impl EventBus {
	/// Creates a new event bus with the given channel capacity.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	/// Publishes an event to all current subscribers.
	///
	/// Returns an error when no subscriber is listening; publishers treat
	/// that as non-fatal and `.ok()` it.
	pub fn publish(
		&self,
		event: DispatchEvent,
	) -> Result<usize, broadcast::error::SendError<DispatchEvent>> {
		self.sender.send(event)
	}

	/// Creates a new subscription to the event stream.
	pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
		self.sender.subscribe()
	}
}
