//! Bounded snapshot cache backing change suppression.

use dispatch_types::{Order, OrderStatus, StoreResponseStatus};
use std::collections::{HashMap, VecDeque};

/// The slice of an order row the relay compares between sightings.
///
/// Payload edits and timestamp bumps are not material to subscribers; the
/// fields here are the ones a dashboard row actually renders differently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OrderSnapshot {
	pub status: OrderStatus,
	pub response_status: Option<StoreResponseStatus>,
	pub assigned_store_id: Option<String>,
}

impl OrderSnapshot {
	pub fn of(order: &Order) -> Self {
		Self {
			status: order.status,
			response_status: order.response_status,
			assigned_store_id: order.assigned_store_id.clone(),
		}
	}

	/// True when the difference between two sightings should be relayed.
	pub fn materially_differs(&self, other: &Self) -> bool {
		self != other
	}
}

struct Entry {
	snapshot: OrderSnapshot,
	seq: u64,
}

/// LRU cache of the last relayed snapshot per order.
///
/// Recency is tracked with sequence stamps in a queue; stale queue slots are
/// skipped during eviction and swept out when the queue grows past four
/// times the capacity. An evicted order simply relays again on its next
/// sighting, so bounds here trade a duplicate notification for memory.
pub(crate) struct SnapshotCache {
	capacity: usize,
	seq: u64,
	entries: HashMap<String, Entry>,
	recency: VecDeque<(String, u64)>,
}

impl SnapshotCache {
	pub fn new(capacity: usize) -> Self {
		Self {
			capacity: capacity.max(1),
			seq: 0,
			entries: HashMap::new(),
			recency: VecDeque::new(),
		}
	}

	/// Returns the last relayed snapshot for the order, refreshing its
	/// recency.
	pub fn get(&mut self, order_id: &str) -> Option<OrderSnapshot> {
		let seq = self.next_seq();
		let entry = self.entries.get_mut(order_id)?;
		entry.seq = seq;
		let snapshot = entry.snapshot.clone();
		self.touch(order_id.to_string(), seq);
		Some(snapshot)
	}

	/// Records the latest relayed snapshot, evicting the least recently
	/// seen order when over capacity.
	pub fn put(&mut self, order_id: String, snapshot: OrderSnapshot) {
		let seq = self.next_seq();
		self.entries.insert(
			order_id.clone(),
			Entry { snapshot, seq },
		);
		self.touch(order_id, seq);

		while self.entries.len() > self.capacity {
			match self.recency.pop_front() {
				Some((id, seq)) => {
					let live = self
						.entries
						.get(&id)
						.map(|e| e.seq == seq)
						.unwrap_or(false);
					if live {
						self.entries.remove(&id);
					}
				}
				None => break,
			}
		}
	}

	#[cfg(test)]
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	fn next_seq(&mut self) -> u64 {
		self.seq += 1;
		self.seq
	}

	fn touch(&mut self, order_id: String, seq: u64) {
		self.recency.push_back((order_id, seq));
		if self.recency.len() > self.capacity * 4 {
			let entries = &self.entries;
			self.recency
				.retain(|(id, s)| entries.get(id).map(|e| e.seq == *s).unwrap_or(false));
		}
	}
}
