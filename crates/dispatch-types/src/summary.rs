//! Operation outcome types returned to the dashboard layer.

use crate::Order;
use serde::{Deserialize, Serialize};

/// Result of an auto-assignment sweep.
///
/// The sweep is best-effort: per-order failures are counted here rather
/// than aborting the batch, and orders skipped by a deadline are simply
/// omitted from all three counts.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SweepSummary {
	/// Orders successfully assigned during this sweep.
	pub assigned: usize,
	/// Orders left untouched because no eligible store name matched.
	pub unmatched: usize,
	/// Orders whose conditional write failed (e.g. lost a race to a
	/// concurrent manual assignment) or hit a backend error.
	pub errors: usize,
}

impl SweepSummary {
	/// Total number of orders this sweep reached a verdict on.
	pub fn processed(&self) -> usize {
		self.assigned + self.unmatched + self.errors
	}
}

/// Result of a store response submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseOutcome {
	/// The order snapshot after the response was applied.
	pub order: Order,
	/// True when this call repeated an identical, already-recorded
	/// decision and changed nothing.
	pub already_recorded: bool,
}
