//! Fulfillment store types.

use serde::{Deserialize, Serialize};

/// A fulfillment store that orders can be assigned to.
///
/// Stores are administered externally and read-only to the dispatch core.
/// Display names are expected to be unique case-insensitively; the matcher
/// surfaces duplicates as an ambiguity rather than picking one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Store {
	/// Unique identifier for this store.
	pub id: String,
	/// Display name, matched case-insensitively during auto-assignment.
	pub name: String,
	/// Inactive stores keep their assignments but are excluded from
	/// auto-matching.
	#[serde(default = "default_active")]
	pub active: bool,
}

fn default_active() -> bool {
	true
}
