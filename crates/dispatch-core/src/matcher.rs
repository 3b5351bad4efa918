//! Assignment matcher.
//!
//! Pure matching of an order's preferred store name against the store
//! directory. Case-insensitive, whitespace-trimmed exact match; duplicate
//! display names are a data-quality problem and surface as an ambiguity
//! instead of an arbitrary pick.

use dispatch_types::Store;

/// Outcome of matching a preferred store name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
	/// Exactly one active store matched.
	Matched(Store),
	/// No active store matched.
	NotFound,
	/// More than one active store carries the name.
	Ambiguous { candidates: usize },
}

/// Matches a preferred store name against the directory listing.
///
/// Inactive stores never match. No side effects.
pub fn match_preferred_store(preferred: &str, stores: &[Store]) -> MatchOutcome {
	let wanted = preferred.trim().to_lowercase();
	if wanted.is_empty() {
		return MatchOutcome::NotFound;
	}

	let mut candidates = stores
		.iter()
		.filter(|s| s.active && s.name.trim().to_lowercase() == wanted);

	match candidates.next() {
		None => MatchOutcome::NotFound,
		Some(first) => {
			let rest = candidates.count();
			if rest > 0 {
				MatchOutcome::Ambiguous {
					candidates: rest + 1,
				}
			} else {
				MatchOutcome::Matched(first.clone())
			}
		}
	}
}
