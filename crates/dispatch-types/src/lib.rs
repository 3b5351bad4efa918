//! Common types module for the order dispatch system.
//!
//! This module defines the core data types and structures used throughout
//! the dispatch system. It provides a centralized location for shared types
//! to ensure consistency across all dispatch components.

/// Event types for inter-service communication.
pub mod events;
/// Order lifecycle types including statuses and store responses.
pub mod order;
/// Implementation registry trait for pluggable backends.
pub mod registry;
/// Fulfillment store types.
pub mod store;
/// Operation outcome and sweep summary types.
pub mod summary;
/// Utility functions shared across crates.
pub mod utils;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

// Re-export all types for convenient access
pub use events::*;
pub use order::*;
pub use registry::*;
pub use store::*;
pub use summary::*;
pub use utils::{current_timestamp, truncate_id};
pub use validation::*;
