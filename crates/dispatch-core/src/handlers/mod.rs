//! Handlers for store-initiated lifecycle transitions.

pub mod fulfillment;
pub mod response;

pub use fulfillment::FulfillmentHandler;
pub use response::ResponseHandler;
