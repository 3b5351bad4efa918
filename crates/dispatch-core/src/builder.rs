//! Builder for constructing a dispatcher from configuration.
//!
//! Backend implementations register themselves as named factories; the
//! builder resolves the configured names, lets each factory validate its
//! own configuration section, and wires the resulting services into the
//! engine, handlers, and relay.

use crate::assignment::AssignmentEngine;
use crate::dispatcher::Dispatcher;
use crate::event_bus::EventBus;
use crate::handlers::{FulfillmentHandler, ResponseHandler};
use crate::relay::ChangeRelay;
use crate::DispatchError;
use dispatch_config::Config;
use dispatch_store::{DirectoryFactory, DirectoryService, OrderStoreFactory, OrderStoreService};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Capacity of the internal lifecycle event bus.
const EVENT_BUS_CAPACITY: usize = 1000;

/// Builder for the dispatcher with registered backend factories.
pub struct DispatchBuilder {
	config: Config,
	order_store_factories: HashMap<String, OrderStoreFactory>,
	directory_factories: HashMap<String, DirectoryFactory>,
}

impl DispatchBuilder {
	/// Creates a new builder with the given configuration.
	pub fn new(config: Config) -> Self {
		Self {
			config,
			order_store_factories: HashMap::new(),
			directory_factories: HashMap::new(),
		}
	}

	/// Registers an order store backend factory under its implementation
	/// name.
	pub fn with_order_store_factory(mut self, name: &str, factory: OrderStoreFactory) -> Self {
		self.order_store_factories.insert(name.to_string(), factory);
		self
	}

	/// Registers a directory backend factory under its implementation name.
	pub fn with_directory_factory(mut self, name: &str, factory: DirectoryFactory) -> Self {
		self.directory_factories.insert(name.to_string(), factory);
		self
	}

	/// Resolves the configured backends and builds the dispatcher.
	pub fn build(self) -> Result<Dispatcher, DispatchError> {
		let order_store_factory = self
			.order_store_factories
			.get(&self.config.order_store.backend)
			.ok_or_else(|| {
				DispatchError::Config(format!(
					"Unknown order store backend: {}",
					self.config.order_store.backend
				))
			})?;
		let order_backend = order_store_factory(&self.config.order_store.config)
			.map_err(|e| DispatchError::Config(e.to_string()))?;
		let order_store = Arc::new(OrderStoreService::new(order_backend));

		let directory_factory = self
			.directory_factories
			.get(&self.config.directory.backend)
			.ok_or_else(|| {
				DispatchError::Config(format!(
					"Unknown directory backend: {}",
					self.config.directory.backend
				))
			})?;
		let directory_backend = directory_factory(&self.config.directory.config)
			.map_err(|e| DispatchError::Config(e.to_string()))?;
		let directory = Arc::new(DirectoryService::new(directory_backend));

		let event_bus = EventBus::new(EVENT_BUS_CAPACITY);
		let request_timeout = Duration::from_millis(self.config.service.request_timeout_ms);

		let engine = AssignmentEngine::new(
			order_store.clone(),
			directory.clone(),
			event_bus.clone(),
			request_timeout,
			self.config.service.sweep_concurrency,
		);
		let response_handler =
			ResponseHandler::new(order_store.clone(), event_bus.clone(), request_timeout);
		let fulfillment_handler =
			FulfillmentHandler::new(order_store.clone(), event_bus.clone(), request_timeout);
		let relay = Arc::new(ChangeRelay::new(
			self.config.relay.snapshot_cache_capacity,
			self.config.relay.channel_capacity,
		));

		Ok(Dispatcher::new(
			self.config,
			order_store,
			engine,
			response_handler,
			fulfillment_handler,
			relay,
			event_bus,
		))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use dispatch_store::{all_directory_implementations, all_order_store_implementations};

	fn config(raw: &str) -> Config {
		raw.parse().unwrap()
	}

	fn builder(raw: &str) -> DispatchBuilder {
		let mut builder = DispatchBuilder::new(config(raw));
		for (name, factory) in all_order_store_implementations() {
			builder = builder.with_order_store_factory(name, factory);
		}
		for (name, factory) in all_directory_implementations() {
			builder = builder.with_directory_factory(name, factory);
		}
		builder
	}

	#[tokio::test]
	async fn builds_from_memory_backends() {
		let dispatcher = builder(
			r#"
			[service]
			id = "dispatch-test"

			[order_store]
			backend = "memory"

			[directory]
			backend = "memory"
			[directory.config]
			stores = [{ id = "s1", name = "Acme" }]
			"#,
		)
		.build()
		.unwrap();

		let result = dispatcher.get_order("nope").await;
		assert!(matches!(result, Err(DispatchError::OrderNotFound(_))));
	}

	#[tokio::test]
	async fn unknown_backend_is_a_config_error() {
		let result = builder(
			r#"
			[service]
			id = "dispatch-test"

			[order_store]
			backend = "cockroach"

			[directory]
			backend = "memory"
			"#,
		)
		.build();
		assert!(matches!(result, Err(DispatchError::Config(_))));
	}

	#[tokio::test]
	async fn invalid_backend_config_is_a_config_error() {
		let result = builder(
			r#"
			[service]
			id = "dispatch-test"

			[order_store]
			backend = "memory"

			[directory]
			backend = "memory"
			[directory.config]
			stores = [{ id = "s1" }]
			"#,
		)
		.build();
		assert!(matches!(result, Err(DispatchError::Config(_))));
	}
}
