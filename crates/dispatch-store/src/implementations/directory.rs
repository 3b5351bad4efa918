//! In-memory store directory backend.
//!
//! The directory is read-mostly and administered externally; this
//! implementation is seeded from the TOML configuration at startup.

use crate::{DirectoryFactory, DirectoryInterface, StoreError};
use async_trait::async_trait;
use dispatch_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, Store, ValidationError,
};
use std::collections::HashMap;

/// In-memory directory implementation seeded from configuration.
pub struct MemoryDirectory {
	stores: HashMap<String, Store>,
}

impl MemoryDirectory {
	/// Creates a directory from a list of stores.
	pub fn new(stores: Vec<Store>) -> Self {
		Self {
			stores: stores.into_iter().map(|s| (s.id.clone(), s)).collect(),
		}
	}
}

#[async_trait]
impl DirectoryInterface for MemoryDirectory {
	async fn list_stores(&self) -> Result<Vec<Store>, StoreError> {
		Ok(self.stores.values().cloned().collect())
	}

	async fn get_store(&self, id: &str) -> Result<Store, StoreError> {
		self.stores.get(id).cloned().ok_or(StoreError::NotFound)
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryDirectorySchema)
	}
}

/// Configuration schema for MemoryDirectory.
pub struct MemoryDirectorySchema;

impl ConfigSchema for MemoryDirectorySchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new(
				"stores",
				FieldType::Array(Box::new(FieldType::Table(Schema::new(
					vec![
						Field::new("id", FieldType::String),
						Field::new("name", FieldType::String),
					],
					vec![Field::new("active", FieldType::Boolean)],
				)))),
			)],
			vec![],
		);
		schema.validate(config)
	}
}

/// Registry entry for the memory directory.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = DirectoryFactory;

	fn factory() -> Self::Factory {
		create_directory
	}
}

impl crate::DirectoryRegistry for Registry {}

/// Factory function to create a memory directory from configuration.
///
/// Configuration parameters:
/// - `stores`: array of `{ id, name, active? }` tables
pub fn create_directory(config: &toml::Value) -> Result<Box<dyn DirectoryInterface>, StoreError> {
	MemoryDirectorySchema
		.validate(config)
		.map_err(|e| StoreError::Configuration(e.to_string()))?;

	let stores: Vec<Store> = config
		.get("stores")
		.cloned()
		.map(|v| v.try_into())
		.transpose()
		.map_err(|e: toml::de::Error| StoreError::Configuration(e.to_string()))?
		.unwrap_or_default();

	Ok(Box::new(MemoryDirectory::new(stores)))
}
