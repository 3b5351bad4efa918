//! Configuration module for the order dispatch system.
//!
//! This module provides structures and utilities for managing dispatcher
//! configuration. It supports loading configuration from TOML files and
//! provides validation to ensure all required configuration values are
//! properly set.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the huge input dump
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for the dispatcher.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Configuration specific to the dispatcher instance.
	pub service: ServiceConfig,
	/// Configuration for the order store backend.
	pub order_store: BackendConfig,
	/// Configuration for the store directory backend.
	pub directory: BackendConfig,
	/// Configuration for the change propagation relay.
	#[serde(default)]
	pub relay: RelayConfig,
}

/// Configuration specific to the dispatcher instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	/// Unique identifier for this dispatcher instance.
	pub id: String,
	/// Interval between auto-assignment sweeps in seconds.
	/// Defaults to 30 seconds if not specified.
	#[serde(default = "default_sweep_interval_seconds")]
	pub sweep_interval_seconds: u64,
	/// Request-scoped timeout for individual handler writes, in
	/// milliseconds. After this elapses the caller is told the outcome
	/// is unknown and must re-read. Defaults to 5000.
	#[serde(default = "default_request_timeout_ms")]
	pub request_timeout_ms: u64,
	/// Number of orders processed concurrently by a sweep. Defaults to 8.
	#[serde(default = "default_sweep_concurrency")]
	pub sweep_concurrency: usize,
}

/// Returns the default sweep interval in seconds.
fn default_sweep_interval_seconds() -> u64 {
	30
}

/// Returns the default per-request write timeout in milliseconds.
fn default_request_timeout_ms() -> u64 {
	5000
}

/// Returns the default sweep concurrency.
fn default_sweep_concurrency() -> usize {
	8
}

/// Configuration for a pluggable backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
	/// Which implementation to use, by registered name.
	pub backend: String,
	/// Implementation-specific configuration as a raw TOML value.
	#[serde(default = "empty_table")]
	pub config: toml::Value,
}

fn empty_table() -> toml::Value {
	toml::Value::Table(toml::map::Map::new())
}

/// Configuration for the change propagation relay.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelayConfig {
	/// Capacity of the bounded last-seen snapshot cache. Defaults to 1024.
	#[serde(default = "default_snapshot_cache_capacity")]
	pub snapshot_cache_capacity: usize,
	/// Capacity of each subscriber broadcast channel. Defaults to 256.
	#[serde(default = "default_channel_capacity")]
	pub channel_capacity: usize,
}

impl Default for RelayConfig {
	fn default() -> Self {
		Self {
			snapshot_cache_capacity: default_snapshot_cache_capacity(),
			channel_capacity: default_channel_capacity(),
		}
	}
}

fn default_snapshot_cache_capacity() -> usize {
	1024
}

fn default_channel_capacity() -> usize {
	256
}

impl Config {
	/// Loads configuration from a TOML file asynchronously.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let content = tokio::fs::read_to_string(path).await?;
		content.parse()
	}

	/// Validates the configuration values.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.service.id.is_empty() {
			return Err(ConfigError::Validation(
				"service.id must not be empty".to_string(),
			));
		}
		if self.service.sweep_interval_seconds == 0 {
			return Err(ConfigError::Validation(
				"service.sweep_interval_seconds must be positive".to_string(),
			));
		}
		if self.service.sweep_concurrency == 0 {
			return Err(ConfigError::Validation(
				"service.sweep_concurrency must be positive".to_string(),
			));
		}
		if self.relay.snapshot_cache_capacity == 0 {
			return Err(ConfigError::Validation(
				"relay.snapshot_cache_capacity must be positive".to_string(),
			));
		}
		if self.relay.channel_capacity == 0 {
			return Err(ConfigError::Validation(
				"relay.channel_capacity must be positive".to_string(),
			));
		}
		Ok(())
	}
}

impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let config: Config = toml::from_str(s)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	const MINIMAL: &str = r#"
[service]
id = "dispatch-test"

[order_store]
backend = "memory"

[directory]
backend = "memory"
[directory.config]
stores = [{ id = "s1", name = "Acme" }]
"#;

	#[test]
	fn minimal_config_parses_with_defaults() {
		let config: Config = MINIMAL.parse().unwrap();
		assert_eq!(config.service.id, "dispatch-test");
		assert_eq!(config.service.sweep_interval_seconds, 30);
		assert_eq!(config.service.request_timeout_ms, 5000);
		assert_eq!(config.service.sweep_concurrency, 8);
		assert_eq!(config.relay.snapshot_cache_capacity, 1024);
		assert_eq!(config.order_store.backend, "memory");
	}

	#[test]
	fn empty_id_rejected() {
		let raw = MINIMAL.replace("dispatch-test", "");
		let result: Result<Config, _> = raw.parse();
		assert!(matches!(result, Err(ConfigError::Validation(_))));
	}

	#[test]
	fn zero_sweep_interval_rejected() {
		let raw = format!("{}\n", MINIMAL).replace(
			"id = \"dispatch-test\"",
			"id = \"dispatch-test\"\nsweep_interval_seconds = 0",
		);
		let result: Result<Config, _> = raw.parse();
		assert!(matches!(result, Err(ConfigError::Validation(_))));
	}

	#[tokio::test]
	async fn loads_from_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		file.write_all(MINIMAL.as_bytes()).unwrap();

		let config = Config::from_file(file.path().to_str().unwrap())
			.await
			.unwrap();
		assert_eq!(config.directory.backend, "memory");
	}

	#[tokio::test]
	async fn missing_file_is_io_error() {
		let result = Config::from_file("/nonexistent/dispatch.toml").await;
		assert!(matches!(result, Err(ConfigError::Io(_))));
	}
}
