//! Main entry point for the order dispatch service.
//!
//! This binary runs the full assignment and fulfillment lifecycle engine:
//! the periodic auto-assignment sweep, the store response and fulfillment
//! handlers, and the change propagation relay. Backends are pluggable and
//! selected by name from the configuration file.

use clap::Parser;
use dispatch_config::Config;
use dispatch_core::{DispatchBuilder, Dispatcher};
use dispatch_store::{all_directory_implementations, all_order_store_implementations};
use std::path::PathBuf;

/// Command-line arguments for the dispatch service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	// Initialize tracing with env filter
	use tracing_subscriber::{fmt, EnvFilter};

	let default_directive = args.log_level.to_string();
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started dispatch service");

	let config_path = args.config.to_string_lossy().into_owned();
	let config = Config::from_file(&config_path).await?;
	tracing::info!("Loaded configuration [{}]", config.service.id);

	let dispatcher = build_dispatcher(config)?;
	dispatcher.run().await?;

	tracing::info!("Stopped dispatch service");
	Ok(())
}

/// Builds the dispatcher with every registered backend implementation.
fn build_dispatcher(config: Config) -> Result<Dispatcher, Box<dyn std::error::Error>> {
	let mut builder = DispatchBuilder::new(config);
	for (name, factory) in all_order_store_implementations() {
		builder = builder.with_order_store_factory(name, factory);
	}
	for (name, factory) in all_directory_implementations() {
		builder = builder.with_directory_factory(name, factory);
	}
	Ok(builder.build()?)
}
