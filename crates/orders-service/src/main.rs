//! Main entry point for the orders service.
//!
//! Loads the configuration, opens the configured key-value backend, and
//! serves the orders HTTP API until interrupted.

use clap::Parser;
use orders_config::Config;
use orders_core::{OrderLifecycle, OrderStore};
use orders_storage::{StorageError, StorageInterface};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

mod apis;
mod server;

/// Command-line arguments for the orders service.
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

type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started orders service");

	let config_path = args
		.config
		.to_str()
		.ok_or("Configuration path is not valid UTF-8")?;
	let config = Config::from_file(config_path).await?;
	tracing::info!("Loaded configuration [{}]", config.service.id);

	let store = build_store(&config, storage_factories())?;
	let lifecycle = OrderLifecycle::new(store);

	let api_config = config.api_or_default();
	if !api_config.enabled {
		tracing::warn!("API server disabled in configuration, nothing to serve");
		return Ok(());
	}

	let shutdown = CancellationToken::new();
	tokio::spawn(wait_for_shutdown(shutdown.clone()));

	server::start_server(api_config, lifecycle, shutdown).await?;

	tracing::info!("Stopped orders service");
	Ok(())
}

/// Cancels `shutdown` on ctrl-c.
async fn wait_for_shutdown(shutdown: CancellationToken) {
	match tokio::signal::ctrl_c().await {
		Ok(()) => tracing::info!("Received shutdown signal"),
		Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
	}
	shutdown.cancel();
}

/// All storage backends this binary can open, by configuration name.
fn storage_factories() -> HashMap<String, StorageFactory> {
	orders_storage::get_all_implementations()
		.into_iter()
		.map(|(name, factory)| (name.to_string(), factory))
		.collect()
}

/// Opens the primary storage backend and wraps it in an [`OrderStore`].
fn build_store(
	config: &Config,
	factories: HashMap<String, StorageFactory>,
) -> Result<OrderStore, Box<dyn std::error::Error>> {
	let name = &config.storage.primary;
	let backend_config = config
		.storage
		.primary_config()
		.ok_or_else(|| format!("Primary storage '{}' has no configuration", name))?;
	let factory = factories
		.get(name)
		.ok_or_else(|| format!("Unknown storage implementation '{}'", name))?;

	let backend = factory(backend_config).map_err(|e| {
		tracing::error!(
			component = "storage",
			implementation = %name,
			error = %e,
			"Failed to create storage implementation"
		);
		format!("Failed to create storage implementation '{}': {}", name, e)
	})?;
	tracing::info!(component = "storage", implementation = %name, "Loaded");

	Ok(OrderStore::new(Arc::from(backend)))
}

#[cfg(test)]
mod tests {
	use super::*;
	use orders_config::{ServiceConfig, StorageConfig};
	use orders_storage::OpContext;
	use orders_types::Order;
	use tempfile::tempdir;
	use uuid::Uuid;

	fn config_for(primary: &str, backend: toml::Value) -> Config {
		let mut implementations = HashMap::new();
		implementations.insert(primary.to_string(), backend);
		Config {
			service: ServiceConfig {
				id: "orders-test".to_string(),
			},
			storage: StorageConfig {
				primary: primary.to_string(),
				implementations,
			},
			api: None,
		}
	}

	fn empty_table() -> toml::Value {
		toml::Value::Table(toml::map::Map::new())
	}

	#[test]
	fn test_args_parse() {
		let args = Args::parse_from(["orders", "--config", "custom.toml", "-l", "debug"]);
		assert_eq!(args.config, PathBuf::from("custom.toml"));
		assert_eq!(args.log_level, "debug");

		let defaults = Args::parse_from(["orders"]);
		assert_eq!(defaults.config, PathBuf::from("config.toml"));
		assert_eq!(defaults.log_level, "info");
	}

	#[test]
	fn test_storage_factories() {
		let factories = storage_factories();
		assert_eq!(factories.len(), 2);
		assert!(factories.contains_key("memory"));
		assert!(factories.contains_key("file"));
	}

	#[tokio::test]
	async fn test_build_store_with_memory_backend() {
		let store = build_store(&config_for("memory", empty_table()), storage_factories()).unwrap();
		let ctx = OpContext::new();
		let order = Order::new(3, Uuid::from_u128(1), Vec::new());

		store.insert(&ctx, &order).await.unwrap();
		assert_eq!(store.find_by_id(&ctx, 3).await.unwrap(), order);
	}

	#[tokio::test]
	async fn test_build_store_with_file_backend() {
		let temp_dir = tempdir().unwrap();
		let mut table = toml::map::Map::new();
		table.insert(
			"storage_path".to_string(),
			toml::Value::String(temp_dir.path().to_string_lossy().into_owned()),
		);

		let store = build_store(&config_for("file", toml::Value::Table(table)), storage_factories())
			.unwrap();
		let ctx = OpContext::new();
		store
			.insert(&ctx, &Order::new(8, Uuid::from_u128(1), Vec::new()))
			.await
			.unwrap();
		assert!(store.find_by_id(&ctx, 8).await.is_ok());
	}

	#[test]
	fn test_build_store_rejects_unknown_backend() {
		let result = build_store(&config_for("redis", empty_table()), storage_factories());
		let err = result.err().unwrap().to_string();
		assert!(err.contains("Unknown storage implementation 'redis'"));
	}

	#[test]
	fn test_build_store_rejects_invalid_backend_settings() {
		let mut table = toml::map::Map::new();
		table.insert("unexpected".to_string(), toml::Value::Integer(1));

		let result = build_store(&config_for("memory", toml::Value::Table(table)), storage_factories());
		let err = result.err().unwrap().to_string();
		assert!(err.contains("Failed to create storage implementation 'memory'"));
	}

	#[tokio::test]
	async fn test_config_file_round_trip() {
		let temp_dir = tempdir().unwrap();
		let config_path = temp_dir.path().join("config.toml");
		std::fs::write(
			&config_path,
			r#"
[service]
id = "orders-file"

[storage]
primary = "memory"
[storage.implementations.memory]

[api]
enabled = true
port = 0
"#,
		)
		.unwrap();

		let config = Config::from_file(config_path.to_str().unwrap()).await.unwrap();
		assert_eq!(config.service.id, "orders-file");
		assert!(config.api_or_default().enabled);
		assert!(build_store(&config, storage_factories()).is_ok());
	}
}
