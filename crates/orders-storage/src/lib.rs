//! Key-value storage backends for the orders service.
//!
//! This module defines the backend capability set the order store is built
//! on: point reads, batched reads, set membership, and atomic batches of
//! conditional writes. Backends are constructed explicitly from configuration
//! and injected, never held as process-wide singletons.

use async_trait::async_trait;
use orders_types::{ConfigSchema, ImplementationRegistry};
use thiserror::Error;

mod batch;
mod context;

pub use batch::{Batch, BatchOp, BatchResult};
pub use context::OpContext;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs when a requested item is not found.
	#[error("Not found")]
	NotFound,
	/// Stored bytes could not be decoded by the backend itself.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
	/// The operation's cancellation token fired.
	#[error("Operation cancelled")]
	Cancelled,
	/// The operation's deadline passed.
	#[error("Operation timed out")]
	Timeout,
}

/// Trait defining the low-level interface for storage backends.
///
/// Every call takes the caller's [`OpContext`]; implementations must fail
/// with [`StorageError::Cancelled`] or [`StorageError::Timeout`] without
/// touching the store when the context is already done.
///
/// Implementations are shared across concurrent requests and must be safe to
/// call without external locking.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, ctx: &OpContext, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Retrieves the values of several keys in one round-trip.
	///
	/// The result has one entry per requested key, in request order, with
	/// `None` for keys that have no value.
	async fn get_many(
		&self,
		ctx: &OpContext,
		keys: &[String],
	) -> Result<Vec<Option<Vec<u8>>>, StorageError>;

	/// Returns every member of the named set, in no particular order.
	///
	/// A set that was never written is empty.
	async fn set_members(&self, ctx: &OpContext, set: &str) -> Result<Vec<String>, StorageError>;

	/// Applies all operations of `batch` atomically.
	async fn execute(&self, ctx: &OpContext, batch: Batch) -> Result<BatchResult, StorageError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Writes `value` only if `key` is absent. Returns whether it was written.
	async fn set_if_absent(
		&self,
		ctx: &OpContext,
		key: &str,
		value: Vec<u8>,
	) -> Result<bool, StorageError> {
		let result = self
			.execute(ctx, Batch::new().set_if_absent(key, value))
			.await?;
		Ok(result.applied(0))
	}

	/// Overwrites `key` only if present. Returns whether it was written.
	async fn set_if_present(
		&self,
		ctx: &OpContext,
		key: &str,
		value: Vec<u8>,
	) -> Result<bool, StorageError> {
		let result = self
			.execute(ctx, Batch::new().set_if_present(key, value))
			.await?;
		Ok(result.applied(0))
	}

	/// Overwrites `key` only if it still holds `expected`. Returns whether it
	/// was written.
	async fn set_if_equals(
		&self,
		ctx: &OpContext,
		key: &str,
		expected: Vec<u8>,
		value: Vec<u8>,
	) -> Result<bool, StorageError> {
		let result = self
			.execute(ctx, Batch::new().set_if_equals(key, expected, value))
			.await?;
		Ok(result.applied(0))
	}

	/// Deletes `key`. Returns whether it existed.
	async fn delete(&self, ctx: &OpContext, key: &str) -> Result<bool, StorageError> {
		let result = self.execute(ctx, Batch::new().delete(key)).await?;
		Ok(result.applied(0))
	}

	/// Adds `member` to `set`. Returns whether it was newly added.
	async fn set_add(&self, ctx: &OpContext, set: &str, member: &str) -> Result<bool, StorageError> {
		let result = self.execute(ctx, Batch::new().set_add(set, member)).await?;
		Ok(result.applied(0))
	}

	/// Removes `member` from `set`. Returns whether it was present.
	async fn set_remove(
		&self,
		ctx: &OpContext,
		set: &str,
		member: &str,
	) -> Result<bool, StorageError> {
		let result = self.execute(ctx, Batch::new().set_remove(set, member)).await?;
		Ok(result.applied(0))
	}
}

/// Type alias for storage factory functions.
///
/// This is the function signature that all storage implementations must provide
/// to create instances of their storage interface.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Registry trait for storage implementations.
pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// Get all registered storage implementations.
///
/// Returns a vector of (name, factory) tuples for all available storage implementations.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}
