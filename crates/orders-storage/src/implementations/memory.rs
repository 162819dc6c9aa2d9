//! In-memory storage backend implementation.
//!
//! This module provides a memory-based implementation of the StorageInterface trait,
//! useful for testing and development scenarios where persistence is not required.

use crate::batch::{apply_batch, BatchState};
use crate::{Batch, BatchResult, OpContext, StorageError, StorageFactory, StorageInterface};
use async_trait::async_trait;
use orders_types::{ConfigSchema, ImplementationRegistry, Schema, ValidationError};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct MemoryState {
	values: HashMap<String, Vec<u8>>,
	sets: HashMap<String, BTreeSet<String>>,
}

impl BatchState for MemoryState {
	fn contains_key(&mut self, key: &str) -> Result<bool, StorageError> {
		Ok(self.values.contains_key(key))
	}

	fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
		Ok(self.values.get(key).cloned())
	}

	fn put(&mut self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		self.values.insert(key.to_string(), value);
		Ok(())
	}

	fn remove(&mut self, key: &str) -> Result<bool, StorageError> {
		Ok(self.values.remove(key).is_some())
	}

	fn set_insert(&mut self, set: &str, member: &str) -> Result<bool, StorageError> {
		Ok(self
			.sets
			.entry(set.to_string())
			.or_default()
			.insert(member.to_string()))
	}

	fn set_delete(&mut self, set: &str, member: &str) -> Result<bool, StorageError> {
		let Some(members) = self.sets.get_mut(set) else {
			return Ok(false);
		};
		let removed = members.remove(member);
		if members.is_empty() {
			self.sets.remove(set);
		}
		Ok(removed)
	}
}

/// In-memory storage implementation.
///
/// Values and sets live behind a single read-write lock, so a batch holds the
/// write guard for its whole evaluation and readers never see half of it.
/// Clones share the same underlying store.
#[derive(Clone, Default)]
pub struct MemoryStorage {
	state: Arc<RwLock<MemoryState>>,
}

impl MemoryStorage {
	/// Creates a new MemoryStorage instance.
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, ctx: &OpContext, key: &str) -> Result<Vec<u8>, StorageError> {
		ctx.check()?;
		let state = self.state.read().await;
		state.values.get(key).cloned().ok_or(StorageError::NotFound)
	}

	async fn get_many(
		&self,
		ctx: &OpContext,
		keys: &[String],
	) -> Result<Vec<Option<Vec<u8>>>, StorageError> {
		ctx.check()?;
		let state = self.state.read().await;
		Ok(keys.iter().map(|key| state.values.get(key).cloned()).collect())
	}

	async fn set_members(&self, ctx: &OpContext, set: &str) -> Result<Vec<String>, StorageError> {
		ctx.check()?;
		let state = self.state.read().await;
		Ok(state
			.sets
			.get(set)
			.map(|members| members.iter().cloned().collect())
			.unwrap_or_default())
	}

	async fn execute(&self, ctx: &OpContext, batch: Batch) -> Result<BatchResult, StorageError> {
		ctx.check()?;
		let mut state = self.state.write().await;
		// Re-check after waiting for the guard; past this point the batch runs to completion.
		ctx.check()?;
		apply_batch(&mut *state, batch)
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryStorageSchema)
	}
}

/// Configuration schema for MemoryStorage.
pub struct MemoryStorageSchema;

impl ConfigSchema for MemoryStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		// Memory storage takes no settings
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Registry for the memory backend.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {}

/// Factory function to create a memory storage backend from configuration.
///
/// Configuration parameters:
/// - None accepted for memory storage
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	MemoryStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;
	Ok(Box::new(MemoryStorage::new()))
}
