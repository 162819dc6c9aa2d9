//! File-based storage backend.
//!
//! Layout under `storage_path`:
//!
//! - `values/<key>.bin`: one file per key, a small header followed by the value
//! - `sets/<set>.json`: one JSON array per set
//! - `journal.json`: resolved effects of the batch being applied, if any
//! - `.lock`: exclusive lock held while a batch is applied
//!
//! Each file is replaced atomically by writing a temp file and renaming it.
//! A batch touching several files first writes its resolved effects to the
//! journal, then applies them, then removes the journal. A journal left
//! behind by a crash is replayed before the next batch and when the store is
//! opened, so a batch is never observed half-applied after recovery.

use crate::batch::{apply_batch, BatchState};
use crate::{Batch, BatchResult, OpContext, StorageError, StorageFactory, StorageInterface};
use async_trait::async_trait;
use fs2::FileExt;
use orders_types::{ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const VALUES_DIR: &str = "values";
const SETS_DIR: &str = "sets";
const JOURNAL_FILE: &str = "journal.json";
const LOCK_FILE: &str = ".lock";
const DEFAULT_STORAGE_PATH: &str = "./data/orders";

/// Fixed-size header prefixed to every value file.
///
/// Binary layout (8 bytes total):
/// - [0-3]: Magic bytes "ORDS"
/// - [4-5]: Version (u16, little-endian)
/// - [6-7]: Reserved
struct FileHeader;

impl FileHeader {
	const MAGIC: &'static [u8; 4] = b"ORDS";
	const VERSION: u16 = 1;
	const SIZE: usize = 8;

	fn encode(value: &[u8]) -> Vec<u8> {
		let mut data = Vec::with_capacity(Self::SIZE + value.len());
		data.extend_from_slice(Self::MAGIC);
		data.extend_from_slice(&Self::VERSION.to_le_bytes());
		data.extend_from_slice(&[0u8; 2]);
		data.extend_from_slice(value);
		data
	}

	/// Strips the header. Files without one are returned unchanged.
	fn decode(mut data: Vec<u8>) -> Result<Vec<u8>, StorageError> {
		if data.len() < Self::SIZE || &data[0..4] != Self::MAGIC {
			return Ok(data);
		}

		let version = u16::from_le_bytes([data[4], data[5]]);
		if version > Self::VERSION {
			return Err(StorageError::Backend(format!(
				"Unsupported file version: {}",
				version
			)));
		}

		Ok(data.split_off(Self::SIZE))
	}
}

/// Resolved effect of a batch on one file. Applying an entry twice has the
/// same result as applying it once, which makes replay safe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum JournalEntry {
	PutValue { key: String, value: Vec<u8> },
	RemoveValue { key: String },
	PutSet { set: String, members: Vec<String> },
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Journal {
	entries: Vec<JournalEntry>,
}

impl Journal {
	fn apply(&self, root: &Path) -> Result<(), StorageError> {
		for entry in &self.entries {
			match entry {
				JournalEntry::PutValue { key, value } => {
					write_atomic(&value_path(root, key), &FileHeader::encode(value))?;
				},
				JournalEntry::RemoveValue { key } => remove_if_exists(&value_path(root, key))?,
				JournalEntry::PutSet { set, members } if members.is_empty() => {
					remove_if_exists(&set_path(root, set))?;
				},
				JournalEntry::PutSet { set, members } => {
					let bytes = serde_json::to_vec(members)
						.map_err(|e| StorageError::Serialization(e.to_string()))?;
					write_atomic(&set_path(root, set), &bytes)?;
				},
			}
		}
		Ok(())
	}
}

/// Batch evaluation area. Reads fall through to disk, writes stay in memory
/// until they are turned into a journal.
struct Staging<'a> {
	root: &'a Path,
	/// Keys written (`Some`) or removed (`None`) by the batch.
	values: BTreeMap<String, Option<Vec<u8>>>,
	/// On-disk existence of keys the batch only looked at.
	known: HashMap<String, bool>,
	sets: BTreeMap<String, BTreeSet<String>>,
	dirty_sets: BTreeSet<String>,
}

impl<'a> Staging<'a> {
	fn new(root: &'a Path) -> Self {
		Self {
			root,
			values: BTreeMap::new(),
			known: HashMap::new(),
			sets: BTreeMap::new(),
			dirty_sets: BTreeSet::new(),
		}
	}

	fn load_set(&mut self, set: &str) -> Result<&mut BTreeSet<String>, StorageError> {
		if !self.sets.contains_key(set) {
			let members = read_set_file(self.root, set)?;
			self.sets.insert(set.to_string(), members);
		}
		self.sets
			.get_mut(set)
			.ok_or_else(|| StorageError::Backend(format!("set {} not staged", set)))
	}

	fn into_journal(self) -> Journal {
		let mut entries: Vec<JournalEntry> = self
			.values
			.into_iter()
			.map(|(key, value)| match value {
				Some(value) => JournalEntry::PutValue { key, value },
				None => JournalEntry::RemoveValue { key },
			})
			.collect();

		let mut sets = self.sets;
		for set in self.dirty_sets {
			let members = sets.remove(&set).unwrap_or_default();
			entries.push(JournalEntry::PutSet {
				set,
				members: members.into_iter().collect(),
			});
		}

		Journal { entries }
	}
}

impl BatchState for Staging<'_> {
	fn contains_key(&mut self, key: &str) -> Result<bool, StorageError> {
		if let Some(value) = self.values.get(key) {
			return Ok(value.is_some());
		}
		if let Some(exists) = self.known.get(key) {
			return Ok(*exists);
		}
		let exists = value_path(self.root, key)
			.try_exists()
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		self.known.insert(key.to_string(), exists);
		Ok(exists)
	}

	fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
		if let Some(value) = self.values.get(key) {
			return Ok(value.clone());
		}
		let value = read_value_file(self.root, key)?;
		self.known.insert(key.to_string(), value.is_some());
		Ok(value)
	}

	fn put(&mut self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		self.values.insert(key.to_string(), Some(value));
		Ok(())
	}

	fn remove(&mut self, key: &str) -> Result<bool, StorageError> {
		let existed = self.contains_key(key)?;
		if existed {
			self.values.insert(key.to_string(), None);
		}
		Ok(existed)
	}

	fn set_insert(&mut self, set: &str, member: &str) -> Result<bool, StorageError> {
		let added = self.load_set(set)?.insert(member.to_string());
		if added {
			self.dirty_sets.insert(set.to_string());
		}
		Ok(added)
	}

	fn set_delete(&mut self, set: &str, member: &str) -> Result<bool, StorageError> {
		let removed = self.load_set(set)?.remove(member);
		if removed {
			self.dirty_sets.insert(set.to_string());
		}
		Ok(removed)
	}
}

/// File-based storage implementation.
///
/// Reads go straight to the individual files and never block on a running
/// batch. Batches are serialized within the process by a mutex and across
/// processes by an exclusive lock on `.lock`.
pub struct FileStorage {
	/// Base directory path for storing files.
	base_path: PathBuf,
	write_lock: Arc<Mutex<()>>,
}

impl FileStorage {
	/// Opens (creating if needed) a store rooted at `base_path`, replaying any
	/// journal left by an interrupted batch.
	pub fn open(base_path: impl Into<PathBuf>) -> Result<Self, StorageError> {
		let base_path = base_path.into();
		for dir in [VALUES_DIR, SETS_DIR] {
			fs::create_dir_all(base_path.join(dir))
				.map_err(|e| StorageError::Backend(e.to_string()))?;
		}

		let storage = Self {
			base_path,
			write_lock: Arc::new(Mutex::new(())),
		};
		{
			let _file_lock = lock_store(&storage.base_path)?;
			replay_journal(&storage.base_path)?;
		}
		Ok(storage)
	}

	pub fn base_path(&self) -> &Path {
		&self.base_path
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, ctx: &OpContext, key: &str) -> Result<Vec<u8>, StorageError> {
		let path = value_path(&self.base_path, key);
		ctx.run(async {
			match tokio::fs::read(&path).await {
				Ok(data) => FileHeader::decode(data),
				Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound),
				Err(e) => Err(StorageError::Backend(e.to_string())),
			}
		})
		.await
	}

	async fn get_many(
		&self,
		ctx: &OpContext,
		keys: &[String],
	) -> Result<Vec<Option<Vec<u8>>>, StorageError> {
		ctx.run(async {
			let mut values = Vec::with_capacity(keys.len());
			for key in keys {
				let value = match tokio::fs::read(value_path(&self.base_path, key)).await {
					Ok(data) => Some(FileHeader::decode(data)?),
					Err(e) if e.kind() == ErrorKind::NotFound => None,
					Err(e) => return Err(StorageError::Backend(e.to_string())),
				};
				values.push(value);
			}
			Ok(values)
		})
		.await
	}

	async fn set_members(&self, ctx: &OpContext, set: &str) -> Result<Vec<String>, StorageError> {
		let path = set_path(&self.base_path, set);
		ctx.run(async {
			match tokio::fs::read(&path).await {
				Ok(data) => decode_set(&data).map(|members| members.into_iter().collect()),
				Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
				Err(e) => Err(StorageError::Backend(e.to_string())),
			}
		})
		.await
	}

	async fn execute(&self, ctx: &OpContext, batch: Batch) -> Result<BatchResult, StorageError> {
		ctx.check()?;
		if batch.is_empty() {
			return Ok(BatchResult::default());
		}

		let root = self.base_path.clone();
		let write_lock = Arc::clone(&self.write_lock);
		let ctx = ctx.clone();
		// Not raced against the context: once started, the batch completes.
		tokio::task::spawn_blocking(move || {
			let _guard = write_lock
				.lock()
				.map_err(|_| StorageError::Backend("write lock poisoned".into()))?;
			let _file_lock = lock_store(&root)?;
			// Re-check after queueing for both locks, before the journal is written.
			ctx.check()?;
			execute_locked(&root, batch)
		})
		.await
		.map_err(|e| StorageError::Backend(format!("batch task failed: {}", e)))?
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}
}

/// Evaluates and applies `batch`. The caller holds both write locks.
fn execute_locked(root: &Path, batch: Batch) -> Result<BatchResult, StorageError> {
	replay_journal(root)?;

	let mut staging = Staging::new(root);
	let result = apply_batch(&mut staging, batch)?;
	let journal = staging.into_journal();
	if journal.entries.is_empty() {
		return Ok(result);
	}

	let journal_path = root.join(JOURNAL_FILE);
	let bytes =
		serde_json::to_vec(&journal).map_err(|e| StorageError::Serialization(e.to_string()))?;
	write_atomic(&journal_path, &bytes)?;
	journal.apply(root)?;
	remove_if_exists(&journal_path)?;

	Ok(result)
}

fn replay_journal(root: &Path) -> Result<(), StorageError> {
	let journal_path = root.join(JOURNAL_FILE);
	let bytes = match fs::read(&journal_path) {
		Ok(bytes) => bytes,
		Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
		Err(e) => return Err(StorageError::Backend(e.to_string())),
	};

	let journal: Journal = serde_json::from_slice(&bytes)
		.map_err(|e| StorageError::Serialization(format!("corrupt journal: {}", e)))?;
	tracing::warn!(
		"Replaying {} journal entries from interrupted batch in {:?}",
		journal.entries.len(),
		root
	);
	journal.apply(root)?;
	remove_if_exists(&journal_path)
}

/// Takes the cross-process lock. Released when the returned file is dropped.
fn lock_store(root: &Path) -> Result<File, StorageError> {
	let file = OpenOptions::new()
		.create(true)
		.truncate(false)
		.write(true)
		.open(root.join(LOCK_FILE))
		.map_err(|e| StorageError::Backend(e.to_string()))?;
	FileExt::lock_exclusive(&file).map_err(|e| StorageError::Backend(e.to_string()))?;
	Ok(file)
}

fn read_value_file(root: &Path, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
	match fs::read(value_path(root, key)) {
		Ok(data) => FileHeader::decode(data).map(Some),
		Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
		Err(e) => Err(StorageError::Backend(e.to_string())),
	}
}

fn read_set_file(root: &Path, set: &str) -> Result<BTreeSet<String>, StorageError> {
	match fs::read(set_path(root, set)) {
		Ok(data) => decode_set(&data),
		Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeSet::new()),
		Err(e) => Err(StorageError::Backend(e.to_string())),
	}
}

fn decode_set(data: &[u8]) -> Result<BTreeSet<String>, StorageError> {
	serde_json::from_slice(data).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StorageError> {
	let temp_path = path.with_extension("tmp");
	let mut file = File::create(&temp_path).map_err(|e| StorageError::Backend(e.to_string()))?;
	file.write_all(data)
		.and_then(|_| file.sync_all())
		.map_err(|e| StorageError::Backend(e.to_string()))?;
	fs::rename(&temp_path, path).map_err(|e| StorageError::Backend(e.to_string()))
}

fn remove_if_exists(path: &Path) -> Result<(), StorageError> {
	match fs::remove_file(path) {
		Ok(()) => Ok(()),
		Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
		Err(e) => Err(StorageError::Backend(e.to_string())),
	}
}

fn value_path(root: &Path, key: &str) -> PathBuf {
	root.join(VALUES_DIR).join(format!("{}.bin", escape_name(key)))
}

fn set_path(root: &Path, set: &str) -> PathBuf {
	root.join(SETS_DIR).join(format!("{}.json", escape_name(set)))
}

/// Maps a key to a file-name stem. Alphanumerics, `-` and `_` are kept and
/// every other byte becomes `%XX`, so distinct keys never share a file.
fn escape_name(key: &str) -> String {
	let mut escaped = String::with_capacity(key.len());
	for byte in key.bytes() {
		match byte {
			b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' => escaped.push(byte as char),
			other => escaped.push_str(&format!("%{:02X}", other)),
		}
	}
	escaped
}

/// Configuration schema for FileStorage.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("storage_path", FieldType::String).with_validator(|value| {
					match value.as_str() {
						Some("") => Err("storage_path cannot be empty".to_string()),
						_ => Ok(()),
					}
				}),
			],
		);
		schema.validate(config)
	}
}

/// Registry for the file backend.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {}

/// Factory function to create a storage backend from configuration.
///
/// Configuration parameters:
/// - `storage_path`: Base directory for file storage (default: "./data/orders")
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_STORAGE_PATH);

	Ok(Box::new(FileStorage::open(storage_path)?))
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[test]
	fn test_header_round_trip() {
		let encoded = FileHeader::encode(b"payload");
		assert_eq!(&encoded[0..4], b"ORDS");
		assert_eq!(FileHeader::decode(encoded).unwrap(), b"payload");
		assert_eq!(FileHeader::decode(b"raw".to_vec()).unwrap(), b"raw");
	}

	#[test]
	fn test_header_rejects_newer_version() {
		let mut encoded = FileHeader::encode(b"payload");
		encoded[4] = 9;
		assert!(matches!(
			FileHeader::decode(encoded),
			Err(StorageError::Backend(_))
		));
	}

	#[test]
	fn test_escape_name_is_injective() {
		assert_eq!(escape_name("order:1"), "order%3A1");
		assert_ne!(escape_name("order:1"), escape_name("order_1"));
		assert_ne!(escape_name("a%3A"), escape_name("a:"));
		assert_eq!(escape_name("../x"), "%2E%2E%2Fx");
	}

	#[tokio::test]
	async fn test_basic_operations() {
		let temp_dir = TempDir::new().unwrap();
		let storage = FileStorage::open(temp_dir.path()).unwrap();
		let ctx = OpContext::new();

		assert!(storage.set_if_absent(&ctx, "order:1", b"one".to_vec()).await.unwrap());
		assert!(!storage.set_if_absent(&ctx, "order:1", b"uno".to_vec()).await.unwrap());
		assert_eq!(storage.get_bytes(&ctx, "order:1").await.unwrap(), b"one");

		assert!(storage.set_if_present(&ctx, "order:1", b"1".to_vec()).await.unwrap());
		assert!(!storage.set_if_present(&ctx, "order:2", b"2".to_vec()).await.unwrap());
		assert!(matches!(
			storage.get_bytes(&ctx, "order:2").await,
			Err(StorageError::NotFound)
		));

		assert!(storage.delete(&ctx, "order:1").await.unwrap());
		assert!(!storage.delete(&ctx, "order:1").await.unwrap());
		assert!(matches!(
			storage.get_bytes(&ctx, "order:1").await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test]
	async fn test_compare_and_set_reads_disk_and_staged_values() {
		let temp_dir = TempDir::new().unwrap();
		let storage = FileStorage::open(temp_dir.path()).unwrap();
		let ctx = OpContext::new();

		assert!(!storage
			.set_if_equals(&ctx, "order:1", b"new".to_vec(), b"shipped".to_vec())
			.await
			.unwrap());
		storage
			.set_if_absent(&ctx, "order:1", b"new".to_vec())
			.await
			.unwrap();

		let result = storage
			.execute(
				&ctx,
				Batch::new()
					.set_if_equals("order:1", b"new".to_vec(), b"shipped".to_vec())
					.set_if_equals("order:1", b"new".to_vec(), b"stale".to_vec())
					.set_if_equals("order:1", b"shipped".to_vec(), b"completed".to_vec()),
			)
			.await
			.unwrap();
		assert!(result.applied(0));
		assert!(!result.applied(1));
		assert!(result.applied(2));
		assert_eq!(
			storage.get_bytes(&ctx, "order:1").await.unwrap(),
			b"completed"
		);
	}

	#[tokio::test]
	async fn test_deadline_passing_while_queued_skips_batch() {
		let temp_dir = TempDir::new().unwrap();
		let storage = Arc::new(FileStorage::open(temp_dir.path()).unwrap());

		let held = storage.write_lock.lock().unwrap();
		let queued = {
			let storage = Arc::clone(&storage);
			tokio::spawn(async move {
				let ctx = OpContext::new().with_timeout(std::time::Duration::from_millis(50));
				storage
					.execute(&ctx, Batch::new().set_if_absent("k", b"v".to_vec()))
					.await
			})
		};
		tokio::time::sleep(std::time::Duration::from_millis(200)).await;
		drop(held);

		let result = queued.await.unwrap();
		assert!(matches!(result, Err(StorageError::Timeout)));
		assert!(!value_path(temp_dir.path(), "k").exists());
		assert!(!temp_dir.path().join(JOURNAL_FILE).exists());
	}

	#[tokio::test]
	async fn test_batch_persists_across_reopen() {
		let temp_dir = TempDir::new().unwrap();
		let ctx = OpContext::new();
		{
			let storage = FileStorage::open(temp_dir.path()).unwrap();
			let result = storage
				.execute(
					&ctx,
					Batch::new()
						.set_if_absent("order:7", b"seven".to_vec())
						.set_add("orders", "order:7")
						.set_if_absent("order:8", b"eight".to_vec())
						.set_add("orders", "order:8"),
				)
				.await
				.unwrap();
			assert_eq!(result.len(), 4);
			assert!((0..4).all(|i| result.applied(i)));
		}

		let storage = FileStorage::open(temp_dir.path()).unwrap();
		let mut members = storage.set_members(&ctx, "orders").await.unwrap();
		members.sort();
		assert_eq!(members, vec!["order:7", "order:8"]);

		let keys = vec!["order:8".to_string(), "order:9".to_string()];
		let values = storage.get_many(&ctx, &keys).await.unwrap();
		assert_eq!(values, vec![Some(b"eight".to_vec()), None]);
		assert!(!temp_dir.path().join(JOURNAL_FILE).exists());
	}

	#[tokio::test]
	async fn test_delete_with_index_removal() {
		let temp_dir = TempDir::new().unwrap();
		let storage = FileStorage::open(temp_dir.path()).unwrap();
		let ctx = OpContext::new();

		storage
			.execute(
				&ctx,
				Batch::new()
					.set_if_absent("order:1", b"x".to_vec())
					.set_add("orders", "order:1"),
			)
			.await
			.unwrap();

		let result = storage
			.execute(
				&ctx,
				Batch::new()
					.delete("order:1")
					.set_remove("orders", "order:1"),
			)
			.await
			.unwrap();
		assert!(result.applied(0));
		assert!(result.applied(1));
		assert!(storage.set_members(&ctx, "orders").await.unwrap().is_empty());
		assert!(!set_path(temp_dir.path(), "orders").exists());
	}

	#[tokio::test]
	async fn test_leftover_journal_is_replayed_on_open() {
		let temp_dir = TempDir::new().unwrap();
		fs::create_dir_all(temp_dir.path().join(VALUES_DIR)).unwrap();
		fs::create_dir_all(temp_dir.path().join(SETS_DIR)).unwrap();

		let journal = Journal {
			entries: vec![
				JournalEntry::PutValue {
					key: "order:3".into(),
					value: b"three".to_vec(),
				},
				JournalEntry::PutSet {
					set: "orders".into(),
					members: vec!["order:3".into()],
				},
			],
		};
		fs::write(
			temp_dir.path().join(JOURNAL_FILE),
			serde_json::to_vec(&journal).unwrap(),
		)
		.unwrap();

		let storage = FileStorage::open(temp_dir.path()).unwrap();
		let ctx = OpContext::new();
		assert_eq!(storage.get_bytes(&ctx, "order:3").await.unwrap(), b"three");
		assert_eq!(
			storage.set_members(&ctx, "orders").await.unwrap(),
			vec!["order:3"]
		);
		assert!(!temp_dir.path().join(JOURNAL_FILE).exists());
	}

	#[tokio::test]
	async fn test_corrupt_set_file_is_serialization_error() {
		let temp_dir = TempDir::new().unwrap();
		let storage = FileStorage::open(temp_dir.path()).unwrap();
		fs::write(set_path(temp_dir.path(), "orders"), b"not json").unwrap();

		let ctx = OpContext::new();
		assert!(matches!(
			storage.set_members(&ctx, "orders").await,
			Err(StorageError::Serialization(_))
		));
		// A batch touching the set must fail before writing anything.
		let result = storage
			.execute(
				&ctx,
				Batch::new()
					.set_if_absent("order:1", b"x".to_vec())
					.set_add("orders", "order:1"),
			)
			.await;
		assert!(matches!(result, Err(StorageError::Serialization(_))));
		assert!(matches!(
			storage.get_bytes(&ctx, "order:1").await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test]
	async fn test_cancelled_context_skips_io() {
		let temp_dir = TempDir::new().unwrap();
		let storage = FileStorage::open(temp_dir.path()).unwrap();
		let ctx = OpContext::new();
		ctx.cancel();

		let result = storage
			.execute(&ctx, Batch::new().set_if_absent("k", b"v".to_vec()))
			.await;
		assert!(matches!(result, Err(StorageError::Cancelled)));
		assert!(!value_path(temp_dir.path(), "k").exists());
	}

	#[test]
	fn test_create_storage_from_config() {
		let temp_dir = TempDir::new().unwrap();
		let mut table = toml::map::Map::new();
		table.insert(
			"storage_path".to_string(),
			toml::Value::String(temp_dir.path().join("db").to_string_lossy().into_owned()),
		);
		assert!(create_storage(&toml::Value::Table(table)).is_ok());
		assert!(temp_dir.path().join("db").join(VALUES_DIR).is_dir());

		let bad: toml::Value = toml::from_str("storage_path = \"\"").unwrap();
		assert!(matches!(
			create_storage(&bad),
			Err(StorageError::Configuration(_))
		));
	}
}
