//! Atomic batches of key and set mutations.
//!
//! A [`Batch`] is plain data until it is handed to
//! [`StorageInterface::execute`](crate::StorageInterface::execute), which
//! consumes it. Backends apply every operation of a batch in order, with no
//! other writer interleaved, and either all effects become visible or none do.

use crate::StorageError;

/// A single mutation inside a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
	/// Write `value` only if `key` has no value yet.
	SetIfAbsent { key: String, value: Vec<u8> },
	/// Overwrite `key` only if it already has a value.
	SetIfPresent { key: String, value: Vec<u8> },
	/// Overwrite `key` only if its current value is exactly `expected`.
	SetIfEquals {
		key: String,
		expected: Vec<u8>,
		value: Vec<u8>,
	},
	/// Remove `key`.
	Delete { key: String },
	/// Add `member` to the named set.
	SetAdd { set: String, member: String },
	/// Remove `member` from the named set.
	SetRemove { set: String, member: String },
}

/// Ordered list of operations executed as one atomic unit.
#[must_use = "a batch has no effect until it is passed to StorageInterface::execute"]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
	ops: Vec<BatchOp>,
}

impl Batch {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn set_if_absent(mut self, key: impl Into<String>, value: Vec<u8>) -> Self {
		self.ops.push(BatchOp::SetIfAbsent {
			key: key.into(),
			value,
		});
		self
	}

	pub fn set_if_present(mut self, key: impl Into<String>, value: Vec<u8>) -> Self {
		self.ops.push(BatchOp::SetIfPresent {
			key: key.into(),
			value,
		});
		self
	}

	pub fn set_if_equals(
		mut self,
		key: impl Into<String>,
		expected: Vec<u8>,
		value: Vec<u8>,
	) -> Self {
		self.ops.push(BatchOp::SetIfEquals {
			key: key.into(),
			expected,
			value,
		});
		self
	}

	pub fn delete(mut self, key: impl Into<String>) -> Self {
		self.ops.push(BatchOp::Delete { key: key.into() });
		self
	}

	pub fn set_add(mut self, set: impl Into<String>, member: impl Into<String>) -> Self {
		self.ops.push(BatchOp::SetAdd {
			set: set.into(),
			member: member.into(),
		});
		self
	}

	pub fn set_remove(mut self, set: impl Into<String>, member: impl Into<String>) -> Self {
		self.ops.push(BatchOp::SetRemove {
			set: set.into(),
			member: member.into(),
		});
		self
	}

	pub fn len(&self) -> usize {
		self.ops.len()
	}

	pub fn is_empty(&self) -> bool {
		self.ops.is_empty()
	}

	pub fn ops(&self) -> &[BatchOp] {
		&self.ops
	}

	pub fn into_ops(self) -> Vec<BatchOp> {
		self.ops
	}
}

/// Per-operation outcome of an executed batch.
///
/// An operation is "applied" when it changed the store: the conditional write
/// found its precondition true, the delete removed an existing key, or the
/// set membership actually changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
	applied: Vec<bool>,
}

impl BatchResult {
	pub fn new(applied: Vec<bool>) -> Self {
		Self { applied }
	}

	/// Whether the operation at `index` changed the store.
	///
	/// Out-of-range indices report `false`.
	pub fn applied(&self, index: usize) -> bool {
		self.applied.get(index).copied().unwrap_or(false)
	}

	pub fn len(&self) -> usize {
		self.applied.len()
	}

	pub fn is_empty(&self) -> bool {
		self.applied.is_empty()
	}
}

/// Mutable view of a backend that a batch is evaluated against.
///
/// Backends implement this over whatever they hold while the batch runs
/// exclusively: the locked maps of the memory backend, or the staging area of
/// the file backend.
pub(crate) trait BatchState {
	fn contains_key(&mut self, key: &str) -> Result<bool, StorageError>;
	/// Current value of `key`, including writes staged earlier in the batch.
	fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
	fn put(&mut self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;
	/// Returns whether the key existed.
	fn remove(&mut self, key: &str) -> Result<bool, StorageError>;
	/// Returns whether the member was newly added.
	fn set_insert(&mut self, set: &str, member: &str) -> Result<bool, StorageError>;
	/// Returns whether the member was present.
	fn set_delete(&mut self, set: &str, member: &str) -> Result<bool, StorageError>;
}

/// Evaluates every operation of `batch` against `state`, in order.
pub(crate) fn apply_batch<S: BatchState>(
	state: &mut S,
	batch: Batch,
) -> Result<BatchResult, StorageError> {
	let mut applied = Vec::with_capacity(batch.len());
	for op in batch.into_ops() {
		let changed = match op {
			BatchOp::SetIfAbsent { key, value } => {
				if state.contains_key(&key)? {
					false
				} else {
					state.put(&key, value)?;
					true
				}
			},
			BatchOp::SetIfPresent { key, value } => {
				if state.contains_key(&key)? {
					state.put(&key, value)?;
					true
				} else {
					false
				}
			},
			BatchOp::SetIfEquals {
				key,
				expected,
				value,
			} => {
				if state.get(&key)?.is_some_and(|current| current == expected) {
					state.put(&key, value)?;
					true
				} else {
					false
				}
			},
			BatchOp::Delete { key } => state.remove(&key)?,
			BatchOp::SetAdd { set, member } => state.set_insert(&set, &member)?,
			BatchOp::SetRemove { set, member } => state.set_delete(&set, &member)?,
		};
		applied.push(changed);
	}
	Ok(BatchResult::new(applied))
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::{BTreeSet, HashMap};

	#[derive(Default)]
	struct MapState {
		values: HashMap<String, Vec<u8>>,
		sets: HashMap<String, BTreeSet<String>>,
	}

	impl BatchState for MapState {
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
			Ok(self
				.sets
				.get_mut(set)
				.is_some_and(|members| members.remove(member)))
		}
	}

	#[test]
	fn test_builder_preserves_order() {
		let batch = Batch::new()
			.set_if_absent("a", b"1".to_vec())
			.set_add("idx", "a");
		assert_eq!(batch.len(), 2);
		assert!(matches!(batch.ops()[0], BatchOp::SetIfAbsent { .. }));
		assert!(matches!(batch.ops()[1], BatchOp::SetAdd { .. }));
	}

	#[test]
	fn test_conditional_writes() {
		let mut state = MapState::default();

		let result = apply_batch(
			&mut state,
			Batch::new()
				.set_if_present("k", b"x".to_vec())
				.set_if_absent("k", b"v1".to_vec())
				.set_if_absent("k", b"v2".to_vec())
				.set_if_present("k", b"v3".to_vec()),
		)
		.unwrap();

		assert!(!result.applied(0));
		assert!(result.applied(1));
		assert!(!result.applied(2));
		assert!(result.applied(3));
		assert_eq!(state.values["k"], b"v3");
	}

	#[test]
	fn test_set_if_equals_compares_current_value() {
		let mut state = MapState::default();

		let result = apply_batch(
			&mut state,
			Batch::new()
				.set_if_equals("k", b"v1".to_vec(), b"x".to_vec())
				.set_if_absent("k", b"v1".to_vec())
				.set_if_equals("k", b"stale".to_vec(), b"v2".to_vec())
				.set_if_equals("k", b"v1".to_vec(), b"v2".to_vec())
				.set_if_equals("k", b"v1".to_vec(), b"v3".to_vec()),
		)
		.unwrap();

		assert!(!result.applied(0));
		assert!(result.applied(1));
		assert!(!result.applied(2));
		assert!(result.applied(3));
		assert!(!result.applied(4));
		assert_eq!(state.values["k"], b"v2");
	}

	#[test]
	fn test_delete_and_set_membership_outcomes() {
		let mut state = MapState::default();
		let result = apply_batch(
			&mut state,
			Batch::new()
				.delete("missing")
				.set_add("idx", "a")
				.set_add("idx", "a")
				.set_remove("idx", "a")
				.set_remove("idx", "a"),
		)
		.unwrap();

		assert_eq!(result.len(), 5);
		assert!(!result.applied(0));
		assert!(result.applied(1));
		assert!(!result.applied(2));
		assert!(result.applied(3));
		assert!(!result.applied(4));
		assert!(!result.applied(99));
	}
}
