//! Key-value backed order repository.
//!
//! Each order is one value under `order:<id>` plus one member of the
//! `orders` index set. Mutations that change whether a key exists (insert
//! and delete) touch both in one atomic batch, so the index always holds
//! exactly the keys of existing orders.
//!
//! There is no isolation between calls: a [`OrderStore::find_all`] running
//! concurrently with an insert may or may not see the new order. Each single
//! call is atomic, which is all the HTTP API needs.

use orders_storage::{Batch, OpContext, StorageError, StorageInterface};
use orders_types::{order_key, parse_order_key, Order, OrderId, StorageKey};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Read-modify-write rounds [`OrderStore::update_with`] tries before giving up.
const MAX_UPDATE_ATTEMPTS: usize = 5;

/// Errors returned by [`OrderStore`] operations.
#[derive(Debug, Error)]
pub enum OrderStoreError {
	/// Malformed input, e.g. the reserved order ID zero.
	#[error("Validation error: {0}")]
	Validation(String),
	#[error("Order not found: {0}")]
	NotFound(OrderId),
	#[error("Order already exists: {0}")]
	Duplicate(OrderId),
	/// A record could not be encoded or a stored record could not be decoded.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Backend communication, cancellation, timeout or batch failure.
	#[error("Backend error: {0}")]
	Backend(#[source] StorageError),
}

impl From<StorageError> for OrderStoreError {
	fn from(err: StorageError) -> Self {
		match err {
			StorageError::Serialization(msg) => OrderStoreError::Serialization(msg),
			other => OrderStoreError::Backend(other),
		}
	}
}

/// Page descriptor for [`OrderStore::find_all`].
///
/// Skipped index entries count towards `size`, so a page can hold fewer than
/// `size` orders even though more follow. Keep paging until
/// [`OrderPage::next_offset`] is `None`; a short page is not the end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FindAllPage {
	/// Maximum number of index entries to read. Zero yields an empty page.
	pub size: u64,
	/// Number of index entries to skip.
	pub offset: u64,
}

/// Why an index entry produced no order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
	/// The index names a key that has no value.
	Missing,
	/// The index member is not an order key.
	InvalidKey,
	/// The stored value could not be decoded.
	Corrupt(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
	pub key: String,
	pub reason: SkipReason,
}

/// One page of orders in enumeration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderPage {
	pub orders: Vec<Order>,
	/// Index entries inside the page window that were skipped.
	pub skipped: Vec<SkippedRecord>,
	/// Offset of the next page, `None` once the index is exhausted. This,
	/// not the number of orders, is what tells the caller to stop.
	pub next_offset: Option<u64>,
}

impl OrderPage {
	/// Whether some entries of the window were skipped.
	pub fn is_partial(&self) -> bool {
		!self.skipped.is_empty()
	}
}

/// Serializes an order to its stored representation.
pub fn encode_order(order: &Order) -> Result<Vec<u8>, OrderStoreError> {
	serde_json::to_vec(order).map_err(|e| OrderStoreError::Serialization(e.to_string()))
}

/// Inverse of [`encode_order`].
pub fn decode_order(bytes: &[u8]) -> Result<Order, OrderStoreError> {
	serde_json::from_slice(bytes).map_err(|e| OrderStoreError::Serialization(e.to_string()))
}

fn validate_id(id: OrderId) -> Result<(), OrderStoreError> {
	if id == 0 {
		return Err(OrderStoreError::Validation(
			"order_id must be non-zero".into(),
		));
	}
	Ok(())
}

/// Sorts index members by numeric order ID. Members that are not order keys
/// go last, in lexicographic order.
fn sort_index(members: &mut [String]) {
	members.sort_by_cached_key(|member| {
		let id = parse_order_key(member);
		(id.is_none(), id, member.clone())
	});
}

/// Repository of orders on top of a key-value backend.
///
/// Cheap to clone; clones share the backend.
#[derive(Clone)]
pub struct OrderStore {
	backend: Arc<dyn StorageInterface>,
}

impl OrderStore {
	pub fn new(backend: Arc<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	/// Stores a new order.
	///
	/// Fails with [`OrderStoreError::Duplicate`] when the ID is taken, in
	/// which case the stored order is left untouched.
	#[instrument(skip_all, fields(order_id = order.order_id))]
	pub async fn insert(&self, ctx: &OpContext, order: &Order) -> Result<(), OrderStoreError> {
		validate_id(order.order_id)?;
		let key = order_key(order.order_id);
		let bytes = encode_order(order)?;

		let result = self
			.backend
			.execute(
				ctx,
				Batch::new()
					.set_if_absent(&key, bytes)
					.set_add(StorageKey::OrderIndex.as_str(), &key),
			)
			.await?;

		if !result.applied(0) {
			tracing::debug!("Rejected insert of existing order");
			return Err(OrderStoreError::Duplicate(order.order_id));
		}

		tracing::debug!("Inserted order");
		Ok(())
	}

	/// Loads an order by ID.
	#[instrument(skip_all, fields(order_id = id))]
	pub async fn find_by_id(&self, ctx: &OpContext, id: OrderId) -> Result<Order, OrderStoreError> {
		validate_id(id)?;
		let key = order_key(id);

		let bytes = match self.backend.get_bytes(ctx, &key).await {
			Ok(bytes) => bytes,
			Err(StorageError::NotFound) => return Err(OrderStoreError::NotFound(id)),
			Err(e) => return Err(e.into()),
		};

		decode_order(&bytes).inspect_err(|e| {
			tracing::error!("Corrupt order record at {}: {}", key, e);
		})
	}

	/// Replaces an existing order. Never creates one.
	#[instrument(skip_all, fields(order_id = order.order_id))]
	pub async fn update(&self, ctx: &OpContext, order: &Order) -> Result<(), OrderStoreError> {
		validate_id(order.order_id)?;
		let key = order_key(order.order_id);
		let bytes = encode_order(order)?;

		if !self.backend.set_if_present(ctx, &key, bytes).await? {
			return Err(OrderStoreError::NotFound(order.order_id));
		}

		tracing::debug!("Updated order");
		Ok(())
	}

	/// Applies `updater` to the stored order and writes the result only if
	/// the record is unchanged since it was read.
	///
	/// When a concurrent write lands in between, the order is re-read and
	/// `updater` runs again on the newer record, so it may be called more
	/// than once. An error from `updater` aborts without writing.
	#[instrument(skip_all, fields(order_id = id))]
	pub async fn update_with<F>(
		&self,
		ctx: &OpContext,
		id: OrderId,
		mut updater: F,
	) -> Result<Order, OrderStoreError>
	where
		F: FnMut(&mut Order) -> Result<(), OrderStoreError>,
	{
		validate_id(id)?;
		let key = order_key(id);

		for attempt in 1..=MAX_UPDATE_ATTEMPTS {
			let current = match self.backend.get_bytes(ctx, &key).await {
				Ok(bytes) => bytes,
				Err(StorageError::NotFound) => return Err(OrderStoreError::NotFound(id)),
				Err(e) => return Err(e.into()),
			};
			let mut order = decode_order(&current).inspect_err(|e| {
				tracing::error!("Corrupt order record at {}: {}", key, e);
			})?;

			updater(&mut order)?;
			let bytes = encode_order(&order)?;

			if self
				.backend
				.set_if_equals(ctx, &key, current, bytes)
				.await?
			{
				tracing::debug!("Updated order");
				return Ok(order);
			}
			tracing::debug!(attempt, "Order changed concurrently, re-reading");
		}

		tracing::warn!("Giving up update after {} conflicting writes", MAX_UPDATE_ATTEMPTS);
		Err(OrderStoreError::Validation(format!(
			"order {} was modified concurrently",
			id
		)))
	}

	/// Deletes an order and its index entry.
	#[instrument(skip_all, fields(order_id = id))]
	pub async fn delete_by_id(&self, ctx: &OpContext, id: OrderId) -> Result<(), OrderStoreError> {
		validate_id(id)?;
		let key = order_key(id);

		// The index removal also runs when the value is missing, dropping any stale entry.
		let result = self
			.backend
			.execute(
				ctx,
				Batch::new()
					.delete(&key)
					.set_remove(StorageKey::OrderIndex.as_str(), &key),
			)
			.await?;

		if !result.applied(0) {
			if result.applied(1) {
				tracing::warn!("Removed stale index entry {} without a value", key);
			}
			return Err(OrderStoreError::NotFound(id));
		}

		tracing::debug!("Deleted order");
		Ok(())
	}

	/// Returns one page of orders, ordered by ascending order ID.
	///
	/// Index entries without a value, entries that are not order keys, and
	/// records that fail to decode are skipped and listed in
	/// [`OrderPage::skipped`]; they still count towards `size` and `offset`,
	/// so paging with `offset = k * size` visits every entry exactly once.
	#[instrument(skip_all, fields(size = page.size, offset = page.offset))]
	pub async fn find_all(
		&self,
		ctx: &OpContext,
		page: FindAllPage,
	) -> Result<OrderPage, OrderStoreError> {
		ctx.check()?;
		if page.size == 0 {
			return Ok(OrderPage::default());
		}

		let mut members = self
			.backend
			.set_members(ctx, StorageKey::OrderIndex.as_str())
			.await?;
		sort_index(&mut members);

		let total = members.len();
		let start = usize::try_from(page.offset).unwrap_or(usize::MAX).min(total);
		let end = usize::try_from(page.size)
			.unwrap_or(usize::MAX)
			.saturating_add(start)
			.min(total);
		let next_offset = (end < total).then_some(end as u64);

		let mut skipped = Vec::new();
		let mut wanted = Vec::with_capacity(end - start);
		for key in members.drain(start..end) {
			match parse_order_key(&key) {
				Some(id) => wanted.push((id, key)),
				None => {
					tracing::warn!("Index entry {} is not an order key", key);
					skipped.push(SkippedRecord {
						key,
						reason: SkipReason::InvalidKey,
					});
				},
			}
		}

		let keys: Vec<String> = wanted.iter().map(|(_, key)| key.clone()).collect();
		let values = if keys.is_empty() {
			Vec::new()
		} else {
			self.backend.get_many(ctx, &keys).await?
		};

		let mut orders = Vec::with_capacity(values.len());
		for ((id, key), value) in wanted.into_iter().zip(values) {
			let Some(bytes) = value else {
				tracing::warn!("Index entry {} has no stored order", key);
				skipped.push(SkippedRecord {
					key,
					reason: SkipReason::Missing,
				});
				continue;
			};

			match decode_order(&bytes) {
				Ok(order) if order.order_id == id => orders.push(order),
				Ok(order) => {
					let reason = format!("record holds order_id {}", order.order_id);
					tracing::error!("Corrupt order record at {}: {}", key, reason);
					skipped.push(SkippedRecord {
						key,
						reason: SkipReason::Corrupt(reason),
					});
				},
				Err(e) => {
					tracing::error!("Corrupt order record at {}: {}", key, e);
					skipped.push(SkippedRecord {
						key,
						reason: SkipReason::Corrupt(e.to_string()),
					});
				},
			}
		}

		if !skipped.is_empty() {
			tracing::warn!(
				"Returning partial page: {} of {} index entries skipped",
				skipped.len(),
				end - start
			);
		}

		Ok(OrderPage {
			orders,
			skipped,
			next_offset,
		})
	}
}
