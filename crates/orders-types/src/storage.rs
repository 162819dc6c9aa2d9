//! Storage key layout for persisted orders.
//!
//! Keys and the index set name are part of the persisted format. Changing
//! either makes existing data unreachable without a migration.

use crate::OrderId;

/// Namespaces used by the order store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Prefix of per-order value keys.
	Order,
	/// Name of the set holding the key of every existing order.
	OrderIndex,
}

impl StorageKey {
	/// Returns the string representation of the storage key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Order => "order",
			StorageKey::OrderIndex => "orders",
		}
	}
}

/// Encodes an order ID as its storage key, `order:<decimal-id>`.
pub fn order_key(id: OrderId) -> String {
	format!("{}:{}", StorageKey::Order.as_str(), id)
}

/// Inverse of [`order_key`].
///
/// Only canonical decimal encodings are accepted, so `order:007` and
/// `order:+7` are rejected even though they parse as integers.
pub fn parse_order_key(key: &str) -> Option<OrderId> {
	let digits = key
		.strip_prefix(StorageKey::Order.as_str())?
		.strip_prefix(':')?;
	let id: OrderId = digits.parse().ok()?;
	(id.to_string() == digits).then_some(id)
}
