//! Order entity persisted by the order store.
//!
//! Everything apart from [`Order::order_id`] is opaque to the storage layer;
//! it is serialized as a whole and written under the order's key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Caller-assigned order identifier.
///
/// Zero is reserved and rejected by every store operation.
pub type OrderId = u64;

/// A customer order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
	/// Unique identifier, immutable once inserted.
	pub order_id: OrderId,
	/// Customer that placed the order.
	pub customer_id: Uuid,
	/// Items purchased in this order.
	#[serde(default)]
	pub line_items: Vec<LineItem>,
	/// Current fulfilment status.
	#[serde(default)]
	pub status: OrderStatus,
	/// When the order was created.
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub created_at: Option<DateTime<Utc>>,
	/// When the order was shipped.
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub shipped_at: Option<DateTime<Utc>>,
	/// When the order was completed.
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub completed_at: Option<DateTime<Utc>>,
}

impl Order {
	/// Creates a new order in the `new` state with no timestamps set.
	pub fn new(order_id: OrderId, customer_id: Uuid, line_items: Vec<LineItem>) -> Self {
		Self {
			order_id,
			customer_id,
			line_items,
			status: OrderStatus::New,
			created_at: None,
			shipped_at: None,
			completed_at: None,
		}
	}

	/// Total price of all line items.
	pub fn total(&self) -> u64 {
		self.line_items
			.iter()
			.map(|item| item.price.saturating_mul(item.quantity as u64))
			.fold(0u64, u64::saturating_add)
	}
}

/// A single purchased item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
	pub item_id: Uuid,
	pub quantity: u32,
	/// Unit price in minor currency units.
	pub price: u64,
}

/// Fulfilment status of an order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
	#[default]
	New,
	Shipped,
	Completed,
}

impl OrderStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			OrderStatus::New => "new",
			OrderStatus::Shipped => "shipped",
			OrderStatus::Completed => "completed",
		}
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for OrderStatus {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"new" => Ok(Self::New),
			"shipped" => Ok(Self::Shipped),
			"completed" => Ok(Self::Completed),
			other => Err(format!("unknown order status: {}", other)),
		}
	}
}
