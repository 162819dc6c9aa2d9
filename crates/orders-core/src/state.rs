//! Order creation and status transitions.
//!
//! Wraps an [`OrderStore`] with the rules the HTTP API applies on top of
//! plain persistence: server-assigned IDs, creation timestamps, and the
//! `new -> shipped -> completed` status machine.

use crate::store::{OrderStore, OrderStoreError};
use chrono::Utc;
use orders_storage::OpContext;
use orders_types::{LineItem, Order, OrderId, OrderStatus};
use rand::Rng;
use std::sync::Arc;
use uuid::Uuid;

/// Attempts at drawing a fresh ID before giving up on a create.
const MAX_ID_ATTEMPTS: usize = 3;

type IdSource = Arc<dyn Fn() -> OrderId + Send + Sync>;

fn random_order_id() -> OrderId {
	rand::rng().random_range(1..=OrderId::MAX)
}

/// Checks whether an order may move from `from` to `to`.
pub fn check_transition(from: OrderStatus, to: OrderStatus) -> Result<(), OrderStoreError> {
	match (from, to) {
		(OrderStatus::New, OrderStatus::Shipped) | (OrderStatus::Shipped, OrderStatus::Completed) => {
			Ok(())
		},
		_ => Err(OrderStoreError::Validation(format!(
			"InvalidTransition: cannot move order from {} to {}",
			from, to
		))),
	}
}

/// Creates orders and drives their status changes.
#[derive(Clone)]
pub struct OrderLifecycle {
	store: OrderStore,
	id_source: IdSource,
}

impl OrderLifecycle {
	pub fn new(store: OrderStore) -> Self {
		Self {
			store,
			id_source: Arc::new(random_order_id),
		}
	}

	/// Replaces the random ID generator. Zero results are rejected by the store.
	pub fn with_id_source<F>(mut self, source: F) -> Self
	where
		F: Fn() -> OrderId + Send + Sync + 'static,
	{
		self.id_source = Arc::new(source);
		self
	}

	pub fn store(&self) -> &OrderStore {
		&self.store
	}

	/// Creates a new order with a fresh ID, status `new` and `created_at` now.
	///
	/// An ID collision is retried with a new ID a bounded number of times.
	pub async fn place_order(
		&self,
		ctx: &OpContext,
		customer_id: Uuid,
		line_items: Vec<LineItem>,
	) -> Result<Order, OrderStoreError> {
		if let Some(item) = line_items.iter().find(|item| item.quantity == 0) {
			return Err(OrderStoreError::Validation(format!(
				"line item {} has zero quantity",
				item.item_id
			)));
		}

		let mut order = Order::new(0, customer_id, line_items);
		order.created_at = Some(Utc::now());

		let mut last_err = None;
		for _ in 0..MAX_ID_ATTEMPTS {
			order.order_id = (self.id_source)();
			match self.store.insert(ctx, &order).await {
				Ok(()) => return Ok(order),
				Err(OrderStoreError::Duplicate(id)) => {
					tracing::warn!(order_id = id, "Generated order ID already taken, retrying");
					last_err = Some(OrderStoreError::Duplicate(id));
				},
				Err(e) => return Err(e),
			}
		}

		Err(last_err.unwrap_or(OrderStoreError::Duplicate(order.order_id)))
	}

	/// Moves an order to `status`, stamping the matching timestamp.
	///
	/// The check and the write are one compare-and-set on the stored record,
	/// so a transition decided on a status that has since changed is
	/// re-checked against the newer status instead of overwriting it.
	pub async fn transition(
		&self,
		ctx: &OpContext,
		id: OrderId,
		status: OrderStatus,
	) -> Result<Order, OrderStoreError> {
		let order = self
			.store
			.update_with(ctx, id, |order| {
				check_transition(order.status, status)?;
				let now = Utc::now();
				match status {
					OrderStatus::Shipped => order.shipped_at = Some(now),
					OrderStatus::Completed => order.completed_at = Some(now),
					OrderStatus::New => {},
				}
				order.status = status;
				Ok(())
			})
			.await?;

		tracing::info!(order_id = id, status = %status, "Order status changed");
		Ok(order)
	}
}
