//! Order endpoints.
//!
//! Thin handlers that translate HTTP requests into [`OrderLifecycle`] and
//! [`OrderStore`](orders_core::OrderStore) calls and map the typed store
//! errors onto status codes.

use crate::server::AppState;
use axum::{
	extract::{
		rejection::{JsonRejection, QueryRejection},
		Path, Query, State,
	},
	http::StatusCode,
	response::Json,
};
use orders_core::{FindAllPage, OrderStoreError};
use orders_storage::StorageError;
use orders_types::{
	APIError, CreateOrderRequest, ListOrdersQuery, ListOrdersResponse, Order, OrderId,
	UpdateOrderRequest,
};
use tracing::{info, warn};

/// Page size used when a listing does not ask for one.
pub const DEFAULT_PAGE_SIZE: u64 = 50;

/// Maps a store error onto the API error returned to the client.
///
/// Storage failures are logged here and replaced by a generic message.
pub fn map_store_error(err: OrderStoreError) -> APIError {
	match err {
		OrderStoreError::Validation(message) => APIError::BadRequest {
			error_type: "INVALID_REQUEST".to_string(),
			message,
		},
		OrderStoreError::NotFound(id) => APIError::NotFound {
			error_type: "ORDER_NOT_FOUND".to_string(),
			message: format!("Order {} not found", id),
		},
		OrderStoreError::Duplicate(id) => APIError::Conflict {
			error_type: "ORDER_EXISTS".to_string(),
			message: format!("Order {} already exists", id),
		},
		OrderStoreError::Backend(StorageError::Timeout | StorageError::Cancelled) => {
			warn!("Order request did not finish before its deadline");
			APIError::ServiceUnavailable {
				error_type: "REQUEST_TIMEOUT".to_string(),
				message: "Request could not be completed in time".to_string(),
			}
		},
		e @ (OrderStoreError::Serialization(_) | OrderStoreError::Backend(_)) => {
			tracing::error!("Order storage failure: {}", e);
			APIError::InternalServerError {
				error_type: "INTERNAL_ERROR".to_string(),
				message: "Internal server error".to_string(),
			}
		},
	}
}

fn bad_request(message: String) -> APIError {
	APIError::BadRequest {
		error_type: "INVALID_REQUEST".to_string(),
		message,
	}
}

/// Parses the `{id}` path segment.
fn parse_order_id(raw: &str) -> Result<OrderId, APIError> {
	raw.parse::<OrderId>()
		.map_err(|_| bad_request(format!("Order ID must be a positive integer: {}", raw)))
}

/// Handles POST /orders.
pub async fn create_order(
	State(state): State<AppState>,
	body: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Order>), APIError> {
	let Json(request) = body.map_err(|e| bad_request(e.body_text()))?;
	let ctx = state.request_context();

	let order = state
		.lifecycle
		.place_order(&ctx, request.customer_id, request.line_items)
		.await
		.map_err(map_store_error)?;

	info!(
		order_id = order.order_id,
		items = order.line_items.len(),
		total = order.total(),
		"Created order"
	);
	Ok((StatusCode::CREATED, Json(order)))
}

/// Handles GET /orders.
pub async fn list_orders(
	State(state): State<AppState>,
	query: Result<Query<ListOrdersQuery>, QueryRejection>,
) -> Result<Json<ListOrdersResponse>, APIError> {
	let Query(query) = query.map_err(|e| bad_request(e.body_text()))?;
	let page = FindAllPage {
		size: query
			.size
			.unwrap_or(DEFAULT_PAGE_SIZE)
			.min(state.api.max_page_size),
		offset: query.offset.unwrap_or(0),
	};
	let ctx = state.request_context();

	let result = state
		.lifecycle
		.store()
		.find_all(&ctx, page)
		.await
		.map_err(map_store_error)?;

	if result.is_partial() {
		warn!(
			skipped = result.skipped.len(),
			offset = page.offset,
			"Listing returned a partial page"
		);
	}

	Ok(Json(ListOrdersResponse {
		items: result.orders,
		next_offset: result.next_offset,
	}))
}

/// Handles GET /orders/{id}.
pub async fn get_order(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<Json<Order>, APIError> {
	let id = parse_order_id(&id)?;
	let ctx = state.request_context();

	let order = state
		.lifecycle
		.store()
		.find_by_id(&ctx, id)
		.await
		.map_err(map_store_error)?;
	Ok(Json(order))
}

/// Handles PUT /orders/{id}, moving the order to the requested status.
pub async fn update_order(
	State(state): State<AppState>,
	Path(id): Path<String>,
	body: Result<Json<UpdateOrderRequest>, JsonRejection>,
) -> Result<Json<Order>, APIError> {
	let id = parse_order_id(&id)?;
	let Json(request) = body.map_err(|e| bad_request(e.body_text()))?;
	let ctx = state.request_context();

	let order = state
		.lifecycle
		.transition(&ctx, id, request.status)
		.await
		.map_err(map_store_error)?;
	Ok(Json(order))
}

/// Handles DELETE /orders/{id}.
pub async fn delete_order(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<StatusCode, APIError> {
	let id = parse_order_id(&id)?;
	let ctx = state.request_context();

	state
		.lifecycle
		.store()
		.delete_by_id(&ctx, id)
		.await
		.map_err(map_store_error)?;

	info!(order_id = id, "Deleted order");
	Ok(StatusCode::NO_CONTENT)
}
