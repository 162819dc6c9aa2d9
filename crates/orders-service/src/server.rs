//! HTTP server for the orders API.

use crate::apis::order;
use axum::{extract::DefaultBodyLimit, routing::get, Router};
use orders_config::ApiConfig;
use orders_core::OrderLifecycle;
use orders_storage::OpContext;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	pub lifecycle: OrderLifecycle,
	pub api: ApiConfig,
	/// Cancelled on shutdown; every request context is a child of it.
	pub shutdown: CancellationToken,
}

impl AppState {
	/// Context for one request: cancelled on shutdown, bounded by the API timeout.
	pub fn request_context(&self) -> OpContext {
		OpContext::with_token(self.shutdown.child_token())
			.with_timeout(Duration::from_secs(self.api.timeout_seconds))
	}
}

/// Builds the router with all order routes.
pub fn router(state: AppState) -> Router {
	let body_limit = state.api.max_request_size;

	Router::new()
		.route("/orders", get(order::list_orders).post(order::create_order))
		.route(
			"/orders/{id}",
			get(order::get_order)
				.put(order::update_order)
				.delete(order::delete_order),
		)
		.layer(
			ServiceBuilder::new()
				.layer(TraceLayer::new_for_http())
				.layer(CorsLayer::permissive())
				.layer(DefaultBodyLimit::max(body_limit)),
		)
		.with_state(state)
}

/// Serves the API until `shutdown` is cancelled, then drains in-flight requests.
pub async fn start_server(
	api_config: ApiConfig,
	lifecycle: OrderLifecycle,
	shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let app = router(AppState {
		lifecycle,
		api: api_config,
		shutdown: shutdown.clone(),
	});

	let listener = TcpListener::bind(&bind_address).await?;
	tracing::info!("Orders API server starting on {}", bind_address);

	axum::serve(listener, app)
		.with_graceful_shutdown(async move { shutdown.cancelled().await })
		.await?;

	tracing::info!("Orders API server stopped");
	Ok(())
}
