//! Common types for the orders service.
//!
//! Defines the order entity, the persisted key layout, API payloads and the
//! configuration validation primitives shared by the other crates.

/// API types for HTTP endpoints and request/response structures.
pub mod api;
/// Order entity and its status.
pub mod order;
/// Self-registration trait for pluggable implementations.
pub mod registry;
/// Storage key layout.
pub mod storage;
/// Configuration validation types for backend settings.
pub mod validation;

pub use api::*;
pub use order::*;
pub use registry::ImplementationRegistry;
pub use storage::*;
pub use validation::*;
