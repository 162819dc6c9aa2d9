//! Order persistence and lifecycle on top of a key-value backend.
//!
//! [`OrderStore`] maps orders onto the backend's keys and the `orders` index
//! set; [`OrderLifecycle`] adds ID assignment and status transitions.

pub mod state;
pub mod store;

pub use state::{check_transition, OrderLifecycle};
pub use store::{
	decode_order, encode_order, FindAllPage, OrderPage, OrderStore, OrderStoreError, SkipReason,
	SkippedRecord,
};
