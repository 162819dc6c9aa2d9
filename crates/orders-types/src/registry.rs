//! Self-registration of pluggable implementations.

/// Declares the configuration name and factory of an implementation.
///
/// Every storage backend module exposes a `Registry` type implementing this
/// trait, so the service can map `[storage.implementations.<NAME>]` tables
/// to a constructor without a hand-maintained match.
pub trait ImplementationRegistry {
	/// Name used in configuration files, e.g. `"memory"` or `"file"`.
	const NAME: &'static str;

	/// Factory function type produced by this implementation.
	type Factory;

	fn factory() -> Self::Factory;
}
