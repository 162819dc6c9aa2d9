//! Per-operation cancellation and deadline.

use crate::StorageError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation token and optional deadline threaded through every backend
/// call of one repository operation.
///
/// Cloning shares the token, so cancelling any clone cancels them all.
#[derive(Debug, Clone, Default)]
pub struct OpContext {
	token: CancellationToken,
	deadline: Option<Instant>,
}

impl OpContext {
	/// A context that is never cancelled and has no deadline.
	pub fn new() -> Self {
		Self::default()
	}

	/// Wraps an existing token, typically a child of a shutdown token.
	pub fn with_token(token: CancellationToken) -> Self {
		Self {
			token,
			deadline: None,
		}
	}

	/// Sets the deadline `timeout` from now, keeping an earlier one if set.
	///
	/// A timeout too large to represent as an instant sets no deadline.
	pub fn with_timeout(self, timeout: Duration) -> Self {
		match Instant::now().checked_add(timeout) {
			Some(deadline) => self.with_deadline(deadline),
			None => self,
		}
	}

	/// Sets an absolute deadline, keeping an earlier one if set.
	pub fn with_deadline(mut self, deadline: Instant) -> Self {
		self.deadline = Some(match self.deadline {
			Some(current) => current.min(deadline),
			None => deadline,
		});
		self
	}

	pub fn token(&self) -> &CancellationToken {
		&self.token
	}

	pub fn deadline(&self) -> Option<Instant> {
		self.deadline
	}

	pub fn cancel(&self) {
		self.token.cancel();
	}

	/// Fails fast when the operation must not start any I/O.
	pub fn check(&self) -> Result<(), StorageError> {
		if self.token.is_cancelled() {
			return Err(StorageError::Cancelled);
		}
		if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
			return Err(StorageError::Timeout);
		}
		Ok(())
	}

	/// Runs `fut` until it completes, the token is cancelled, or the deadline
	/// passes, whichever comes first.
	///
	/// Only use this for futures that are safe to drop half-way, i.e. reads.
	pub async fn run<F, T>(&self, fut: F) -> Result<T, StorageError>
	where
		F: Future<Output = Result<T, StorageError>>,
	{
		self.check()?;
		tokio::select! {
			biased;
			_ = self.token.cancelled() => Err(StorageError::Cancelled),
			_ = sleep_until(self.deadline) => Err(StorageError::Timeout),
			result = fut => result,
		}
	}
}

async fn sleep_until(deadline: Option<Instant>) {
	match deadline {
		Some(deadline) => tokio::time::sleep_until(deadline).await,
		None => std::future::pending::<()>().await,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_fresh_context_passes() {
		let ctx = OpContext::new();
		assert!(ctx.check().is_ok());
		assert_eq!(ctx.run(async { Ok(7) }).await.unwrap(), 7);
	}

	#[tokio::test]
	async fn test_cancelled_context_fails_fast() {
		let ctx = OpContext::new();
		ctx.cancel();
		assert!(matches!(ctx.check(), Err(StorageError::Cancelled)));

		let polled = std::cell::Cell::new(false);
		let result = ctx
			.run(async {
				polled.set(true);
				Ok(())
			})
			.await;
		assert!(matches!(result, Err(StorageError::Cancelled)));
		assert!(!polled.get());
	}

	#[tokio::test]
	async fn test_clone_shares_cancellation() {
		let ctx = OpContext::new();
		let clone = ctx.clone();
		clone.cancel();
		assert!(ctx.token().is_cancelled());
	}

	#[tokio::test(start_paused = true)]
	async fn test_deadline_interrupts_pending_future() {
		let ctx = OpContext::new().with_timeout(Duration::from_millis(50));
		let result: Result<(), _> = ctx.run(std::future::pending()).await;
		assert!(matches!(result, Err(StorageError::Timeout)));
		assert!(matches!(ctx.check(), Err(StorageError::Timeout)));
	}

	#[tokio::test(start_paused = true)]
	async fn test_earlier_deadline_wins() {
		let ctx = OpContext::new()
			.with_timeout(Duration::from_secs(1))
			.with_timeout(Duration::from_secs(60));
		let remaining = ctx.deadline().unwrap() - Instant::now();
		assert!(remaining <= Duration::from_secs(1));
	}

	#[tokio::test]
	async fn test_unrepresentable_timeout_sets_no_deadline() {
		let ctx = OpContext::new().with_timeout(Duration::MAX);
		assert!(ctx.deadline().is_none());
		assert!(ctx.check().is_ok());
		assert_eq!(ctx.run(async { Ok(1) }).await.unwrap(), 1);

		let bounded = OpContext::new()
			.with_timeout(Duration::from_secs(5))
			.with_timeout(Duration::from_secs(u64::MAX));
		assert!(bounded.deadline().is_some());
	}

	#[tokio::test]
	async fn test_cancellation_interrupts_pending_future() {
		let ctx = OpContext::new();
		let canceller = ctx.clone();
		tokio::spawn(async move {
			tokio::time::sleep(Duration::from_millis(10)).await;
			canceller.cancel();
		});
		let result: Result<(), _> = ctx.run(std::future::pending()).await;
		assert!(matches!(result, Err(StorageError::Cancelled)));
	}
}
