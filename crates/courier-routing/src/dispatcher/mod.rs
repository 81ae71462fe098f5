//! Resilient dispatch: classification, candidate selection, retries with
//! backoff, per-attempt timeouts, overall deadlines and fallover.
//!
//! A dispatch walks the candidate chain of its primary backend in order.
//! Each candidate gets up to `max_retries` attempts; retryable failures back
//! off exponentially, non-retryable ones move straight to the next candidate.
//! Unhealthy candidates are passed over unless they are the last one left.

/// Dispatcher and its builder
pub mod dispatch;
/// Backoff policy and deadline accounting
pub mod retry;

pub use dispatch::{
    DispatchReply, DispatchRequest, Dispatcher, DispatcherBuilder, Target, open_store,
};
pub use retry::{Deadline, RetryPolicy};
