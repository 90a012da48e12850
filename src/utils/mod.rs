//! Utility functions.
//!
//! Stateless helpers used by applications hosting switchyard.

pub mod bootstrap;

pub use bootstrap::{connect_with_retry, init_tracing, try_init_tracing, RetryPolicy};
