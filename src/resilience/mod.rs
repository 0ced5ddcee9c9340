//! Failure-tolerance primitives shared by the storage and source layers.

pub mod retry;

pub use retry::{retry, RetryConfig, RetryError};
