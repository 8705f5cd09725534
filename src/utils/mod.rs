//! Utility modules.

pub mod retry;
pub mod text;

pub use retry::{RetryPolicy, RetryResult, Retryable, with_retry};
pub use text::{char_len, is_blank};
