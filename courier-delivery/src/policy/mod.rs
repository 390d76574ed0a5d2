//! Policy abstractions for delivery operations.
//!
//! - [`RetryPolicy`]: decides whether a queued email gets another pass and
//!   how long it waits before it

pub mod retry;

pub use retry::RetryPolicy;
