//! Courier: an email delivery service that fails over between providers
//!
//! The [`controller::Courier`] value is deserialized from the configuration
//! file and wires the delivery engine to its HTTP front end and retry
//! processor.

pub mod controller;

pub use controller::{Courier, Running};
