//! Model-client decorators for Reflace.
//!
//! All decorators implement `reflace_core::ModelClient` and wrap another
//! client, so they compose with whatever backend the host supplies.

pub mod retry;

pub use retry::RetryingClient;
