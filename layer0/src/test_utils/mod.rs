//! In-memory implementations for testing.
//!
//! Available behind the `test-utils` feature flag. These are minimal
//! implementations that prove the trait APIs are usable.

mod echo_operator;
mod in_memory_store;

pub use echo_operator::EchoOperator;
pub use in_memory_store::InMemoryStore;
