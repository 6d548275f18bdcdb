//! Data store backends.
//!
//! The in-memory store used by tests lives in `tidemark_core::testing`.

mod dynamodb;

pub use dynamodb::{DynamoHistory, DynamoStore};
