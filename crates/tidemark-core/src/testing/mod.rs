//! Testing utilities for Tidemark.
//!
//! Provides an in-memory store implementing both store traits, and a
//! configurable migration unit that records how it was invoked.
//!
//! # Example
//!
//! ```ignore
//! let store = MemoryStore::new();
//! let history = store.history("migration_history");
//! let unit = RecordingMigration::new("20160318110710", "test_namespace")
//!     .creates_table(spec);
//! ```

mod memory;
mod units;

pub use memory::{MemoryHistory, MemoryStore};
pub use units::{InvocationLog, RecordingMigration};
