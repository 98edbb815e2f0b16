//! # reldb Testkit
//!
//! Test utilities for reldb.
//!
//! This crate provides:
//! - [`TestStore`]: in-memory or temp-directory stores of the sample [`Task`] entry
//! - [`MemoryLedger`]: an in-memory [`Ledger`](reldb_core::Ledger)
//! - proptest strategies for tasks and relationship sets
//! - [`init_test_logging`]: a `tracing` subscriber for tests
//!
//! ## Usage
//!
//! ```rust
//! use reldb_testkit::prelude::*;
//!
//! let store = TestStore::memory();
//! let task = store.new(Task::new("write docs").user("ana")).unwrap();
//! assert_eq!(store.get(task.id()).unwrap().title, "write docs");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod ledger;

use std::sync::Once;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::init_test_logging;
    pub use crate::ledger::*;
    pub use reldb_core::{Context, CoreError, Entry, Filter, IteratingOpts};
}

pub use fixtures::*;
pub use generators::*;
pub use ledger::*;

static LOGGING: Once = Once::new();

/// Installs a `tracing` subscriber that writes to the test output.
///
/// Honours `RUST_LOG` and defaults to `warn`. Safe to call from every test.
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
