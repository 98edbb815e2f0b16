//! # reldb Core
//!
//! A transactional record store that keeps secondary "relationship" indexes
//! for its entries and queries them through composable filter cursors.
//!
//! This crate provides:
//! - [`Store`]: typed entries, one-shot operations, transactions and batches
//! - [`Transaction`]: writes that maintain the relationship index, filtered
//!   iteration with resumable pagination, and record cursors
//! - [`Filter`] and the [`FilterCursor`] family: match, inverse match and
//!   comparison filters combined by conjunction
//! - [`Context`]: cancellation, deadlines and idle ("touch") timeouts raced
//!   against running transactions
//! - [`Ledger`]: hooks for an append-only history and read-only mirrors
//!
//! ## Layout
//!
//! ```text
//! entries/<entry id>                                -> encoded entry
//! relationships/<key>/<relationship id>/<entry id>  -> (empty)
//! meta/index, meta/last_block                       -> counters
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod config;
mod context;
pub mod cursor;
#[cfg(feature = "std")]
mod dir;
mod entry;
mod error;
mod filter;
mod history;
mod meta;
mod query;
mod relationships;
mod store;
mod transaction;

pub use config::Config;
pub use context::{CancelReason, Context, ContextContainer, Listener};
pub use cursor::{new_filter_cursor, new_multi_cursor, FilterCursor, SeekToken};
pub use entry::{format_id, parse_id, Entry, EntryMeta, Relationships};
pub use error::{CoreError, CoreResult};
pub use filter::{Filter, Predicate};
pub use history::{process_block, Action, ActionKind, Block, Ledger};
pub use query::{Cursor, IdCursor, IteratingOpts};
pub use relationships::{IndexDelta, RelationshipIndex};
pub use store::{Stats, Store};
pub use transaction::Transaction;

pub use reldb_codec::{CborCodec, Codec, EncryptedCodec, EncryptionKey, JsonCodec};
