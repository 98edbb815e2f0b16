//! Hooks for an append-only history ledger.
//!
//! A [`Ledger`] receives one [`Block`] per committed write transaction and
//! hands blocks back so another store, or the same store after a restart,
//! can catch up. The ledger's own storage and transport are up to the
//! implementation.

use crate::entry::Entry;
use crate::error::CoreResult;
use crate::transaction::Transaction;
use reldb_codec::Codec;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// What an [`Action`] does to its entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    /// Store `value` as the entry.
    Write,
    /// Remove the entry.
    Delete,
}

/// A single entry mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Mutation kind.
    pub kind: ActionKind,
    /// Entry ID.
    pub key: String,
    /// Encoded entry for writes, empty for deletes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub value: Vec<u8>,
}

impl Action {
    /// Creates a write action.
    pub fn write(key: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            kind: ActionKind::Write,
            key: key.into(),
            value,
        }
    }

    /// Creates a delete action.
    pub fn delete(key: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Delete,
            key: key.into(),
            value: Vec::new(),
        }
    }
}

/// The actions of one committed transaction, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Actions in commit order.
    pub actions: Vec<Action>,
}

/// Append-only block storage.
pub trait Ledger: Send + Sync {
    /// Appends a block and returns its index. Indices increase strictly.
    fn append(&self, block: &Block) -> CoreResult<u64>;

    /// Returns the blocks after `after` in index order, or every block for
    /// `None`.
    fn blocks_after(&self, after: Option<u64>) -> CoreResult<Vec<(u64, Block)>>;
}

/// Re-applies `block` inside `tx`.
///
/// Writes go through the relationship index as upserts; deletes of entries
/// that are already gone are skipped. The replayed actions are not recorded
/// again.
pub fn process_block<T: Entry, C: Codec>(tx: &mut Transaction<T, C>, block: &Block) -> CoreResult<()> {
    let recording = tx.set_record_history(false);
    let result = block.actions.iter().try_for_each(|action| match action.kind {
        ActionKind::Write => tx.replay_write(&action.key, &action.value),
        ActionKind::Delete => tx.replay_delete(&action.key),
    });
    tx.set_record_history(recording);
    result?;
    trace!(actions = block.actions.len(), "block applied");
    Ok(())
}

/// Applies block `index` unless the store has already seen it, and records
/// it as the last applied block. Returns whether the block was applied.
pub(crate) fn apply_block<T: Entry, C: Codec>(
    tx: &mut Transaction<T, C>,
    index: u64,
    block: &Block,
) -> CoreResult<bool> {
    if tx.last_block()?.is_some_and(|last| index <= last) {
        return Ok(false);
    }
    process_block(tx, block)?;
    tx.mark_block(index)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delete_action_serializes_without_value() {
        let json = serde_json::to_string(&Action::delete("000000000001")).unwrap();
        assert_eq!(json, r#"{"kind":"delete","key":"000000000001"}"#);
    }

    #[test]
    fn block_round_trips_through_json() {
        let block = Block {
            actions: vec![Action::write("1", b"{}".to_vec()), Action::delete("2")],
        };
        let json = serde_json::to_vec(&block).unwrap();
        let back: Block = serde_json::from_slice(&json).unwrap();
        assert_eq!(back, block);
    }
}
