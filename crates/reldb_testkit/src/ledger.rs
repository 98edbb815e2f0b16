//! An in-memory history ledger.

use parking_lot::Mutex;
use reldb_core::{Block, CoreResult, Ledger};
use std::sync::Arc;

/// Keeps blocks in a shared vector. Block `i` has index `i + 1`.
///
/// Clones share the same blocks, so one ledger can feed a primary store and
/// its mirrors.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    blocks: Arc<Mutex<Vec<Block>>>,
}

impl MemoryLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of blocks.
    pub fn len(&self) -> usize {
        self.blocks.lock().len()
    }

    /// Returns true if no block was appended.
    pub fn is_empty(&self) -> bool {
        self.blocks.lock().is_empty()
    }

    /// Returns a copy of every block.
    pub fn blocks(&self) -> Vec<Block> {
        self.blocks.lock().clone()
    }

    /// Returns this ledger as a shareable trait object.
    pub fn shared(&self) -> Arc<dyn Ledger> {
        Arc::new(self.clone())
    }
}

impl Ledger for MemoryLedger {
    fn append(&self, block: &Block) -> CoreResult<u64> {
        let mut blocks = self.blocks.lock();
        blocks.push(block.clone());
        Ok(blocks.len() as u64)
    }

    fn blocks_after(&self, after: Option<u64>) -> CoreResult<Vec<(u64, Block)>> {
        let skip = after.map_or(0, |index| usize::try_from(index).unwrap_or(usize::MAX));
        Ok(self
            .blocks
            .lock()
            .iter()
            .enumerate()
            .skip(skip)
            .map(|(i, block)| (i as u64 + 1, block.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reldb_core::Action;

    #[test]
    fn indices_start_at_one() {
        let ledger = MemoryLedger::new();
        let first = ledger.append(&Block::default()).unwrap();
        let second = ledger
            .append(&Block {
                actions: vec![Action::delete("000000000001")],
            })
            .unwrap();
        assert_eq!((first, second), (1, 2));

        let after_first = ledger.blocks_after(Some(1)).unwrap();
        assert_eq!(after_first.len(), 1);
        assert_eq!(after_first[0].0, 2);
        assert_eq!(ledger.blocks_after(None).unwrap().len(), 2);
        assert!(ledger.blocks_after(Some(2)).unwrap().is_empty());
    }
}
