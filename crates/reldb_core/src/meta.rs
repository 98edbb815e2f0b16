//! Bucket layout and the metadata namespace.
//!
//! ```text
//! entries/<entry id>                                -> encoded entry
//! relationships/<key>/<relationship id>/<entry id>  -> (empty)
//! meta/index                                        -> next ID counter
//! meta/last_block                                   -> last applied ledger block
//! ```

use crate::error::{CoreError, CoreResult};
use reldb_storage::{View, WriteTx};

/// Primary entry bucket.
pub(crate) const ENTRIES: &str = "entries";
/// Root of the relationship index buckets.
pub(crate) const RELATIONSHIPS: &str = "relationships";
/// Metadata bucket.
pub(crate) const META: &str = "meta";

const INDEX_KEY: &[u8] = b"index";
const LAST_BLOCK_KEY: &[u8] = b"last_block";

/// Creates the fixed buckets and one index bucket per relationship key.
pub(crate) fn initialize(tx: &mut WriteTx, keys: &[String]) -> CoreResult<()> {
    tx.create_bucket_if_missing(&[ENTRIES])?;
    tx.create_bucket_if_missing(&[META])?;
    let mut relationships = tx.create_bucket_if_missing(&[RELATIONSHIPS])?;
    for key in keys {
        relationships.create_bucket_if_missing(key.as_bytes())?;
    }
    Ok(())
}

/// Returns the next ID counter value.
pub(crate) fn next_index<V: View>(view: &V) -> CoreResult<u64> {
    read_u64(view, INDEX_KEY).map(Option::unwrap_or_default)
}

/// Stores the next ID counter value.
pub(crate) fn set_next_index(tx: &mut WriteTx, index: u64) -> CoreResult<()> {
    write_u64(tx, INDEX_KEY, index)
}

/// Returns the last ledger block applied to this store.
pub(crate) fn last_block<V: View>(view: &V) -> CoreResult<Option<u64>> {
    read_u64(view, LAST_BLOCK_KEY)
}

/// Records the last ledger block applied to this store.
pub(crate) fn store_meta(tx: &mut WriteTx, block: u64) -> CoreResult<()> {
    write_u64(tx, LAST_BLOCK_KEY, block)
}

fn read_u64<V: View>(view: &V, key: &[u8]) -> CoreResult<Option<u64>> {
    let meta = view
        .bucket(&[META])
        .ok_or_else(|| CoreError::not_initialized(META))?;
    let Some(raw) = meta.get(key) else {
        return Ok(None);
    };
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Some)
        .ok_or_else(|| {
            CoreError::invalid_operation(format!(
                "meta/{} holds a non-numeric value",
                String::from_utf8_lossy(key)
            ))
        })
}

fn write_u64(tx: &mut WriteTx, key: &[u8], value: u64) -> CoreResult<()> {
    let mut meta = tx
        .bucket_mut(&[META])?
        .ok_or_else(|| CoreError::not_initialized(META))?;
    meta.put(key, value.to_string().as_bytes())?;
    Ok(())
}
