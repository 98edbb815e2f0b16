//! Commit log framing.
//!
//! ```text
//! | length (4, LE) | crc32 (4, LE) | CBOR payload (length bytes) |
//! ```
//!
//! A payload is the ordered list of [`LogOp`]s of one committed transaction.
//!
//! ## Recovery policy
//!
//! - A trailing frame whose header or payload is cut short is a torn write:
//!   replay stops there and the tail is discarded.
//! - A CRC mismatch or undecodable payload is corruption and fails recovery.

use crate::bucket::{Bucket, Node};
use crate::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};

/// Size of the frame header in bytes.
pub const FRAME_HEADER_SIZE: usize = 8;

/// One mutation recorded by a write transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogOp {
    /// Create every missing bucket along `path`.
    CreateBucket {
        /// Bucket path from the root.
        path: Vec<Vec<u8>>,
    },
    /// Remove the nested bucket `key` inside the bucket at `path`.
    DeleteBucket {
        /// Parent bucket path.
        path: Vec<Vec<u8>>,
        /// Name of the nested bucket.
        key: Vec<u8>,
    },
    /// Store `value` under `key` in the bucket at `path`.
    Put {
        /// Bucket path.
        path: Vec<Vec<u8>>,
        /// Key.
        key: Vec<u8>,
        /// Value.
        value: Vec<u8>,
    },
    /// Remove `key` from the bucket at `path`.
    Delete {
        /// Bucket path.
        path: Vec<Vec<u8>>,
        /// Key.
        key: Vec<u8>,
    },
}

impl LogOp {
    /// Applies this operation to a tree.
    pub fn apply(&self, root: &mut Bucket) -> StorageResult<()> {
        match self {
            Self::CreateBucket { path } => {
                root.descend_mut(path, true)?;
            }
            Self::DeleteBucket { path, key } => {
                if let Some(parent) = root.descend_mut(path, false)? {
                    parent.delete_bucket(path, key)?;
                }
            }
            Self::Put { path, key, value } => {
                let bucket = root
                    .descend_mut(path, false)?
                    .ok_or_else(|| StorageError::bucket_not_found(path))?;
                bucket.put(path, key, value)?;
            }
            Self::Delete { path, key } => {
                if let Some(bucket) = root.descend_mut(path, false)? {
                    bucket.delete(path, key)?;
                }
            }
        }
        Ok(())
    }
}

/// Encodes a list of operations as one frame.
pub fn encode_frame(ops: &[LogOp]) -> StorageResult<Vec<u8>> {
    let mut payload = Vec::new();
    ciborium::ser::into_writer(ops, &mut payload)
        .map_err(|e| StorageError::Encoding(e.to_string()))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| StorageError::Encoding("frame larger than 4 GiB".into()))?;

    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Frames decoded from a log, plus the length of the valid prefix.
#[derive(Debug, Default)]
pub struct DecodedLog {
    /// Operation lists, one per committed transaction, in commit order.
    pub frames: Vec<Vec<LogOp>>,
    /// Length of the log prefix made of complete frames.
    pub valid_len: u64,
}

/// Decodes every complete frame of a log.
pub fn decode_frames(bytes: &[u8]) -> StorageResult<DecodedLog> {
    let mut decoded = DecodedLog::default();
    let mut offset = 0usize;

    while bytes.len() - offset >= FRAME_HEADER_SIZE {
        let header = &bytes[offset..offset + FRAME_HEADER_SIZE];
        let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        let start = offset + FRAME_HEADER_SIZE;
        let Some(end) = start.checked_add(len).filter(|end| *end <= bytes.len()) else {
            break;
        };

        let payload = &bytes[start..end];
        let actual_crc = crc32fast::hash(payload);
        if actual_crc != expected_crc {
            return Err(StorageError::corrupted(
                offset as u64,
                format!("checksum mismatch: expected {expected_crc:08x}, got {actual_crc:08x}"),
            ));
        }

        let ops: Vec<LogOp> = ciborium::de::from_reader(payload)
            .map_err(|e| StorageError::corrupted(offset as u64, e.to_string()))?;
        decoded.frames.push(ops);
        offset = end;
    }

    decoded.valid_len = offset as u64;
    Ok(decoded)
}

/// Produces the operations that rebuild `root` from an empty tree.
pub fn snapshot_ops(root: &Bucket) -> Vec<LogOp> {
    let mut ops = Vec::new();
    let mut path = Vec::new();
    collect_snapshot(root, &mut path, &mut ops);
    ops
}

fn collect_snapshot(bucket: &Bucket, path: &mut Vec<Vec<u8>>, ops: &mut Vec<LogOp>) {
    for (key, node) in bucket.entries().iter() {
        match node {
            Node::Value(value) => ops.push(LogOp::Put {
                path: path.clone(),
                key: key.clone(),
                value: value.clone(),
            }),
            Node::Bucket(child) => {
                path.push(key.clone());
                ops.push(LogOp::CreateBucket { path: path.clone() });
                collect_snapshot(child, path, ops);
                path.pop();
            }
        }
    }
}
