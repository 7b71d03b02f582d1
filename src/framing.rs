//! Chunk framing for size-limited record transports
//!
//! A serialized event is cut into consecutive frames of at most `limit`
//! bytes. Every frame of one payload carries the same correlation id and the
//! final frame count, so a reader can reassemble the payload by concatenating
//! `data` in `chunk_number` order.

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::event::random_uuid;
use crate::{ReplayError, Result};

/// Hard per-record ceiling of the remote channel
pub const MAX_RECORD_BYTES: usize = 1_048_576;

/// Room left under [`MAX_RECORD_BYTES`] for the frame envelope
pub const FRAME_HEADROOM: usize = 200;

/// Largest frame whose JSON record still fits under [`MAX_RECORD_BYTES`]
///
/// Frame data is re-escaped when the chunk is encoded, so each `"` and `\`
/// of the serialized event costs two bytes on the wire.
pub const MAX_FRAME_LIMIT: usize = (MAX_RECORD_BYTES - FRAME_HEADROOM) / 2;

/// Smallest frame that can hold any UTF-8 character
pub const MIN_FRAME_LIMIT: usize = 4;

/// Default frame size
pub const DEFAULT_FRAME_LIMIT: usize = MAX_FRAME_LIMIT;

/// One frame of a possibly-split event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventChunk {
    /// Zero-based position within the group
    #[serde(rename = "chunkNumber")]
    pub chunk_number: usize,
    /// Total frames in the group
    #[serde(rename = "numberOfChunks")]
    pub num_chunks: usize,
    /// Shared by every frame of one payload
    #[serde(rename = "uuid")]
    pub correlation_id: String,
    /// Slice of the serialized payload
    pub data: String,
}

/// Split `payload` into correlated frames of at most `limit` bytes
///
/// # Errors
///
/// Returns [`ReplayError::InvalidFrameLimit`] if `limit` is zero or narrower
/// than a character of `payload`
pub fn frame(payload: &str, limit: usize) -> Result<Vec<EventChunk>> {
    let correlation_id = correlation_id(payload, random_uuid());
    frame_with_id(payload, limit, &correlation_id)
}

/// Split `payload` using a caller-supplied correlation id
///
/// # Errors
///
/// Returns [`ReplayError::InvalidFrameLimit`] if `limit` is zero or narrower
/// than a character of `payload`
pub fn frame_with_id(payload: &str, limit: usize, correlation_id: &str) -> Result<Vec<EventChunk>> {
    let pieces = split(payload, limit)?;
    let num_chunks = pieces.len();

    Ok(pieces
        .into_iter()
        .enumerate()
        .map(|(chunk_number, data)| EventChunk {
            chunk_number,
            num_chunks,
            correlation_id: correlation_id.to_string(),
            data: data.to_string(),
        })
        .collect())
}

/// Reassemble frames of one group, in any arrival order
///
/// # Errors
///
/// Returns [`ReplayError::Parse`] if frames are missing, duplicated or belong to
/// different groups
pub fn reassemble(chunks: &[EventChunk]) -> Result<String> {
    let Some(first) = chunks.first() else {
        return Err(ReplayError::Parse("no chunks to reassemble".to_string()));
    };

    if chunks.len() != first.num_chunks {
        return Err(ReplayError::Parse(format!(
            "expected {} chunks, got {}",
            first.num_chunks,
            chunks.len()
        )));
    }

    let mut ordered: Vec<Option<&str>> = vec![None; first.num_chunks];
    for chunk in chunks {
        if chunk.correlation_id != first.correlation_id || chunk.num_chunks != first.num_chunks {
            return Err(ReplayError::Parse(format!(
                "chunk {} does not belong to group {}",
                chunk.chunk_number, first.correlation_id
            )));
        }
        let slot = ordered
            .get_mut(chunk.chunk_number)
            .filter(|slot| slot.is_none())
            .ok_or_else(|| {
                ReplayError::Parse(format!(
                    "duplicate or out of range chunk number {}",
                    chunk.chunk_number
                ))
            })?;
        *slot = Some(chunk.data.as_str());
    }

    Ok(ordered.into_iter().flatten().collect())
}

/// Pick the group id: a fresh UUID, or the payload's SHA-256 if entropy failed
fn correlation_id<E: Display>(payload: &str, generated: std::result::Result<uuid::Uuid, E>) -> String {
    match generated {
        Ok(id) => id.to_string(),
        Err(e) => {
            debug!("UUID generation failed: {e}; falling back to payload hash for chunk correlation");
            hex::encode(Sha256::digest(payload.as_bytes()))
        }
    }
}

/// Non-overlapping slices in order, cut on UTF-8 boundaries
fn split(payload: &str, limit: usize) -> Result<Vec<&str>> {
    if limit == 0 {
        return Err(ReplayError::InvalidFrameLimit(limit));
    }

    let mut pieces = Vec::with_capacity(payload.len().div_ceil(limit).max(1));
    let mut start = 0;

    while start < payload.len() {
        let mut end = (start + limit).min(payload.len());
        while !payload.is_char_boundary(end) {
            end -= 1;
        }
        if end == start {
            return Err(ReplayError::InvalidFrameLimit(limit));
        }
        pieces.push(&payload[start..end]);
        start = end;
    }

    if pieces.is_empty() {
        pieces.push("");
    }

    Ok(pieces)
}
