//! Result encoders: packed binary vector for `embed_text`, JSON array of
//! arrays for `embed_texts`.

use std::fmt::Write;

use gembed_core::{Error, Result};
use gembed_infer::EmbeddingBatch;

/// Size of the little-endian `u32` dimension prefix of a binary vector.
pub const VECTOR_HEADER_LEN: usize = 4;

/// Encode a single-vector batch as `u32 dimension` followed by `dimension`
/// `f32` values, all little-endian.
///
/// Fails if the batch does not hold exactly one vector or if the encoding
/// would be longer than `max_len` bytes.
pub fn encode_vector(batch: &EmbeddingBatch, max_len: usize) -> Result<Vec<u8>> {
    if batch.vector_count() != 1 {
        return Err(Error::InvalidArgument(format!(
            "binary vector encoding needs exactly one vector, got {}",
            batch.vector_count()
        )));
    }
    let view = batch.view().ok_or_else(|| malformed(batch))?;

    let dimension = u32::try_from(batch.dimension())
        .map_err(|_| Error::OutputOverflow { ceiling: max_len })?;
    let len = batch
        .dimension()
        .checked_mul(std::mem::size_of::<f32>())
        .and_then(|n| n.checked_add(VECTOR_HEADER_LEN))
        .filter(|&n| n <= max_len)
        .ok_or(Error::OutputOverflow { ceiling: max_len })?;

    let mut out = Vec::with_capacity(len);
    out.extend_from_slice(&dimension.to_le_bytes());
    for value in view.row(0) {
        out.extend_from_slice(&value.to_le_bytes());
    }
    Ok(out)
}

/// Encode a batch as `[[f0,f1,...],[f0,f1,...]]`, each value with exactly six
/// decimals and no whitespace.
///
/// The output may not exceed `ceiling` bytes. The check runs after every
/// value, so an oversized batch is abandoned as soon as it cannot fit rather
/// than after it has been fully rendered.
pub fn encode_batch_json(batch: &EmbeddingBatch, ceiling: usize) -> Result<String> {
    let view = batch.view().ok_or_else(|| malformed(batch))?;
    let overflow = || Error::OutputOverflow { ceiling };

    // "-0.123456," is ten bytes; most normalised embeddings stay within that
    let estimate = batch
        .values()
        .len()
        .saturating_mul(10)
        .saturating_add(batch.vector_count().saturating_mul(3))
        .saturating_add(2);
    let mut out = String::with_capacity(estimate.min(ceiling));

    out.push('[');
    for (i, row) in view.rows().into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push('[');
        for (j, value) in row.iter().enumerate() {
            if j > 0 {
                out.push(',');
            }
            // writing into a String cannot fail
            let _ = write!(out, "{value:.6}");

            // the row and the outer array still need closing: "]]"
            if out.len() + 2 > ceiling {
                return Err(overflow());
            }
        }
        out.push(']');
        if out.len() + 1 > ceiling {
            return Err(overflow());
        }
    }
    out.push(']');

    if out.len() > ceiling {
        return Err(overflow());
    }
    Ok(out)
}

fn malformed(batch: &EmbeddingBatch) -> Error {
    Error::Backend(format!(
        "batch of {} values does not match {} vectors of dimension {}",
        batch.values().len(),
        batch.vector_count(),
        batch.dimension()
    ))
}
