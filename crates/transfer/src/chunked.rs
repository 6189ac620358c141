use sha2::{Digest, Sha256};

use crate::TransferError;
use crate::types::Part;

// ---------------------------------------------------------------------------
// Checksum helpers
// ---------------------------------------------------------------------------

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

// ---------------------------------------------------------------------------
// Part splitting
// ---------------------------------------------------------------------------

/// Splits `[0, size)` into consecutive parts of `part_size` bytes.
///
/// The parts tile the range exactly; the last one may be shorter.
/// An empty object yields no parts.
pub fn split_parts(size: i64, part_size: usize) -> Result<Vec<Part>, TransferError> {
    if part_size == 0 {
        return Err(TransferError::InvalidPartSize(part_size));
    }
    if size <= 0 {
        return Ok(Vec::new());
    }

    let step = part_size as i64;
    let count = (size + step - 1) / step;
    let parts = (0..count)
        .map(|index| {
            let offset = index * step;
            Part {
                index: index as usize,
                offset,
                size: std::cmp::min(step, size - offset) as usize,
            }
        })
        .collect();
    Ok(parts)
}
