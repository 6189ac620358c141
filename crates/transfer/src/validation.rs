use crate::{MAX_PART_SIZE, TransferError};

/// Validates a part size against the rules remote endpoints enforce.
///
/// Rejects:
/// - Zero
/// - Sizes that are not a multiple of 1 KiB
/// - Sizes larger than [`MAX_PART_SIZE`]
/// - Sizes that do not evenly divide [`MAX_PART_SIZE`]
pub fn validate_part_size(part_size: usize) -> Result<(), TransferError> {
    if part_size == 0
        || part_size % 1024 != 0
        || part_size > MAX_PART_SIZE
        || MAX_PART_SIZE % part_size != 0
    {
        return Err(TransferError::InvalidPartSize(part_size));
    }
    Ok(())
}
