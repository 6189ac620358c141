/// A contiguous byte range of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Part {
    /// Zero-based part number.
    pub index: usize,
    /// Byte offset within the object.
    pub offset: i64,
    /// Length in bytes; only the final part may be shorter than the part size.
    pub size: usize,
}

/// A part of file data on its way to the destination.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Upload session the part belongs to.
    pub file_id: i64,
    pub index: i32,
    pub total_parts: i32,
    /// Raw part data.
    pub data: Vec<u8>,
    /// SHA-256 hex checksum of `data`.
    pub checksum: String,
}

/// Source of an upload: a sequential reader and its declared length.
pub struct Upload<R> {
    pub name: String,
    pub size: i64,
    pub reader: R,
}

impl<R> Upload<R> {
    /// Describes `size` bytes of `reader` to be uploaded as `name`.
    pub fn new(name: impl Into<String>, reader: R, size: i64) -> Self {
        Self {
            name: name.into(),
            size,
            reader,
        }
    }
}
