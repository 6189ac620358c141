//! Chunked parallel transfer engine.
//!
//! Objects are split into fixed-size parts which are moved with a bounded
//! number of parts in flight. Two primitives are exposed:
//!
//! - [`Downloader`]: fetches an object's parts from a source [`Client`] and
//!   writes each one at its absolute offset through [`WriteAt`].
//! - [`Uploader`]: reads a source sequentially and pushes its parts to a
//!   destination [`Client`], reporting cumulative progress.
//!
//! Neither primitive retries failed parts; the first error aborts the
//! whole transfer.

mod chunked;
mod client;
mod downloader;
pub mod memory;
mod progress;
mod types;
mod uploader;
mod validation;

pub use chunked::{checksum_bytes, split_parts};
pub use client::{Client, ClientFuture, Pool};
pub use downloader::{Downloader, WriteAt};
pub use memory::MemoryEndpoint;
pub use progress::{Progress, ProgressState};
pub use types::{Chunk, Part, Upload};
pub use uploader::Uploader;
pub use validation::validate_part_size;

/// Default part size: 512 KiB.
pub const DEFAULT_PART_SIZE: usize = 512 * 1024;

/// Largest part size accepted by remote endpoints.
///
/// Valid part sizes are multiples of 1 KiB that evenly divide this value.
pub const MAX_PART_SIZE: usize = 512 * 1024;

/// Errors produced by the transfer engine.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid part size: {0}")]
    InvalidPartSize(usize),

    #[error("unexpected end of data at offset {offset}")]
    UnexpectedEof { offset: i64 },

    #[error("checksum mismatch for part {part}")]
    ChecksumMismatch { part: i32 },

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("cancelled")]
    Cancelled,
}
