use std::io;

use futures_util::{StreamExt, TryStreamExt, future, stream};
use mediarelay_protocol::Location;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::chunked::split_parts;
use crate::client::Client;
use crate::types::Part;
use crate::{DEFAULT_PART_SIZE, TransferError};

/// Positional write target shared by concurrent part writers.
///
/// Parts complete out of order, so writes carry their absolute offset
/// instead of relying on a cursor.
pub trait WriteAt: Send + Sync {
    /// Writes a prefix of `buf` at `offset`, returning how many bytes were written.
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize>;
}

/// Parallel fetch primitive.
#[derive(Debug, Clone)]
pub struct Downloader {
    part_size: usize,
    threads: usize,
}

impl Default for Downloader {
    fn default() -> Self {
        Self::new()
    }
}

impl Downloader {
    /// Creates a downloader using [`DEFAULT_PART_SIZE`] and one part in flight.
    pub fn new() -> Self {
        Self {
            part_size: DEFAULT_PART_SIZE,
            threads: 1,
        }
    }

    pub fn with_part_size(mut self, part_size: usize) -> Self {
        self.part_size = part_size;
        self
    }

    /// Sets how many parts may be in flight at once (at least one).
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// Downloads `size` bytes of `location` into `writer`.
    ///
    /// Every part is written at its absolute offset. The first failing part
    /// aborts the download; bytes already written stay in place.
    pub async fn download(
        &self,
        client: &dyn Client,
        location: &Location,
        size: i64,
        writer: &dyn WriteAt,
        cancel: &CancellationToken,
    ) -> Result<(), TransferError> {
        let parts = split_parts(size, self.part_size)?;
        debug!(
            object = location.object_id,
            size,
            parts = parts.len(),
            threads = self.threads,
            "download started"
        );

        let work = stream::iter(parts)
            .map(|part| fetch_part(client, location, part, writer))
            .buffer_unordered(self.threads)
            .try_for_each(|()| future::ready(Ok(())));

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransferError::Cancelled),
            result = work => result,
        }
    }
}

/// Fetches one part, re-requesting the remainder until the part is complete.
async fn fetch_part(
    client: &dyn Client,
    location: &Location,
    part: Part,
    writer: &dyn WriteAt,
) -> Result<(), TransferError> {
    let end = part.offset + part.size as i64;
    let mut offset = part.offset;

    while offset < end {
        let remaining = (end - offset) as usize;
        let data = client.download_part(location, offset, remaining).await?;
        if data.is_empty() {
            return Err(TransferError::UnexpectedEof { offset });
        }

        let n = data.len().min(remaining);
        write_all_at(writer, &data[..n], offset as u64)?;
        offset += n as i64;
    }

    Ok(())
}

fn write_all_at(writer: &dyn WriteAt, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
    while !buf.is_empty() {
        match writer.write_at(buf, offset) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "failed to write whole part",
                ));
            }
            Ok(n) => {
                buf = &buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
