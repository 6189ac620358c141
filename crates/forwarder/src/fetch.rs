//! Fetch stage: source endpoint → staging file.

use std::io;

use mediarelay_protocol::Media;
use mediarelay_transfer::{Downloader, Pool, TransferError, WriteAt};
use tokio_util::sync::CancellationToken;

use crate::progress::ProgressSink;
use crate::staging::StagingFile;

/// Writes into the staging file and reports every committed write.
struct ProgressWriter<'a> {
    file: &'a dyn StagingFile,
    sink: &'a dyn ProgressSink,
}

impl WriteAt for ProgressWriter<'_> {
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        let n = self.file.write_at(buf, offset)?;
        self.sink.add(n as i64);
        Ok(n)
    }
}

/// Downloads `media` from its source endpoint into `file`.
///
/// Each successful write reports the number of bytes actually written, so
/// the sink receives exactly `media.size` bytes on success. A failed write
/// aborts the fetch; bytes already written are left for the caller to
/// discard.
pub async fn fetch(
    pool: &dyn Pool,
    media: &Media,
    threads: usize,
    part_size: usize,
    file: &dyn StagingFile,
    sink: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> Result<(), TransferError> {
    let client = pool.client(media.endpoint)?;
    let writer = ProgressWriter { file, sink };

    Downloader::new()
        .with_part_size(part_size)
        .with_threads(threads)
        .download(client.as_ref(), &media.location, media.size, &writer, cancel)
        .await
}
