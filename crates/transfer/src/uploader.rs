use std::io::{self, Read};
use std::sync::atomic::{AtomicI64, Ordering};

use futures_util::{StreamExt, TryStreamExt, future, stream};
use mediarelay_protocol::InputFile;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::chunked::{checksum_bytes, split_parts};
use crate::client::Client;
use crate::progress::{Progress, ProgressState};
use crate::types::{Chunk, Part, Upload};
use crate::{DEFAULT_PART_SIZE, TransferError};

/// Parallel push primitive.
///
/// The source is read sequentially; up to `threads` parts are uploaded
/// concurrently while the next ones are being read.
pub struct Uploader<'a> {
    client: &'a dyn Client,
    part_size: usize,
    threads: usize,
    progress: Option<&'a dyn Progress>,
}

impl<'a> Uploader<'a> {
    /// Creates an uploader targeting `client`.
    pub fn new(client: &'a dyn Client) -> Self {
        Self {
            client,
            part_size: DEFAULT_PART_SIZE,
            threads: 1,
            progress: None,
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

    /// Registers a callback invoked after every uploaded part.
    pub fn with_progress(mut self, progress: &'a dyn Progress) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Uploads `upload.size` bytes read from `upload.reader`.
    ///
    /// Returns the destination handle of the assembled file.
    pub async fn upload<R: Read + Send>(
        &self,
        upload: Upload<R>,
        cancel: &CancellationToken,
    ) -> Result<InputFile, TransferError> {
        let Upload {
            name,
            size,
            mut reader,
        } = upload;

        let parts = split_parts(size, self.part_size)?;
        let total_parts = parts.len() as i32;
        let file_id: i64 = rand::random();
        debug!(file_id, %name, size, parts = total_parts, threads = self.threads, "upload started");

        let uploaded = AtomicI64::new(0);
        let mut hasher = Sha256::new();

        {
            let name = name.as_str();
            let uploaded = &uploaded;
            let reader = &mut reader;
            let hasher = &mut hasher;
            let work = stream::iter(parts)
                .map(move |part| {
                    let chunk = read_chunk(&mut *reader, &mut *hasher, file_id, total_parts, part);
                    self.send_chunk(chunk, name, size, uploaded)
                })
                .buffer_unordered(self.threads)
                .try_for_each(|()| future::ready(Ok(())));

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TransferError::Cancelled),
                result = work => result?,
            }
        }

        Ok(InputFile {
            id: file_id,
            parts: total_parts,
            name,
            size,
            checksum: hex::encode(hasher.finalize()),
        })
    }

    async fn send_chunk(
        &self,
        chunk: Result<Chunk, TransferError>,
        name: &str,
        total: i64,
        uploaded: &AtomicI64,
    ) -> Result<(), TransferError> {
        let chunk = chunk?;
        let (id, part, len) = (chunk.file_id, chunk.index, chunk.data.len() as i64);

        self.client.upload_part(chunk).await?;

        let cumulative = uploaded.fetch_add(len, Ordering::SeqCst) + len;
        if let Some(progress) = self.progress {
            progress.chunk(&ProgressState {
                id,
                name: name.to_string(),
                part,
                part_size: self.part_size,
                uploaded: cumulative,
                total,
            });
        }
        Ok(())
    }
}

/// Reads the next part from the source and folds it into the running digest.
///
/// The read blocks the task; parts are bounded by `MAX_PART_SIZE`.
fn read_chunk<R: Read>(
    reader: &mut R,
    hasher: &mut Sha256,
    file_id: i64,
    total_parts: i32,
    part: Part,
) -> Result<Chunk, TransferError> {
    let mut data = vec![0u8; part.size];
    reader.read_exact(&mut data).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => TransferError::UnexpectedEof {
            offset: part.offset,
        },
        _ => TransferError::Io(e),
    })?;
    hasher.update(&data);

    Ok(Chunk {
        file_id,
        index: part.index as i32,
        total_parts,
        checksum: checksum_bytes(&data),
        data,
    })
}
