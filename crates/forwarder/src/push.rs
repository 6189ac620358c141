//! Push stage: staging file → destination endpoint.

use std::sync::atomic::{AtomicI64, Ordering};

use mediarelay_protocol::InputFile;
use mediarelay_transfer::{Pool, Progress, ProgressState, TransferError, Upload, Uploader};
use tokio_util::sync::CancellationToken;

use crate::progress::ProgressSink;
use crate::staging::StagingFile;

/// Turns the uploader's cumulative snapshots into deltas for the sink.
///
/// Snapshots can arrive out of order from concurrent parts. The previous
/// value is advanced with a single atomic max, so each byte is reported
/// once and a stale snapshot yields nothing.
struct Uploaded<'a> {
    sink: &'a dyn ProgressSink,
    prev: AtomicI64,
}

impl<'a> Uploaded<'a> {
    fn new(sink: &'a dyn ProgressSink) -> Self {
        Self {
            sink,
            prev: AtomicI64::new(0),
        }
    }

    fn delta(&self, cumulative: i64) -> i64 {
        let prev = self.prev.fetch_max(cumulative, Ordering::SeqCst);
        (cumulative - prev).max(0)
    }
}

impl Progress for Uploaded<'_> {
    fn chunk(&self, state: &ProgressState) {
        let delta = self.delta(state.uploaded);
        if delta > 0 {
            self.sink.add(delta);
        }
    }
}

/// Uploads `size` bytes of the rewound staging `file` as `name`.
///
/// Returns the destination handle of the uploaded file.
#[allow(clippy::too_many_arguments)]
pub async fn push(
    pool: &dyn Pool,
    name: &str,
    file: &mut dyn StagingFile,
    size: i64,
    threads: usize,
    part_size: usize,
    sink: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> Result<InputFile, TransferError> {
    let client = pool.default_client()?;
    let progress = Uploaded::new(sink);

    Uploader::new(client.as_ref())
        .with_part_size(part_size)
        .with_threads(threads)
        .with_progress(&progress)
        .upload(Upload::new(name, file, size), cancel)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staging::{Stager, TempStager};
    use mediarelay_transfer::{MemoryEndpoint, checksum_bytes};
    use std::io::Seek;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Deltas(Mutex<Vec<i64>>);

    impl ProgressSink for Deltas {
        fn add(&self, delta: i64) {
            self.0.lock().unwrap().push(delta);
        }
    }

    fn state(uploaded: i64) -> ProgressState {
        ProgressState {
            id: 1,
            name: "clip.mp4".into(),
            part: 0,
            part_size: 1024,
            uploaded,
            total: 600,
        }
    }

    #[test]
    fn cumulative_snapshots_become_deltas() {
        let deltas = Deltas::default();
        let progress = Uploaded::new(&deltas);
        for uploaded in [100, 100, 250, 600] {
            progress.chunk(&state(uploaded));
        }

        let deltas = deltas.0.into_inner().unwrap();
        assert_eq!(deltas, vec![100, 150, 350]);
        assert_eq!(deltas.iter().sum::<i64>(), 600);
    }

    #[test]
    fn stale_snapshot_is_ignored() {
        let deltas = Deltas::default();
        let progress = Uploaded::new(&deltas);
        for uploaded in [250, 100, 600] {
            progress.chunk(&state(uploaded));
        }

        let deltas = deltas.0.into_inner().unwrap();
        assert!(deltas.iter().all(|d| *d > 0));
        assert_eq!(deltas.iter().sum::<i64>(), 600);
    }

    #[test]
    fn concurrent_duplicate_snapshots_count_once() {
        use std::thread;

        for _ in 0..200 {
            let sink = Arc::new(AtomicI64::new(0));
            let sink_ref: &dyn ProgressSink = sink.as_ref();
            let progress = Uploaded::new(sink_ref);

            thread::scope(|scope| {
                for uploaded in [100, 100, 250, 600, 250, 100] {
                    let progress = &progress;
                    scope.spawn(move || progress.chunk(&state(uploaded)));
                }
            });

            assert_eq!(sink.load(Ordering::SeqCst), 600);
        }
    }

    #[tokio::test]
    async fn uploads_staging_file() {
        let source: Vec<u8> = (0..4000u32).map(|i| (i % 256) as u8).collect();
        let endpoint = MemoryEndpoint::new();

        let dir = tempfile::tempdir().unwrap();
        let mut file = TempStager::in_dir(dir.path()).acquire().unwrap();
        file.write_at(&source, 0).unwrap();
        file.rewind().unwrap();

        let deltas = Deltas::default();
        let input = push(
            &endpoint,
            "clip.mp4",
            file.as_mut(),
            4000,
            2,
            1024,
            &deltas,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(input.name, "clip.mp4");
        assert_eq!(input.size, 4000);
        assert_eq!(input.parts, 4);
        assert_eq!(input.checksum, checksum_bytes(&source));
        assert_eq!(endpoint.uploaded(input.id).unwrap(), source);
        assert_eq!(endpoint.connected(), vec![None]);

        let deltas = deltas.0.into_inner().unwrap();
        assert!(deltas.iter().all(|d| *d > 0));
        assert_eq!(deltas.iter().sum::<i64>(), 4000);

        file.release().unwrap();
    }
}
