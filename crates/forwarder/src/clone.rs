//! Clone orchestrator: stage, fetch, rewind, push, release.

use std::io::SeekFrom;
use std::sync::Arc;

use mediarelay_protocol::{Elem, InputFile, Media};
use mediarelay_transfer::Pool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ForwarderConfig;
use crate::error::{CloneError, ConfigError, compose};
use crate::fetch::fetch;
use crate::progress::ProgressSink;
use crate::push::push;
use crate::staging::{Stager, StagingFile, TempStager};
use crate::threads::best_threads;

/// Inputs of a single clone invocation.
#[derive(Clone, Copy)]
pub struct CloneOptions<'a> {
    /// Correlation token, only used for logging.
    pub elem: &'a Elem,
    /// Object to relay.
    pub media: &'a Media,
    /// Receives byte deltas from both phases (2 × size on success).
    pub progress: &'a dyn ProgressSink,
}

/// Relays media objects from their source endpoints to the default one.
pub struct Forwarder {
    pool: Arc<dyn Pool>,
    stager: Arc<dyn Stager>,
    threads: usize,
    part_size: usize,
    dry_run: bool,
}

impl Forwarder {
    /// Validates `config` and stages into its `tempDir` (or the system temp dir).
    pub fn new(config: ForwarderConfig, pool: Arc<dyn Pool>) -> Result<Self, ConfigError> {
        config.validate()?;
        let stager = match config.temp_dir {
            Some(dir) => TempStager::in_dir(dir),
            None => TempStager::new(),
        };
        Ok(Self {
            pool,
            stager: Arc::new(stager),
            threads: config.threads,
            part_size: config.part_size,
            dry_run: config.dry_run,
        })
    }

    /// Replaces the staging file provider.
    pub fn with_stager(mut self, stager: Arc<dyn Stager>) -> Self {
        self.stager = stager;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Copies `opts.media` to the destination endpoint.
    ///
    /// Returns the destination handle, or [`InputFile::placeholder`] in dry
    /// run mode. The staging file is released exactly once on every path
    /// after it was created; a release failure is appended to the stage
    /// error or, after a successful push, becomes the error.
    pub async fn clone_media(
        &self,
        opts: CloneOptions<'_>,
        cancel: &CancellationToken,
    ) -> Result<InputFile, CloneError> {
        let media = opts.media;

        if self.dry_run {
            debug!(elem = %opts.elem, name = %media.name, size = media.size, "dry run");
            opts.progress.add(2 * media.size);
            return Ok(InputFile::placeholder());
        }

        let mut file = self.stager.acquire().map_err(CloneError::CreateTemp)?;
        debug!(elem = %opts.elem, path = %file.path().display(), "staging file created");

        let result = self.relay(&opts, file.as_mut(), cancel).await;

        let released = file.release();
        if let Err(e) = &released {
            warn!(elem = %opts.elem, error = %e, "failed to release staging file");
        }

        let input = compose(result, released)?;
        info!(
            elem = %opts.elem,
            name = %media.name,
            size = media.size,
            file_id = input.id,
            "media cloned"
        );
        Ok(input)
    }

    async fn relay(
        &self,
        opts: &CloneOptions<'_>,
        file: &mut dyn StagingFile,
        cancel: &CancellationToken,
    ) -> Result<InputFile, CloneError> {
        let media = opts.media;
        let threads = best_threads(media.size, self.threads);
        debug!(elem = %opts.elem, size = media.size, threads, "relay started");

        fetch(
            self.pool.as_ref(),
            media,
            threads,
            self.part_size,
            &*file,
            opts.progress,
            cancel,
        )
        .await
        .map_err(|e| CloneError::from_transfer(e, CloneError::Download))?;
        debug!(elem = %opts.elem, "fetch done");

        if cancel.is_cancelled() {
            return Err(CloneError::Cancelled);
        }
        file.seek(SeekFrom::Start(0)).map_err(CloneError::Seek)?;

        let input = push(
            self.pool.as_ref(),
            &media.name,
            file,
            media.size,
            threads,
            self.part_size,
            opts.progress,
            cancel,
        )
        .await
        .map_err(|e| CloneError::from_transfer(e, CloneError::Upload))?;
        debug!(elem = %opts.elem, file_id = input.id, "push done");

        Ok(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Phase;
    use mediarelay_protocol::{EndpointId, Location};
    use mediarelay_transfer::{MemoryEndpoint, checksum_bytes};
    use std::io::{self, Read, Seek};
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Deltas(Mutex<Vec<i64>>);

    impl ProgressSink for Deltas {
        fn add(&self, delta: i64) {
            self.0.lock().unwrap().push(delta);
        }
    }

    impl Deltas {
        fn sum(&self) -> i64 {
            self.0.lock().unwrap().iter().sum()
        }

        fn len(&self) -> usize {
            self.0.lock().unwrap().len()
        }
    }

    /// Staging file with an injectable seek failure and release fault.
    struct Faulty {
        inner: Box<dyn StagingFile>,
        fail_seek: bool,
        delete_before_release: bool,
    }

    impl Read for Faulty {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl Seek for Faulty {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            if self.fail_seek {
                return Err(io::Error::other("seek refused"));
            }
            self.inner.seek(pos)
        }
    }

    impl StagingFile for Faulty {
        fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
            self.inner.write_at(buf, offset)
        }

        fn path(&self) -> &Path {
            self.inner.path()
        }

        fn release(self: Box<Self>) -> Result<(), CloneError> {
            let Faulty {
                inner,
                delete_before_release,
                ..
            } = *self;
            if delete_before_release {
                std::fs::remove_file(inner.path()).map_err(CloneError::RemoveTemp)?;
            }
            inner.release()
        }
    }

    struct FaultyStager {
        inner: TempStager,
        fail_seek: bool,
        delete_before_release: bool,
        acquired: AtomicUsize,
    }

    impl FaultyStager {
        fn new(dir: &Path) -> Self {
            Self {
                inner: TempStager::in_dir(dir),
                fail_seek: false,
                delete_before_release: false,
                acquired: AtomicUsize::new(0),
            }
        }
    }

    impl Stager for FaultyStager {
        fn acquire(&self) -> io::Result<Box<dyn StagingFile>> {
            self.acquired.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(Faulty {
                inner: self.inner.acquire()?,
                fail_seek: self.fail_seek,
                delete_before_release: self.delete_before_release,
            }))
        }
    }

    fn elem() -> Elem {
        Elem {
            from: "source".into(),
            to: "archive".into(),
            message_id: 77,
        }
    }

    fn media(size: i64) -> Media {
        Media {
            size,
            name: "clip.mp4".into(),
            location: Location {
                object_id: 5,
                access_hash: 6,
                file_reference: vec![9],
            },
            endpoint: EndpointId(2),
        }
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    struct Fixture {
        endpoint: MemoryEndpoint,
        dir: tempfile::TempDir,
        media: Media,
        source: Vec<u8>,
    }

    impl Fixture {
        fn new(size: usize) -> Self {
            let endpoint = MemoryEndpoint::new();
            let media = media(size as i64);
            let source = pattern(size);
            endpoint.insert(&media.location, source.clone());
            Self {
                endpoint,
                dir: tempfile::tempdir().unwrap(),
                media,
                source,
            }
        }

        fn config(&self) -> ForwarderConfig {
            ForwarderConfig {
                threads: 4,
                part_size: 1024,
                dry_run: false,
                temp_dir: Some(self.dir.path().to_path_buf()),
            }
        }

        fn forwarder(&self) -> Forwarder {
            Forwarder::new(self.config(), Arc::new(self.endpoint.clone())).unwrap()
        }

        fn staged_files(&self) -> usize {
            std::fs::read_dir(self.dir.path()).unwrap().count()
        }
    }

    #[tokio::test]
    async fn clones_media() {
        let fx = Fixture::new(10_000);
        let deltas = Deltas::default();
        let elem = elem();
        let opts = CloneOptions {
            elem: &elem,
            media: &fx.media,
            progress: &deltas,
        };

        let input = fx
            .forwarder()
            .clone_media(opts, &CancellationToken::new())
            .await
            .unwrap();

        assert!(!input.is_placeholder());
        assert_eq!(input.name, "clip.mp4");
        assert_eq!(input.size, 10_000);
        assert_eq!(input.checksum, checksum_bytes(&fx.source));
        assert_eq!(fx.endpoint.uploaded(input.id).unwrap(), fx.source);
        assert_eq!(deltas.sum(), 20_000);
        assert_eq!(fx.staged_files(), 0);
        // Source endpoint for fetch, default connection for push.
        assert_eq!(fx.endpoint.connected(), vec![Some(EndpointId(2)), None]);
    }

    #[tokio::test]
    async fn small_object_uses_one_part_in_flight() {
        let fx = Fixture::new(8 * 1024);
        fx.endpoint.set_latency(Duration::from_millis(5));
        let sink = AtomicI64::new(0);
        let elem = elem();
        let opts = CloneOptions {
            elem: &elem,
            media: &fx.media,
            progress: &sink,
        };

        fx.forwarder()
            .clone_media(opts, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(fx.endpoint.max_in_flight(), 1);
        assert_eq!(sink.load(Ordering::SeqCst), 16 * 1024);
    }

    #[tokio::test]
    async fn dry_run_reports_twice_size_once() {
        let fx = Fixture::new(4096);
        let mut config = fx.config();
        config.dry_run = true;
        let stager = Arc::new(FaultyStager::new(fx.dir.path()));
        let forwarder = Forwarder::new(config, Arc::new(fx.endpoint.clone()))
            .unwrap()
            .with_stager(stager.clone());
        assert!(forwarder.is_dry_run());

        let deltas = Deltas::default();
        let elem = elem();
        let opts = CloneOptions {
            elem: &elem,
            media: &fx.media,
            progress: &deltas,
        };
        let input = forwarder
            .clone_media(opts, &CancellationToken::new())
            .await
            .unwrap();

        assert!(input.is_placeholder());
        assert_eq!(*deltas.0.lock().unwrap(), vec![8192]);
        assert_eq!(stager.acquired.load(Ordering::SeqCst), 0);
        assert_eq!(fx.staged_files(), 0);
        assert_eq!(fx.endpoint.download_calls(), 0);
        assert_eq!(fx.endpoint.upload_calls(), 0);
    }

    #[tokio::test]
    async fn fetch_failure_skips_push_and_cleans_up() {
        let fx = Fixture::new(6000);
        fx.endpoint.fail_download_at(2500);
        let deltas = Deltas::default();
        let elem = elem();
        let opts = CloneOptions {
            elem: &elem,
            media: &fx.media,
            progress: &deltas,
        };

        let err = fx
            .forwarder()
            .clone_media(opts, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.phase(), Phase::Fetch);
        assert!(err.to_string().starts_with("download: "));
        assert_eq!(fx.endpoint.upload_calls(), 0);
        assert!(deltas.sum() < 6000);
        assert_eq!(fx.staged_files(), 0);
    }

    #[tokio::test]
    async fn seek_failure_skips_push_and_cleans_up() {
        let fx = Fixture::new(3000);
        let mut stager = FaultyStager::new(fx.dir.path());
        stager.fail_seek = true;
        let forwarder = fx.forwarder().with_stager(Arc::new(stager));

        let deltas = Deltas::default();
        let elem = elem();
        let opts = CloneOptions {
            elem: &elem,
            media: &fx.media,
            progress: &deltas,
        };
        let err = forwarder
            .clone_media(opts, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.phase(), Phase::Seek);
        assert!(matches!(err, CloneError::Seek(_)));
        assert_eq!(fx.endpoint.upload_calls(), 0);
        assert_eq!(deltas.sum(), 3000);
        assert_eq!(fx.staged_files(), 0);
    }

    #[tokio::test]
    async fn push_failure_is_upload_tagged() {
        let fx = Fixture::new(5000);
        fx.endpoint.fail_upload_part(3);
        let sink = AtomicI64::new(0);
        let elem = elem();
        let opts = CloneOptions {
            elem: &elem,
            media: &fx.media,
            progress: &sink,
        };

        let err = fx
            .forwarder()
            .clone_media(opts, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.phase(), Phase::Push);
        assert!(err.to_string().starts_with("upload: "));
        assert!(sink.load(Ordering::SeqCst) < 10_000);
        assert_eq!(fx.staged_files(), 0);
    }

    #[tokio::test]
    async fn create_temp_failure_leaves_sink_untouched() {
        let fx = Fixture::new(100);
        let forwarder = fx
            .forwarder()
            .with_stager(Arc::new(TempStager::in_dir(fx.dir.path().join("missing"))));

        let deltas = Deltas::default();
        let elem = elem();
        let opts = CloneOptions {
            elem: &elem,
            media: &fx.media,
            progress: &deltas,
        };
        let err = forwarder
            .clone_media(opts, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, CloneError::CreateTemp(_)));
        assert_eq!(err.phase(), Phase::TempFile);
        assert_eq!(deltas.len(), 0);
        assert_eq!(fx.endpoint.download_calls(), 0);
    }

    #[tokio::test]
    async fn release_failure_after_success_is_reported() {
        let fx = Fixture::new(2048);
        let mut stager = FaultyStager::new(fx.dir.path());
        stager.delete_before_release = true;
        let forwarder = fx.forwarder().with_stager(Arc::new(stager));

        let sink = AtomicI64::new(0);
        let elem = elem();
        let opts = CloneOptions {
            elem: &elem,
            media: &fx.media,
            progress: &sink,
        };
        let err = forwarder
            .clone_media(opts, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.phase(), Phase::TempFile);
        assert!(err.to_string().starts_with("remove temp file: "));
        assert_eq!(sink.load(Ordering::SeqCst), 4096);
        assert_eq!(fx.staged_files(), 0);
    }

    #[tokio::test]
    async fn release_failure_is_appended_to_stage_error() {
        let fx = Fixture::new(2048);
        fx.endpoint.fail_upload_part(0);
        let mut stager = FaultyStager::new(fx.dir.path());
        stager.delete_before_release = true;
        let forwarder = fx.forwarder().with_stager(Arc::new(stager));

        let sink = AtomicI64::new(0);
        let elem = elem();
        let opts = CloneOptions {
            elem: &elem,
            media: &fx.media,
            progress: &sink,
        };
        let err = forwarder
            .clone_media(opts, &CancellationToken::new())
            .await
            .unwrap_err();

        let parts = err.errors();
        assert_eq!(parts.len(), 2);
        assert!(matches!(parts[0], CloneError::Upload(_)));
        assert!(matches!(parts[1], CloneError::RemoveTemp(_)));
        assert_eq!(err.phase(), Phase::Push);
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let fx = Fixture::new(4096);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let sink = AtomicI64::new(0);
        let elem = elem();
        let opts = CloneOptions {
            elem: &elem,
            media: &fx.media,
            progress: &sink,
        };
        let err = fx.forwarder().clone_media(opts, &cancel).await.unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(sink.load(Ordering::SeqCst), 0);
        assert_eq!(fx.endpoint.upload_calls(), 0);
        assert_eq!(fx.staged_files(), 0);
    }

    #[tokio::test]
    async fn cancelled_mid_fetch() {
        let fx = Fixture::new(64 * 1024);
        fx.endpoint.set_latency(Duration::from_millis(200));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let sink = AtomicI64::new(0);
        let elem = elem();
        let opts = CloneOptions {
            elem: &elem,
            media: &fx.media,
            progress: &sink,
        };
        let err = fx.forwarder().clone_media(opts, &cancel).await.unwrap_err();

        assert!(matches!(err, CloneError::Cancelled));
        assert_eq!(fx.endpoint.upload_calls(), 0);
        assert_eq!(fx.staged_files(), 0);
    }

    /// Cancels its token once the running total passes `limit`.
    struct CancelPast {
        total: AtomicI64,
        limit: i64,
        cancel: CancellationToken,
    }

    impl ProgressSink for CancelPast {
        fn add(&self, delta: i64) {
            let total = self.total.fetch_add(delta, Ordering::SeqCst) + delta;
            if total > self.limit {
                self.cancel.cancel();
            }
        }
    }

    #[tokio::test]
    async fn cancelled_mid_push() {
        let size = 64 * 1024;
        let fx = Fixture::new(size);
        fx.endpoint.set_latency(Duration::from_millis(1));
        let cancel = CancellationToken::new();
        let sink = CancelPast {
            total: AtomicI64::new(0),
            limit: size as i64,
            cancel: cancel.clone(),
        };

        let elem = elem();
        let opts = CloneOptions {
            elem: &elem,
            media: &fx.media,
            progress: &sink,
        };
        let err = fx.forwarder().clone_media(opts, &cancel).await.unwrap_err();

        assert!(matches!(err, CloneError::Cancelled));
        let uploads = fx.endpoint.upload_calls();
        assert!(uploads >= 1 && uploads < 64, "uploads = {uploads}");
        let total = sink.total.load(Ordering::SeqCst);
        assert!(total > size as i64 && total < 2 * size as i64);
        assert_eq!(fx.staged_files(), 0);
    }

    #[test]
    fn new_rejects_invalid_config() {
        let config = ForwarderConfig {
            threads: 0,
            ..ForwarderConfig::default()
        };
        let result = Forwarder::new(config, Arc::new(MemoryEndpoint::new()));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
}
