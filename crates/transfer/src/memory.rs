//! In-process loopback endpoint.
//!
//! `MemoryEndpoint` serves downloads from objects held in memory and
//! assembles uploaded parts per session. It implements both [`Client`] and
//! [`Pool`], so a single value can play source and destination. Faults and
//! latency can be injected to exercise failure and cancellation paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use mediarelay_protocol::{EndpointId, Location};

use crate::TransferError;
use crate::chunked::checksum_bytes;
use crate::client::{Client, ClientFuture, Pool};
use crate::types::Chunk;

/// Loopback endpoint backed by in-memory maps (cheap to clone, shared state).
#[derive(Clone, Default)]
pub struct MemoryEndpoint {
    inner: Arc<Mutex<State>>,
}

#[derive(Default)]
struct State {
    objects: HashMap<i64, Vec<u8>>,
    uploads: HashMap<i64, Session>,
    latency: Duration,
    offline: bool,
    download_failure: Option<i64>,
    upload_failure: Option<i32>,
    connected: Vec<Option<EndpointId>>,
    download_calls: usize,
    upload_calls: usize,
    in_flight: usize,
    max_in_flight: usize,
}

#[derive(Default)]
struct Session {
    total_parts: i32,
    parts: BTreeMap<i32, Vec<u8>>,
}

/// Decrements the in-flight counter when a request finishes or is dropped.
struct InFlight<'a> {
    state: &'a Mutex<State>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut s = self.state.lock().unwrap();
        s.in_flight -= 1;
    }
}

impl MemoryEndpoint {
    /// Creates an empty endpoint.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `data` as the object addressed by `location`.
    pub fn insert(&self, location: &Location, data: Vec<u8>) {
        self.lock().objects.insert(location.object_id, data);
    }

    /// Delays every request by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Makes every new connection attempt fail.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Fails any download request whose range covers `offset`.
    pub fn fail_download_at(&self, offset: i64) {
        self.lock().download_failure = Some(offset);
    }

    /// Fails the upload of part `index`.
    pub fn fail_upload_part(&self, index: i32) {
        self.lock().upload_failure = Some(index);
    }

    /// Returns the assembled content of a finished upload session.
    ///
    /// `None` if the session is unknown or still missing parts.
    pub fn uploaded(&self, file_id: i64) -> Option<Vec<u8>> {
        let s = self.lock();
        let session = s.uploads.get(&file_id)?;
        if session.parts.len() != session.total_parts as usize {
            return None;
        }
        Some(session.parts.values().flatten().copied().collect())
    }

    /// Endpoints connections were requested for; `None` marks the default connection.
    pub fn connected(&self) -> Vec<Option<EndpointId>> {
        self.lock().connected.clone()
    }

    pub fn download_calls(&self) -> usize {
        self.lock().download_calls
    }

    pub fn upload_calls(&self) -> usize {
        self.lock().upload_calls
    }

    /// Highest number of requests observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.lock().max_in_flight
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner.lock().unwrap()
    }

    fn connect(&self, endpoint: Option<EndpointId>) -> Result<Arc<dyn Client>, TransferError> {
        let mut s = self.lock();
        if s.offline {
            return Err(TransferError::Rpc("endpoint offline".into()));
        }
        s.connected.push(endpoint);
        Ok(Arc::new(self.clone()))
    }

    /// Registers a request and returns its in-flight guard plus the configured latency.
    fn enter(&self, download: bool) -> (InFlight<'_>, Duration) {
        let mut s = self.lock();
        if download {
            s.download_calls += 1;
        } else {
            s.upload_calls += 1;
        }
        s.in_flight += 1;
        s.max_in_flight = s.max_in_flight.max(s.in_flight);
        let latency = s.latency;
        (InFlight { state: &self.inner }, latency)
    }
}

impl Client for MemoryEndpoint {
    fn download_part<'a>(
        &'a self,
        location: &'a Location,
        offset: i64,
        limit: usize,
    ) -> ClientFuture<'a, Vec<u8>> {
        Box::pin(async move {
            let (_flight, latency) = self.enter(true);
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }

            let s = self.lock();
            if let Some(fail) = s.download_failure
                && fail >= offset
                && fail < offset + limit as i64
            {
                return Err(TransferError::Rpc(format!(
                    "download failed at offset {fail}"
                )));
            }

            let object = s.objects.get(&location.object_id).ok_or_else(|| {
                TransferError::Rpc(format!("object {} not found", location.object_id))
            })?;
            let start = (offset.max(0) as usize).min(object.len());
            let end = start.saturating_add(limit).min(object.len());
            Ok(object[start..end].to_vec())
        })
    }

    fn upload_part(&self, chunk: Chunk) -> ClientFuture<'_, ()> {
        Box::pin(async move {
            let (_flight, latency) = self.enter(false);
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }

            if checksum_bytes(&chunk.data) != chunk.checksum {
                return Err(TransferError::ChecksumMismatch { part: chunk.index });
            }

            let mut s = self.lock();
            if s.upload_failure == Some(chunk.index) {
                return Err(TransferError::Rpc(format!(
                    "upload failed for part {}",
                    chunk.index
                )));
            }

            let session = s.uploads.entry(chunk.file_id).or_default();
            session.total_parts = chunk.total_parts;
            session.parts.insert(chunk.index, chunk.data);
            Ok(())
        })
    }
}

impl Pool for MemoryEndpoint {
    fn client(&self, endpoint: EndpointId) -> Result<Arc<dyn Client>, TransferError> {
        self.connect(Some(endpoint))
    }

    fn default_client(&self) -> Result<Arc<dyn Client>, TransferError> {
        self.connect(None)
    }
}
