//! Endpoint capabilities consumed by the transfer engine.
//!
//! Callers bridge these traits to their actual transport; keeping them as
//! traits makes the engine testable with in-process endpoints.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use mediarelay_protocol::{EndpointId, Location};

use crate::TransferError;
use crate::types::Chunk;

/// Boxed future returned by [`Client`] methods.
pub type ClientFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, TransferError>> + Send + 'a>>;

/// A connection to one remote endpoint.
pub trait Client: Send + Sync {
    /// Fetches up to `limit` bytes of the object at `location` starting at `offset`.
    ///
    /// May return fewer bytes than requested; an empty result means no data
    /// exists at `offset`.
    fn download_part<'a>(
        &'a self,
        location: &'a Location,
        offset: i64,
        limit: usize,
    ) -> ClientFuture<'a, Vec<u8>>;

    /// Stores one part of an upload session.
    fn upload_part(&self, chunk: Chunk) -> ClientFuture<'_, ()>;
}

/// Hands out connections to remote endpoints.
pub trait Pool: Send + Sync {
    /// Returns a connection scoped to `endpoint`.
    fn client(&self, endpoint: EndpointId) -> Result<Arc<dyn Client>, TransferError>;

    /// Returns the connection used for uploads.
    fn default_client(&self) -> Result<Arc<dyn Client>, TransferError>;
}
