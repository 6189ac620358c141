use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a remote endpoint (data center / shard) holding file data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(pub i32);

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dc{}", self.0)
    }
}

/// Opaque handle that lets the source endpoint locate a stored object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub object_id: i64,
    pub access_hash: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_reference: Vec<u8>,
}

/// A remote media object to relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    /// Size in bytes.
    pub size: i64,
    /// Name the object gets on the destination side.
    pub name: String,
    pub location: Location,
    /// Endpoint that stores the object's bytes.
    pub endpoint: EndpointId,
}

/// The message a relayed media object belongs to.
///
/// Only used to correlate logs and progress with the caller's work item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Elem {
    pub from: String,
    pub to: String,
    pub message_id: i64,
}

impl fmt::Display for Elem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} -> {}", self.from, self.message_id, self.to)
    }
}

/// Destination-side handle of a fully uploaded file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputFile {
    pub id: i64,
    pub parts: i32,
    pub name: String,
    pub size: i64,
    /// SHA-256 hex digest of the uploaded content.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub checksum: String,
}

impl InputFile {
    /// Handle returned when nothing was uploaded (dry runs).
    pub fn placeholder() -> Self {
        Self::default()
    }

    /// Returns `true` for the empty handle produced by [`placeholder`](Self::placeholder).
    pub fn is_placeholder(&self) -> bool {
        *self == Self::default()
    }
}
