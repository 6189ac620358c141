/// Snapshot delivered to [`Progress`] after each uploaded part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressState {
    /// Upload session id.
    pub id: i64,
    pub name: String,
    /// Index of the part that just completed.
    pub part: i32,
    pub part_size: usize,
    /// Cumulative bytes uploaded so far, not the size of this part.
    pub uploaded: i64,
    /// Total bytes of the upload.
    pub total: i64,
}

/// Receives upload progress.
///
/// May be called from several in-flight parts; snapshots are not
/// guaranteed to arrive in increasing order.
pub trait Progress: Send + Sync {
    fn chunk(&self, state: &ProgressState);
}
