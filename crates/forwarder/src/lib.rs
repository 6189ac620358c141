//! Media relay pipeline.
//!
//! Moves a single remote media object from its source endpoint to the
//! destination endpoint without holding it in memory. The object is staged
//! in a private temporary file:
//!
//! 1. **Stage**: create the temporary file
//! 2. **Fetch**: download parts in parallel, writing each at its offset
//! 3. **Rewind**: seek the staging file back to the start
//! 4. **Push**: upload the file in parallel parts to the destination
//!
//! The staging file is released on every exit path. Progress from both
//! phases is reported to a single [`ProgressSink`], so a completed relay
//! always accounts for twice the object size. Dry runs report that total
//! at once and touch neither the network nor the filesystem.

pub mod clone;
pub mod config;
pub mod error;
pub mod fetch;
pub mod progress;
pub mod push;
pub mod staging;
pub mod threads;

pub use clone::{CloneOptions, Forwarder};
pub use config::ForwarderConfig;
pub use error::{CloneError, ConfigError, Phase};
pub use progress::{ProgressCounter, ProgressSink};
pub use staging::{Stager, StagingFile, TempStager};
pub use threads::best_threads;
