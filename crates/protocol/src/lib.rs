//! Data types shared by the mediarelay crates.
//!
//! Everything here is plain data: descriptors supplied by callers
//! (`Media`, `Elem`) and the destination-side handle produced by a
//! finished relay (`InputFile`).

pub mod types;

pub use types::{Elem, EndpointId, InputFile, Location, Media};
