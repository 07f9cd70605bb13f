//! Domain types shared by the kiln crates.
//!
//! Everything here is plain data: identifiers, build task rows, raw job submissions,
//! resolved manifests and the stable error codes surfaced to callers.

mod domain;
pub use domain::*;
