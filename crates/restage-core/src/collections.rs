//! Hash map/set aliases used throughout the crate.
//!
//! The default build uses `rustc-hash` for its fast, non-cryptographic
//! hasher. The `std-hash` feature swaps in the standard library
//! implementations for hosts that require SipHash's DoS resistance.

#[cfg(feature = "std-hash")]
pub mod map {
    pub use std::collections::{HashMap, HashSet};
}

#[cfg(not(feature = "std-hash"))]
pub mod map {
    pub use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
}
