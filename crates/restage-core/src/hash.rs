//! Hasher state selection for transient lookup tables.

#[cfg(feature = "std-hash")]
pub mod default {
    pub use std::collections::hash_map::RandomState as BuildHasher;
}

#[cfg(not(feature = "std-hash"))]
pub mod default {
    pub use ahash::RandomState as BuildHasher;
}
