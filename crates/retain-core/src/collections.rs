//! Hash containers and the hasher behind derived keys.
//!
//! The `std-hash` feature swaps the `hashbrown`/`ahash` defaults for the
//! standard library's, e.g. to compare hashing cost in the diff benchmarks.

use std::hash::{Hash, Hasher};

#[cfg(not(feature = "std-hash"))]
pub mod map {
    pub use hashbrown::{HashMap, HashSet};
}

#[cfg(feature = "std-hash")]
pub mod map {
    pub use std::collections::{HashMap, HashSet};
}

#[cfg(not(feature = "std-hash"))]
type KeyHasher = ahash::AHasher;

#[cfg(feature = "std-hash")]
type KeyHasher = std::collections::hash_map::DefaultHasher;

/// Hash used for `Key::hashed` and call-site keys. Stable for the lifetime
/// of the process, which is all child matching needs.
pub fn key_hash<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = KeyHasher::default();
    value.hash(&mut hasher);
    hasher.finish()
}
