//! Deterministic `HashMap` and `HashSet` variants. The standard library maps are
//! randomly seeded per process, which would make iteration order (and therefore
//! simulation output for a fixed random seed) vary between runs.
//!
//! `HashMap<K, V, S>` does not have a `new` method for a custom hasher. Use
//! `HashMap::default()` instead.
//!
//! The `hash_str` free function is used by `crate::random` to derive a stable
//! per-generator seed offset from the generator's name.

use xxhash_rust::xxh3::xxh3_64;

pub use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};

/// A convenience method to compute the hash of a `&str`.
pub fn hash_str(data: &str) -> u64 {
    xxh3_64(data.as_bytes())
}
