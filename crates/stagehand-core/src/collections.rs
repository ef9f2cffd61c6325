//! Hashed collections used across the engine, pinned to one hasher.

pub(crate) type HashMap<K, V> = hashbrown::HashMap<K, V, ahash::RandomState>;
pub(crate) type HashSet<T> = hashbrown::HashSet<T, ahash::RandomState>;
