//! Hash map aliases used by the comparator and the directory cache.
//!
//! With the `gxhash` feature the maps use gxhash's hasher; without it they
//! fall back to std so the crate builds on CPUs lacking AES-NI/SSE2.

#[cfg(feature = "gxhash")]
pub use gxhash::{GxBuildHasher, HashMap, HashMapExt};

#[cfg(not(feature = "gxhash"))]
pub use std::collections::HashMap;

/// Hasher used for `DashMap` keys
#[cfg(not(feature = "gxhash"))]
pub type GxBuildHasher = std::hash::RandomState;
