//! Dependency resolution engine: memoized range lookups, concurrent graph
//! walking with cycle detection, nearest-wins conflict resolution with
//! downgrade detection, and multi-framework sessions over a shared cache.

pub mod cache;
pub mod cache_key;
pub mod conflict;
pub mod feed;
pub mod graph;
pub mod provider;
pub mod resolver;
pub mod walker;
