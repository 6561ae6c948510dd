//! Shared utilities for graft.
//!
//! This crate provides the cross-cutting concerns used by the other graft
//! crates: the unified error type and content hashing for resolved graphs.

pub mod errors;
pub mod hash;
