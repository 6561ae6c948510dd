//! Core value types for graft.
//!
//! This crate defines the pure data model shared by the resolver: versions,
//! version ranges with floating selectors, library ranges and identities,
//! target frameworks, and user configuration.
//!
//! This crate is intentionally free of async code and network I/O.

pub mod config;
pub mod framework;
pub mod library;
pub mod range;
pub mod version;
