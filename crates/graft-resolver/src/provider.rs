//! The metadata provider seam: where concrete library versions and their
//! declared dependencies come from.

use async_trait::async_trait;
use graft_core::framework::Framework;
use graft_core::library::{LibraryIdentity, LibraryRange};

/// A concrete library selected for a range, with its direct dependencies
/// for the requested framework.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryMatch {
    pub identity: LibraryIdentity,
    pub dependencies: Vec<LibraryRange>,
}

/// Source of library metadata (remote feeds, local folders, project
/// references).
///
/// Implementations must be safe to call concurrently for different ranges.
/// They need not cache: the resolver deduplicates identical lookups.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Find the best library for `range` under `framework`.
    ///
    /// `Ok(None)` means nothing satisfies the range; `Err` is a provider
    /// failure (network, I/O) and is propagated to the caller.
    async fn resolve(
        &self,
        range: &LibraryRange,
        framework: &Framework,
    ) -> miette::Result<Option<LibraryMatch>>;
}
