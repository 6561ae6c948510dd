//! Memoization key for range lookups.

use std::fmt;
use std::hash::{Hash, Hasher};

use graft_core::framework::Framework;
use graft_core::library::LibraryRange;

/// A library range looked up for one framework under one fallback mode.
///
/// Two keys are equal iff all three components are equal. Sharing a
/// [`ResolutionCache`](crate::cache::ResolutionCache) across frameworks or
/// fallback modes is safe only because of this.
#[derive(Debug, Clone)]
pub struct RangeCacheKey {
    range: LibraryRange,
    framework: Framework,
    legacy_fallback: bool,
}

impl RangeCacheKey {
    pub fn new(range: LibraryRange, framework: Framework, legacy_fallback: bool) -> Self {
        Self {
            range,
            framework,
            legacy_fallback,
        }
    }

    pub fn range(&self) -> &LibraryRange {
        &self.range
    }

    pub fn framework(&self) -> &Framework {
        &self.framework
    }

    pub fn legacy_fallback(&self) -> bool {
        self.legacy_fallback
    }
}

impl PartialEq for RangeCacheKey {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        self.range == other.range
            && self.framework == other.framework
            && self.legacy_fallback == other.legacy_fallback
    }
}

impl Eq for RangeCacheKey {}

impl Hash for RangeCacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.range.hash(state);
        self.framework.hash(state);
        self.legacy_fallback.hash(state);
    }
}

impl fmt::Display for RangeCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.range, self.framework, self.legacy_fallback)
    }
}
