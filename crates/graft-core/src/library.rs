//! Library references: requested ranges and resolved identities.
//!
//! Library names are case-insensitive identities. Equality and hashing both
//! fold ASCII case so that `Newtonsoft.Json` and `newtonsoft.json` are the
//! same library everywhere (cache keys, conflict grouping, cycle checks).

use std::fmt;
use std::hash::{Hash, Hasher};

use graft_util::errors::GraftError;
use serde::{Deserialize, Serialize};

use crate::range::VersionRange;
use crate::version::Version;

/// How a dependency participates in the consumer's build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyKind {
    /// Flows to consumers like any other dependency.
    #[default]
    Normal,
    /// Needed only while building the declaring library; not followed
    /// transitively by consumers of that library.
    BuildOnly,
}

/// What a resolved identity refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryType {
    Package,
    Project,
    Unresolved,
}

impl fmt::Display for LibraryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Package => "package",
            Self::Project => "project",
            Self::Unresolved => "unresolved",
        })
    }
}

/// A named library plus an allowed set of versions plus a dependency kind.
#[derive(Debug, Clone)]
pub struct LibraryRange {
    name: String,
    version_range: Option<VersionRange>,
    kind: DependencyKind,
}

impl LibraryRange {
    /// Create a range, rejecting names that are empty after trimming.
    pub fn new(
        name: &str,
        version_range: Option<VersionRange>,
        kind: DependencyKind,
    ) -> miette::Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GraftError::InvalidLibrary {
                message: "library name must not be empty".to_string(),
            }
            .into());
        }
        Ok(Self {
            name: name.to_string(),
            version_range,
            kind,
        })
    }

    /// Parse `name` with a range expression; an empty expression means any version.
    pub fn parse(name: &str, range: &str) -> miette::Result<Self> {
        let version_range = if range.trim().is_empty() {
            None
        } else {
            Some(VersionRange::parse(range)?)
        };
        Self::new(name, version_range, DependencyKind::Normal)
    }

    /// The same range with a different dependency kind.
    pub fn with_kind(mut self, kind: DependencyKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lowercased name, used to group nodes of the same library.
    pub fn key(&self) -> String {
        self.name.to_ascii_lowercase()
    }

    pub fn version_range(&self) -> Option<&VersionRange> {
        self.version_range.as_ref()
    }

    pub fn kind(&self) -> DependencyKind {
        self.kind
    }

    /// Case-insensitive name comparison.
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// Pick the best version out of `available` for this range.
    pub fn select_best<'a, I>(&self, available: I) -> Option<Version>
    where
        I: IntoIterator<Item = &'a Version>,
    {
        match self.version_range {
            Some(ref range) => range.select_best(available),
            None => VersionRange::all().select_best(available),
        }
    }
}

impl PartialEq for LibraryRange {
    fn eq(&self, other: &Self) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
            && self.version_range == other.version_range
            && self.kind == other.kind
    }
}

impl Eq for LibraryRange {}

impl Hash for LibraryRange {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_name(&self.name, state);
        self.version_range.hash(state);
        self.kind.hash(state);
    }
}

impl fmt::Display for LibraryRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some(ref range) = self.version_range {
            write!(f, " {range}")?;
        }
        if self.kind == DependencyKind::BuildOnly {
            f.write_str(" (build)")?;
        }
        Ok(())
    }
}

/// A concrete library: name, exact version, and what kind of thing it is.
#[derive(Debug, Clone)]
pub struct LibraryIdentity {
    pub name: String,
    pub version: Version,
    pub library_type: LibraryType,
}

impl LibraryIdentity {
    pub fn package(name: &str, version: Version) -> Self {
        Self {
            name: name.to_string(),
            version,
            library_type: LibraryType::Package,
        }
    }

    pub fn project(name: &str, version: Version) -> Self {
        Self {
            name: name.to_string(),
            version,
            library_type: LibraryType::Project,
        }
    }

    /// Placeholder for a range nothing satisfied. The version is the range
    /// minimum (or `0.0.0`) so diagnostics can show what was asked for.
    pub fn unresolved(range: &LibraryRange) -> Self {
        let version = range
            .version_range()
            .and_then(VersionRange::min)
            .cloned()
            .unwrap_or_else(|| Version::new(0, 0, 0, 0));
        Self {
            name: range.name().to_string(),
            version,
            library_type: LibraryType::Unresolved,
        }
    }

    /// Lowercased name.
    pub fn key(&self) -> String {
        self.name.to_ascii_lowercase()
    }

    pub fn is_unresolved(&self) -> bool {
        self.library_type == LibraryType::Unresolved
    }
}

impl PartialEq for LibraryIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
            && self.version == other.version
            && self.library_type == other.library_type
    }
}

impl Eq for LibraryIdentity {}

impl Hash for LibraryIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_name(&self.name, state);
        self.version.hash(state);
        self.library_type.hash(state);
    }
}

impl fmt::Display for LibraryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}

/// Hash a name the same way `eq_ignore_ascii_case` compares it.
fn hash_name<H: Hasher>(name: &str, state: &mut H) {
    for b in name.bytes() {
        state.write_u8(b.to_ascii_lowercase());
    }
    state.write_u8(0xff);
}
