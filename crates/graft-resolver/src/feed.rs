//! An in-memory package feed usable as a [`MetadataProvider`].
//!
//! Feeds can be built in code or loaded from TOML:
//!
//! ```toml
//! [[package]]
//! name = "Contoso.Http"
//! version = "2.1.0"
//!
//! [package.dependencies]
//! "Contoso.Json" = "[1.0, 2.0)"
//! "Contoso.Analyzers" = { version = "1.*", kind = "build-only" }
//!
//! [package.frameworks."netstandard2.0".dependencies]
//! "System.Memory" = "4.5"
//! ```
//!
//! `[package.dependencies]` is the framework-independent group; each
//! `[package.frameworks.<tfm>]` table adds a group for that framework.
//! Dependencies keep the order they are written in.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use graft_core::framework::Framework;
use graft_core::library::{DependencyKind, LibraryIdentity, LibraryRange};
use graft_core::version::Version;
use graft_util::errors::GraftError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::provider::{LibraryMatch, MetadataProvider};

/// A feed package version and its dependency groups.
#[derive(Debug, Clone)]
struct FeedEntry {
    identity: LibraryIdentity,
    groups: Vec<DependencyGroup>,
}

#[derive(Debug, Clone)]
struct DependencyGroup {
    framework: Option<Framework>,
    dependencies: Vec<LibraryRange>,
}

impl FeedEntry {
    /// The most specific group usable by `target`: an exact framework match,
    /// else the nearest compatible framework (same family first, then the
    /// highest version), else the framework-less group.
    fn dependencies_for(&self, target: &Framework) -> Vec<LibraryRange> {
        let nearest = self
            .groups
            .iter()
            .filter_map(|g| g.framework.as_ref().map(|fw| (fw, g)))
            .filter(|(fw, _)| target.is_compatible_with(fw))
            .max_by_key(|(fw, _)| {
                (
                    *fw == target,
                    fw.family() == target.family(),
                    fw.version().clone(),
                )
            })
            .map(|(_, g)| g);
        nearest
            .or_else(|| self.groups.iter().find(|g| g.framework.is_none()))
            .map(|g| g.dependencies.clone())
            .unwrap_or_default()
    }
}

/// Package versions keyed by lowercased name.
#[derive(Debug, Default)]
pub struct LocalFeed {
    packages: HashMap<String, Vec<FeedEntry>>,
    calls: AtomicUsize,
}

impl LocalFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a package version with framework-independent dependencies given
    /// as `(name, range)` pairs.
    pub fn add(
        &mut self,
        name: &str,
        version: &str,
        dependencies: &[(&str, &str)],
    ) -> miette::Result<&mut Self> {
        let deps = parse_pairs(dependencies)?;
        self.add_group(name, version, None, deps)?;
        Ok(self)
    }

    /// Add a dependency group for one framework to a package version,
    /// creating the version if needed.
    pub fn add_for(
        &mut self,
        name: &str,
        version: &str,
        framework: &str,
        dependencies: &[(&str, &str)],
    ) -> miette::Result<&mut Self> {
        let deps = parse_pairs(dependencies)?;
        self.add_group(name, version, Some(Framework::parse(framework)?), deps)?;
        Ok(self)
    }

    /// Add a package version with explicit dependency ranges.
    pub fn add_ranges(
        &mut self,
        name: &str,
        version: &str,
        dependencies: Vec<LibraryRange>,
    ) -> miette::Result<&mut Self> {
        self.add_group(name, version, None, dependencies)?;
        Ok(self)
    }

    fn add_group(
        &mut self,
        name: &str,
        version: &str,
        framework: Option<Framework>,
        dependencies: Vec<LibraryRange>,
    ) -> miette::Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GraftError::InvalidLibrary {
                message: "feed package name must not be empty".to_string(),
            }
            .into());
        }
        let version = Version::parse(version)?;
        let entries = self.packages.entry(name.to_ascii_lowercase()).or_default();
        let group = DependencyGroup {
            framework,
            dependencies,
        };
        match entries.iter_mut().find(|e| e.identity.version == version) {
            Some(entry) => {
                entry.groups.retain(|g| g.framework != group.framework);
                entry.groups.push(group);
            }
            None => entries.push(FeedEntry {
                identity: LibraryIdentity::package(name, version),
                groups: vec![group],
            }),
        }
        Ok(())
    }

    /// All versions of a package, unordered.
    pub fn versions(&self, name: &str) -> Vec<Version> {
        self.packages
            .get(&name.to_ascii_lowercase())
            .map(|entries| entries.iter().map(|e| e.identity.version.clone()).collect())
            .unwrap_or_default()
    }

    /// Number of `resolve` calls served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Load a feed from a TOML file.
    pub fn from_path(path: &Path) -> miette::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(GraftError::Io)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> miette::Result<Self> {
        let manifest: FeedManifest = toml::from_str(content).map_err(|e| GraftError::Generic {
            message: format!("Failed to parse feed: {e}"),
        })?;
        let mut feed = Self::new();
        for package in manifest.package {
            feed.add_group(
                &package.name,
                &package.version,
                None,
                to_ranges(&package.dependencies)?,
            )?;
            for (tfm, group) in &package.frameworks {
                feed.add_group(
                    &package.name,
                    &package.version,
                    Some(Framework::parse(tfm)?),
                    to_ranges(&group.dependencies)?,
                )?;
            }
        }
        Ok(feed)
    }
}

#[async_trait]
impl MetadataProvider for LocalFeed {
    async fn resolve(
        &self,
        range: &LibraryRange,
        framework: &Framework,
    ) -> miette::Result<Option<LibraryMatch>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let Some(entries) = self.packages.get(&range.key()) else {
            return Ok(None);
        };
        let best = range.select_best(entries.iter().map(|e| &e.identity.version));
        Ok(best.and_then(|version| {
            entries
                .iter()
                .find(|e| e.identity.version == version)
                .map(|entry| LibraryMatch {
                    identity: entry.identity.clone(),
                    dependencies: entry.dependencies_for(framework),
                })
        }))
    }
}

fn parse_pairs(pairs: &[(&str, &str)]) -> miette::Result<Vec<LibraryRange>> {
    pairs
        .iter()
        .map(|(name, range)| LibraryRange::parse(name, range))
        .collect()
}

/// On-disk feed format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct FeedManifest {
    #[serde(default)]
    package: Vec<FeedPackage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FeedPackage {
    name: String,
    version: String,
    #[serde(default)]
    dependencies: IndexMap<String, FeedDependency>,
    #[serde(default)]
    frameworks: BTreeMap<String, FeedGroup>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct FeedGroup {
    #[serde(default)]
    dependencies: IndexMap<String, FeedDependency>,
}

/// A dependency written either as a bare range or as a table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum FeedDependency {
    Short(String),
    Detailed {
        #[serde(default)]
        version: String,
        #[serde(default)]
        kind: DependencyKind,
    },
}

fn to_ranges(deps: &IndexMap<String, FeedDependency>) -> miette::Result<Vec<LibraryRange>> {
    deps.iter()
        .map(|(name, dep)| match dep {
            FeedDependency::Short(range) => LibraryRange::parse(name, range),
            FeedDependency::Detailed { version, kind } => {
                Ok(LibraryRange::parse(name, version)?.with_kind(*kind))
            }
        })
        .collect()
}
