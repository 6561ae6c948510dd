//! Resolution sessions: walk, resolve conflicts, report.
//!
//! A [`Resolver`] owns the provider, a shared [`ResolutionCache`] and the
//! resolve settings. Each call to [`Resolver::resolve`] is one session for
//! one framework; [`Resolver::resolve_frameworks`] runs several sessions in
//! parallel over the same cache.

use std::sync::Arc;

use graft_core::config::ResolveConfig;
use graft_core::framework::Framework;
use graft_core::library::{LibraryIdentity, LibraryRange, LibraryType};
use graft_util::errors::GraftError;
use graft_util::hash::sha256_bytes;
use petgraph::graph::NodeIndex;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::cache::ResolutionCache;
use crate::conflict::{
    resolve_conflicts, ConflictReport, ConflictResolution, Disposition, VersionConflict,
};
use crate::graph::ResolvedGraph;
use crate::provider::MetadataProvider;
use crate::walker::{CycleReport, GraphWalker};

/// Everything one session needs.
#[derive(Debug, Clone)]
pub struct ResolveRequest {
    pub project: LibraryIdentity,
    pub roots: Vec<LibraryRange>,
    pub framework: Framework,
    pub legacy_fallback: bool,
}

/// Entry point for resolution sessions.
#[derive(Clone)]
pub struct Resolver {
    provider: Arc<dyn MetadataProvider>,
    cache: ResolutionCache,
    config: ResolveConfig,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl Resolver {
    pub fn new(provider: Arc<dyn MetadataProvider>, config: ResolveConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.concurrency()));
        Self {
            provider,
            cache: ResolutionCache::new(),
            config,
            permits,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an existing cache, e.g. one shared with another resolver.
    pub fn with_cache(mut self, cache: ResolutionCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    pub fn config(&self) -> &ResolveConfig {
        &self.config
    }

    /// A request for `framework` using the configured legacy flag.
    pub fn request(
        &self,
        project: LibraryIdentity,
        roots: Vec<LibraryRange>,
        framework: Framework,
    ) -> ResolveRequest {
        ResolveRequest {
            project,
            roots,
            framework,
            legacy_fallback: self.config.legacy_fallback,
        }
    }

    /// Run one session.
    ///
    /// Unresolved ranges, cycles and downgrades are part of the outcome, not
    /// errors; see [`ResolveOutcome::check`] for turning them into errors.
    pub async fn resolve(&self, request: &ResolveRequest) -> miette::Result<ResolveOutcome> {
        let walker = GraphWalker::new(
            self.provider.clone(),
            self.cache.clone(),
            request.framework.clone(),
        )
        .with_legacy_fallback(request.legacy_fallback)
        .with_permits(self.permits.clone())
        .with_cancellation(self.cancel.clone());

        let walked = walker.walk(&request.project, &request.roots).await?;
        let conflicts = resolve_conflicts(&walked.graph);

        let outcome = ResolveOutcome {
            framework: request.framework.clone(),
            graph: walked.graph,
            conflicts,
            cycles: walked.cycles,
        };
        tracing::info!(
            "Resolved {} packages for {} ({} unresolved, {} conflicts)",
            outcome.accepted().len(),
            outcome.framework,
            outcome.unresolved().len(),
            outcome.report().len()
        );
        Ok(outcome)
    }

    /// Run one session per framework in parallel over the shared cache.
    /// Outcomes come back in the order of `frameworks`.
    pub async fn resolve_frameworks(
        &self,
        project: &LibraryIdentity,
        roots: &[LibraryRange],
        frameworks: &[Framework],
    ) -> miette::Result<Vec<ResolveOutcome>> {
        let mut join_set = JoinSet::new();
        for (i, framework) in frameworks.iter().enumerate() {
            let resolver = self.clone();
            let request = self.request(project.clone(), roots.to_vec(), framework.clone());
            join_set.spawn(async move { (i, resolver.resolve(&request).await) });
        }

        let mut outcomes: Vec<Option<ResolveOutcome>> = frameworks.iter().map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            let (i, result) = joined.map_err(|e| GraftError::Generic {
                message: format!("Resolution task failed: {e}"),
            })?;
            outcomes[i] = Some(result?);
        }
        Ok(outcomes.into_iter().flatten().collect())
    }
}

/// A package in the final resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedPackage {
    pub name: String,
    pub version: String,
    #[serde(rename = "type")]
    pub library_type: LibraryType,
    /// Names of the direct dependencies, sorted.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

/// The result of one session.
#[derive(Debug)]
pub struct ResolveOutcome {
    pub framework: Framework,
    pub graph: ResolvedGraph,
    pub conflicts: ConflictResolution,
    pub cycles: Vec<CycleReport>,
}

impl ResolveOutcome {
    pub fn disposition(&self, idx: NodeIndex) -> Disposition {
        self.conflicts.disposition(idx)
    }

    /// Accepted nodes, breadth-first.
    pub fn accepted(&self) -> Vec<NodeIndex> {
        self.conflicts.accepted(&self.graph)
    }

    /// Ranges nothing satisfied, among nodes that took part in resolution.
    pub fn unresolved(&self) -> Vec<&LibraryRange> {
        self.conflicts
            .with_disposition(&self.graph, Disposition::Unresolved)
            .into_iter()
            .map(|idx| &self.graph.node(idx).range)
            .collect()
    }

    pub fn report(&self) -> &ConflictReport {
        &self.conflicts.report
    }

    pub fn downgrades(&self) -> Vec<&VersionConflict> {
        self.conflicts.report.downgrades().collect()
    }

    /// The accepted identity for a library name.
    pub fn resolved(&self, name: &str) -> Option<&LibraryIdentity> {
        self.conflicts
            .winner(name)
            .filter(|&idx| idx != self.graph.root())
            .map(|idx| &self.graph.node(idx).identity)
    }

    /// Accepted packages sorted by name, with their direct dependencies.
    pub fn packages(&self) -> Vec<ResolvedPackage> {
        let mut packages: Vec<ResolvedPackage> = self
            .accepted()
            .into_iter()
            .map(|idx| {
                let node = self.graph.node(idx);
                let mut dependencies: Vec<String> = self
                    .graph
                    .children(idx)
                    .iter()
                    .filter(|&&child| {
                        matches!(
                            self.disposition(child),
                            Disposition::Accepted
                                | Disposition::Rejected
                                | Disposition::Downgraded
                        )
                    })
                    .map(|&child| {
                        self.conflicts
                            .effective_identity(&self.graph, child)
                            .name
                            .clone()
                    })
                    .collect();
                dependencies.sort_by_key(|name| name.to_ascii_lowercase());
                dependencies.dedup_by(|a, b| a.eq_ignore_ascii_case(b));
                ResolvedPackage {
                    name: node.identity.name.clone(),
                    version: node.identity.version.to_string(),
                    library_type: node.identity.library_type,
                    dependencies,
                }
            })
            .collect();
        packages.sort_by(|a, b| {
            a.name
                .to_ascii_lowercase()
                .cmp(&b.name.to_ascii_lowercase())
        });
        packages
    }

    /// The resolved packages as pretty-printed JSON.
    pub fn to_json(&self) -> miette::Result<String> {
        serde_json::to_string_pretty(&self.packages()).map_err(|e| {
            GraftError::Generic {
                message: format!("Failed to serialize resolution: {e}"),
            }
            .into()
        })
    }

    /// SHA-256 of [`to_json`](Self::to_json); equal for equal resolutions.
    pub fn fingerprint(&self) -> miette::Result<String> {
        Ok(sha256_bytes(self.to_json()?.as_bytes()))
    }

    /// Apply the caller's policy: unresolved ranges and, optionally,
    /// downgrades become errors.
    pub fn check(&self, config: &ResolveConfig) -> miette::Result<()> {
        let unresolved = self.unresolved();
        if config.fail_on_unresolved && !unresolved.is_empty() {
            let ranges: Vec<String> = unresolved.iter().map(|r| r.to_string()).collect();
            return Err(GraftError::Resolution {
                message: format!(
                    "Unable to find {} for {}: {}",
                    if ranges.len() == 1 { "a package" } else { "packages" },
                    self.framework,
                    ranges.join(", ")
                ),
            }
            .into());
        }

        let downgrades = self.downgrades();
        if downgrades.is_empty() {
            return Ok(());
        }
        if config.downgrades_as_errors {
            let detail: Vec<String> = downgrades.iter().map(|d| d.to_string()).collect();
            return Err(GraftError::Resolution {
                message: format!(
                    "Detected package downgrade for {}: {}",
                    self.framework,
                    detail.join("; ")
                ),
            }
            .into());
        }
        for downgrade in downgrades {
            tracing::warn!("{downgrade}");
        }
        Ok(())
    }

    /// Render the walked tree, marking nodes that lost to another node.
    pub fn print_tree(&self, max_depth: Option<usize>) -> String {
        self.graph.print_tree(max_depth, |idx| match self.disposition(idx) {
            lost @ (Disposition::Rejected | Disposition::Downgraded) => {
                match self.conflicts.winner(&self.graph.node(idx).key()) {
                    Some(winner) => Some(format!(
                        "{lost}, {} wins",
                        self.graph.node(winner).identity.version
                    )),
                    None => Some(lost.to_string()),
                }
            }
            _ => None,
        })
    }
}
