//! Expands root ranges into the full dependency tree for one framework.
//!
//! The walk is depth-first with siblings expanded concurrently. Every lookup
//! goes through the shared [`ResolutionCache`]; provider calls are bounded
//! by a semaphore. Each branch carries its own copy of the active path (the
//! names of its ancestors, project included), which is how cycles are cut.

use std::sync::Arc;

use futures_util::future::{self, BoxFuture, FutureExt};
use graft_core::framework::Framework;
use graft_core::library::{DependencyKind, LibraryIdentity, LibraryRange};
use graft_core::range::VersionRange;
use graft_util::errors::GraftError;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::cache::{LibraryResolution, ResolutionCache};
use crate::cache_key::RangeCacheKey;
use crate::graph::{ResolvedGraph, WalkNode, WalkOutcome};
use crate::provider::MetadataProvider;

/// Provider calls allowed in flight when no limit is configured.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// A dependency cycle found during the walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Names from the project down to the repeated library, which appears
    /// at both ends.
    pub path: Vec<String>,
}

impl std::fmt::Display for CycleReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.path.join(" -> "))
    }
}

/// The walked tree plus the cycles cut while building it.
#[derive(Debug)]
pub struct WalkResult {
    pub graph: ResolvedGraph,
    pub cycles: Vec<CycleReport>,
}

/// Walks dependency ranges for one framework.
#[derive(Clone)]
pub struct GraphWalker {
    provider: Arc<dyn MetadataProvider>,
    cache: ResolutionCache,
    framework: Framework,
    legacy_fallback: bool,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl GraphWalker {
    pub fn new(
        provider: Arc<dyn MetadataProvider>,
        cache: ResolutionCache,
        framework: Framework,
    ) -> Self {
        Self {
            provider,
            cache,
            framework,
            legacy_fallback: false,
            permits: Arc::new(Semaphore::new(DEFAULT_CONCURRENCY)),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_legacy_fallback(mut self, legacy_fallback: bool) -> Self {
        self.legacy_fallback = legacy_fallback;
        self
    }

    /// Limit concurrent provider calls (at least one).
    pub fn with_concurrency(mut self, jobs: usize) -> Self {
        self.permits = Arc::new(Semaphore::new(jobs.max(1)));
        self
    }

    /// Share an existing permit pool, e.g. across sessions.
    pub fn with_permits(mut self, permits: Arc<Semaphore>) -> Self {
        self.permits = permits;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn framework(&self) -> &Framework {
        &self.framework
    }

    /// Walk `roots` as the direct dependencies of `project`.
    ///
    /// Unresolved ranges and cycles do not fail the walk. Provider failures
    /// and cancellation do, and leave nothing partial in the cache.
    pub async fn walk(
        &self,
        project: &LibraryIdentity,
        roots: &[LibraryRange],
    ) -> miette::Result<WalkResult> {
        self.check_cancelled()?;

        let root_range = LibraryRange::new(
            &project.name,
            Some(VersionRange::exact(project.version.clone())),
            DependencyKind::Normal,
        )?;
        let path = vec![project.name.clone()];

        let children = future::try_join_all(
            roots
                .iter()
                .map(|range| self.expand(range.clone(), path.clone())),
        )
        .await?;

        let root = WalkNode {
            range: root_range,
            identity: project.clone(),
            outcome: WalkOutcome::Resolved,
            children,
        };

        let mut cycles = Vec::new();
        collect_cycles(&root, &mut vec![project.name.clone()], &mut cycles);
        for cycle in &cycles {
            tracing::warn!("Dependency cycle detected: {cycle}");
        }

        let graph = ResolvedGraph::from_walk(root);
        tracing::debug!(
            "Walked {} nodes for {} ({} cycles)",
            graph.len(),
            self.framework,
            cycles.len()
        );
        Ok(WalkResult { graph, cycles })
    }

    /// Resolve `range` and, unless it closes a cycle, its dependencies.
    /// Build-only dependencies of a resolved library are not followed.
    ///
    /// `path` holds the names of every ancestor of this node.
    fn expand(
        &self,
        range: LibraryRange,
        path: Vec<String>,
    ) -> BoxFuture<'_, miette::Result<WalkNode>> {
        async move {
            self.check_cancelled()?;

            if path.iter().any(|name| range.is_named(name)) {
                return Ok(WalkNode {
                    identity: LibraryIdentity::unresolved(&range),
                    range,
                    outcome: WalkOutcome::Cycle,
                    children: Vec::new(),
                });
            }

            let resolution = self.lookup(&range).await?;
            let Some(found) = resolution.as_match() else {
                tracing::debug!("No match for {range} ({})", self.framework);
                return Ok(WalkNode {
                    identity: LibraryIdentity::unresolved(&range),
                    range,
                    outcome: WalkOutcome::Unresolved,
                    children: Vec::new(),
                });
            };

            let mut child_path = path;
            child_path.push(range.name().to_string());

            let children = future::try_join_all(
                found
                    .dependencies
                    .iter()
                    .filter(|dep| dep.kind() != DependencyKind::BuildOnly)
                    .map(|dep| self.expand(dep.clone(), child_path.clone())),
            )
            .await?;

            Ok(WalkNode {
                identity: found.identity.clone(),
                range,
                outcome: WalkOutcome::Resolved,
                children,
            })
        }
        .boxed()
    }

    async fn lookup(&self, range: &LibraryRange) -> miette::Result<Arc<LibraryResolution>> {
        let key = RangeCacheKey::new(range.clone(), self.framework.clone(), self.legacy_fallback);
        self.cache.get_or_resolve(key, || self.fetch(range)).await
    }

    /// Ask the provider, holding a permit. Both the wait for a permit and
    /// the provider call race cancellation.
    async fn fetch(&self, range: &LibraryRange) -> miette::Result<LibraryResolution> {
        let _permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(GraftError::Cancelled.into()),
            permit = self.permits.acquire() => permit.map_err(|e| GraftError::Generic {
                message: format!("Provider permit pool unavailable: {e}"),
            })?,
        };
        tracing::debug!("Resolving {range} for {}", self.framework);
        let found = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(GraftError::Cancelled.into()),
            found = self.provider.resolve(range, &self.framework) => found?,
        };
        Ok(match found {
            Some(found) => LibraryResolution::Resolved(found),
            None => LibraryResolution::Unresolved,
        })
    }

    fn check_cancelled(&self) -> miette::Result<()> {
        if self.cancel.is_cancelled() {
            return Err(GraftError::Cancelled.into());
        }
        Ok(())
    }
}

/// Record one report per cycle node, in preorder.
fn collect_cycles(node: &WalkNode, path: &mut Vec<String>, out: &mut Vec<CycleReport>) {
    for child in &node.children {
        if child.outcome == WalkOutcome::Cycle {
            let mut cycle = path.clone();
            cycle.push(child.range.name().to_string());
            out.push(CycleReport { path: cycle });
            continue;
        }
        path.push(child.range.name().to_string());
        collect_cycles(child, path, out);
        path.pop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use graft_core::version::Version;

    use super::*;
    use crate::feed::LocalFeed;
    use crate::provider::LibraryMatch;

    fn project() -> LibraryIdentity {
        LibraryIdentity::project("App", Version::parse("1.0").unwrap())
    }

    fn range(name: &str, r: &str) -> LibraryRange {
        LibraryRange::parse(name, r).unwrap()
    }

    fn walker(feed: LocalFeed) -> GraphWalker {
        GraphWalker::new(
            Arc::new(feed),
            ResolutionCache::new(),
            Framework::parse("net8.0").unwrap(),
        )
    }

    #[tokio::test]
    async fn walks_transitive_dependencies() {
        let mut feed = LocalFeed::new();
        feed.add("A", "1.0.0", &[("B", "1.0")]).unwrap();
        feed.add("B", "1.0.0", &[("C", "1.0")]).unwrap();
        feed.add("C", "1.0.0", &[]).unwrap();

        let result = walker(feed).walk(&project(), &[range("A", "1.0")]).await.unwrap();
        let g = &result.graph;
        assert_eq!(g.len(), 3);
        assert!(result.cycles.is_empty());
        let c = g.nodes_named("C")[0];
        assert_eq!(g.node(c).depth, 3);
        assert_eq!(g.node(c).outcome, WalkOutcome::Resolved);
    }

    #[tokio::test]
    async fn cycle_is_cut_and_reported() {
        let mut feed = LocalFeed::new();
        feed.add("A", "1.0.0", &[("B", "1.0")]).unwrap();
        feed.add("B", "1.0.0", &[("a", "1.0"), ("D", "1.0")]).unwrap();
        feed.add("D", "1.0.0", &[]).unwrap();

        let result = walker(feed).walk(&project(), &[range("A", "1.0")]).await.unwrap();
        assert_eq!(result.cycles.len(), 1);
        assert_eq!(result.cycles[0].to_string(), "App -> A -> B -> a");

        let g = &result.graph;
        let cut = g.nodes_named("A")[1];
        assert_eq!(g.node(cut).outcome, WalkOutcome::Cycle);
        assert!(g.children(cut).is_empty());
        assert_eq!(g.nodes_named("D").len(), 1);
    }

    #[tokio::test]
    async fn dependency_on_the_project_is_a_cycle() {
        let mut feed = LocalFeed::new();
        feed.add("A", "1.0.0", &[("App", "1.0")]).unwrap();
        let result = walker(feed).walk(&project(), &[range("A", "1.0")]).await.unwrap();
        assert_eq!(result.cycles[0].path, vec!["App", "A", "App"]);
    }

    #[tokio::test]
    async fn build_only_dependencies_of_packages_are_skipped() {
        let mut feed = LocalFeed::new();
        feed.add_ranges(
            "A",
            "1.0.0",
            vec![range("Analyzer", "1.0").with_kind(DependencyKind::BuildOnly)],
        )
        .unwrap();
        feed.add("Analyzer", "1.0.0", &[]).unwrap();

        let roots = [
            range("A", "1.0"),
            range("Analyzer", "1.0").with_kind(DependencyKind::BuildOnly),
        ];
        let result = walker(feed).walk(&project(), &roots).await.unwrap();
        let g = &result.graph;
        let analyzers = g.nodes_named("Analyzer");
        assert_eq!(analyzers.len(), 1);
        assert_eq!(g.node(analyzers[0]).depth, 1);
        assert_eq!(g.node(analyzers[0]).range.kind(), DependencyKind::BuildOnly);
    }

    #[tokio::test]
    async fn build_only_dependency_of_root_package_is_not_walked() {
        let mut feed = LocalFeed::new();
        feed.add_ranges(
            "A",
            "1.0.0",
            vec![
                range("Analyzer", "1.0").with_kind(DependencyKind::BuildOnly),
                range("B", "1.0"),
            ],
        )
        .unwrap();
        feed.add("Analyzer", "1.0.0", &[]).unwrap();
        feed.add("B", "1.0.0", &[]).unwrap();

        let result = walker(feed).walk(&project(), &[range("A", "1.0")]).await.unwrap();
        let g = &result.graph;
        assert!(g.nodes_named("Analyzer").is_empty());
        assert_eq!(g.nodes_named("B").len(), 1);
        assert_eq!(g.len(), 2);
    }

    #[tokio::test]
    async fn unresolved_ranges_are_kept() {
        let mut feed = LocalFeed::new();
        feed.add("A", "1.0.0", &[("Missing", "[2.0,3.0)")]).unwrap();
        let result = walker(feed).walk(&project(), &[range("A", "1.0")]).await.unwrap();
        let g = &result.graph;
        let missing = g.nodes_named("missing")[0];
        assert_eq!(g.node(missing).outcome, WalkOutcome::Unresolved);
        assert!(g.node(missing).identity.is_unresolved());
    }

    struct Counting {
        inner: LocalFeed,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl MetadataProvider for Counting {
        async fn resolve(
            &self,
            range: &LibraryRange,
            framework: &Framework,
        ) -> miette::Result<Option<LibraryMatch>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.inner.resolve(range, framework).await
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrency_is_bounded() {
        let mut inner = LocalFeed::new();
        let deps: Vec<(String, String)> =
            (0..12).map(|i| (format!("Leaf{i}"), "1.0".to_string())).collect();
        let pairs: Vec<(&str, &str)> = deps.iter().map(|(n, v)| (n.as_str(), v.as_str())).collect();
        inner.add("Hub", "1.0.0", &pairs).unwrap();
        for (name, _) in &deps {
            inner.add(name, "1.0.0", &[]).unwrap();
        }
        let provider = Arc::new(Counting {
            inner,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });

        let walker = GraphWalker::new(
            provider.clone(),
            ResolutionCache::new(),
            Framework::parse("net8.0").unwrap(),
        )
        .with_concurrency(2);
        let result = walker.walk(&project(), &[range("Hub", "1.0")]).await.unwrap();
        assert_eq!(result.graph.len(), 13);
        assert!(provider.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut feed = LocalFeed::new();
        feed.add("A", "1.0.0", &[]).unwrap();
        let cache = ResolutionCache::new();
        let walker = GraphWalker::new(Arc::new(feed), cache.clone(), Framework::any())
            .with_cancellation(cancel);
        let err = walker.walk(&project(), &[range("A", "1.0")]).await.unwrap_err();
        assert!(err.to_string().contains("cancelled"), "got: {err}");
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn cancelled_while_waiting_for_a_permit() {
        let mut feed = LocalFeed::new();
        feed.add("A", "1.0.0", &[]).unwrap();
        let cancel = CancellationToken::new();
        let cache = ResolutionCache::new();
        let walker = GraphWalker::new(Arc::new(feed), cache.clone(), Framework::any())
            .with_permits(Arc::new(Semaphore::new(0)))
            .with_cancellation(cancel.clone());

        let trigger = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            cancel.cancel();
        });
        let err = walker.walk(&project(), &[range("A", "1.0")]).await.unwrap_err();
        trigger.await.unwrap();
        assert!(err.to_string().contains("cancelled"), "got: {err}");
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn closed_permit_pool_is_not_a_cancellation() {
        let mut feed = LocalFeed::new();
        feed.add("A", "1.0.0", &[]).unwrap();
        let permits = Arc::new(Semaphore::new(1));
        permits.close();
        let walker = GraphWalker::new(Arc::new(feed), ResolutionCache::new(), Framework::any())
            .with_permits(permits);

        let err = walker.walk(&project(), &[range("A", "1.0")]).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("permit pool unavailable"), "got: {message}");
        assert!(!message.contains("cancelled"));
    }
}
