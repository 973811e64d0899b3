//! Pull request discovery
//!
//! Finds every merged pull request a user authored in a date window by
//! composing independent [`DiscoveryStrategy`] implementations over one
//! [`GitHubApi`]. Strategy outputs are concatenated, deduplicated by
//! `(repo_full_name, number)`, and sorted by merge time.
//!
//! Failure handling follows [`crate::error::ErrorTier`]: a repo or org that
//! cannot be read is skipped with a warning, while authentication failures
//! and exhausted rate-limit retries abort the run.

pub mod filter;
pub mod repo_scan;
pub mod strategy;

pub use filter::{RepoFilter, Scope};
pub use repo_scan::{scan_repo, RepoScanOutcome};
pub use strategy::{
    DiscoveryStrategy, ExplicitRepoStrategy, GlobalSearchStrategy, OrgSweepStrategy,
};

use crate::cache::ResponseCache;
use crate::error::GitHubError;
use crate::github::{GitHubApi, PullRequest, SearchHit};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Only work that landed on these branches counts as shipped.
pub fn is_allowed_base_branch(branch: &str) -> bool {
    branch == "main" || branch == "master" || branch.starts_with("release/")
}

pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// 23:59:59.999 UTC on `date`.
pub fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    start_of_day(date) + Duration::days(1) - Duration::milliseconds(1)
}

/// `since <= merged_at <= end_of_day(until)`
pub fn is_in_date_range(merged_at: DateTime<Utc>, since: NaiveDate, until: NaiveDate) -> bool {
    merged_at >= start_of_day(since) && merged_at <= end_of_day(until)
}

/// What to discover and where to look.
#[derive(Debug, Clone)]
pub struct DiscoveryRequest {
    pub username: String,
    pub since: NaiveDate,
    pub until: NaiveDate,
    pub filter: RepoFilter,
    /// When non-empty, only these repositories are scanned.
    pub explicit_repos: Vec<String>,
    pub skip_org_sweep: bool,
    pub include_commits: bool,
}

impl DiscoveryRequest {
    pub fn new(username: impl Into<String>, since: NaiveDate, until: NaiveDate) -> Self {
        Self {
            username: username.into(),
            since,
            until,
            filter: RepoFilter::default(),
            explicit_repos: Vec::new(),
            skip_org_sweep: false,
            include_commits: true,
        }
    }

    pub fn in_range(&self, merged_at: DateTime<Utc>) -> bool {
        is_in_date_range(merged_at, self.since, self.until)
    }

    pub fn merged_qualifier(&self) -> String {
        format!(
            "merged:{}..{}",
            self.since.format("%Y-%m-%d"),
            self.until.format("%Y-%m-%d")
        )
    }

    pub fn allows_repo(&self, full_name: &str) -> bool {
        self.filter.allows(full_name, &self.username)
    }
}

/// Counters reported after a discovery run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryStats {
    pub strategies_run: Vec<String>,
    pub search_hits: usize,
    pub cache_hit: bool,
    pub repos_scanned: usize,
    pub repos_skipped: usize,
}

/// Shared state handed to each strategy in turn.
pub struct DiscoveryContext<'a> {
    pub api: &'a dyn GitHubApi,
    pub cache: &'a ResponseCache,
    pub request: &'a DiscoveryRequest,
    /// Lower-cased full names already handled by an earlier strategy.
    pub covered_repos: HashSet<String>,
    pub stats: DiscoveryStats,
}

impl<'a> DiscoveryContext<'a> {
    pub fn new(
        api: &'a dyn GitHubApi,
        cache: &'a ResponseCache,
        request: &'a DiscoveryRequest,
    ) -> Self {
        Self {
            api,
            cache,
            request,
            covered_repos: HashSet::new(),
            stats: DiscoveryStats::default(),
        }
    }

    pub fn mark_covered(&mut self, full_name: &str) {
        self.covered_repos.insert(full_name.to_ascii_lowercase());
    }

    pub fn is_covered(&self, full_name: &str) -> bool {
        self.covered_repos.contains(&full_name.to_ascii_lowercase())
    }

    /// Fetch the full pull request behind each distinct search hit, keeping
    /// merged ones on an allowed base branch. A hit that cannot be fetched is
    /// skipped unless the error is fatal.
    pub async fn hydrate_hits(
        &self,
        hits: Vec<SearchHit>,
    ) -> Result<Vec<PullRequest>, GitHubError> {
        let mut seen = HashSet::new();
        let mut prs = Vec::new();

        for hit in hits {
            if !seen.insert(hit.clone()) {
                continue;
            }
            let record = match self.api.pull_request(&hit.repo_full_name, hit.number).await {
                Ok(record) => record,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(
                        repo = %hit.repo_full_name,
                        number = hit.number,
                        error = %e,
                        "Skipping pull request that could not be fetched"
                    );
                    continue;
                }
            };
            let Some(pr) = record.into_merged() else {
                continue;
            };
            if !is_allowed_base_branch(&pr.base_branch) {
                debug!(repo = %pr.repo_full_name, number = pr.number, branch = %pr.base_branch, "Skipping non-release base branch");
                continue;
            }
            prs.push(pr);
        }

        Ok(prs)
    }

    /// Attach commit history when requested. Commit fetch failures leave the
    /// list empty.
    pub async fn attach_commits(&self, prs: &mut [PullRequest]) -> Result<(), GitHubError> {
        if !self.request.include_commits {
            return Ok(());
        }
        for pr in prs.iter_mut() {
            match self.api.pull_commits(&pr.repo_full_name, pr.number).await {
                Ok(commits) => pr.commits = commits,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    debug!(repo = %pr.repo_full_name, number = pr.number, error = %e, "No commits for pull request");
                    pr.commits.clear();
                }
            }
        }
        Ok(())
    }
}

/// Result of [`DiscoveryEngine::discover`].
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub pull_requests: Vec<PullRequest>,
    pub stats: DiscoveryStats,
}

/// Concatenate strategy outputs, keep the first occurrence of each
/// `(repo_full_name, number)`, and order by `merged_at` ascending. The sort
/// is stable, so equal timestamps keep discovery order.
pub fn merge_and_dedup(batches: Vec<Vec<PullRequest>>) -> Vec<PullRequest> {
    let mut seen: HashSet<(String, u64)> = HashSet::new();
    let mut merged: Vec<PullRequest> = batches
        .into_iter()
        .flatten()
        .filter(|pr| seen.insert((pr.repo_full_name.to_ascii_lowercase(), pr.number)))
        .collect();
    merged.sort_by_key(|pr| pr.merged_at);
    merged
}

pub struct DiscoveryEngine<'a> {
    api: &'a dyn GitHubApi,
    cache: &'a ResponseCache,
}

impl<'a> DiscoveryEngine<'a> {
    pub fn new(api: &'a dyn GitHubApi, cache: &'a ResponseCache) -> Self {
        Self { api, cache }
    }

    /// An explicit repo list replaces every other strategy. Otherwise global
    /// search runs first so the org sweep can skip repos it already covered.
    pub fn default_strategies(request: &DiscoveryRequest) -> Vec<Box<dyn DiscoveryStrategy>> {
        if !request.explicit_repos.is_empty() {
            return vec![Box::new(ExplicitRepoStrategy)];
        }

        let mut strategies: Vec<Box<dyn DiscoveryStrategy>> = vec![Box::new(GlobalSearchStrategy)];
        if !request.skip_org_sweep {
            strategies.push(Box::new(OrgSweepStrategy));
        }
        strategies
    }

    pub async fn discover(&self, request: &DiscoveryRequest) -> Result<Discovery, GitHubError> {
        let strategies = Self::default_strategies(request);
        self.run(request, &strategies).await
    }

    /// Run `strategies` in order against one shared context.
    pub async fn run(
        &self,
        request: &DiscoveryRequest,
        strategies: &[Box<dyn DiscoveryStrategy>],
    ) -> Result<Discovery, GitHubError> {
        let mut ctx = DiscoveryContext::new(self.api, self.cache, request);
        let mut batches = Vec::with_capacity(strategies.len());

        for strategy in strategies {
            debug!(strategy = strategy.name(), "Running discovery strategy");
            ctx.stats.strategies_run.push(strategy.name().to_string());
            let found = strategy.discover(&mut ctx).await?;
            debug!(strategy = strategy.name(), found = found.len(), "Strategy finished");
            batches.push(found);
        }

        let pull_requests = merge_and_dedup(batches);
        let stats = ctx.stats;
        info!(
            user = %request.username,
            pull_requests = pull_requests.len(),
            strategies = ?stats.strategies_run,
            search_hits = stats.search_hits,
            cache_hit = stats.cache_hit,
            repos_scanned = stats.repos_scanned,
            repos_skipped = stats.repos_skipped,
            "Discovery complete"
        );

        Ok(Discovery {
            pull_requests,
            stats,
        })
    }
}
