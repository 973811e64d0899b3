//! Independent ways of finding a user's merged pull requests.

use super::repo_scan::scan_repo;
use super::DiscoveryContext;
use crate::error::GitHubError;
use crate::github::PullRequest;
use async_trait::async_trait;
use tracing::{debug, info, warn};

const SEARCH_CACHE_PREFIX: &str = "search";

#[async_trait]
pub trait DiscoveryStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn discover(
        &self,
        ctx: &mut DiscoveryContext<'_>,
    ) -> Result<Vec<PullRequest>, GitHubError>;
}

/// Scan each caller-supplied repository directly.
pub struct ExplicitRepoStrategy;

#[async_trait]
impl DiscoveryStrategy for ExplicitRepoStrategy {
    fn name(&self) -> &'static str {
        "explicit-repos"
    }

    async fn discover(
        &self,
        ctx: &mut DiscoveryContext<'_>,
    ) -> Result<Vec<PullRequest>, GitHubError> {
        let request = ctx.request;
        let mut found = Vec::new();

        for repo in &request.explicit_repos {
            if !request.allows_repo(repo) {
                debug!(repo = %repo, "Explicit repo excluded by filter");
                continue;
            }
            let outcome = scan_repo(ctx, repo).await?;
            ctx.mark_covered(repo);
            found.extend(outcome.into_pull_requests());
        }

        Ok(found)
    }
}

/// One `author:` search across everything the token can see.
pub struct GlobalSearchStrategy;

impl GlobalSearchStrategy {
    fn query(ctx: &DiscoveryContext<'_>) -> String {
        format!(
            "author:{} is:pr is:merged {}",
            ctx.request.username,
            ctx.request.merged_qualifier()
        )
    }

    /// Search and hydrate, consulting the cache first. The cached list is
    /// unfiltered so different scope flags can share it.
    async fn search(ctx: &mut DiscoveryContext<'_>) -> Result<Vec<PullRequest>, GitHubError> {
        let request = ctx.request;
        let since = request.since.format("%Y-%m-%d").to_string();
        let until = request.until.format("%Y-%m-%d").to_string();
        let params = [
            ("username", request.username.as_str()),
            ("since", since.as_str()),
            ("until", until.as_str()),
            ("type", "search"),
        ];

        if let Some(cached) = ctx.cache.get::<Vec<PullRequest>>(SEARCH_CACHE_PREFIX, &params) {
            info!(count = cached.len(), "Using cached search results");
            ctx.stats.cache_hit = true;
            return Ok(cached);
        }

        let query = Self::query(ctx);
        let hits = match ctx.api.search_pull_requests(&query).await {
            Ok(hits) => hits,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(error = %e, "Global search failed; continuing without it");
                return Ok(Vec::new());
            }
        };
        ctx.stats.search_hits += hits.len();

        let prs = ctx.hydrate_hits(hits).await?;
        ctx.cache.set(SEARCH_CACHE_PREFIX, &params, &prs);
        Ok(prs)
    }
}

#[async_trait]
impl DiscoveryStrategy for GlobalSearchStrategy {
    fn name(&self) -> &'static str {
        "global-search"
    }

    async fn discover(
        &self,
        ctx: &mut DiscoveryContext<'_>,
    ) -> Result<Vec<PullRequest>, GitHubError> {
        let request = ctx.request;
        let mut prs: Vec<PullRequest> = Self::search(ctx)
            .await?
            .into_iter()
            .filter(|pr| request.allows_repo(&pr.repo_full_name))
            .collect();

        for pr in &prs {
            ctx.mark_covered(&pr.repo_full_name);
        }
        ctx.attach_commits(&mut prs).await?;
        Ok(prs)
    }
}

/// Walk every repository of every org the user belongs to. Catches PRs in
/// repositories the search index misses.
pub struct OrgSweepStrategy;

impl OrgSweepStrategy {
    async fn orgs(ctx: &DiscoveryContext<'_>) -> Result<Vec<String>, GitHubError> {
        if !ctx.request.filter.orgs.is_empty() {
            return Ok(ctx.request.filter.orgs.clone());
        }
        match ctx.api.user_orgs().await {
            Ok(orgs) => Ok(orgs),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(error = %e, "Could not list organizations; skipping org sweep");
                Ok(Vec::new())
            }
        }
    }
}

#[async_trait]
impl DiscoveryStrategy for OrgSweepStrategy {
    fn name(&self) -> &'static str {
        "org-sweep"
    }

    async fn discover(
        &self,
        ctx: &mut DiscoveryContext<'_>,
    ) -> Result<Vec<PullRequest>, GitHubError> {
        let request = ctx.request;
        let mut found = Vec::new();

        for org in Self::orgs(ctx).await? {
            let repos = match ctx.api.org_repos(&org).await {
                Ok(repos) => repos,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(org = %org, error = %e, "Could not list org repositories; skipping org");
                    continue;
                }
            };

            for repo in repos {
                if ctx.is_covered(&repo.full_name) {
                    debug!(repo = %repo.full_name, "Already covered");
                    continue;
                }
                if !request.allows_repo(&repo.full_name) {
                    continue;
                }
                let outcome = scan_repo(ctx, &repo.full_name).await?;
                ctx.mark_covered(&repo.full_name);
                found.extend(outcome.into_pull_requests());
            }
        }

        Ok(found)
    }
}
