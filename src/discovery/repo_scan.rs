//! Per-repository scan of closed pull requests, with a search fallback.

use super::{is_allowed_base_branch, start_of_day, DiscoveryContext, DiscoveryRequest};
use crate::error::GitHubError;
use crate::github::{PullRequest, PullRequestRecord};
use tracing::{debug, warn};

/// Hard stop for very old, very busy repositories.
const MAX_SCAN_PAGES: u32 = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoScanOutcome {
    /// Listed through the pulls endpoint.
    Scanned(Vec<PullRequest>),
    /// Listing failed; found through a per-repo search instead.
    Fallback(Vec<PullRequest>),
    /// Neither approach worked.
    Skipped,
}

impl RepoScanOutcome {
    pub fn into_pull_requests(self) -> Vec<PullRequest> {
        match self {
            RepoScanOutcome::Scanned(prs) | RepoScanOutcome::Fallback(prs) => prs,
            RepoScanOutcome::Skipped => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Keep,
    Reject,
    /// Merged before the window. Listing is newest-first, so nothing after
    /// this can qualify.
    Stop,
}

fn evaluate(record: &PullRequestRecord, request: &DiscoveryRequest) -> Verdict {
    let Some(merged_at) = record.merged_at else {
        return Verdict::Reject;
    };
    if !record.authored_by(&request.username) {
        return Verdict::Reject;
    }
    if merged_at < start_of_day(request.since) {
        return Verdict::Stop;
    }
    if !request.in_range(merged_at) {
        return Verdict::Reject;
    }
    if !is_allowed_base_branch(&record.base_branch) {
        return Verdict::Reject;
    }
    Verdict::Keep
}

async fn list_merged(
    ctx: &DiscoveryContext<'_>,
    repo: &str,
) -> Result<Vec<PullRequest>, GitHubError> {
    let mut prs = Vec::new();
    let mut page = 1;

    'pages: loop {
        let listing = ctx.api.closed_pulls_page(repo, page).await?;
        for record in listing.items {
            match evaluate(&record, ctx.request) {
                Verdict::Keep => prs.extend(record.into_merged()),
                Verdict::Reject => {}
                Verdict::Stop => {
                    debug!(repo, page, "Reached pull requests older than the window");
                    break 'pages;
                }
            }
        }
        if !listing.has_next {
            break;
        }
        if page >= MAX_SCAN_PAGES {
            warn!(repo, page, "Stopping repository scan at page ceiling; results may be partial");
            break;
        }
        page += 1;
    }

    Ok(prs)
}

async fn search_repo(
    ctx: &DiscoveryContext<'_>,
    repo: &str,
) -> Result<Vec<PullRequest>, GitHubError> {
    let query = format!(
        "repo:{} author:{} is:pr is:merged {}",
        repo,
        ctx.request.username,
        ctx.request.merged_qualifier()
    );
    let hits = ctx.api.search_pull_requests(&query).await?;
    ctx.hydrate_hits(hits).await
}

/// Find the user's merged pull requests in one repository.
///
/// Non-fatal listing errors fall back to a repo-scoped search; if that fails
/// too the repository is skipped. Fatal errors propagate from either step.
pub async fn scan_repo(
    ctx: &mut DiscoveryContext<'_>,
    repo: &str,
) -> Result<RepoScanOutcome, GitHubError> {
    let outcome = match list_merged(ctx, repo).await {
        Ok(prs) => RepoScanOutcome::Scanned(prs),
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            debug!(repo, error = %e, "Listing failed; trying search fallback");
            match search_repo(ctx, repo).await {
                Ok(prs) => RepoScanOutcome::Fallback(prs),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(repo, error = %e, "Skipping repository");
                    RepoScanOutcome::Skipped
                }
            }
        }
    };

    let outcome = match outcome {
        RepoScanOutcome::Scanned(mut prs) => {
            ctx.attach_commits(&mut prs).await?;
            ctx.stats.repos_scanned += 1;
            RepoScanOutcome::Scanned(prs)
        }
        RepoScanOutcome::Fallback(mut prs) => {
            ctx.attach_commits(&mut prs).await?;
            ctx.stats.repos_scanned += 1;
            RepoScanOutcome::Fallback(prs)
        }
        RepoScanOutcome::Skipped => {
            ctx.stats.repos_skipped += 1;
            RepoScanOutcome::Skipped
        }
    };
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::cache::ResponseCache;
    use crate::github::SearchHit;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn request() -> DiscoveryRequest {
        let mut request = DiscoveryRequest::new("octocat", date(2024, 1, 1), date(2024, 3, 31));
        request.include_commits = false;
        request
    }

    fn numbers(outcome: RepoScanOutcome) -> Vec<u64> {
        outcome
            .into_pull_requests()
            .iter()
            .map(|p| p.number)
            .collect()
    }

    #[test]
    fn test_evaluate_rules() {
        let request = request();
        let inside = Some(at(2024, 2, 1, 12, 0, 0));
        let eval = |r: PullRequestRecord| evaluate(&r, &request);

        assert_eq!(eval(record("a/b", 1, "octocat", "main", inside)), Verdict::Keep);
        assert_eq!(eval(record("a/b", 1, "OctoCat", "master", inside)), Verdict::Keep);
        assert_eq!(eval(record("a/b", 1, "octocat", "main", None)), Verdict::Reject);
        assert_eq!(eval(record("a/b", 1, "someone", "main", inside)), Verdict::Reject);
        assert_eq!(
            eval(record("a/b", 1, "octocat", "feature/x", inside)),
            Verdict::Reject
        );
        assert_eq!(
            eval(record("a/b", 1, "octocat", "release/9.2", inside)),
            Verdict::Keep
        );
        assert_eq!(
            eval(record("a/b", 1, "octocat", "main", Some(at(2024, 3, 31, 23, 59, 59)))),
            Verdict::Keep
        );
        assert_eq!(
            eval(record("a/b", 1, "octocat", "main", Some(at(2024, 4, 1, 0, 0, 0)))),
            Verdict::Reject
        );
        assert_eq!(
            eval(record("a/b", 1, "octocat", "main", Some(at(2023, 12, 31, 8, 0, 0)))),
            Verdict::Stop
        );
        // Someone else's old PR does not end the scan.
        assert_eq!(
            eval(record("a/b", 1, "someone", "main", Some(at(2023, 12, 31, 8, 0, 0)))),
            Verdict::Reject
        );
    }

    #[tokio::test]
    async fn test_scan_stops_at_first_old_pull_request() {
        let newest = at(2024, 3, 20, 0, 0, 0);
        let mut api = FakeGitHub::default().with_pulls(vec![
            record("a/b", 5, "octocat", "main", Some(newest)),
            record("a/b", 4, "octocat", "main", Some(newest - Duration::days(10))),
            record("a/b", 3, "octocat", "main", Some(at(2023, 11, 1, 0, 0, 0))),
            record("a/b", 2, "octocat", "main", Some(at(2024, 2, 1, 0, 0, 0))),
            record("a/b", 1, "octocat", "main", Some(at(2024, 1, 5, 0, 0, 0))),
        ]);
        api.page_size = 2;
        let cache = ResponseCache::disabled();
        let request = request();
        let mut ctx = DiscoveryContext::new(&api, &cache, &request);

        let outcome = scan_repo(&mut ctx, "a/b").await.unwrap();
        assert!(matches!(outcome, RepoScanOutcome::Scanned(_)));
        assert_eq!(numbers(outcome), vec![5, 4]);
        assert_eq!(
            api.calls(),
            vec!["pulls a/b page 1".to_string(), "pulls a/b page 2".to_string()]
        );
        assert_eq!(ctx.stats.repos_scanned, 1);
    }

    #[tokio::test]
    async fn test_scan_stops_at_page_ceiling() {
        let merged = Some(at(2024, 2, 1, 0, 0, 0));
        let pages = MAX_SCAN_PAGES as u64;
        let mut api = FakeGitHub::default().with_pulls(
            (1..=pages + 5)
                .rev()
                .map(|n| record("a/b", n, "octocat", "main", merged))
                .collect(),
        );
        api.page_size = 1;
        let cache = ResponseCache::disabled();
        let request = request();
        let mut ctx = DiscoveryContext::new(&api, &cache, &request);

        let outcome = scan_repo(&mut ctx, "a/b").await.unwrap();
        assert_eq!(outcome.into_pull_requests().len(), MAX_SCAN_PAGES as usize);
        let calls = api.calls();
        assert_eq!(calls.len(), MAX_SCAN_PAGES as usize);
        assert_eq!(calls.last().unwrap(), &format!("pulls a/b page {}", pages));
    }

    #[tokio::test]
    async fn test_scan_is_idempotent() {
        let merged = Some(at(2024, 2, 1, 0, 0, 0));
        let api = FakeGitHub::default().with_pulls(vec![
            record("a/b", 3, "octocat", "main", merged),
            record("a/b", 2, "octocat", "main", merged),
            record("a/b", 1, "octocat", "main", merged),
        ]);
        let cache = ResponseCache::disabled();
        let request = request();
        let mut ctx = DiscoveryContext::new(&api, &cache, &request);

        let first = scan_repo(&mut ctx, "a/b").await.unwrap();
        let second = scan_repo(&mut ctx, "a/b").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(numbers(first), vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn test_forbidden_repo_falls_back_to_search() {
        let merged = Some(at(2024, 2, 1, 0, 0, 0));
        let mut api =
            FakeGitHub::default().with_pulls(vec![record("a/b", 8, "octocat", "main", merged)]);
        api.failing_repos.insert("a/b".to_string(), 403);
        api.search.insert(
            "repo:a/b author:octocat is:pr is:merged merged:2024-01-01..2024-03-31".to_string(),
            vec![SearchHit {
                repo_full_name: "a/b".to_string(),
                number: 8,
            }],
        );
        let cache = ResponseCache::disabled();
        let request = request();
        let mut ctx = DiscoveryContext::new(&api, &cache, &request);

        let outcome = scan_repo(&mut ctx, "a/b").await.unwrap();
        assert!(matches!(outcome, RepoScanOutcome::Fallback(_)));
        assert_eq!(numbers(outcome), vec![8]);
    }

    #[tokio::test]
    async fn test_repo_skipped_when_fallback_fails_too() {
        let mut api = FakeGitHub::default();
        api.failing_repos.insert("a/b".to_string(), 404);
        api.failing_search.insert(
            "repo:a/b author:octocat is:pr is:merged merged:2024-01-01..2024-03-31".to_string(),
            422,
        );
        let cache = ResponseCache::disabled();
        let request = request();
        let mut ctx = DiscoveryContext::new(&api, &cache, &request);

        let outcome = scan_repo(&mut ctx, "a/b").await.unwrap();
        assert_eq!(outcome, RepoScanOutcome::Skipped);
        assert_eq!(ctx.stats.repos_skipped, 1);
    }

    #[tokio::test]
    async fn test_unauthorized_aborts_without_fallback() {
        let mut api = FakeGitHub::default();
        api.failing_repos.insert("a/b".to_string(), 401);
        let cache = ResponseCache::disabled();
        let request = request();
        let mut ctx = DiscoveryContext::new(&api, &cache, &request);

        let err = scan_repo(&mut ctx, "a/b").await.unwrap_err();
        assert!(err.is_fatal());
        assert!(!api.calls().iter().any(|c| c.starts_with("search")));
    }

    #[tokio::test]
    async fn test_commits_attached_when_requested() {
        let merged = Some(at(2024, 2, 1, 0, 0, 0));
        let api =
            FakeGitHub::default().with_pulls(vec![record("a/b", 1, "octocat", "main", merged)]);
        let cache = ResponseCache::disabled();
        let mut request = request();
        request.include_commits = true;
        let mut ctx = DiscoveryContext::new(&api, &cache, &request);

        let prs = scan_repo(&mut ctx, "a/b").await.unwrap().into_pull_requests();
        assert_eq!(prs[0].commits.len(), 1);
        assert_eq!(prs[0].commits[0].subject(), "feat: change 1");
    }
}
