//! GitHub REST integration
//!
//! [`GitHubApi`] is the surface discovery depends on. [`GitHubClient`] is the
//! HTTP implementation; tests substitute an in-memory one.

mod client;
pub mod pagination;
pub mod rate_limit;
pub mod types;

pub use client::{ApiResponse, GitHubClient, DEFAULT_API_URL, MAX_SEARCH_PAGES};
pub use types::{Commit, Page, PullRequest, PullRequestRecord, Repository, SearchHit};

use crate::error::GitHubError;
use async_trait::async_trait;

#[async_trait]
pub trait GitHubApi: Send + Sync {
    /// Logins of every organization the authenticated user belongs to.
    async fn user_orgs(&self) -> Result<Vec<String>, GitHubError>;

    /// Every repository in `org` visible to the token.
    async fn org_repos(&self, org: &str) -> Result<Vec<Repository>, GitHubError>;

    /// Run an issue search and return every hit across pages.
    async fn search_pull_requests(&self, query: &str) -> Result<Vec<SearchHit>, GitHubError>;

    async fn pull_request(
        &self,
        repo_full_name: &str,
        number: u64,
    ) -> Result<PullRequestRecord, GitHubError>;

    /// One page (1-based) of closed pull requests, most recently updated first.
    async fn closed_pulls_page(
        &self,
        repo_full_name: &str,
        page: u32,
    ) -> Result<Page<PullRequestRecord>, GitHubError>;

    async fn pull_commits(
        &self,
        repo_full_name: &str,
        number: u64,
    ) -> Result<Vec<Commit>, GitHubError>;
}
