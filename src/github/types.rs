//! Domain records for repositories, pull requests, and commits, plus the
//! GitHub wire shapes they are built from.

use crate::util::split_full_name;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A repository the user can see. Identified by `full_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: u64,
    pub name: String,
    pub full_name: String,
    pub owner: String,
    pub url: String,
    pub default_branch: String,
}

/// A commit attached to a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
    pub message: String,
    pub author: String,
    pub date: Option<DateTime<Utc>>,
}

impl Commit {
    /// First line of the commit message.
    pub fn subject(&self) -> &str {
        self.message.lines().next().unwrap_or("").trim()
    }
}

/// A merged pull request retained by discovery.
///
/// Identity is `(repo_full_name, number)`. `merged_at` is not optional: a
/// record only becomes a `PullRequest` once it is known to be merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub url: String,
    pub repo_name: String,
    pub repo_full_name: String,
    pub base_branch: String,
    pub created_at: DateTime<Utc>,
    pub merged_at: DateTime<Utc>,
    #[serde(default)]
    pub commits: Vec<Commit>,
}

impl PullRequest {
    pub fn key(&self) -> (&str, u64) {
        (self.repo_full_name.as_str(), self.number)
    }
}

/// A pull request as listed by the API, merged or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestRecord {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub url: String,
    pub repo_full_name: String,
    pub author: Option<String>,
    pub base_branch: String,
    pub created_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
}

impl PullRequestRecord {
    pub fn authored_by(&self, username: &str) -> bool {
        self.author
            .as_deref()
            .is_some_and(|login| login.eq_ignore_ascii_case(username))
    }

    /// Convert into a retained pull request. `None` if it was never merged.
    pub fn into_merged(self) -> Option<PullRequest> {
        let merged_at = self.merged_at?;
        let repo_name = split_full_name(&self.repo_full_name)
            .map(|(_, name)| name.to_string())
            .unwrap_or_else(|| self.repo_full_name.clone());
        Some(PullRequest {
            number: self.number,
            title: self.title,
            body: self.body,
            url: self.url,
            repo_name,
            repo_full_name: self.repo_full_name,
            base_branch: self.base_branch,
            created_at: self.created_at,
            merged_at,
            commits: Vec::new(),
        })
    }
}

/// One hit from the issue search endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearchHit {
    pub repo_full_name: String,
    pub number: u64,
}

/// A single page of a paginated listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_next: bool,
}

// ============================================================================
// Wire formats
// ============================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct ApiUser {
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiRepository {
    pub id: u64,
    pub name: String,
    pub full_name: String,
    pub owner: ApiUser,
    pub html_url: String,
    #[serde(default)]
    pub default_branch: Option<String>,
}

impl From<ApiRepository> for Repository {
    fn from(api: ApiRepository) -> Self {
        Repository {
            id: api.id,
            name: api.name,
            full_name: api.full_name,
            owner: api.owner.login,
            url: api.html_url,
            default_branch: api.default_branch.unwrap_or_else(|| "main".to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiBranchRef {
    #[serde(rename = "ref")]
    pub ref_name: String,
    #[serde(default)]
    pub repo: Option<ApiBranchRepo>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiBranchRepo {
    pub full_name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiPullRequest {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub html_url: String,
    #[serde(default)]
    pub user: Option<ApiUser>,
    pub base: ApiBranchRef,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub merged_at: Option<DateTime<Utc>>,
}

impl ApiPullRequest {
    /// `fallback_repo` is used when the base ref carries no repository (deleted forks).
    pub fn into_record(self, fallback_repo: &str) -> PullRequestRecord {
        let repo_full_name = self
            .base
            .repo
            .map(|r| r.full_name)
            .unwrap_or_else(|| fallback_repo.to_string());
        PullRequestRecord {
            number: self.number,
            title: self.title,
            body: self.body,
            url: self.html_url,
            repo_full_name,
            author: self.user.map(|u| u.login),
            base_branch: self.base.ref_name,
            created_at: self.created_at,
            merged_at: self.merged_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiSearchResponse<T> {
    #[serde(default)]
    pub incomplete_results: bool,
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiSearchItem {
    pub number: u64,
    pub repository_url: String,
}

impl ApiSearchItem {
    /// `https://api.github.com/repos/owner/name` -> `owner/name`
    pub fn into_hit(self) -> Option<SearchHit> {
        let parsed = url::Url::parse(&self.repository_url).ok()?;
        let segments: Vec<&str> = parsed.path_segments()?.filter(|s| !s.is_empty()).collect();
        let repos_idx = segments.iter().rposition(|s| *s == "repos")?;
        match &segments[repos_idx + 1..] {
            [owner, name] => Some(SearchHit {
                repo_full_name: format!("{}/{}", owner, name),
                number: self.number,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiCommit {
    pub sha: String,
    pub commit: ApiCommitDetail,
    #[serde(default)]
    pub author: Option<ApiUser>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiCommitDetail {
    pub message: String,
    #[serde(default)]
    pub author: Option<ApiGitAuthor>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiGitAuthor {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

impl From<ApiCommit> for Commit {
    fn from(api: ApiCommit) -> Self {
        let git_author = api.commit.author;
        let author = api
            .author
            .map(|u| u.login)
            .or_else(|| git_author.as_ref().and_then(|a| a.name.clone()))
            .unwrap_or_default();
        Commit {
            sha: api.sha,
            message: api.commit.message,
            author,
            date: git_author.and_then(|a| a.date),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiOrg {
    pub login: String,
}
