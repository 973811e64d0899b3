//! Authenticated GitHub REST client
//!
//! Every request goes through the shared [`Pacer`] and the rate-limit retry
//! loop in [`GitHubClient::request`]. List endpoints are walked by following
//! `rel="next"` links.

use super::pagination::{parse_link_header, PaginationLinks};
use super::rate_limit::{backoff_delay, Pacer, RateLimitSignal, MAX_RATE_LIMIT_RETRIES};
use super::types::{
    ApiCommit, ApiOrg, ApiPullRequest, ApiRepository, ApiSearchItem, ApiSearchResponse, Commit,
    Page, PullRequestRecord, Repository, SearchHit,
};
use super::GitHubApi;
use crate::error::GitHubError;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, LINK};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

const API_TIMEOUT_SECS: u64 = 60;
const USER_AGENT: &str = concat!("shiplog/", env!("CARGO_PKG_VERSION"));
const PER_PAGE: &str = "100";

/// GitHub search never returns more than 1000 results (10 pages of 100).
pub const MAX_SEARCH_PAGES: usize = 10;

/// Safety net for list endpoints.
const MAX_LIST_PAGES: usize = 50;

/// Maximum length for error body content in error messages
const MAX_ERROR_BODY_LEN: usize = 200;

/// Sanitize an API error body to prevent credential leakage.
/// Truncates long responses and redacts potential secrets.
fn sanitize_error_body(body: &str) -> String {
    const SECRET_PATTERNS: &[&str] = &[
        "token",
        "secret",
        "password",
        "credential",
        "bearer",
        "ghp_",
        "gho_",
        "ghu_",
        "github_pat_",
    ];

    let truncated = crate::util::truncate(body.trim(), MAX_ERROR_BODY_LEN);
    let lower = truncated.to_lowercase();
    if SECRET_PATTERNS.iter().any(|pattern| lower.contains(pattern)) {
        return "(error details redacted - may contain sensitive data)".to_string();
    }

    truncated
}

#[derive(Deserialize)]
struct ApiErrorResponse {
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

/// Best human-readable message for a failed response body.
fn error_message(body: &str) -> String {
    if let Ok(api_error) = serde_json::from_str::<ApiErrorResponse>(body) {
        let detail = api_error
            .errors
            .first()
            .and_then(|e| e.message.clone())
            .unwrap_or_default();
        return if detail.is_empty() {
            api_error.message
        } else {
            format!("{}: {}", api_error.message, detail)
        };
    }
    sanitize_error_body(body)
}

fn error_from_response(status: u16, endpoint: &str, body: &str) -> GitHubError {
    let message = error_message(body);
    if status == 401 {
        GitHubError::Unauthorized {
            endpoint: endpoint.to_string(),
            message,
        }
    } else {
        GitHubError::Api {
            status,
            endpoint: endpoint.to_string(),
            message,
        }
    }
}

/// A decoded payload plus the pagination cursors that came with it.
#[derive(Debug)]
pub struct ApiResponse<T> {
    pub payload: T,
    pub links: PaginationLinks,
}

pub struct GitHubClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    pacer: Pacer,
}

impl GitHubClient {
    pub fn new(token: impl Into<String>, base_url: &str) -> Result<Self, GitHubError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|source| GitHubError::Transport {
                endpoint: base_url.to_string(),
                source,
            })?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
            pacer: Pacer::default(),
        })
    }

    fn url_for(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
        }
    }

    /// Issue one GET and decode the JSON payload.
    ///
    /// Throttled responses are retried up to [`MAX_RATE_LIMIT_RETRIES`] times;
    /// after that the call fails with [`GitHubError::RateLimited`].
    pub async fn request<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> Result<ApiResponse<T>, GitHubError> {
        let url = self.url_for(endpoint);
        let transport = |source| GitHubError::Transport {
            endpoint: endpoint.to_string(),
            source,
        };
        let mut retries = 0u32;

        loop {
            self.pacer.wait().await;
            debug!(endpoint, "GET");

            let response = self
                .http
                .get(&url)
                .query(query)
                .header("Accept", "application/vnd.github+json")
                .header("Authorization", format!("Bearer {}", self.token))
                .header("X-GitHub-Api-Version", "2022-11-28")
                .send()
                .await
                .map_err(transport)?;

            let status = response.status().as_u16();
            let signal = RateLimitSignal::from_headers(response.headers());

            if signal.is_rate_limited(status) {
                if retries >= MAX_RATE_LIMIT_RETRIES {
                    return Err(GitHubError::RateLimited {
                        endpoint: endpoint.to_string(),
                        attempts: retries,
                    });
                }
                retries += 1;
                let delay = backoff_delay(&signal, Utc::now().timestamp_millis());
                warn!(
                    endpoint,
                    attempt = retries,
                    max_attempts = MAX_RATE_LIMIT_RETRIES,
                    wait_secs = delay.as_secs(),
                    "GitHub rate limit hit, backing off"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            let links = links_from_headers(response.headers());
            let body = response.text().await.map_err(transport)?;

            if !(200..300).contains(&status) {
                return Err(error_from_response(status, endpoint, &body));
            }

            let payload = serde_json::from_str(&body).map_err(|e| GitHubError::Decode {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            })?;
            return Ok(ApiResponse { payload, links });
        }
    }

    /// Walk every page of a list endpoint, concatenating the arrays.
    pub async fn fetch_all_pages<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, GitHubError> {
        self.paginate::<Vec<T>, T>(endpoint, query, MAX_LIST_PAGES, |page| page)
            .await
    }

    async fn paginate<P, T>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
        max_pages: usize,
        extract: impl Fn(P) -> Vec<T>,
    ) -> Result<Vec<T>, GitHubError>
    where
        P: DeserializeOwned,
    {
        let first: ApiResponse<P> = self.request(endpoint, query).await?;
        let mut items = extract(first.payload);
        let mut next = first.links.next;
        let mut pages = 1;

        while let Some(next_url) = next {
            if pages >= max_pages {
                warn!(endpoint, pages, "Stopping pagination at page ceiling");
                break;
            }
            // The cursor URL already carries the original query string.
            let page: ApiResponse<P> = self.request(&next_url, &[]).await?;
            items.extend(extract(page.payload));
            next = page.links.next;
            pages += 1;
        }

        Ok(items)
    }
}

fn links_from_headers(headers: &HeaderMap) -> PaginationLinks {
    headers
        .get(LINK)
        .and_then(|v| v.to_str().ok())
        .map(parse_link_header)
        .unwrap_or_default()
}

#[async_trait]
impl GitHubApi for GitHubClient {
    async fn user_orgs(&self) -> Result<Vec<String>, GitHubError> {
        let orgs: Vec<ApiOrg> = self
            .fetch_all_pages("/user/orgs", &[("per_page", PER_PAGE)])
            .await?;
        Ok(orgs.into_iter().map(|o| o.login).collect())
    }

    async fn org_repos(&self, org: &str) -> Result<Vec<Repository>, GitHubError> {
        let endpoint = format!("/orgs/{}/repos", org);
        let repos: Vec<ApiRepository> = self
            .fetch_all_pages(&endpoint, &[("per_page", PER_PAGE), ("type", "all")])
            .await?;
        Ok(repos.into_iter().map(Repository::from).collect())
    }

    async fn search_pull_requests(&self, query: &str) -> Result<Vec<SearchHit>, GitHubError> {
        let items: Vec<ApiSearchItem> = self
            .paginate::<ApiSearchResponse<ApiSearchItem>, ApiSearchItem>(
                "/search/issues",
                &[("q", query), ("per_page", PER_PAGE)],
                MAX_SEARCH_PAGES,
                |page| {
                    if page.incomplete_results {
                        warn!("GitHub search returned incomplete results");
                    }
                    page.items
                },
            )
            .await?;
        Ok(items.into_iter().filter_map(ApiSearchItem::into_hit).collect())
    }

    async fn pull_request(
        &self,
        repo_full_name: &str,
        number: u64,
    ) -> Result<PullRequestRecord, GitHubError> {
        let endpoint = format!("/repos/{}/pulls/{}", repo_full_name, number);
        let response: ApiResponse<ApiPullRequest> = self.request(&endpoint, &[]).await?;
        Ok(response.payload.into_record(repo_full_name))
    }

    async fn closed_pulls_page(
        &self,
        repo_full_name: &str,
        page: u32,
    ) -> Result<Page<PullRequestRecord>, GitHubError> {
        let endpoint = format!("/repos/{}/pulls", repo_full_name);
        let page = page.to_string();
        let response: ApiResponse<Vec<ApiPullRequest>> = self
            .request(
                &endpoint,
                &[
                    ("state", "closed"),
                    ("sort", "updated"),
                    ("direction", "desc"),
                    ("per_page", PER_PAGE),
                    ("page", page.as_str()),
                ],
            )
            .await?;
        Ok(Page {
            has_next: response.links.has_next(),
            items: response
                .payload
                .into_iter()
                .map(|pr| pr.into_record(repo_full_name))
                .collect(),
        })
    }

    async fn pull_commits(
        &self,
        repo_full_name: &str,
        number: u64,
    ) -> Result<Vec<Commit>, GitHubError> {
        let endpoint = format!("/repos/{}/pulls/{}/commits", repo_full_name, number);
        let commits: Vec<ApiCommit> = self
            .fetch_all_pages(&endpoint, &[("per_page", PER_PAGE)])
            .await?;
        Ok(commits.into_iter().map(Commit::from).collect())
    }
}
