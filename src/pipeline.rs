//! Orchestration: discovery, then summarization, then clustering.
//!
//! Library errors are wrapped with `anyhow` context here so the binary can
//! print a readable cause chain.

use crate::cache::ResponseCache;
use crate::clustering::{cluster_features, DEFAULT_THRESHOLD};
use crate::config::Config;
use crate::discovery::{
    Discovery, DiscoveryEngine, DiscoveryRequest, DiscoveryStats, RepoFilter, Scope,
};
use crate::error::ConfigError;
use crate::github::{GitHubApi, GitHubClient, PullRequest};
use crate::report::Report;
use crate::summarize::{self, OpenRouterClient, TextGenerator};
use crate::util::split_full_name;
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use tracing::info;

/// Everything `shiplog generate` was asked to do.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub username: String,
    pub since: NaiveDate,
    pub until: NaiveDate,
    pub scope: Scope,
    pub repos: Vec<String>,
    pub orgs: Vec<String>,
    pub exclude: Vec<String>,
    pub skip_org_sweep: bool,
    /// Batch summaries and skip commit fetching.
    pub fast: bool,
    pub dry_run: bool,
    pub no_cache: bool,
}

impl GenerateOptions {
    pub fn new(username: impl Into<String>, since: NaiveDate, until: NaiveDate) -> Self {
        Self {
            username: username.into(),
            since,
            until,
            scope: Scope::All,
            repos: Vec::new(),
            orgs: Vec::new(),
            exclude: Vec::new(),
            skip_org_sweep: false,
            fast: false,
            dry_run: false,
            no_cache: false,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.since > self.until {
            return Err(ConfigError::InvertedRange {
                since: self.since.to_string(),
                until: self.until.to_string(),
            });
        }
        if let Some(bad) = self
            .repos
            .iter()
            .chain(&self.exclude)
            .find(|r| split_full_name(r).is_none())
        {
            return Err(ConfigError::InvalidRepo(bad.clone()));
        }
        Ok(())
    }

    /// `--repos` both restricts the filter and replaces the other strategies.
    pub fn discovery_request(&self) -> DiscoveryRequest {
        let mut request = DiscoveryRequest::new(&self.username, self.since, self.until);
        request.filter = RepoFilter {
            scope: self.scope,
            repos: self.repos.clone(),
            orgs: self.orgs.clone(),
            exclude: self.exclude.clone(),
        };
        request.explicit_repos = self.repos.clone();
        request.skip_org_sweep = self.skip_org_sweep;
        request.include_commits = !self.fast;
        request
    }
}

#[derive(Debug)]
pub enum PipelineOutcome {
    DryRun {
        pull_requests: Vec<PullRequest>,
        stats: DiscoveryStats,
    },
    NothingFound {
        stats: DiscoveryStats,
    },
    Report(Report),
}

/// Run the whole pipeline against live GitHub and OpenRouter.
pub async fn run(config: &Config, options: &GenerateOptions) -> anyhow::Result<PipelineOutcome> {
    options.validate()?;
    let token = config.require_github_token()?;

    let github = GitHubClient::new(token, &config.github_api_url)
        .context("Failed to set up GitHub client")?;
    let cache = if options.no_cache {
        ResponseCache::disabled()
    } else {
        ResponseCache::at_default_location()
    };

    run_with(config, options, &github, &cache).await
}

/// Discover through `api`, then summarize with OpenRouter.
///
/// The OpenRouter key is only required once there is something to summarize,
/// so a dry run or an empty window succeeds without one.
pub async fn run_with(
    config: &Config,
    options: &GenerateOptions,
    api: &dyn GitHubApi,
    cache: &ResponseCache,
) -> anyhow::Result<PipelineOutcome> {
    options.validate()?;
    let discovery = discover(api, cache, options).await?;

    if options.dry_run {
        return Ok(PipelineOutcome::DryRun {
            pull_requests: discovery.pull_requests,
            stats: discovery.stats,
        });
    }
    if discovery.pull_requests.is_empty() {
        return Ok(PipelineOutcome::NothingFound {
            stats: discovery.stats,
        });
    }

    let llm_key = config.require_llm_key()?;
    let generator = OpenRouterClient::new(llm_key, &config.model)
        .context("Failed to set up OpenRouter client")?;
    let report = build_report(&generator, options, discovery.pull_requests, Utc::now()).await?;
    Ok(PipelineOutcome::Report(report))
}

pub async fn discover(
    api: &dyn GitHubApi,
    cache: &ResponseCache,
    options: &GenerateOptions,
) -> anyhow::Result<Discovery> {
    let request = options.discovery_request();
    DiscoveryEngine::new(api, cache)
        .discover(&request)
        .await
        .with_context(|| format!("Failed to discover pull requests for {}", options.username))
}

/// Summarize and cluster already-discovered pull requests.
pub async fn build_report(
    generator: &dyn TextGenerator,
    options: &GenerateOptions,
    pull_requests: Vec<PullRequest>,
    generated_at: DateTime<Utc>,
) -> anyhow::Result<Report> {
    let features = summarize::summarize_all(generator, &pull_requests, options.fast)
        .await
        .context("Failed to summarize pull requests")?;
    let feature_count = features.len();
    let projects = cluster_features(features, DEFAULT_THRESHOLD);
    info!(
        features_in = feature_count,
        features_out = projects.iter().map(|p| p.features.len()).sum::<usize>(),
        projects = projects.len(),
        "Clustering complete"
    );

    Ok(Report::new(
        &options.username,
        options.since,
        options.until,
        projects,
        generated_at,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::testing::{at, date, record, FakeGitHub};
    use crate::error::LlmError;
    use crate::summarize::CompletionOptions;
    use async_trait::async_trait;

    fn options() -> GenerateOptions {
        GenerateOptions::new("octocat", date(2024, 3, 1), date(2024, 3, 31))
    }

    #[test]
    fn test_validate_rejects_inverted_range() {
        let mut opts = options();
        opts.since = date(2024, 4, 1);
        assert!(matches!(
            opts.validate(),
            Err(ConfigError::InvertedRange { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_malformed_repo() {
        let mut opts = options();
        opts.repos = vec!["a/b".to_string(), "nope".to_string()];
        assert!(matches!(opts.validate(), Err(ConfigError::InvalidRepo(r)) if r == "nope"));

        let mut opts = options();
        opts.exclude = vec!["a/b/c".to_string()];
        assert!(opts.validate().is_err());
        assert!(options().validate().is_ok());
    }

    #[test]
    fn test_discovery_request_mapping() {
        let mut opts = options();
        opts.repos = vec!["a/b".to_string()];
        opts.orgs = vec!["acme".to_string()];
        opts.fast = true;
        opts.skip_org_sweep = true;

        let request = opts.discovery_request();
        assert_eq!(request.explicit_repos, vec!["a/b".to_string()]);
        assert_eq!(request.filter.repos, vec!["a/b".to_string()]);
        assert_eq!(request.filter.orgs, vec!["acme".to_string()]);
        assert!(!request.include_commits);
        assert!(request.skip_org_sweep);
    }

    struct Unreachable;

    #[async_trait]
    impl TextGenerator for Unreachable {
        async fn complete(
            &self,
            _prompt: &str,
            _options: &CompletionOptions,
        ) -> Result<String, LlmError> {
            Err(LlmError::Transient {
                status: None,
                message: "offline".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_report_survives_offline_generator() {
        let api = FakeGitHub::default().with_pulls(vec![
            record("a/b", 2, "octocat", "main", Some(at(2024, 3, 5, 0, 0, 0))),
            record("a/b", 1, "octocat", "main", Some(at(2024, 3, 2, 0, 0, 0))),
        ]);
        let mut opts = options();
        opts.repos = vec!["a/b".to_string()];

        let cache = ResponseCache::disabled();
        let discovery = discover(&api, &cache, &opts).await.unwrap();
        assert_eq!(discovery.pull_requests.len(), 2);

        let generated_at = at(2024, 4, 1, 0, 0, 0);
        let report = build_report(&Unreachable, &opts, discovery.pull_requests, generated_at)
            .await
            .unwrap();
        assert_eq!(report.total_prs, 2);
        assert_eq!(report.projects.len(), 1);
        assert_eq!(report.projects[0].repo_full_name, "a/b");
    }

    fn keyless() -> Config {
        Config::from_lookup(|_| None)
    }

    #[tokio::test]
    async fn test_empty_window_needs_no_llm_key() {
        let api = FakeGitHub::default();
        let mut opts = options();
        opts.repos = vec!["a/b".to_string()];

        let outcome = run_with(&keyless(), &opts, &api, &ResponseCache::disabled())
            .await
            .unwrap();
        assert!(matches!(outcome, PipelineOutcome::NothingFound { .. }));
    }

    #[tokio::test]
    async fn test_dry_run_needs_no_llm_key() {
        let api = FakeGitHub::default().with_pulls(vec![record(
            "a/b",
            1,
            "octocat",
            "main",
            Some(at(2024, 3, 2, 0, 0, 0)),
        )]);
        let mut opts = options();
        opts.repos = vec!["a/b".to_string()];
        opts.dry_run = true;

        let outcome = run_with(&keyless(), &opts, &api, &ResponseCache::disabled())
            .await
            .unwrap();
        match outcome {
            PipelineOutcome::DryRun { pull_requests, .. } => assert_eq!(pull_requests.len(), 1),
            other => panic!("expected dry run, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_found_prs_without_llm_key_fail() {
        let api = FakeGitHub::default().with_pulls(vec![record(
            "a/b",
            1,
            "octocat",
            "main",
            Some(at(2024, 3, 2, 0, 0, 0)),
        )]);
        let mut opts = options();
        opts.repos = vec!["a/b".to_string()];

        let err = run_with(&keyless(), &opts, &api, &ResponseCache::disabled())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::MissingLlmKey)
        ));
    }
}
