//! Pull request summarization
//!
//! Turns each merged pull request into one [`Feature`] using a
//! [`TextGenerator`]. Failures degrade to a low-confidence feature built from
//! the PR title, except credential errors, which stop the run.

pub mod client;
pub mod parse;
pub mod prompts;

pub use client::{CompletionOptions, OpenRouterClient, TextGenerator};

use crate::clustering::{Confidence, Feature, FeatureType};
use crate::error::LlmError;
use crate::github::PullRequest;
use parse::FeatureJson;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Pull requests per request in fast mode.
pub const BATCH_SIZE: usize = 10;

const SINGLE_MAX_TOKENS: u32 = 512;
const BATCH_MAX_TOKENS: u32 = 4096;

fn conventional_prefix() -> Option<&'static Regex> {
    static PREFIX: OnceLock<Option<Regex>> = OnceLock::new();
    PREFIX
        .get_or_init(|| {
            Regex::new(r"(?i)^\s*(feat|feature|fix|bugfix|hotfix|perf|refactor|chore|ci|build|docs|deps|style|test)(\([^)]*\))?!?:").ok()
        })
        .as_ref()
}

/// Guess a type from a conventional-commit style title. Unprefixed titles
/// count as enhancements.
pub fn guess_type(title: &str) -> FeatureType {
    let Some(caps) = conventional_prefix().and_then(|re| re.captures(title)) else {
        return FeatureType::Enhancement;
    };
    match caps[1].to_lowercase().as_str() {
        "feat" | "feature" => FeatureType::Feature,
        "fix" | "bugfix" | "hotfix" => FeatureType::Bugfix,
        "refactor" | "style" => FeatureType::Refactor,
        "chore" | "ci" | "build" | "deps" | "test" => FeatureType::Infra,
        _ => FeatureType::Enhancement,
    }
}

fn feature_from(
    pr: &PullRequest,
    title: String,
    description: String,
    kind: FeatureType,
    confidence: Confidence,
) -> Feature {
    Feature {
        project: pr.repo_full_name.clone(),
        title,
        description,
        kind,
        prs: vec![pr.number],
        start_date: pr.created_at,
        end_date: pr.merged_at,
        confidence,
    }
}

/// Low-confidence feature straight from the PR title.
pub fn fallback_feature(pr: &PullRequest) -> Feature {
    let title = pr.title.trim();
    let description = pr
        .body
        .as_deref()
        .and_then(|body| body.lines().map(str::trim).find(|line| !line.is_empty()))
        .map(|line| crate::util::truncate(line, 200))
        .unwrap_or_default();
    feature_from(pr, title.to_string(), description, guess_type(title), Confidence::Low)
}

fn feature_from_json(pr: &PullRequest, json: FeatureJson) -> Feature {
    let title = if json.title.trim().is_empty() {
        pr.title.trim().to_string()
    } else {
        json.title.trim().to_string()
    };
    let kind = json.feature_type();
    let confidence = json.confidence();
    feature_from(pr, title, json.description.trim().to_string(), kind, confidence)
}

/// Summarize one pull request, including its commit subjects.
pub async fn summarize_pr(
    generator: &dyn TextGenerator,
    pr: &PullRequest,
) -> Result<Feature, LlmError> {
    let options = CompletionOptions {
        system_prompt: prompts::FEATURE_SYSTEM.to_string(),
        max_tokens: SINGLE_MAX_TOKENS,
        ..Default::default()
    };

    let result = match generator.complete(&prompts::single_pr_prompt(pr), &options).await {
        Ok(content) => parse::parse_feature(&content),
        Err(e) => Err(e),
    };

    match result {
        Ok(json) => Ok(feature_from_json(pr, json)),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            warn!(repo = %pr.repo_full_name, number = pr.number, error = %e, "Summary failed; using PR title");
            Ok(fallback_feature(pr))
        }
    }
}

/// Summarize several pull requests in one request. Results are matched back
/// by id; anything the model dropped or garbled falls back to the PR title.
pub async fn summarize_batch(
    generator: &dyn TextGenerator,
    prs: &[PullRequest],
) -> Result<Vec<Feature>, LlmError> {
    if prs.is_empty() {
        return Ok(Vec::new());
    }

    let options = CompletionOptions {
        system_prompt: prompts::FEATURE_SYSTEM.to_string(),
        max_tokens: BATCH_MAX_TOKENS,
        ..Default::default()
    };

    let result = match generator.complete(&prompts::batch_prompt(prs), &options).await {
        Ok(content) => parse::parse_batch(&content),
        Err(e) => Err(e),
    };

    let mut by_id: HashMap<String, FeatureJson> = match result {
        Ok(items) => items
            .into_iter()
            .filter_map(|item| Some((item.id.clone()?, item)))
            .collect(),
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            warn!(count = prs.len(), error = %e, "Batch summary failed; using PR titles");
            HashMap::new()
        }
    };

    let features = prs
        .iter()
        .map(|pr| match by_id.remove(&prompts::pr_id(pr)) {
            Some(json) => feature_from_json(pr, json),
            None => {
                debug!(repo = %pr.repo_full_name, number = pr.number, "No batch result for pull request");
                fallback_feature(pr)
            }
        })
        .collect();
    Ok(features)
}

/// Summarize everything, one request per PR or in batches of [`BATCH_SIZE`].
pub async fn summarize_all(
    generator: &dyn TextGenerator,
    prs: &[PullRequest],
    fast: bool,
) -> Result<Vec<Feature>, LlmError> {
    let mut features = Vec::with_capacity(prs.len());

    if fast {
        for (i, chunk) in prs.chunks(BATCH_SIZE).enumerate() {
            info!(batch = i + 1, size = chunk.len(), "Summarizing batch");
            features.extend(summarize_batch(generator, chunk).await?);
        }
    } else {
        for (i, pr) in prs.iter().enumerate() {
            info!(current = i + 1, total = prs.len(), repo = %pr.repo_full_name, number = pr.number, "Summarizing pull request");
            features.push(summarize_pr(generator, pr).await?);
        }
    }

    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    /// Replays canned responses in order and records prompts.
    struct ScriptedGenerator {
        responses: Mutex<Vec<Result<String, LlmError>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedGenerator {
        fn new(responses: Vec<Result<String, LlmError>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn complete(
            &self,
            prompt: &str,
            _options: &CompletionOptions,
        ) -> Result<String, LlmError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(LlmError::Empty);
            }
            responses.remove(0)
        }
    }

    fn pr(number: u64, title: &str) -> PullRequest {
        PullRequest {
            number,
            title: title.to_string(),
            body: Some("\n  First line of body.\nSecond line".to_string()),
            url: format!("https://github.com/a/b/pull/{}", number),
            repo_name: "b".to_string(),
            repo_full_name: "a/b".to_string(),
            base_branch: "main".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
            merged_at: Utc.with_ymd_and_hms(2024, 2, 3, 0, 0, 0).unwrap(),
            commits: Vec::new(),
        }
    }

    #[test]
    fn test_guess_type_from_prefix() {
        assert_eq!(guess_type("feat(ui): add dark mode"), FeatureType::Feature);
        assert_eq!(guess_type("fix!: crash on empty input"), FeatureType::Bugfix);
        assert_eq!(guess_type("Chore: bump deps"), FeatureType::Infra);
        assert_eq!(guess_type("refactor: split module"), FeatureType::Refactor);
        assert_eq!(guess_type("Add dark mode"), FeatureType::Enhancement);
        assert_eq!(guess_type("fixture cleanup"), FeatureType::Enhancement);
    }

    #[test]
    fn test_fallback_feature() {
        let feature = fallback_feature(&pr(7, "fix: handle null body"));
        assert_eq!(feature.title, "fix: handle null body");
        assert_eq!(feature.description, "First line of body.");
        assert_eq!(feature.kind, FeatureType::Bugfix);
        assert_eq!(feature.confidence, Confidence::Low);
        assert_eq!(feature.prs, vec![7]);
        assert_eq!(feature.project, "a/b");
    }

    #[tokio::test]
    async fn test_summarize_pr_uses_model_output() {
        let generator = ScriptedGenerator::new(vec![Ok(
            r#"{"title": "Dark mode toggle", "description": "Users can switch themes.", "type": "feature", "confidence": "high"}"#.to_string(),
        )]);
        let source = pr(1, "Add dark mode");
        let feature = summarize_pr(&generator, &source).await.unwrap();
        assert_eq!(feature.title, "Dark mode toggle");
        assert_eq!(feature.kind, FeatureType::Feature);
        assert_eq!(feature.confidence, Confidence::High);
        assert_eq!(feature.start_date, source.created_at);
        assert_eq!(feature.end_date, source.merged_at);
    }

    #[tokio::test]
    async fn test_summarize_pr_degrades_on_garbage() {
        let generator = ScriptedGenerator::new(vec![Ok("no json here".to_string())]);
        let feature = summarize_pr(&generator, &pr(1, "Add dark mode")).await.unwrap();
        assert_eq!(feature.title, "Add dark mode");
        assert_eq!(feature.confidence, Confidence::Low);
    }

    #[tokio::test]
    async fn test_summarize_pr_propagates_auth_failure() {
        let generator = ScriptedGenerator::new(vec![Err(LlmError::Permanent {
            status: Some(401),
            message: "Invalid OpenRouter API key".to_string(),
        })]);
        let err = summarize_pr(&generator, &pr(1, "Add dark mode")).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_batch_matches_by_id_and_fills_gaps() {
        let generator = ScriptedGenerator::new(vec![Ok(r#"[
            {"id": "a/b#2", "title": "Second", "type": "bugfix", "confidence": "medium"},
            {"id": "x/y#9", "title": "Stray", "type": "feature", "confidence": "high"}
        ]"#
        .to_string())]);
        let prs = vec![pr(1, "First PR"), pr(2, "Second PR")];
        let features = summarize_batch(&generator, &prs).await.unwrap();

        assert_eq!(features.len(), 2);
        assert_eq!(features[0].title, "First PR");
        assert_eq!(features[0].confidence, Confidence::Low);
        assert_eq!(features[1].title, "Second");
        assert_eq!(features[1].kind, FeatureType::Bugfix);
    }

    #[tokio::test]
    async fn test_fast_mode_chunks_requests() {
        let prs: Vec<PullRequest> = (1..=23).map(|n| pr(n, "Tweak")).collect();
        let generator = ScriptedGenerator::new(Vec::new());
        let features = summarize_all(&generator, &prs, true).await.unwrap();

        assert_eq!(features.len(), 23);
        assert_eq!(generator.prompts.lock().unwrap().len(), 3);
        assert!(features.iter().all(|f| f.confidence == Confidence::Low));
    }
}
