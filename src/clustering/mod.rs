//! Feature clustering
//!
//! Collapses near-duplicate features within each project using
//! single-linkage agglomerative merging, then rolls them up into one
//! [`ProjectSummary`] per project.
//!
//! Clustering never touches pull requests. It only sees the features the
//! summarizer produced for them.

pub mod similarity;

pub use similarity::similarity;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};

/// Similarity at or above which two features are merged.
pub const DEFAULT_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureType {
    Feature,
    Enhancement,
    Bugfix,
    Infra,
    Refactor,
}

impl FeatureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureType::Feature => "feature",
            FeatureType::Enhancement => "enhancement",
            FeatureType::Bugfix => "bugfix",
            FeatureType::Infra => "infra",
            FeatureType::Refactor => "refactor",
        }
    }

    /// Lenient parse of model output. `None` for anything unrecognised.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "feature" | "feat" => Some(FeatureType::Feature),
            "enhancement" | "improvement" => Some(FeatureType::Enhancement),
            "bugfix" | "bug" | "fix" => Some(FeatureType::Bugfix),
            "infra" | "infrastructure" | "chore" | "ci" | "build" => Some(FeatureType::Infra),
            "refactor" | "refactoring" => Some(FeatureType::Refactor),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "high" => Some(Confidence::High),
            "medium" => Some(Confidence::Medium),
            "low" => Some(Confidence::Low),
            _ => None,
        }
    }
}

/// One shipped unit of work, described from one or more pull requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    /// Repository full name.
    pub project: String,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: FeatureType,
    /// Ascending and free of duplicates.
    pub prs: Vec<u64>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub confidence: Confidence,
}

/// Combine two features describing the same work.
///
/// Title, description, and type come from the more confident side, with ties
/// going to `a`. PR lists are unioned and the date range widened. Confidence
/// drops to medium when the two sides disagree.
pub fn merge_features(a: &Feature, b: &Feature) -> Feature {
    let primary = match (a.confidence, b.confidence) {
        (Confidence::High, _) => a,
        (_, Confidence::High) => b,
        (_, Confidence::Low) => a,
        (Confidence::Low, _) => b,
        _ => a,
    };

    let prs: BTreeSet<u64> = a.prs.iter().chain(&b.prs).copied().collect();
    let confidence = if a.confidence == b.confidence {
        a.confidence
    } else {
        Confidence::Medium
    };

    Feature {
        project: a.project.clone(),
        title: primary.title.clone(),
        description: primary.description.clone(),
        kind: primary.kind,
        prs: prs.into_iter().collect(),
        start_date: a.start_date.min(b.start_date),
        end_date: a.end_date.max(b.end_date),
        confidence,
    }
}

/// Everything shipped in one repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub repo_name: String,
    pub repo_full_name: String,
    /// Ordered by `end_date`.
    pub features: Vec<Feature>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub total_prs: usize,
}

impl ProjectSummary {
    fn from_features(repo_full_name: String, features: Vec<Feature>) -> Option<Self> {
        let start_date = features.iter().map(|f| f.start_date).min()?;
        let end_date = features.iter().map(|f| f.end_date).max()?;
        let total_prs = features
            .iter()
            .flat_map(|f| f.prs.iter().copied())
            .collect::<BTreeSet<_>>()
            .len();
        let repo_name = repo_full_name
            .rsplit('/')
            .next()
            .unwrap_or(repo_full_name.as_str())
            .to_string();

        Some(Self {
            repo_name,
            repo_full_name,
            features,
            start_date,
            end_date,
            total_prs,
        })
    }
}

/// Merge near-duplicates within one project's features.
///
/// The first remaining feature is the pivot; every later feature scoring at
/// least `threshold` against the (growing) pivot is folded into it. Repeats
/// until the pool is empty.
pub fn cluster_project(features: Vec<Feature>, threshold: f64) -> Vec<Feature> {
    if features.len() < 2 {
        return features;
    }

    let mut pool: VecDeque<Feature> = features.into();
    let mut clustered = Vec::new();

    while let Some(mut pivot) = pool.pop_front() {
        let mut remaining = VecDeque::with_capacity(pool.len());
        for candidate in pool.drain(..) {
            if similarity(&pivot, &candidate) >= threshold {
                pivot = merge_features(&pivot, &candidate);
            } else {
                remaining.push_back(candidate);
            }
        }
        pool = remaining;
        clustered.push(pivot);
    }

    clustered
}

/// Group by project, cluster each group, and summarise.
///
/// Summaries are ordered by `start_date`; features within a summary by
/// `end_date`.
pub fn cluster_features(features: Vec<Feature>, threshold: f64) -> Vec<ProjectSummary> {
    let mut groups: Vec<(String, Vec<Feature>)> = Vec::new();
    for feature in features {
        match groups.iter_mut().find(|(project, _)| *project == feature.project) {
            Some((_, group)) => group.push(feature),
            None => groups.push((feature.project.clone(), vec![feature])),
        }
    }

    let mut summaries: Vec<ProjectSummary> = groups
        .into_iter()
        .filter_map(|(project, group)| {
            let mut merged = cluster_project(group, threshold);
            merged.sort_by_key(|f| f.end_date);
            ProjectSummary::from_features(project, merged)
        })
        .collect();

    summaries.sort_by_key(|s| s.start_date);
    summaries
}
