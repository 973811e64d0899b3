//! Markdown and JSON rendering of the final feature log.

use crate::clustering::ProjectSummary;
use crate::discovery::DiscoveryStats;
use crate::github::PullRequest;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    #[default]
    Markdown,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub username: String,
    pub since: NaiveDate,
    pub until: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub projects: Vec<ProjectSummary>,
    pub total_prs: usize,
    pub total_features: usize,
}

impl Report {
    pub fn new(
        username: impl Into<String>,
        since: NaiveDate,
        until: NaiveDate,
        projects: Vec<ProjectSummary>,
        generated_at: DateTime<Utc>,
    ) -> Self {
        let total_prs = projects.iter().map(|p| p.total_prs).sum();
        let total_features = projects.iter().map(|p| p.features.len()).sum();
        Self {
            username: username.into(),
            since,
            until,
            generated_at,
            projects,
            total_prs,
            total_features,
        }
    }
}

fn day(date: &DateTime<Utc>) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn plural(count: usize, word: &str) -> String {
    if count == 1 {
        format!("{} {}", count, word)
    } else {
        format!("{} {}s", count, word)
    }
}

pub fn render(report: &Report, format: ReportFormat) -> anyhow::Result<String> {
    match format {
        ReportFormat::Markdown => Ok(render_markdown(report)),
        ReportFormat::Json => Ok(serde_json::to_string_pretty(report)?),
    }
}

pub fn render_markdown(report: &Report) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Shipped work: {}", report.username);
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{} to {} · {} across {} · {}",
        report.since,
        report.until,
        plural(report.total_features, "feature"),
        plural(report.projects.len(), "project"),
        plural(report.total_prs, "pull request"),
    );

    for project in &report.projects {
        let _ = writeln!(out);
        let _ = writeln!(out, "## {}", project.repo_full_name);
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "{} to {} · {}",
            day(&project.start_date),
            day(&project.end_date),
            plural(project.total_prs, "pull request"),
        );
        let _ = writeln!(out);

        for feature in &project.features {
            let prs = feature
                .prs
                .iter()
                .map(|n| format!("#{}", n))
                .collect::<Vec<_>>()
                .join(", ");
            let _ = write!(out, "- **{}** ({})", feature.title, feature.kind.as_str());
            if !feature.description.is_empty() {
                let _ = write!(out, " — {}", feature.description);
            }
            let _ = writeln!(out, " [{}]", prs);
            let _ = writeln!(
                out,
                "  _{} to {}, {} confidence_",
                day(&feature.start_date),
                day(&feature.end_date),
                feature.confidence.as_str()
            );
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "_Generated {}_",
        report.generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    out
}

/// Discovered pull requests grouped by repository, without summarization.
pub fn render_dry_run(
    username: &str,
    since: NaiveDate,
    until: NaiveDate,
    prs: &[PullRequest],
    stats: &DiscoveryStats,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Dry run: {}", username);
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{} to {} · {} found",
        since,
        until,
        plural(prs.len(), "merged pull request")
    );
    let _ = writeln!(
        out,
        "Strategies: {} · search hits: {} · repos scanned: {} · repos skipped: {}{}",
        stats.strategies_run.join(", "),
        stats.search_hits,
        stats.repos_scanned,
        stats.repos_skipped,
        if stats.cache_hit { " · cached" } else { "" }
    );

    let mut repos: Vec<&str> = Vec::new();
    for pr in prs {
        if !repos.contains(&pr.repo_full_name.as_str()) {
            repos.push(&pr.repo_full_name);
        }
    }

    for repo in repos {
        let _ = writeln!(out);
        let _ = writeln!(out, "## {}", repo);
        let _ = writeln!(out);
        for pr in prs.iter().filter(|p| p.repo_full_name == repo) {
            let _ = writeln!(
                out,
                "- #{} {} ({}, merged {})",
                pr.number,
                pr.title,
                pr.base_branch,
                day(&pr.merged_at)
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::{Confidence, Feature, FeatureType};
    use chrono::TimeZone;

    fn sample() -> Report {
        let at = |d| Utc.with_ymd_and_hms(2024, 3, d, 9, 0, 0).unwrap();
        let feature = Feature {
            project: "a/b".to_string(),
            title: "Dark mode toggle".to_string(),
            description: "Users can switch themes.".to_string(),
            kind: FeatureType::Feature,
            prs: vec![1, 2],
            start_date: at(1),
            end_date: at(4),
            confidence: Confidence::Medium,
        };
        let project = ProjectSummary {
            repo_name: "b".to_string(),
            repo_full_name: "a/b".to_string(),
            features: vec![feature],
            start_date: at(1),
            end_date: at(4),
            total_prs: 2,
        };
        Report::new(
            "octocat",
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
            vec![project],
            at(31),
        )
    }

    #[test]
    fn test_totals() {
        let report = sample();
        assert_eq!(report.total_prs, 2);
        assert_eq!(report.total_features, 1);
    }

    #[test]
    fn test_markdown_layout() {
        let md = render_markdown(&sample());
        assert!(md.starts_with("# Shipped work: octocat\n"));
        assert!(md.contains("1 feature across 1 project · 2 pull requests"));
        assert!(md.contains("## a/b"));
        assert!(md.contains(
            "- **Dark mode toggle** (feature) — Users can switch themes. [#1, #2]"
        ));
        assert!(md.contains("2024-03-01 to 2024-03-04, medium confidence"));
    }

    #[test]
    fn test_json_is_parseable() {
        let json = render(&sample(), ReportFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["username"], "octocat");
        assert_eq!(value["since"], "2024-03-01");
        assert_eq!(value["projects"][0]["features"][0]["type"], "feature");
        assert_eq!(value["projects"][0]["features"][0]["prs"][1], 2);
    }

    #[test]
    fn test_dry_run_groups_by_repo() {
        let at = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap();
        let pr = |repo: &str, number| PullRequest {
            number,
            title: format!("Change {}", number),
            body: None,
            url: String::new(),
            repo_name: String::new(),
            repo_full_name: repo.to_string(),
            base_branch: "main".to_string(),
            created_at: at,
            merged_at: at,
            commits: Vec::new(),
        };
        let stats = DiscoveryStats {
            strategies_run: vec!["global-search".to_string()],
            ..Default::default()
        };
        let out = render_dry_run(
            "octocat",
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
            &[pr("a/b", 1), pr("c/d", 2), pr("a/b", 3)],
            &stats,
        );
        assert!(out.contains("3 merged pull requests found"));
        assert_eq!(out.matches("## a/b").count(), 1);
        assert!(out.find("#3 Change 3").unwrap() < out.find("## c/d").unwrap());
    }
}
