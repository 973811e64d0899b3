use crate::github::PullRequest;
use crate::util::truncate;

/// PR bodies beyond this are cut before prompting.
pub const MAX_BODY_CHARS: usize = 2000;

/// Commit subjects included per pull request.
pub const MAX_COMMITS: usize = 20;

pub const FEATURE_SYSTEM: &str = r#"You turn merged pull requests into entries for a developer's shipped-work log.

Describe the user-visible or team-visible outcome, not the implementation. Write
the title as a short imperative phrase (under 8 words). Write the description as
one or two plain sentences.

Classify the work as exactly one type:
- feature: new capability
- enhancement: improvement to something that already exists
- bugfix: corrects wrong behavior
- infra: CI, build, deploy, dependencies, tooling
- refactor: internal restructuring with no behavior change

Set confidence to high when the pull request clearly states what it does, medium
when you had to infer, and low when the description is mostly guesswork.

Respond with JSON only."#;

pub const SINGLE_FORMAT: &str = r#"Respond with one JSON object:
{"title": "...", "description": "...", "type": "feature|enhancement|bugfix|infra|refactor", "confidence": "high|medium|low"}"#;

pub const BATCH_FORMAT: &str = r#"Respond with a JSON array containing one object per pull request, in the same
order as given. Copy each pull request's id exactly:
[{"id": "...", "title": "...", "description": "...", "type": "feature|enhancement|bugfix|infra|refactor", "confidence": "high|medium|low"}]"#;

/// Stable identifier echoed back by the model in batch mode.
pub fn pr_id(pr: &PullRequest) -> String {
    format!("{}#{}", pr.repo_full_name, pr.number)
}

fn describe(pr: &PullRequest, include_commits: bool) -> String {
    let mut out = format!(
        "Repository: {}\nTitle: {}\n",
        pr.repo_full_name,
        pr.title.trim()
    );

    let body = pr.body.as_deref().map(str::trim).unwrap_or("");
    if body.is_empty() {
        out.push_str("Description: (none)\n");
    } else {
        out.push_str("Description:\n");
        out.push_str(&truncate(body, MAX_BODY_CHARS));
        out.push('\n');
    }

    if include_commits && !pr.commits.is_empty() {
        out.push_str("Commits:\n");
        for commit in pr.commits.iter().take(MAX_COMMITS) {
            out.push_str("- ");
            out.push_str(commit.subject());
            out.push('\n');
        }
        if pr.commits.len() > MAX_COMMITS {
            out.push_str(&format!("- ... and {} more\n", pr.commits.len() - MAX_COMMITS));
        }
    }

    out
}

pub fn single_pr_prompt(pr: &PullRequest) -> String {
    format!("{}\n{}", describe(pr, true), SINGLE_FORMAT)
}

/// Several pull requests separated by `=== PR <id> ===` markers.
pub fn batch_prompt(prs: &[PullRequest]) -> String {
    let mut out = String::new();
    for pr in prs {
        out.push_str(&format!("=== PR {} ===\n", pr_id(pr)));
        out.push_str(&describe(pr, false));
        out.push('\n');
    }
    out.push_str(BATCH_FORMAT);
    out
}
