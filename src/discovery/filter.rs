//! Which repositories a run is allowed to report on.

use crate::util::split_full_name;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Every repository the token can see
    #[default]
    All,
    /// Only repositories owned by the user
    Personal,
    /// Only repositories owned by someone else
    Orgs,
}

/// Scope plus explicit allow and deny lists.
///
/// Evaluation order: the exclude list always wins; a non-empty `repos` or
/// `orgs` allow-list then decides membership on its own; otherwise `scope`
/// applies. All comparisons ignore ASCII case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoFilter {
    pub scope: Scope,
    pub repos: Vec<String>,
    pub orgs: Vec<String>,
    pub exclude: Vec<String>,
}

impl RepoFilter {
    pub fn allows(&self, full_name: &str, username: &str) -> bool {
        if self
            .exclude
            .iter()
            .any(|r| r.eq_ignore_ascii_case(full_name))
        {
            return false;
        }

        let owner = split_full_name(full_name)
            .map(|(owner, _)| owner)
            .unwrap_or(full_name);

        if !self.repos.is_empty() || !self.orgs.is_empty() {
            return self.repos.iter().any(|r| r.eq_ignore_ascii_case(full_name))
                || self.orgs.iter().any(|o| o.eq_ignore_ascii_case(owner));
        }

        let personal = owner.eq_ignore_ascii_case(username);
        match self.scope {
            Scope::All => true,
            Scope::Personal => personal,
            Scope::Orgs => !personal,
        }
    }
}
