//! Policy parameter set: flags and allowlists that drive the rule engine.
//!
//! Flags are tri-state while being assembled (unset vs. explicitly set) so a
//! config file can say `false` for a flag whose default is `true`. After
//! [`PolicyBuilder::build`], every flag holds a concrete value.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::action::Action;

pub const DEFAULT_EXCLUDE_OFFICIAL_ACTIONS: bool = true;
pub const DEFAULT_EXCLUDE_VERIFIED_CREATORS: bool = false;
pub const DEFAULT_ALLOW_ONLY_ALLOWLISTED_HASH: bool = false;
pub const DEFAULT_ALLOW_ARCHIVED_REPO: bool = true;
pub const DEFAULT_ENFORCE_PIN_HASH: bool = true;
pub const DEFAULT_ENFORCE_VERIFIED_ORG: bool = false;

/// Creators whose actions are considered official.
pub const OFFICIAL_CREATORS: &[&str] = &["actions", "cli", "github"];

/// Actions published by verified creators. There is no API to query this, so
/// the list is curated statically.
pub const ACTIONS_BY_VERIFIED_CREATORS: &[&str] = &[
    "docker/login-action",
    "google-github-actions/auth",
    "google-github-actions/setup-gcloud",
    "slackapi/slack-github-action",
];

/// One allowlisted commit hash with an optional reviewer comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedEntry {
    pub sha: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Optional policy values as read from a config file or CLI flags.
/// Every field left `None`/empty falls back to the builder state it is
/// applied onto, and ultimately to the documented defaults.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PolicyOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_official_actions: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_verified_creators: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_only_allowlisted_hash: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_archived_repo: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enforce_pin_hash: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enforce_verified_organization: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub creator_allowlist: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub action_allowlist: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub hash_allowlist: HashMap<String, Vec<AllowedEntry>>,
}

impl PolicyOverrides {
    /// Parse override values from raw YAML config bytes. Allowlisted SHAs are
    /// trimmed so trailing whitespace in the file does not defeat matching.
    pub fn from_yaml(data: &[u8]) -> Result<Self, serde_yaml::Error> {
        let mut overrides: PolicyOverrides = serde_yaml::from_slice(data)?;
        for entries in overrides.hash_allowlist.values_mut() {
            for entry in entries.iter_mut() {
                entry.sha = entry.sha.trim().to_string();
            }
        }
        Ok(overrides)
    }
}

/// Additive builder for a [`LintPolicy`].
#[derive(Debug, Default, Clone)]
pub struct PolicyBuilder {
    exclude_official_actions: Option<bool>,
    exclude_verified_creators: Option<bool>,
    allow_only_allowlisted_hash: Option<bool>,
    allow_archived_repo: Option<bool>,
    enforce_pin_hash: Option<bool>,
    enforce_verified_organization: Option<bool>,
    creator_allowlist: Vec<String>,
    action_allowlist: Vec<String>,
    hash_allowlist: HashMap<String, Vec<AllowedEntry>>,
}

impl PolicyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exclude_official_actions(mut self, v: bool) -> Self {
        self.exclude_official_actions = Some(v);
        self
    }

    pub fn exclude_verified_creators(mut self, v: bool) -> Self {
        self.exclude_verified_creators = Some(v);
        self
    }

    pub fn allow_only_allowlisted_hash(mut self, v: bool) -> Self {
        self.allow_only_allowlisted_hash = Some(v);
        self
    }

    pub fn allow_archived_repo(mut self, v: bool) -> Self {
        self.allow_archived_repo = Some(v);
        self
    }

    pub fn enforce_pin_hash(mut self, v: bool) -> Self {
        self.enforce_pin_hash = Some(v);
        self
    }

    pub fn enforce_verified_organization(mut self, v: bool) -> Self {
        self.enforce_verified_organization = Some(v);
        self
    }

    /// Append creators, suppressing exact duplicates.
    pub fn creator_allowlist<I, S>(mut self, creators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for creator in creators {
            let creator = creator.into();
            if !self.creator_allowlist.contains(&creator) {
                self.creator_allowlist.push(creator);
            }
        }
        self
    }

    /// Append action IDs, suppressing exact duplicates.
    pub fn action_allowlist<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for action in actions {
            let action = action.into();
            if !self.action_allowlist.contains(&action) {
                self.action_allowlist.push(action);
            }
        }
        self
    }

    pub fn hash_allowlist(mut self, allowlist: HashMap<String, Vec<AllowedEntry>>) -> Self {
        self.hash_allowlist = allowlist;
        self
    }

    /// Apply a set of optional overrides on top of the current state.
    pub fn apply(mut self, overrides: &PolicyOverrides) -> Self {
        if let Some(v) = overrides.exclude_official_actions {
            self = self.exclude_official_actions(v);
        }
        if let Some(v) = overrides.exclude_verified_creators {
            self = self.exclude_verified_creators(v);
        }
        if let Some(v) = overrides.allow_only_allowlisted_hash {
            self = self.allow_only_allowlisted_hash(v);
        }
        if let Some(v) = overrides.allow_archived_repo {
            self = self.allow_archived_repo(v);
        }
        if let Some(v) = overrides.enforce_pin_hash {
            self = self.enforce_pin_hash(v);
        }
        if let Some(v) = overrides.enforce_verified_organization {
            self = self.enforce_verified_organization(v);
        }
        if !overrides.creator_allowlist.is_empty() {
            self = self.creator_allowlist(overrides.creator_allowlist.iter().cloned());
        }
        if !overrides.action_allowlist.is_empty() {
            self = self.action_allowlist(overrides.action_allowlist.iter().cloned());
        }
        if !overrides.hash_allowlist.is_empty() {
            self = self.hash_allowlist(overrides.hash_allowlist.clone());
        }
        self
    }

    /// Finalize the policy; any flag left unset receives its default.
    pub fn build(self) -> LintPolicy {
        LintPolicy {
            exclude_official_actions: self
                .exclude_official_actions
                .unwrap_or(DEFAULT_EXCLUDE_OFFICIAL_ACTIONS),
            exclude_verified_creators: self
                .exclude_verified_creators
                .unwrap_or(DEFAULT_EXCLUDE_VERIFIED_CREATORS),
            allow_only_allowlisted_hash: self
                .allow_only_allowlisted_hash
                .unwrap_or(DEFAULT_ALLOW_ONLY_ALLOWLISTED_HASH),
            allow_archived_repo: self.allow_archived_repo.unwrap_or(DEFAULT_ALLOW_ARCHIVED_REPO),
            enforce_pin_hash: self.enforce_pin_hash.unwrap_or(DEFAULT_ENFORCE_PIN_HASH),
            enforce_verified_organization: self
                .enforce_verified_organization
                .unwrap_or(DEFAULT_ENFORCE_VERIFIED_ORG),
            creator_allowlist: self.creator_allowlist,
            action_allowlist: self.action_allowlist,
            hash_allowlist: self.hash_allowlist,
        }
    }
}

/// Immutable policy parameter set for one workflow's lint run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LintPolicy {
    pub exclude_official_actions: bool,
    pub exclude_verified_creators: bool,
    pub allow_only_allowlisted_hash: bool,
    pub allow_archived_repo: bool,
    pub enforce_pin_hash: bool,
    pub enforce_verified_organization: bool,
    pub creator_allowlist: Vec<String>,
    pub action_allowlist: Vec<String>,
    pub hash_allowlist: HashMap<String, Vec<AllowedEntry>>,
}

impl Default for LintPolicy {
    fn default() -> Self {
        PolicyBuilder::new().build()
    }
}

impl LintPolicy {
    /// Look up the hash allowlist for an action: by action ID first, then by
    /// repo ID. `None` means "no entry", distinct from an empty explicit list.
    pub fn get_hash_allowlist(&self, action: &Action) -> Option<&[AllowedEntry]> {
        if let Some(entries) = self.hash_allowlist.get(&action.id) {
            return Some(entries.as_slice());
        }
        self.hash_allowlist
            .get(&action.repo_id())
            .map(|entries| entries.as_slice())
    }
}
