//! Parsing of `uses:` values into structured action references.
//!
//! A remote reference looks like `owner/repo[/path]@ref`. Values without an
//! `@` are local paths or container images and are never policy subjects;
//! callers must treat [`parse_uses`] returning `Ok(None)` as "skip".

use std::fmt;

use regex::Regex;
use std::sync::OnceLock;

fn sha_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9a-fA-F]{40}$").expect("valid regex"))
}

/// Returns true when `s` is a full 40-character commit SHA.
pub fn is_sha(s: &str) -> bool {
    sha_re().is_match(s)
}

/// Shorten a commit SHA to its 7-character prefix; other refs pass through.
pub fn shorten_hash(hash: &str) -> &str {
    if is_sha(hash) {
        &hash[..7]
    } else {
        hash
    }
}

/// A parsed action reference from a workflow step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    /// Everything before the final `@`; may contain path segments for
    /// reusable workflows (e.g. `octo-org/repo/.github/workflows/ci.yml`).
    pub id: String,
    pub owner: String,
    pub name: String,
    pub git_ref: String,
}

impl Action {
    /// `OWNER/NAME` of the backing repository.
    pub fn repo_id(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// True for references into the same repository's workflows directory.
    pub fn is_local_reusable_workflow(&self) -> bool {
        self.id.starts_with("./.github/workflows/")
    }

    /// True when the ref is a full commit SHA rather than a tag or branch.
    pub fn is_pinned_by_sha(&self) -> bool {
        is_sha(&self.git_ref)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.name, self.git_ref)
    }
}

/// Why a `uses:` value could not be parsed as a remote reference.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseUsesError {
    #[error("unexpected 'uses' value: {0}")]
    Unexpected(String),
    #[error("invalid uses value: expected=owner/repo, actual={0}")]
    MissingOwnerRepo(String),
}

/// Parse a `uses:` value.
///
/// Returns `Ok(None)` when the value contains no `@` (local path or container
/// image, always allowed), `Ok(Some(action))` for a remote reference, and an
/// error for malformed values.
pub fn parse_uses(uses: &str) -> Result<Option<Action>, ParseUsesError> {
    let uses = uses.trim();
    let items: Vec<&str> = uses.split('@').collect();
    match items.len() {
        // No '@': an action in the same repository or a Docker Hub image.
        1 => Ok(None),
        2 => {
            let action_id = items[0];
            let git_ref = items[1];

            let parts: Vec<&str> = action_id.split('/').collect();
            if parts.len() < 2 {
                return Err(ParseUsesError::MissingOwnerRepo(action_id.to_string()));
            }

            Ok(Some(Action {
                id: action_id.to_string(),
                owner: parts[0].to_string(),
                name: parts[1].to_string(),
                git_ref: git_ref.to_string(),
            }))
        }
        _ => Err(ParseUsesError::Unexpected(uses.to_string())),
    }
}
