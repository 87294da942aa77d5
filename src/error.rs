//! Violation taxonomy and failure types shared across the linter.
//!
//! A `Violation` is data returned to the caller; a `LintFailure` is an
//! infrastructure problem (unparseable workflow, unreachable remote) that is
//! logged at the aggregation point instead of being returned.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Classification of a lint violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Malformed `uses:` syntax.
    UnexpectedValue,
    /// The ref is not a commit SHA and hash pinning is enforced.
    Unpinned,
    /// The action's repository is archived and archived repos are disallowed.
    ArchivedActionUsed,
    /// The ref is a commit SHA but is absent from the hash allowlist.
    UnallowlistedSha,
    /// A remote collaborator failed; the reference could not be judged.
    RuntimeError,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ViolationKind::UnexpectedValue => "unexpected value",
            ViolationKind::Unpinned => "must be pinned by hash",
            ViolationKind::ArchivedActionUsed => "archived action is not allowed",
            ViolationKind::UnallowlistedSha => "SHA is not allowlisted",
            ViolationKind::RuntimeError => "runtime error",
        };
        f.write_str(s)
    }
}

/// A 1-based position inside a workflow file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pos {
    pub line: usize,
    pub col: usize,
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// One policy violation, never mutated after creation.
#[derive(Debug, Clone, Serialize)]
pub struct Violation {
    pub message: String,
    pub kind: ViolationKind,
    /// Path relative to the project root; printers may prefix the repo ID.
    pub path: String,
    pub line: usize,
    pub column: usize,
    /// Absolute path of the owning workflow file, for snippet rendering.
    #[serde(skip)]
    pub abs_path: PathBuf,
}

impl Violation {
    pub fn new(
        message: impl Into<String>,
        kind: ViolationKind,
        path: impl Into<String>,
        pos: Pos,
        abs_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            message: message.into(),
            kind,
            path: path.into(),
            line: pos.line,
            column: pos.col,
            abs_path: abs_path.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {} [{}]",
            self.path, self.line, self.column, self.message, self.kind
        )
    }
}

/// Infrastructure failures that abort one workflow stream, not the run.
#[derive(Debug, Error)]
pub enum LintFailure {
    #[error("failed to parse workflow: path={path}, msg={msg}")]
    WorkflowParse { path: String, msg: String },

    #[error("failed to read a workflow file: path={path}, error={source}")]
    WorkflowRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by the remote collaborators. They propagate unchanged; the
/// rule engine converts them into `RuntimeError` outcomes.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("failed to run {cmd}: {source}")]
    Spawn {
        cmd: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{cmd} exited with {status}: {stderr}")]
    CommandFailed {
        cmd: String,
        status: i32,
        stderr: String,
    },

    #[error("failed to decode {what}: {source}")]
    Decode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("{sha} is neither a commit nor blob")]
    UnknownSha { sha: String },

    #[error("organization not found: {login}")]
    OrgNotFound { login: String },

    #[error("organization is not verified: {login}")]
    OrgNotVerified { login: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_display_strings() {
        assert_eq!(ViolationKind::Unpinned.to_string(), "must be pinned by hash");
        assert_eq!(
            ViolationKind::UnallowlistedSha.to_string(),
            "SHA is not allowlisted"
        );
        assert_eq!(ViolationKind::RuntimeError.to_string(), "runtime error");
    }

    #[test]
    fn test_violation_display() {
        let v = Violation::new(
            "invalid ref value: action=a/b, expected=SHA, actual=v1",
            ViolationKind::Unpinned,
            ".github/workflows/ci.yml",
            Pos { line: 8, col: 32 },
            "/repo/.github/workflows/ci.yml",
        );
        assert_eq!(
            v.to_string(),
            ".github/workflows/ci.yml:8:32: invalid ref value: action=a/b, expected=SHA, actual=v1 [must be pinned by hash]"
        );
    }
}
