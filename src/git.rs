//! Project repository identity, derived from the `origin` remote.
//!
//! The repo ID (`OWNER/NAME`) prefixes printed paths so output from multiple
//! checked-out repositories stays unambiguous. Resolution shells out to `git`
//! once per project root and caches the answer for the rest of the run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tokio::process::Command;

use crate::error::RemoteError;

/// Extracts `OWNER/NAME` from a git remote URL.
///
/// Handles the two shapes git produces in practice:
/// `git@github.com:owner/name.git` and `https://github.com/owner/name.git`,
/// with or without the `.git` suffix.
pub fn repo_id_from_url(url: &str) -> Option<String> {
    let url = url.trim();
    let path = if let Some(rest) = url.strip_prefix("git@") {
        rest.split_once(':')?.1
    } else if let Some(rest) = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .or_else(|| url.strip_prefix("ssh://git@"))
    {
        rest.split_once('/')?.1
    } else {
        return None;
    };
    let path = path.strip_suffix(".git").unwrap_or(path);
    let path = path.trim_matches('/');
    let mut parts = path.splitn(2, '/');
    let owner = parts.next()?;
    let name = parts.next()?;
    if owner.is_empty() || name.is_empty() || name.contains('/') {
        return None;
    }
    Some(format!("{owner}/{name}"))
}

/// Resolves and memoizes the repo ID per project root. A root without an
/// `origin` remote resolves to `None` and that answer is cached too.
#[derive(Debug, Default)]
pub struct RepoIdentity {
    cache: Mutex<HashMap<PathBuf, Option<String>>>,
}

impl RepoIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn repo_id(&self, project_root: &Path) -> Option<String> {
        {
            let cache = self.cache.lock().expect("repo id cache poisoned");
            if let Some(cached) = cache.get(project_root) {
                return cached.clone();
            }
        }
        let resolved = match origin_url(project_root).await {
            Ok(url) => repo_id_from_url(&url),
            Err(e) => {
                tracing::debug!(root = %project_root.display(), error = %e, "no origin remote");
                None
            }
        };
        let mut cache = self.cache.lock().expect("repo id cache poisoned");
        cache.insert(project_root.to_path_buf(), resolved.clone());
        resolved
    }
}

async fn origin_url(project_root: &Path) -> Result<String, RemoteError> {
    let cmd = "git config --get remote.origin.url".to_string();
    let output = Command::new("git")
        .args(["config", "--get", "remote.origin.url"])
        .current_dir(project_root)
        .output()
        .await
        .map_err(|source| RemoteError::Spawn {
            cmd: cmd.clone(),
            source,
        })?;
    if !output.status.success() {
        return Err(RemoteError::CommandFailed {
            cmd,
            status: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
