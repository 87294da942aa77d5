//! Policy config discovery and the process-wide policy cache.
//!
//! Each project may carry `.github/actionvet.yaml|yml`. Building a
//! [`LintPolicy`] from it is cached under the SHA-256 of the raw bytes, so
//! many workflows sharing one config file pay construction cost once and
//! byte-identical configs in different projects share one cached instance.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use sha2::{Digest, Sha256};

use crate::policy::{LintPolicy, PolicyBuilder, PolicyOverrides};

/// Base name of the per-project config file under `.github/`.
pub const CONFIG_BASENAME: &str = "actionvet";

/// A located (not yet read) policy config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    path: PathBuf,
}

impl ConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> std::io::Result<Vec<u8>> {
        fs::read(&self.path)
    }
}

/// Walk upward from `start` until a `.git` directory marks the project root.
/// Falls back to `start` when no marker is found.
pub fn detect_project_root(start: &Path) -> PathBuf {
    let mut cur = start;
    loop {
        if cur.join(".git").exists() {
            return cur.to_path_buf();
        }
        match cur.parent() {
            Some(p) => cur = p,
            None => return start.to_path_buf(),
        }
    }
}

/// Look for `.github/actionvet.yaml` (then `.yml`) under the project root.
pub fn find_config_file(project_root: &Path) -> Option<ConfigFile> {
    for ext in ["yaml", "yml"] {
        let path = project_root
            .join(".github")
            .join(format!("{CONFIG_BASENAME}.{ext}"));
        if path.is_file() {
            return Some(ConfigFile::new(path));
        }
    }
    None
}

/// Content-keyed cache of built policies. Lives for the whole run and is
/// shared across workflows, so access is mutex-guarded.
#[derive(Debug, Default)]
pub struct PolicyCache {
    entries: Mutex<HashMap<String, Arc<LintPolicy>>>,
}

impl PolicyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache key for raw config bytes: hex SHA-256 of the content.
    pub fn key_for(data: &[u8]) -> String {
        let digest = Sha256::digest(data);
        let mut out = String::with_capacity(digest.len() * 2);
        for b in digest {
            out.push_str(&format!("{b:02x}"));
        }
        out
    }

    /// Build (or fetch) the policy for a workflow: config-file values first,
    /// then flag overrides, then defaults for anything still unset. Runs with
    /// no config file are built fresh each time since there is nothing to key
    /// the cache on.
    pub fn resolve(
        &self,
        config: Option<&ConfigFile>,
        flag_overrides: &PolicyOverrides,
    ) -> anyhow::Result<Arc<LintPolicy>> {
        let Some(config) = config else {
            tracing::debug!("no config file; using flag overrides over defaults");
            return Ok(Arc::new(PolicyBuilder::new().apply(flag_overrides).build()));
        };

        let data = config.read().with_context(|| {
            format!(
                "failed to read the config file: path={}",
                config.path().display()
            )
        })?;
        let key = Self::key_for(&data);

        let mut entries = self.entries.lock().expect("policy cache poisoned");
        if let Some(policy) = entries.get(&key) {
            tracing::debug!(path = %config.path().display(), %key, "cached policy found");
            return Ok(Arc::clone(policy));
        }

        let file_overrides = PolicyOverrides::from_yaml(&data).with_context(|| {
            format!(
                "failed to parse the config file: path={}",
                config.path().display()
            )
        })?;
        let policy = Arc::new(
            PolicyBuilder::new()
                .apply(&file_overrides)
                .apply(flag_overrides)
                .build(),
        );
        entries.insert(key, Arc::clone(&policy));
        Ok(policy)
    }
}
