//! CLI argument parsing via `clap`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::policy::PolicyOverrides;

#[derive(Parser, Debug)]
#[command(
    name = "actionvet",
    version,
    about = "Lint actions of 'uses' in GitHub Actions workflows",
    long_about = "actionvet — lint `uses:` references in GitHub Actions workflows against a supply-chain policy.\n\nConfiguration precedence: CLI > .github/actionvet.yaml > defaults.",
    after_help = "Examples:\n  actionvet\n  actionvet path/to/repo\n  actionvet .github/workflows/ci.yml --enforce-pin-hash=false\n  actionvet --only-allowlisted-hash --output json"
)]
/// Top-level CLI options.
pub struct Cli {
    /// Lint target paths. A path is either a directory of a local repository
    /// clone or the path to a workflow file.
    #[arg(default_value = ".")]
    pub paths: Vec<PathBuf>,

    /// Path to a config file. If not specified, use the default config file
    /// paths (.github/actionvet.yaml or .github/actionvet.yml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level (debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Number of parallel workers. Defaults to the number of CPUs.
    #[arg(long, short = 'n', default_value_t = 0)]
    pub workers: usize,

    /// Base cache TTL (time-to-live), e.g. 48h, 30m, 90s
    #[arg(long, default_value = "48h")]
    pub cache_ttl: String,

    /// Disable caching of remote lookups
    #[arg(long)]
    pub no_cache: bool,

    /// Output mode: human|json
    #[arg(long, default_value = "human")]
    pub output: String,

    /// Exclude actions created by official creators (actions, cli, github)
    #[arg(long = "exclude-official", num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub exclude_official: Option<bool>,

    /// Exclude actions created by verified creators
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub exclude_verified_creators: Option<bool>,

    /// Allow only SHA-pinned actions whose hash is in the allowlist
    #[arg(long = "only-allowlisted-hash", num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub only_allowlisted_hash: Option<bool>,

    /// Allow actions from archived repositories
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub allow_archived_repo: Option<bool>,

    /// Enforce pinning actions by commit hash
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub enforce_pin_hash: Option<bool>,

    /// Enforce using actions from verified organizations
    #[arg(long = "enforce-verified-org", num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub enforce_verified_org: Option<bool>,

    /// Allowlisted creators (e.g. google-github-actions); repeatable
    #[arg(long = "creator-allowlist")]
    pub creator_allowlist: Vec<String>,

    /// Allowlisted actions (e.g. google-github-actions/auth); repeatable
    #[arg(long = "action-allowlist")]
    pub action_allowlist: Vec<String>,
}

impl Cli {
    /// Policy overrides carrying only what the user set explicitly, so
    /// config-file values survive unless a flag contradicts them.
    pub fn policy_overrides(&self) -> PolicyOverrides {
        PolicyOverrides {
            exclude_official_actions: self.exclude_official,
            exclude_verified_creators: self.exclude_verified_creators,
            allow_only_allowlisted_hash: self.only_allowlisted_hash,
            allow_archived_repo: self.allow_archived_repo,
            enforce_pin_hash: self.enforce_pin_hash,
            enforce_verified_organization: self.enforce_verified_org,
            creator_allowlist: self.creator_allowlist.clone(),
            action_allowlist: self.action_allowlist.clone(),
            hash_allowlist: HashMap::new(),
        }
    }

    /// Effective worker count; zero means one per available CPU.
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    /// Effective remote-cache TTL; `--no-cache` collapses it to zero.
    pub fn effective_cache_ttl(&self) -> anyhow::Result<Duration> {
        if self.no_cache {
            return Ok(Duration::ZERO);
        }
        parse_duration(&self.cache_ttl)
    }
}

/// Parses durations of the form `48h`, `30m`, `90s`, or a bare second count.
pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim();
    let (value, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => s.split_at(idx),
        None => (s, "s"),
    };
    let value: u64 = value
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid duration: {s}"))?;
    let secs = match unit {
        "s" => Some(value),
        "m" => value.checked_mul(60),
        "h" => value.checked_mul(3600),
        _ => anyhow::bail!("invalid duration unit: {unit}"),
    };
    let secs = secs.ok_or_else(|| anyhow::anyhow!("invalid duration: {s}"))?;
    Ok(Duration::from_secs(secs))
}
