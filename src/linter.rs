//! Concurrent policy evaluation over workflow `uses:` references.
//!
//! Every step gets its own task; a single counting semaphore bounds
//! in-flight evaluations across the whole run, not per file. Tasks publish
//! through private channels that a merger drains in completion order, so no
//! slow remote lookup blocks results from other steps. Dropping the entry
//! point cancels outstanding tasks through a shared token.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::action::{self, shorten_hash, Action};
use crate::error::{LintFailure, Pos, RemoteError, Violation, ViolationKind};
use crate::github::{LoginKind, Repo, RepoMetadata, TagResolver};
use crate::policy::{LintPolicy, ACTIONS_BY_VERIFIED_CREATORS, OFFICIAL_CREATORS};
use crate::workflow::{self, UsesStep, WorkflowInfo};

const MAX_COMMENT_LEN: usize = 20;

fn replace_newlines(s: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"[\r\n\s]+").expect("valid regex"));
    re.replace_all(s, " ").into_owned()
}

fn truncate_str(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let truncated: String = s.chars().take(max).collect();
    format!("{truncated}...")
}

/// One workflow file paired with the policy it is judged against.
pub struct FileTask {
    pub info: WorkflowInfo,
    pub policy: Arc<LintPolicy>,
}

/// Per-file data shared by every step task spawned for that file.
struct FileContext {
    rel_path: String,
    abs_path: PathBuf,
    policy: Arc<LintPolicy>,
}

enum StepResult {
    Violations(Vec<Violation>),
    Failure(LintFailure),
}

/// Evaluates workflow references against a policy using remote collaborators.
pub struct Linter {
    resolver: Arc<dyn TagResolver>,
    metadata: Arc<dyn RepoMetadata>,
}

impl Linter {
    pub fn new(resolver: Arc<dyn TagResolver>, metadata: Arc<dyn RepoMetadata>) -> Self {
        Self { resolver, metadata }
    }

    /// Lints every file and returns the violations found across all of them.
    ///
    /// The semaphore bound applies across the whole call. Infrastructure
    /// failures (unreadable or unparseable files, collaborator outages that
    /// poison a step) are logged here and excluded from the returned list;
    /// they never abort the remaining files. The result is sorted by
    /// position for stable output.
    pub async fn lint_files(&self, workers: usize, tasks: Vec<FileTask>) -> Vec<Violation> {
        let sem = Arc::new(Semaphore::new(workers.max(1)));
        let cancel = CancellationToken::new();
        let _guard = cancel.clone().drop_guard();

        let mut receivers = Vec::new();
        for task in tasks {
            let ctx = Arc::new(FileContext {
                rel_path: task.info.rel_path(),
                abs_path: task.info.file_path.clone(),
                policy: task.policy,
            });
            match task.info.read() {
                Ok(content) => {
                    self.lint_content(&sem, &cancel, ctx, &content, &mut receivers);
                }
                Err(source) => {
                    let failure = LintFailure::WorkflowRead {
                        path: task.info.file_path.display().to_string(),
                        source,
                    };
                    receivers.push(failure_stream(&cancel, failure));
                }
            }
        }

        let mut merged = fan_in(&cancel, receivers);
        let mut violations = Vec::new();
        while let Some(result) = merged.recv().await {
            match result {
                StepResult::Violations(found) => violations.extend(found),
                StepResult::Failure(failure) => {
                    tracing::error!(error = %failure, "failed to lint");
                }
            }
        }

        violations.sort_by(|a, b| {
            (&a.path, a.line, a.column, &a.message).cmp(&(&b.path, b.line, b.column, &b.message))
        });
        violations
    }

    /// Spawns one evaluation task per `uses:` step of `content`. A file that
    /// fails to parse contributes a single failure stream instead.
    fn lint_content(
        &self,
        sem: &Arc<Semaphore>,
        cancel: &CancellationToken,
        ctx: Arc<FileContext>,
        content: &str,
        receivers: &mut Vec<mpsc::Receiver<StepResult>>,
    ) {
        let parsed = match workflow::parse(content) {
            Ok(parsed) => parsed,
            Err(errors) => {
                let msg = errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("\n");
                let failure = LintFailure::WorkflowParse {
                    path: ctx.abs_path.display().to_string(),
                    msg,
                };
                receivers.push(failure_stream(cancel, failure));
                return;
            }
        };

        tracing::debug!(
            path = %ctx.rel_path,
            name = parsed.name.as_deref().unwrap_or(""),
            steps = parsed.steps.len(),
            "linting a workflow file"
        );

        for step in parsed.steps {
            receivers.push(self.spawn_step(sem, cancel, Arc::clone(&ctx), step));
        }
    }

    fn spawn_step(
        &self,
        sem: &Arc<Semaphore>,
        cancel: &CancellationToken,
        ctx: Arc<FileContext>,
        step: UsesStep,
    ) -> mpsc::Receiver<StepResult> {
        let (tx, rx) = mpsc::channel(1);
        let sem = Arc::clone(sem);
        let cancel = cancel.clone();
        let resolver = Arc::clone(&self.resolver);
        let metadata = Arc::clone(&self.metadata);

        tokio::spawn(async move {
            let permit = match sem.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            let outcome =
                evaluate_step(resolver.as_ref(), metadata.as_ref(), &ctx, &step).await;
            // Free the slot before publishing so a slow consumer cannot
            // starve other evaluations.
            drop(permit);

            let violations = outcome.into_iter().collect();
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tx.send(StepResult::Violations(violations)) => {}
            }
        });

        rx
    }
}

fn failure_stream(cancel: &CancellationToken, failure: LintFailure) -> mpsc::Receiver<StepResult> {
    let (tx, rx) = mpsc::channel(1);
    let cancel = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tx.send(StepResult::Failure(failure)) => {}
        }
    });
    rx
}

/// Merges per-step streams into one channel in completion order.
fn fan_in(
    cancel: &CancellationToken,
    receivers: Vec<mpsc::Receiver<StepResult>>,
) -> mpsc::Receiver<StepResult> {
    let (tx, rx) = mpsc::channel(receivers.len().max(1));
    for mut receiver in receivers {
        let tx = tx.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            while let Some(result) = receiver.recv().await {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    sent = tx.send(result) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
            }
        });
    }
    rx
}

fn allowlist_reason(action: &Action, policy: &LintPolicy) -> Option<&'static str> {
    if policy
        .creator_allowlist
        .iter()
        .any(|creator| creator == &action.owner)
    {
        return Some("allowlisted creator");
    }
    if policy
        .action_allowlist
        .iter()
        .any(|id| id == &action.repo_id())
    {
        return Some("allowlisted action");
    }
    if action.is_pinned_by_sha() {
        if let Some(entries) = policy.get_hash_allowlist(action) {
            if entries.iter().any(|entry| entry.sha == action.git_ref) {
                return Some("pinned by allowlisted hash");
            }
        }
    }
    None
}

async fn resolve_tag_names(
    resolver: &dyn TagResolver,
    repo: &Repo,
    sha: &str,
) -> Result<Vec<String>, RemoteError> {
    resolver.resolve_from_hash(repo, sha).await
}

async fn check_verified_org(metadata: &dyn RepoMetadata, login: &str) -> Result<(), RemoteError> {
    match metadata.login_kind(login).await? {
        LoginKind::User => {
            tracing::debug!(login, reason = "user found", "skip organization verification");
            Ok(())
        }
        LoginKind::Organization => {
            if metadata.org_verified(login).await? {
                Ok(())
            } else {
                Err(RemoteError::OrgNotVerified {
                    login: login.to_string(),
                })
            }
        }
    }
}

/// Runs the ordered rule chain for one `uses:` reference. The first terminal
/// rule decides; at most one violation comes back.
async fn evaluate_step(
    resolver: &dyn TagResolver,
    metadata: &dyn RepoMetadata,
    ctx: &FileContext,
    step: &UsesStep,
) -> Option<Violation> {
    let reject = |message: String, kind: ViolationKind, pos: Pos| {
        Some(Violation::new(
            message,
            kind,
            ctx.rel_path.clone(),
            pos,
            ctx.abs_path.clone(),
        ))
    };

    tracing::debug!(uses = %step.uses, "linting a step");

    let action = match action::parse_uses(&step.uses) {
        Ok(Some(action)) => action,
        Ok(None) => return None,
        Err(e) => return reject(e.to_string(), ViolationKind::UnexpectedValue, step.pos),
    };

    if action.is_local_reusable_workflow() {
        tracing::info!(uses = %step.uses, reason = "local reusable workflow", "skip linting");
        return None;
    }

    let policy = &ctx.policy;

    if policy.exclude_official_actions && OFFICIAL_CREATORS.contains(&action.owner.as_str()) {
        tracing::debug!(action = %action.id, reason = "official action", "valid action found");
        return None;
    }

    let repo = Repo {
        owner: action.owner.clone(),
        name: action.name.clone(),
    };

    if let Some(reason) = allowlist_reason(&action, policy) {
        if action.is_pinned_by_sha() {
            match resolve_tag_names(resolver, &repo, &action.git_ref).await {
                Ok(tags) => {
                    tracing::debug!(
                        action = %action.id,
                        reason,
                        hash = shorten_hash(&action.git_ref),
                        tags = ?tags,
                        "valid action found"
                    );
                }
                Err(e) => {
                    return reject(
                        format!("failed to resolve git tags from sha: {e}"),
                        ViolationKind::RuntimeError,
                        step.pos,
                    );
                }
            }
        } else {
            match resolver.resolve_from_tag(&repo, &action.git_ref).await {
                Ok(tag) => {
                    tracing::debug!(
                        action = %action.id,
                        reason,
                        tag = %tag.tag,
                        hash = %tag.commit_hash,
                        "valid action found"
                    );
                }
                Err(e) => {
                    return reject(
                        format!("failed to resolve git tag: {e}"),
                        ViolationKind::RuntimeError,
                        step.pos,
                    );
                }
            }
        }
        return None;
    }

    if policy.exclude_verified_creators
        && ACTIONS_BY_VERIFIED_CREATORS.contains(&action.repo_id().as_str())
    {
        tracing::debug!(action = %action.id, reason = "verified creator", "valid action found");
        return None;
    }

    match metadata.archived_status(&repo).await {
        Ok(status) if status.archived => {
            let archived_at = status
                .archived_at
                .map(|t| t.format("%Y-%m-%d").to_string())
                .unwrap_or_default();
            if !policy.allow_archived_repo {
                return reject(
                    format!(
                        "archived action found: repo={}, archived-at={archived_at}",
                        action.repo_id()
                    ),
                    ViolationKind::ArchivedActionUsed,
                    step.pos,
                );
            }
            tracing::warn!(action = %action.id, archived_at, "archived action found");
        }
        Ok(_) => {}
        Err(e) => {
            return reject(
                format!("failed to check if the action is archived: {e}"),
                ViolationKind::RuntimeError,
                step.pos,
            );
        }
    }

    if policy.enforce_verified_organization {
        if let Err(e) = check_verified_org(metadata, &action.owner).await {
            return reject(
                format!("failed to check if the owner is verified: {e}"),
                ViolationKind::RuntimeError,
                step.pos,
            );
        }
    }

    // Column of the ref itself, one past the '@'.
    let ref_pos = Pos {
        line: step.pos.line,
        col: step.pos.col + action.id.len() + 1,
    };

    if action.is_pinned_by_sha() {
        let tags = match resolve_tag_names(resolver, &repo, &action.git_ref).await {
            Ok(tags) => tags,
            Err(e) => {
                return reject(
                    format!("failed to resolve git tags: {e}"),
                    ViolationKind::RuntimeError,
                    ref_pos,
                );
            }
        };

        if policy.allow_only_allowlisted_hash {
            let entries = policy.get_hash_allowlist(&action).unwrap_or_default();
            let mut allowlist = Vec::with_capacity(entries.len());
            for entry in entries {
                let entry_tags = match resolve_tag_names(resolver, &repo, &entry.sha).await {
                    Ok(tags) => tags.join(", "),
                    Err(e) => {
                        return reject(
                            format!("failed to resolve git tags: {e}"),
                            ViolationKind::RuntimeError,
                            ref_pos,
                        );
                    }
                };
                let short = shorten_hash(&entry.sha);
                let comment = entry
                    .comment
                    .as_deref()
                    .map(|c| replace_newlines(c).trim().to_string())
                    .unwrap_or_default();
                if comment.is_empty() {
                    allowlist.push(format!("{short}({entry_tags})"));
                } else {
                    allowlist.push(format!(
                        "{short}({entry_tags}: {})",
                        truncate_str(&comment, MAX_COMMENT_LEN)
                    ));
                }
            }

            return reject(
                format!(
                    "invalid ref value: action={}, sha={}({}), allowlist=[{}]",
                    action.id,
                    shorten_hash(&action.git_ref),
                    tags.join(", "),
                    allowlist.join(" ")
                ),
                ViolationKind::UnallowlistedSha,
                ref_pos,
            );
        }

        tracing::debug!(
            action = %action.id,
            hash = shorten_hash(&action.git_ref),
            tags = ?tags,
            "valid action found"
        );
        return None;
    }

    if policy.enforce_pin_hash {
        return reject(
            format!(
                "invalid ref value: action={}, expected=SHA, actual={}",
                action.repo_id(),
                action.git_ref
            ),
            ViolationKind::Unpinned,
            ref_pos,
        );
    }

    tracing::warn!(action = %action.id, reason = "not pinned by hash", "unpinned action found");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::{ArchivedStatus, GitTag};
    use crate::policy::PolicyBuilder;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::HashMap;
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeResolver {
        tags_by_sha: HashMap<String, Vec<String>>,
        sha_by_tag: HashMap<String, String>,
    }

    #[async_trait]
    impl TagResolver for FakeResolver {
        async fn resolve_from_hash(
            &self,
            _repo: &Repo,
            sha: &str,
        ) -> Result<Vec<String>, RemoteError> {
            match self.tags_by_sha.get(sha) {
                Some(tags) => Ok(tags.clone()),
                None => Err(RemoteError::UnknownSha {
                    sha: sha.to_string(),
                }),
            }
        }

        async fn resolve_from_tag(&self, _repo: &Repo, tag: &str) -> Result<GitTag, RemoteError> {
            match self.sha_by_tag.get(tag) {
                Some(sha) => Ok(GitTag {
                    tag: tag.to_string(),
                    commit_hash: sha.clone(),
                }),
                None => Err(RemoteError::CommandFailed {
                    cmd: "fake".to_string(),
                    status: 1,
                    stderr: format!("no such tag: {tag}"),
                }),
            }
        }
    }

    #[derive(Default)]
    struct FakeMetadata {
        archived: HashMap<String, ArchivedStatus>,
        unverified_orgs: Vec<String>,
    }

    #[async_trait]
    impl RepoMetadata for FakeMetadata {
        async fn archived_status(&self, repo: &Repo) -> Result<ArchivedStatus, RemoteError> {
            Ok(self
                .archived
                .get(&repo.to_string())
                .copied()
                .unwrap_or(ArchivedStatus {
                    archived: false,
                    archived_at: None,
                }))
        }

        async fn login_kind(&self, _login: &str) -> Result<LoginKind, RemoteError> {
            Ok(LoginKind::Organization)
        }

        async fn org_verified(&self, login: &str) -> Result<bool, RemoteError> {
            Ok(!self.unverified_orgs.iter().any(|o| o == login))
        }
    }

    fn write_workflow(dir: &Path, name: &str, body: &str) -> WorkflowInfo {
        let workflows = dir.join(".github/workflows");
        fs::create_dir_all(&workflows).unwrap();
        fs::create_dir_all(dir.join(".git")).unwrap();
        let path = workflows.join(name);
        fs::write(&path, body).unwrap();
        WorkflowInfo {
            file_path: path,
            project_root: dir.to_path_buf(),
            config: None,
        }
    }

    fn linter(resolver: FakeResolver, metadata: FakeMetadata) -> Linter {
        Linter::new(Arc::new(resolver), Arc::new(metadata))
    }

    const CHECKOUT_WORKFLOW: &str = "\
name: CI
on:
  push:

jobs:
  test:
    runs-on: ubuntu-latest
    steps:
      - uses: actions/checkout@v4
";

    #[tokio::test]
    async fn test_official_action_excluded_by_default() {
        let dir = TempDir::new().unwrap();
        let info = write_workflow(dir.path(), "ci.yml", CHECKOUT_WORKFLOW);
        let l = linter(FakeResolver::default(), FakeMetadata::default());
        let policy = Arc::new(LintPolicy::default());
        let violations = l
            .lint_files(4, vec![FileTask { info, policy }])
            .await;
        assert!(violations.is_empty(), "got: {violations:?}");
    }

    #[tokio::test]
    async fn test_unpinned_official_action_when_not_excluded() {
        let dir = TempDir::new().unwrap();
        let info = write_workflow(dir.path(), "ci.yml", CHECKOUT_WORKFLOW);
        let l = linter(FakeResolver::default(), FakeMetadata::default());
        let policy = Arc::new(
            PolicyBuilder::new()
                .exclude_official_actions(false)
                .enforce_pin_hash(true)
                .build(),
        );
        let violations = l
            .lint_files(4, vec![FileTask { info, policy }])
            .await;
        assert_eq!(violations.len(), 1);
        let v = &violations[0];
        assert_eq!(v.kind, ViolationKind::Unpinned);
        assert_eq!(
            v.message,
            "invalid ref value: action=actions/checkout, expected=SHA, actual=v4"
        );
        assert_eq!((v.line, v.column), (9, 15 + "actions/checkout".len() + 1));
        assert_eq!(v.path, ".github/workflows/ci.yml");
    }

    #[tokio::test]
    async fn test_flow_style_step_is_linted() {
        let body = "\
name: CI
on: push
jobs:
  test:
    steps: [{uses: x/y@v1}]
";
        let dir = TempDir::new().unwrap();
        let info = write_workflow(dir.path(), "ci.yml", body);
        let l = linter(FakeResolver::default(), FakeMetadata::default());
        let policy = Arc::new(LintPolicy::default());
        let violations = l.lint_files(4, vec![FileTask { info, policy }]).await;
        assert_eq!(violations.len(), 1, "got: {violations:?}");
        let v = &violations[0];
        assert_eq!(v.kind, ViolationKind::Unpinned);
        assert_eq!(
            v.message,
            "invalid ref value: action=x/y, expected=SHA, actual=v1"
        );
        // The value starts at column 20; the ref follows "x/y" and "@".
        assert_eq!((v.line, v.column), (5, 20 + "x/y".len() + 1));
    }

    /// Counts in-flight tag resolutions to observe the evaluation bound.
    #[derive(Default)]
    struct GaugeResolver {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl TagResolver for GaugeResolver {
        async fn resolve_from_hash(
            &self,
            _repo: &Repo,
            _sha: &str,
        ) -> Result<Vec<String>, RemoteError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(vec!["v1.0.0".to_string()])
        }

        async fn resolve_from_tag(&self, _repo: &Repo, tag: &str) -> Result<GitTag, RemoteError> {
            Ok(GitTag {
                tag: tag.to_string(),
                commit_hash: "ab".repeat(20),
            })
        }
    }

    #[tokio::test]
    async fn test_worker_bound_caps_in_flight_evaluations_across_files() {
        let sha = "ab".repeat(20);
        let body = format!(
            "\
name: CI
on: push
jobs:
  test:
    steps:
      - uses: a/b@{sha}
      - uses: c/d@{sha}
      - uses: e/f@{sha}
      - uses: g/h@{sha}
"
        );
        let dir = TempDir::new().unwrap();
        let one = write_workflow(dir.path(), "one.yml", &body);
        let two = write_workflow(dir.path(), "two.yml", &body);

        let gauge = Arc::new(GaugeResolver::default());
        let l = Linter::new(gauge.clone(), Arc::new(FakeMetadata::default()));
        let policy = Arc::new(LintPolicy::default());
        let violations = l
            .lint_files(
                2,
                vec![
                    FileTask {
                        info: one,
                        policy: Arc::clone(&policy),
                    },
                    FileTask {
                        info: two,
                        policy,
                    },
                ],
            )
            .await;

        assert!(violations.is_empty(), "got: {violations:?}");
        // Eight steps competed for two slots shared across both files.
        assert_eq!(gauge.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unresolvable_sha_and_unpinned_ref_both_reported() {
        let body = "\
name: CI
on:
  push:

jobs:
  test:
    runs-on: ubuntu-latest
    steps:
      - uses: tj-actions/changed-files@ffffffffffffffffffffffffffffffffffffffff
      - uses: bufbuild/buf-action@v1.0.2
";
        let dir = TempDir::new().unwrap();
        let info = write_workflow(dir.path(), "ci.yml", body);
        let l = linter(FakeResolver::default(), FakeMetadata::default());
        let policy = Arc::new(PolicyBuilder::new().enforce_pin_hash(true).build());
        let violations = l
            .lint_files(4, vec![FileTask { info, policy }])
            .await;
        assert_eq!(violations.len(), 2, "got: {violations:?}");

        let mut kinds: Vec<ViolationKind> = violations.iter().map(|v| v.kind).collect();
        kinds.sort_by_key(|k| format!("{k:?}"));
        assert_eq!(
            kinds,
            vec![ViolationKind::RuntimeError, ViolationKind::Unpinned]
        );

        let runtime = violations
            .iter()
            .find(|v| v.kind == ViolationKind::RuntimeError)
            .unwrap();
        assert!(runtime.message.contains("neither a commit nor blob"));
        let unpinned = violations
            .iter()
            .find(|v| v.kind == ViolationKind::Unpinned)
            .unwrap();
        assert!(unpinned
            .message
            .contains("action=bufbuild/buf-action, expected=SHA, actual=v1.0.2"));
    }

    #[tokio::test]
    async fn test_action_allowlist_spares_only_listed_action() {
        let body = "\
name: Deploy
on:
  push:

jobs:
  deploy:
    runs-on: ubuntu-latest
    steps:
      - uses: google-github-actions/auth@v2
      - uses: google-github-actions/setup-gcloud@v2
";
        let dir = TempDir::new().unwrap();
        let info = write_workflow(dir.path(), "deploy.yml", body);
        let resolver = FakeResolver {
            sha_by_tag: HashMap::from([("v2".to_string(), "a".repeat(40))]),
            ..Default::default()
        };
        let l = linter(resolver, FakeMetadata::default());
        let policy = Arc::new(
            PolicyBuilder::new()
                .enforce_pin_hash(true)
                .action_allowlist(["google-github-actions/auth"])
                .build(),
        );
        let violations = l
            .lint_files(4, vec![FileTask { info, policy }])
            .await;
        assert_eq!(violations.len(), 1, "got: {violations:?}");
        assert!(violations[0]
            .message
            .contains("action=google-github-actions/setup-gcloud"));
    }

    #[tokio::test]
    async fn test_archived_action_rejected_when_disallowed() {
        let body = "\
name: Release
on:
  push:

jobs:
  release:
    runs-on: ubuntu-latest
    steps:
      - uses: actions/create-release@v1
";
        let dir = TempDir::new().unwrap();
        let info = write_workflow(dir.path(), "release.yml", body);
        let metadata = FakeMetadata {
            archived: HashMap::from([(
                "actions/create-release".to_string(),
                ArchivedStatus {
                    archived: true,
                    archived_at: Some(chrono::Utc.with_ymd_and_hms(2021, 3, 4, 11, 0, 0).unwrap()),
                },
            )]),
            ..Default::default()
        };
        let l = linter(FakeResolver::default(), metadata);
        let policy = Arc::new(
            PolicyBuilder::new()
                .exclude_official_actions(false)
                .allow_archived_repo(false)
                .build(),
        );
        let violations = l
            .lint_files(4, vec![FileTask { info, policy }])
            .await;
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::ArchivedActionUsed);
        assert_eq!(
            violations[0].message,
            "archived action found: repo=actions/create-release, archived-at=2021-03-04"
        );
        // The archive rejection points at the start of the uses value.
        assert_eq!(violations[0].column, 15);
    }

    #[tokio::test]
    async fn test_unallowlisted_sha_lists_allowed_entries() {
        let sha_used = "b".repeat(40);
        let sha_allowed = "c".repeat(40);
        let body = format!(
            "\
name: CI
on:
  push:

jobs:
  test:
    runs-on: ubuntu-latest
    steps:
      - uses: tj-actions/changed-files@{sha_used}
"
        );
        let dir = TempDir::new().unwrap();
        let info = write_workflow(dir.path(), "ci.yml", &body);
        let resolver = FakeResolver {
            tags_by_sha: HashMap::from([
                (sha_used.clone(), vec!["v45".to_string()]),
                (sha_allowed.clone(), vec!["v44".to_string()]),
            ]),
            ..Default::default()
        };
        let l = linter(resolver, FakeMetadata::default());
        let policy = Arc::new(
            PolicyBuilder::new()
                .allow_only_allowlisted_hash(true)
                .hash_allowlist(HashMap::from([(
                    "tj-actions/changed-files".to_string(),
                    vec![crate::policy::AllowedEntry {
                        sha: sha_allowed.clone(),
                        comment: Some("pinned after the supply chain incident".to_string()),
                    }],
                )]))
                .build(),
        );
        let violations = l
            .lint_files(4, vec![FileTask { info, policy }])
            .await;
        assert_eq!(violations.len(), 1, "got: {violations:?}");
        let v = &violations[0];
        assert_eq!(v.kind, ViolationKind::UnallowlistedSha);
        assert_eq!(
            v.message,
            format!(
                "invalid ref value: action=tj-actions/changed-files, sha={}(v45), allowlist=[{}(v44: pinned after the sup...)]",
                &sha_used[..7],
                &sha_allowed[..7]
            )
        );
    }

    #[tokio::test]
    async fn test_unverified_org_surfaces_as_runtime_error() {
        let body = "\
name: CI
on:
  push:

jobs:
  test:
    runs-on: ubuntu-latest
    steps:
      - uses: shady-org/mystery-action@v1
";
        let dir = TempDir::new().unwrap();
        let info = write_workflow(dir.path(), "ci.yml", body);
        let metadata = FakeMetadata {
            unverified_orgs: vec!["shady-org".to_string()],
            ..Default::default()
        };
        let l = linter(FakeResolver::default(), metadata);
        let policy = Arc::new(
            PolicyBuilder::new()
                .enforce_pin_hash(false)
                .enforce_verified_organization(true)
                .build(),
        );
        let violations = l
            .lint_files(4, vec![FileTask { info, policy }])
            .await;
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::RuntimeError);
        assert!(violations[0]
            .message
            .contains("organization is not verified: shady-org"));
    }

    #[tokio::test]
    async fn test_malformed_uses_values() {
        let body = "\
name: CI
on:
  push:

jobs:
  test:
    runs-on: ubuntu-latest
    steps:
      - uses: owner/repo@v1@v2
      - uses: invalid@ref
      - uses: ./local/action
      - uses: docker://alpine:3.18
";
        let dir = TempDir::new().unwrap();
        let info = write_workflow(dir.path(), "ci.yml", body);
        let l = linter(FakeResolver::default(), FakeMetadata::default());
        let policy = Arc::new(LintPolicy::default());
        let violations = l
            .lint_files(4, vec![FileTask { info, policy }])
            .await;
        assert_eq!(violations.len(), 2, "got: {violations:?}");
        assert!(violations
            .iter()
            .all(|v| v.kind == ViolationKind::UnexpectedValue));
        assert!(violations
            .iter()
            .any(|v| v.message == "unexpected 'uses' value: owner/repo@v1@v2"));
        assert!(violations.iter().any(
            |v| v.message == "invalid uses value: expected=owner/repo, actual=invalid"
        ));
    }

    #[tokio::test]
    async fn test_unparseable_workflow_is_logged_not_returned() {
        let dir = TempDir::new().unwrap();
        let info = write_workflow(dir.path(), "broken.yml", "name: CI\n");
        let good = write_workflow(dir.path(), "ci.yml", CHECKOUT_WORKFLOW);
        let l = linter(FakeResolver::default(), FakeMetadata::default());
        let policy = Arc::new(LintPolicy::default());
        let violations = l
            .lint_files(
                4,
                vec![
                    FileTask {
                        info,
                        policy: Arc::clone(&policy),
                    },
                    FileTask { info: good, policy },
                ],
            )
            .await;
        assert!(violations.is_empty(), "got: {violations:?}");
    }

    #[tokio::test]
    async fn test_evaluation_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let info = write_workflow(dir.path(), "ci.yml", CHECKOUT_WORKFLOW);
        let l = linter(FakeResolver::default(), FakeMetadata::default());
        let policy = Arc::new(
            PolicyBuilder::new()
                .exclude_official_actions(false)
                .build(),
        );
        let first = l
            .lint_files(
                2,
                vec![FileTask {
                    info: WorkflowInfo {
                        file_path: info.file_path.clone(),
                        project_root: info.project_root.clone(),
                        config: None,
                    },
                    policy: Arc::clone(&policy),
                }],
            )
            .await;
        let second = l.lint_files(2, vec![FileTask { info, policy }]).await;
        assert_eq!(first.len(), second.len());
        assert_eq!(first[0].message, second[0].message);
        assert_eq!((first[0].line, first[0].column), (second[0].line, second[0].column));
    }

    #[test]
    fn test_truncate_and_newline_helpers() {
        assert_eq!(truncate_str("short", 20), "short");
        assert_eq!(
            truncate_str("a string well beyond the limit", 20),
            "a string well beyond..."
        );
        assert_eq!(replace_newlines("a\nb\r\n  c"), "a b c");
    }
}
