//! Remote collaborators: tag/commit resolution and repository metadata.
//!
//! The rule engine consumes the [`TagResolver`] and [`RepoMetadata`] traits;
//! production wiring uses the `gh` CLI (which carries auth and host
//! configuration) behind TTL caches. Errors propagate unchanged; the rule
//! engine decides what an infrastructure failure means for an outcome, and no
//! retries happen here.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::process::Command;

use crate::error::RemoteError;

/// Identifies a repository on the hosting platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Repo {
    pub owner: String,
    pub name: String,
}

impl std::fmt::Display for Repo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// A git tag name together with the commit it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitTag {
    pub tag: String,
    pub commit_hash: String,
}

/// Archive state of a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchivedStatus {
    pub archived: bool,
    pub archived_at: Option<DateTime<Utc>>,
}

/// What a login resolves to on the hosting platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginKind {
    User,
    Organization,
}

/// Resolves between commit hashes and tag names.
#[async_trait]
pub trait TagResolver: Send + Sync {
    /// Tag names associated with `sha`. An unknown object is an error; a
    /// known commit with no tags is an empty list.
    async fn resolve_from_hash(&self, repo: &Repo, sha: &str) -> Result<Vec<String>, RemoteError>;

    /// Resolve a tag name to the commit it points at.
    async fn resolve_from_tag(&self, repo: &Repo, tag: &str) -> Result<GitTag, RemoteError>;
}

/// Repository and identity lookups.
#[async_trait]
pub trait RepoMetadata: Send + Sync {
    async fn archived_status(&self, repo: &Repo) -> Result<ArchivedStatus, RemoteError>;

    /// Whether `login` names a user or an organization.
    async fn login_kind(&self, login: &str) -> Result<LoginKind, RemoteError>;

    /// Whether the organization behind `login` is verified by the platform.
    async fn org_verified(&self, login: &str) -> Result<bool, RemoteError>;
}

/// Minimal TTL cache. A zero TTL disables storage entirely so `--no-cache`
/// costs nothing at the call sites.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, (Instant, V)>>,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock().expect("ttl cache poisoned");
        match entries.get(key) {
            Some((stored, value)) if stored.elapsed() < self.ttl => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: K, value: V) {
        if self.ttl.is_zero() {
            return;
        }
        let mut entries = self.entries.lock().expect("ttl cache poisoned");
        entries.insert(key, (Instant::now(), value));
    }

    pub fn clear(&self) {
        self.entries.lock().expect("ttl cache poisoned").clear();
    }
}

/// Caching decorator for any [`TagResolver`]. Only successes are memoized.
pub struct CachingResolver<R> {
    inner: R,
    by_hash: TtlCache<(String, String), Vec<String>>,
    by_tag: TtlCache<(String, String), GitTag>,
}

impl<R> CachingResolver<R> {
    pub fn new(inner: R, ttl: Duration) -> Self {
        Self {
            inner,
            by_hash: TtlCache::new(ttl),
            by_tag: TtlCache::new(ttl),
        }
    }

    pub fn clear_cache(&self) {
        self.by_hash.clear();
        self.by_tag.clear();
    }
}

#[async_trait]
impl<R: TagResolver> TagResolver for CachingResolver<R> {
    async fn resolve_from_hash(&self, repo: &Repo, sha: &str) -> Result<Vec<String>, RemoteError> {
        let key = (repo.to_string(), sha.to_string());
        if let Some(tags) = self.by_hash.get(&key) {
            return Ok(tags);
        }
        let tags = self.inner.resolve_from_hash(repo, sha).await?;
        self.by_hash.put(key, tags.clone());
        Ok(tags)
    }

    async fn resolve_from_tag(&self, repo: &Repo, tag: &str) -> Result<GitTag, RemoteError> {
        let key = (repo.to_string(), tag.to_string());
        if let Some(found) = self.by_tag.get(&key) {
            return Ok(found);
        }
        let found = self.inner.resolve_from_tag(repo, tag).await?;
        self.by_tag.put(key, found.clone());
        Ok(found)
    }
}

/// Caching decorator for any [`RepoMetadata`].
pub struct CachingMetadata<M> {
    inner: M,
    archived: TtlCache<String, ArchivedStatus>,
    kinds: TtlCache<String, LoginKind>,
    verified: TtlCache<String, bool>,
}

impl<M> CachingMetadata<M> {
    pub fn new(inner: M, ttl: Duration) -> Self {
        Self {
            inner,
            archived: TtlCache::new(ttl),
            kinds: TtlCache::new(ttl),
            verified: TtlCache::new(ttl),
        }
    }

    pub fn clear_cache(&self) {
        self.archived.clear();
        self.kinds.clear();
        self.verified.clear();
    }
}

#[async_trait]
impl<M: RepoMetadata> RepoMetadata for CachingMetadata<M> {
    async fn archived_status(&self, repo: &Repo) -> Result<ArchivedStatus, RemoteError> {
        let key = repo.to_string();
        if let Some(status) = self.archived.get(&key) {
            return Ok(status);
        }
        let status = self.inner.archived_status(repo).await?;
        self.archived.put(key, status);
        Ok(status)
    }

    async fn login_kind(&self, login: &str) -> Result<LoginKind, RemoteError> {
        let key = login.to_string();
        if let Some(kind) = self.kinds.get(&key) {
            return Ok(kind);
        }
        let kind = self.inner.login_kind(login).await?;
        self.kinds.put(key, kind);
        Ok(kind)
    }

    async fn org_verified(&self, login: &str) -> Result<bool, RemoteError> {
        let key = login.to_string();
        if let Some(v) = self.verified.get(&key) {
            return Ok(v);
        }
        let v = self.inner.org_verified(login).await?;
        self.verified.put(key, v);
        Ok(v)
    }
}

async fn run_gh(args: &[&str]) -> Result<Vec<u8>, RemoteError> {
    let cmd = format!("gh {}", args.join(" "));
    let output = Command::new("gh")
        .args(args)
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
    Ok(output.stdout)
}

/// `gh api`-backed implementation of [`RepoMetadata`].
#[derive(Debug, Default)]
pub struct GhMetadata;

#[derive(Deserialize)]
struct GraphqlEnvelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct RepositoryData {
    repository: ArchivedFields,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArchivedFields {
    is_archived: bool,
    archived_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct OrganizationData {
    organization: VerifiedFields,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifiedFields {
    is_verified: bool,
}

#[derive(Deserialize)]
struct LoginFields {
    #[serde(rename = "type")]
    kind: String,
}

fn parse_archived(data: &[u8]) -> Result<ArchivedStatus, RemoteError> {
    let envelope: GraphqlEnvelope<RepositoryData> =
        serde_json::from_slice(data).map_err(|source| RemoteError::Decode {
            what: "repository archive status",
            source,
        })?;
    Ok(ArchivedStatus {
        archived: envelope.data.repository.is_archived,
        archived_at: envelope.data.repository.archived_at,
    })
}

fn parse_login_kind(login: &str, data: &[u8]) -> Result<LoginKind, RemoteError> {
    let fields: LoginFields = serde_json::from_slice(data).map_err(|source| RemoteError::Decode {
        what: "login lookup",
        source,
    })?;
    match fields.kind.as_str() {
        "Organization" => Ok(LoginKind::Organization),
        "User" | "Bot" => Ok(LoginKind::User),
        _ => Err(RemoteError::OrgNotFound {
            login: login.to_string(),
        }),
    }
}

fn parse_org_verified(data: &[u8]) -> Result<bool, RemoteError> {
    let envelope: GraphqlEnvelope<OrganizationData> =
        serde_json::from_slice(data).map_err(|source| RemoteError::Decode {
            what: "organization verification",
            source,
        })?;
    Ok(envelope.data.organization.is_verified)
}

#[async_trait]
impl RepoMetadata for GhMetadata {
    async fn archived_status(&self, repo: &Repo) -> Result<ArchivedStatus, RemoteError> {
        let query = "query($owner: String!, $name: String!) { repository(owner: $owner, name: $name) { isArchived archivedAt } }";
        let stdout = run_gh(&[
            "api", "graphql", "-f", &format!("query={query}"),
            "-f", &format!("owner={}", repo.owner),
            "-f", &format!("name={}", repo.name),
        ])
        .await?;
        parse_archived(&stdout)
    }

    async fn login_kind(&self, login: &str) -> Result<LoginKind, RemoteError> {
        match run_gh(&["api", &format!("users/{login}")]).await {
            Ok(stdout) => parse_login_kind(login, &stdout),
            Err(RemoteError::CommandFailed { stderr, .. }) if stderr.contains("404") => {
                Err(RemoteError::OrgNotFound {
                    login: login.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn org_verified(&self, login: &str) -> Result<bool, RemoteError> {
        let query =
            "query($login: String!) { organization(login: $login) { isVerified } }";
        let stdout = run_gh(&[
            "api", "graphql", "-f", &format!("query={query}"),
            "-f", &format!("login={login}"),
        ])
        .await?;
        parse_org_verified(&stdout)
    }
}

/// `gh api`-backed implementation of [`TagResolver`].
#[derive(Debug, Default)]
pub struct GhTagResolver;

#[derive(Deserialize)]
struct TagEntry {
    name: String,
    commit: CommitRef,
}

#[derive(Deserialize)]
struct CommitRef {
    sha: String,
}

#[derive(Deserialize)]
struct RefObject {
    object: CommitRef,
}

fn parse_tag_list(data: &[u8]) -> Result<Vec<TagEntry>, RemoteError> {
    serde_json::from_slice(data).map_err(|source| RemoteError::Decode {
        what: "tag list",
        source,
    })
}

#[async_trait]
impl TagResolver for GhTagResolver {
    async fn resolve_from_hash(&self, repo: &Repo, sha: &str) -> Result<Vec<String>, RemoteError> {
        let stdout = run_gh(&[
            "api",
            &format!("repos/{}/{}/tags", repo.owner, repo.name),
            "--paginate",
        ])
        .await?;
        let tags = parse_tag_list(&stdout)?;
        let matched: Vec<String> = tags
            .into_iter()
            .filter(|t| t.commit.sha.eq_ignore_ascii_case(sha))
            .map(|t| t.name)
            .collect();
        if !matched.is_empty() {
            return Ok(matched);
        }

        // No tag points here; make sure the object exists at all before
        // reporting an untagged commit.
        match run_gh(&[
            "api",
            &format!("repos/{}/{}/commits/{}", repo.owner, repo.name, sha),
        ])
        .await
        {
            Ok(_) => Ok(Vec::new()),
            Err(RemoteError::CommandFailed { .. }) => Err(RemoteError::UnknownSha {
                sha: sha.to_string(),
            }),
            Err(e) => Err(e),
        }
    }

    async fn resolve_from_tag(&self, repo: &Repo, tag: &str) -> Result<GitTag, RemoteError> {
        let stdout = run_gh(&[
            "api",
            &format!("repos/{}/{}/git/ref/tags/{}", repo.owner, repo.name, tag),
        ])
        .await?;
        let reference: RefObject =
            serde_json::from_slice(&stdout).map_err(|source| RemoteError::Decode {
                what: "tag ref",
                source,
            })?;
        Ok(GitTag {
            tag: tag.to_string(),
            commit_hash: reference.object.sha,
        })
    }
}
