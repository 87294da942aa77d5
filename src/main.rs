//! actionvet CLI binary entry point.
//! Discovers workflows, resolves policies, runs the linter, prints results.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use actionvet::cli::Cli;
use actionvet::config::{ConfigFile, PolicyCache};
use actionvet::error::Violation;
use actionvet::git::RepoIdentity;
use actionvet::github::{
    CachingMetadata, CachingResolver, GhMetadata, GhTagResolver, RepoMetadata, TagResolver,
};
use actionvet::linter::{FileTask, Linter};
use actionvet::{output, workflow};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    match run(&cli).await {
        Ok(violations) => {
            if !violations.is_empty() || cli.output == "json" {
                output::print_violations(&violations, &cli.output);
            }
            if !violations.is_empty() {
                std::process::exit(1);
            }
        }
        Err(e) => {
            tracing::error!(error = format!("{e:#}"), "failed to lint");
            std::process::exit(2);
        }
    }
}

async fn run(cli: &Cli) -> anyhow::Result<Vec<Violation>> {
    let infos = workflow::list_workflows(&cli.paths)?;
    tracing::debug!(workflows = infos.len(), "listed workflow files");

    let overrides = cli.policy_overrides();
    let explicit_config = cli.config.as_ref().map(ConfigFile::new);
    let policy_cache = PolicyCache::new();

    let ttl = cli.effective_cache_ttl()?;
    let resolver: Arc<dyn TagResolver> = Arc::new(CachingResolver::new(GhTagResolver, ttl));
    let metadata: Arc<dyn RepoMetadata> = Arc::new(CachingMetadata::new(GhMetadata, ttl));
    let linter = Linter::new(resolver, metadata);

    let mut roots_by_file: HashMap<PathBuf, PathBuf> = HashMap::new();
    let mut tasks = Vec::with_capacity(infos.len());
    for info in infos {
        // An explicit --config wins over the per-project one.
        let config = explicit_config.clone().or_else(|| info.config.clone());
        let policy = policy_cache.resolve(config.as_ref(), &overrides)?;
        roots_by_file.insert(info.file_path.clone(), info.project_root.clone());
        tasks.push(FileTask { info, policy });
    }

    let mut violations = linter.lint_files(cli.effective_workers(), tasks).await;

    // Prefix paths with the owning repository's identity so output from
    // nested or multiple checkouts stays unambiguous.
    let identity = RepoIdentity::new();
    for v in &mut violations {
        if let Some(root) = roots_by_file.get(&v.abs_path) {
            if let Some(repo_id) = identity.repo_id(root).await {
                v.path = format!("{repo_id}/{}", v.path);
            }
        }
    }

    Ok(violations)
}
