//! Workflow file discovery and structure parsing.
//!
//! The linter needs three things from a workflow file: that it is valid YAML
//! with a `jobs` mapping, every step's raw `uses:` value, and the 1-based
//! (line, column) where each value starts. The YAML crate exposes no spans,
//! so values are extracted structurally (mappings preserve document order)
//! and each value is then located in the raw text by searching forward for
//! a `uses:` key followed by that exact value. A value the search cannot
//! anchor (a folded scalar, say) keeps an unknown position instead of
//! failing the file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_yaml::Value;

use crate::config::{self, ConfigFile};
use crate::error::Pos;

/// A parse problem that makes the whole file unlintable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub pos: Option<Pos>,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.pos {
            Some(pos) => write!(f, "{}: {}", pos, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// One action-execution step carrying a `uses:` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsesStep {
    pub job: String,
    pub uses: String,
    /// Position of the start of the `uses` value.
    pub pos: Pos,
}

/// Parsed workflow structure, reduced to what the rule engine consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workflow {
    pub name: Option<String>,
    pub steps: Vec<UsesStep>,
}

/// Parse workflow bytes. A non-empty error list is terminal for the file.
pub fn parse(content: &str) -> Result<Workflow, Vec<ParseError>> {
    let doc: Value = match serde_yaml::from_str(content) {
        Ok(v) => v,
        Err(e) => {
            let pos = e.location().map(|loc| Pos {
                line: loc.line(),
                col: loc.column(),
            });
            return Err(vec![ParseError {
                message: e.to_string(),
                pos,
            }]);
        }
    };

    let Value::Mapping(root) = doc else {
        return Err(vec![ParseError {
            message: "workflow is empty or not a mapping".to_string(),
            pos: None,
        }]);
    };

    let name = root
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string);

    let Some(Value::Mapping(jobs)) = root.get("jobs") else {
        return Err(vec![ParseError {
            message: "\"jobs\" section is missing or not a mapping".to_string(),
            pos: None,
        }]);
    };

    // Structured pass: every `uses` scalar across all jobs, in document order.
    let mut uses_values: Vec<(String, String)> = Vec::new();
    for (job_key, job) in jobs {
        let job_id = job_key.as_str().unwrap_or_default().to_string();
        let Value::Mapping(job) = job else { continue };

        // Reusable-workflow jobs carry `uses` directly on the job.
        if let Some(uses) = job.get("uses").and_then(Value::as_str) {
            uses_values.push((job_id.clone(), uses.to_string()));
        }

        let Some(Value::Sequence(steps)) = job.get("steps") else {
            continue;
        };
        for step in steps {
            let Value::Mapping(step) = step else { continue };
            if let Some(uses) = step.get("uses").and_then(Value::as_str) {
                uses_values.push((job_id.clone(), uses.to_string()));
            }
        }
    }

    // Text pass: anchor each extracted value to its `uses:` key in the raw
    // source. Values come back in document order, so the cursor only ever
    // moves forward.
    let mut cursor = TextCursor::new(content);
    let steps = uses_values
        .into_iter()
        .map(|(job, uses)| {
            let pos = cursor.locate(&uses).unwrap_or(Pos { line: 0, col: 0 });
            UsesStep { job, uses, pos }
        })
        .collect();

    Ok(Workflow { name, steps })
}

/// Forward-only scanner that anchors `uses:` values to source positions.
///
/// Tracks a (line, byte offset) cursor so repeated lookups on one line
/// (flow-style steps) and decoy text between real steps both resolve.
struct TextCursor<'a> {
    lines: Vec<&'a str>,
    line: usize,
    col: usize,
}

impl<'a> TextCursor<'a> {
    fn new(content: &'a str) -> Self {
        Self {
            lines: content.lines().collect(),
            line: 0,
            col: 0,
        }
    }

    /// Position of the next `uses:` entry whose value is exactly `value`,
    /// advancing the cursor past it. A failed lookup leaves the cursor
    /// untouched so later values still anchor.
    fn locate(&mut self, value: &str) -> Option<Pos> {
        let (saved_line, saved_col) = (self.line, self.col);
        while self.line < self.lines.len() {
            let full = self.lines[self.line];
            let fresh = self.col == 0;
            if !(fresh && full.trim_start().starts_with('#')) {
                if let Some(off) = find_uses_value(&full[self.col..], value) {
                    let col = self.col + off + 1;
                    self.col += off + value.len();
                    return Some(Pos {
                        line: self.line + 1,
                        col,
                    });
                }
            }
            self.line += 1;
            self.col = 0;
        }
        self.line = saved_line;
        self.col = saved_col;
        None
    }
}

/// Byte offset of `value` in `hay` where it appears as the value of a
/// `uses:` key, including flow-style (`{uses: x}`) and quoted forms.
fn find_uses_value(hay: &str, value: &str) -> Option<usize> {
    let mut search = 0;
    while let Some(found) = hay[search..].find("uses:") {
        let key = search + found;
        search = key + "uses:".len();
        // `uses` must start the key, not end another word.
        let boundary = hay[..key]
            .chars()
            .next_back()
            .map_or(true, |c| " \t-{,\"'".contains(c));
        if !boundary {
            continue;
        }
        let after = &hay[search..];
        let mut val_start = search + (after.len() - after.trim_start().len());
        if hay[val_start..].starts_with(['"', '\'']) {
            val_start += 1;
        }
        if hay[val_start..].starts_with(value) {
            let end = val_start + value.len();
            let terminated = hay[end..]
                .chars()
                .next()
                .map_or(true, |c| " \t\"'},#".contains(c));
            if terminated {
                return Some(val_start);
            }
        }
    }
    None
}

/// A workflow file plus the project context it belongs to.
#[derive(Debug, Clone)]
pub struct WorkflowInfo {
    /// Absolute path to the workflow file.
    pub file_path: PathBuf,
    /// Root directory of the owning project.
    pub project_root: PathBuf,
    /// Policy config discovered for the project, if any.
    pub config: Option<ConfigFile>,
}

impl WorkflowInfo {
    /// Path of the workflow relative to the project root, for reporting.
    pub fn rel_path(&self) -> String {
        pathdiff::diff_paths(&self.file_path, &self.project_root)
            .unwrap_or_else(|| self.file_path.clone())
            .to_string_lossy()
            .to_string()
    }

    pub fn read(&self) -> std::io::Result<String> {
        fs::read_to_string(&self.file_path)
    }
}

fn workflow_info_for_file(path: &Path) -> anyhow::Result<WorkflowInfo> {
    let abs = path
        .canonicalize()
        .with_context(|| format!("failed to resolve path: {}", path.display()))?;
    let start = abs.parent().unwrap_or(&abs);
    let project_root = config::detect_project_root(start);
    let cfg = config::find_config_file(&project_root);
    Ok(WorkflowInfo {
        file_path: abs,
        project_root,
        config: cfg,
    })
}

fn extract_workflows(dir: &Path) -> anyhow::Result<Vec<WorkflowInfo>> {
    let abs = dir
        .canonicalize()
        .with_context(|| format!("failed to resolve path: {}", dir.display()))?;
    let project_root = config::detect_project_root(&abs);
    let workflows_dir = project_root.join(".github").join("workflows");
    let cfg = config::find_config_file(&project_root);

    let entries = fs::read_dir(&workflows_dir).with_context(|| {
        format!(
            "failed to read workflows directory: {}",
            workflows_dir.display()
        )
    })?;

    let mut out = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        match path.extension().and_then(|e| e.to_str()) {
            Some("yml") | Some("yaml") => {}
            _ => continue,
        }
        tracing::debug!(path = %path.display(), "workflow file found");
        out.push(WorkflowInfo {
            file_path: path,
            project_root: project_root.clone(),
            config: cfg.clone(),
        });
    }
    Ok(out)
}

/// Expand CLI path arguments into workflow files.
///
/// A file argument is taken as a workflow file; a directory argument is
/// resolved to its project root and expanded to `.github/workflows/*.{yml,yaml}`.
/// Duplicate files (e.g. a file listed and its directory) collapse to one.
pub fn list_workflows(paths: &[PathBuf]) -> anyhow::Result<Vec<WorkflowInfo>> {
    let mut by_path: BTreeMap<PathBuf, WorkflowInfo> = BTreeMap::new();
    for path in paths {
        tracing::debug!(path = %path.display(), "listing workflows");
        if path.is_file() {
            let info = workflow_info_for_file(path)?;
            by_path.insert(info.file_path.clone(), info);
        } else {
            for info in extract_workflows(path)? {
                by_path.insert(info.file_path.clone(), info);
            }
        }
    }
    Ok(by_path.into_values().collect())
}
