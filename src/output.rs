//! Output rendering for lint violations.
//!
//! Supports `human` (default) and `json` outputs. The human form prints the
//! offending source line with a caret under the reported column; the JSON
//! form includes per-violation fields and a top-level summary.

use std::collections::HashMap;

use owo_colors::OwoColorize;
use serde_json::json;
use serde_json::Value as JsonVal;

use crate::error::Violation;

fn use_colors(output: &str) -> bool {
    output != "json" && std::env::var_os("NO_COLOR").is_none()
}

/// Print violations in the requested format. Human output goes to stderr so
/// stdout stays clean for machine consumption.
pub fn print_violations(violations: &[Violation], output: &str) {
    match output {
        "json" => println!(
            "{}",
            serde_json::to_string_pretty(&compose_lint_json(violations)).unwrap()
        ),
        _ => {
            let color = use_colors(output);
            let mut sources: HashMap<&std::path::Path, Option<String>> = HashMap::new();
            for v in violations {
                let header = if color {
                    format!(
                        "{}: {} {}",
                        format!("{}:{}:{}", v.path, v.line, v.column).bold(),
                        v.message,
                        format!("[{}]", v.kind).bright_black()
                    )
                } else {
                    v.to_string()
                };
                eprintln!("{header}");

                let source = sources
                    .entry(v.abs_path.as_path())
                    .or_insert_with(|| std::fs::read_to_string(&v.abs_path).ok());
                if let Some(snippet) = source
                    .as_deref()
                    .and_then(|src| render_snippet(src, v.line, v.column))
                {
                    eprintln!("{snippet}");
                }
            }
        }
    }
}

/// The offending line plus a caret marker under `column`, or `None` when the
/// position falls outside the source.
fn render_snippet(source: &str, line: usize, column: usize) -> Option<String> {
    let text = source.lines().nth(line.checked_sub(1)?)?;
    if column == 0 || column > text.chars().count() + 1 {
        return Some(text.to_string());
    }
    let marker = " ".repeat(column - 1) + "^";
    Some(format!("{text}\n{marker}"))
}

/// Compose lint JSON object (pure) for testing/snapshot purposes.
pub fn compose_lint_json(violations: &[Violation]) -> JsonVal {
    let files = violations
        .iter()
        .map(|v| v.path.as_str())
        .collect::<std::collections::BTreeSet<_>>()
        .len();
    json!({
        "violations": violations,
        "summary": {
            "violations": violations.len(),
            "files": files,
        },
    })
}
