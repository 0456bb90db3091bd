//! Workflow scaffolding
//!
//! Creates `<dir>/<name>.md` from a template that validates cleanly.

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// Create a new workflow file
pub fn new_workflow(name: &str, dir: &Path) -> Result<InitResult> {
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        anyhow::bail!(
            "invalid workflow name '{}' (use letters, digits, '-' and '_')",
            name
        );
    }

    let path = dir.join(format!("{}.md", name));
    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }

    fs::create_dir_all(dir)?;
    let content = WORKFLOW_TEMPLATE.replace("{{title}}", &title(name));
    fs::write(&path, content)?;

    Ok(InitResult { path })
}

/// `issue-triage` → `Issue Triage`
fn title(name: &str) -> String {
    name.split(|c| c == '-' || c == '_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Result of scaffolding
pub struct InitResult {
    pub path: PathBuf,
}

const WORKFLOW_TEMPLATE: &str = r#"---
name: {{title}}
description: Describe what this workflow does
on:
  workflow_dispatch:
permissions:
  contents: read
  issues: read
engine: copilot
tools:
  edit:
  github:
    toolsets: [issues]
safe-outputs:
  create-issue:
    max: 1
timeout-minutes: 15
---

# {{title}}

Describe the task for the agent here.

Read-only access to the repository and its issues is available. To report
results, open an issue; the `create-issue` safe output performs the write.
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::Validator;
    use tempfile::tempdir;

    #[test]
    fn test_new_workflow() {
        let temp = tempdir().unwrap();
        let result = new_workflow("issue-triage", temp.path()).unwrap();

        assert_eq!(result.path, temp.path().join("issue-triage.md"));
        let content = fs::read_to_string(&result.path).unwrap();
        assert!(content.contains("name: Issue Triage"));
        assert!(content.contains("# Issue Triage"));
    }

    #[test]
    fn test_template_validates_cleanly() {
        let temp = tempdir().unwrap();
        let result = new_workflow("daily", temp.path()).unwrap();

        let validator = Validator::with_builtin_rules().unwrap();
        let report = validator.validate_file(&result.path).unwrap();
        assert!(report.is_valid(), "{:?}", report.errors);
        assert!(!report.has_warnings(), "{:?}", report.warnings);
    }

    #[test]
    fn test_creates_missing_dir() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join(".github/workflows");
        new_workflow("x", &dir).unwrap();
        assert!(dir.join("x.md").exists());
    }

    #[test]
    fn test_already_exists() {
        let temp = tempdir().unwrap();
        new_workflow("x", temp.path()).unwrap();
        assert!(new_workflow("x", temp.path()).is_err());
    }

    #[test]
    fn test_invalid_name() {
        let temp = tempdir().unwrap();
        assert!(new_workflow("../x", temp.path()).is_err());
        assert!(new_workflow("", temp.path()).is_err());
    }

    #[test]
    fn test_title() {
        assert_eq!(title("issue-triage"), "Issue Triage");
        assert_eq!(title("ci_doctor"), "Ci Doctor");
    }
}
