//! Rule loading from YAML
//!
//! The built-in table lives in `rules/workflow-rules.yaml` and is embedded at
//! compile time. A custom table can replace it via configuration.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{AwcError, Result};

const BUILTIN_RULES: &str = include_str!("../rules/workflow-rules.yaml");

/// Value shape a tool accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolShape {
    /// Bare key only
    Marker,
    /// Bare key, `true`, or a sequence of command strings
    Commands,
    /// Mapping only (bare key also accepted, meaning defaults)
    Object,
    /// Bare key or mapping
    MarkerOrObject,
}

/// Safe output definition
#[derive(Debug, Clone, Deserialize)]
pub struct SafeOutputRule {
    /// Write scopes granted to this output's job
    #[serde(default)]
    pub permissions: BTreeMap<String, String>,
    /// JSON Schema for the option mapping; `None` accepts any mapping
    #[serde(default)]
    pub options: Option<serde_json::Value>,
}

/// Complete rule table (from workflow-rules.yaml)
#[derive(Debug, Clone, Deserialize)]
pub struct RuleTable {
    pub version: String,
    pub description: String,
    pub frontmatter_keys: Vec<String>,
    #[serde(default)]
    pub fragment_keys: Vec<String>,
    pub engines: Vec<String>,
    pub tools: BTreeMap<String, ToolShape>,
    #[serde(default)]
    pub disallowed_tools: BTreeMap<String, String>,
    pub permission_scopes: Vec<String>,
    pub toolset_permissions: BTreeMap<String, Vec<String>>,
    pub safe_outputs: BTreeMap<String, SafeOutputRule>,
    #[serde(default)]
    pub network_ecosystems: Vec<String>,
}

impl RuleTable {
    /// Load from YAML string
    pub fn from_yaml(yaml: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// The embedded default table
    pub fn builtin() -> Self {
        Self::from_yaml(BUILTIN_RULES).expect("embedded workflow-rules.yaml must parse")
    }

    /// Load a custom table from disk
    pub fn from_file(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path).map_err(|e| AwcError::Rules {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;
        Self::from_yaml(&yaml).map_err(|e| AwcError::Rules {
            reason: format!("failed to parse {}: {}", path.display(), e),
        })
    }

    pub fn is_frontmatter_key(&self, key: &str) -> bool {
        self.frontmatter_keys.iter().any(|k| k == key)
    }

    pub fn is_fragment_key(&self, key: &str) -> bool {
        self.fragment_keys.iter().any(|k| k == key)
    }

    pub fn tool_shape(&self, tool: &str) -> Option<ToolShape> {
        self.tools.get(tool).copied()
    }

    /// Reason a tool identifier is explicitly rejected
    pub fn disallowed_reason(&self, tool: &str) -> Option<&str> {
        self.disallowed_tools.get(tool).map(String::as_str)
    }

    pub fn is_engine(&self, engine: &str) -> bool {
        self.engines.iter().any(|e| e == engine)
    }

    pub fn is_permission_scope(&self, scope: &str) -> bool {
        self.permission_scopes.iter().any(|s| s == scope)
    }

    /// Permission scopes a github toolset reads. `None` for unknown toolsets.
    pub fn toolset_scopes(&self, toolset: &str) -> Option<&[String]> {
        self.toolset_permissions.get(toolset).map(Vec::as_slice)
    }

    pub fn safe_output(&self, kind: &str) -> Option<&SafeOutputRule> {
        self.safe_outputs.get(kind)
    }

    pub fn is_ecosystem(&self, name: &str) -> bool {
        self.network_ecosystems.iter().any(|e| e == name)
    }
}

/// Find similar identifiers (for "did you mean?" suggestions)
pub fn find_similar<'a, I>(candidate: &str, options: I, max_results: usize) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let lower = candidate.to_lowercase().replace('_', "-");
    if lower.is_empty() {
        return Vec::new();
    }
    options
        .into_iter()
        .filter(|k| {
            let k = k.to_lowercase().replace('_', "-");
            (lower.len() >= 3 && k.contains(&lower))
                || (k.len() >= 3 && lower.contains(&k))
                || edit_distance(&k, &lower) <= 2
        })
        .take(max_results)
        .cloned()
        .collect()
}

fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut cur = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            cur[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        prev = cur;
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_rules_parse() {
        let rules = RuleTable::builtin();
        assert_eq!(rules.version, "1.0");
        assert!(rules.is_frontmatter_key("safe-outputs"));
        assert!(rules.is_engine("copilot"));
        assert_eq!(rules.tool_shape("edit"), Some(ToolShape::Marker));
        assert_eq!(rules.tool_shape("github"), Some(ToolShape::Object));
    }

    #[test]
    fn test_read_tool_is_disallowed() {
        let rules = RuleTable::builtin();
        assert!(rules.tool_shape("read").is_none());
        assert!(rules.disallowed_reason("read").unwrap().contains("edit"));
    }

    #[test]
    fn test_toolset_scopes() {
        let rules = RuleTable::builtin();
        assert_eq!(rules.toolset_scopes("issues").unwrap(), ["issues".to_string()]);
        assert!(rules.toolset_scopes("default").unwrap().contains(&"contents".to_string()));
        assert!(rules.toolset_scopes("nonsense").is_none());
    }

    #[test]
    fn test_safe_output_permissions_are_write_only() {
        let rules = RuleTable::builtin();
        for (kind, rule) in &rules.safe_outputs {
            for level in rule.permissions.values() {
                assert_eq!(level, "write", "{} grants {}", kind, level);
            }
        }
        assert!(rules.safe_output("create-issue").unwrap().options.is_some());
    }

    #[test]
    fn test_safe_output_kinds_are_hyphenated() {
        let rules = RuleTable::builtin();
        assert!(rules.safe_outputs.keys().all(|k| !k.contains('_')));
    }

    #[test]
    fn test_find_similar() {
        let rules = RuleTable::builtin();
        let similar = find_similar("permisions", &rules.frontmatter_keys, 3);
        assert_eq!(similar, vec!["permissions".to_string()]);

        let similar = find_similar("create_issue", rules.safe_outputs.keys(), 3);
        assert!(similar.contains(&"create-issue".to_string()));

        assert!(find_similar("zzzzzzzz", &rules.engines, 3).is_empty());
    }

    #[test]
    fn test_custom_rules_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.yaml");
        std::fs::write(&path, BUILTIN_RULES.replace("  - codex\n", "")).unwrap();

        let rules = RuleTable::from_file(&path).unwrap();
        assert!(!rules.is_engine("codex"));
        assert!(rules.is_engine("claude"));
    }

    #[test]
    fn test_missing_rules_file() {
        let err = RuleTable::from_file(Path::new("/nonexistent/rules.yaml")).unwrap_err();
        assert!(matches!(err, AwcError::Rules { .. }));
    }
}
