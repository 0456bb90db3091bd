//! Cross-field consistency rules
//!
//! Driven by the rule table and run after every per-field pass.
//! Everything here is a warning.

use std::collections::BTreeSet;

use serde_yaml::Value;

use crate::errors::Violation;
use crate::rules::RuleTable;
use crate::workflow::WorkflowConfig;

pub fn validate_consistency(config: &WorkflowConfig, rules: &RuleTable) -> Vec<Violation> {
    let mut out = Vec::new();
    check_toolset_permissions(config, rules, &mut out);
    check_allow_lists(config, &mut out);
    out
}

/// Each github toolset reads some scopes; those scopes should be granted
fn check_toolset_permissions(config: &WorkflowConfig, rules: &RuleTable, out: &mut Vec<Violation>) {
    missing_scopes(&config.github_toolsets(), config, rules, out);
}

/// Toolset scopes for a `github` tool contributed by an imported fragment,
/// checked against the importing document's permissions. A `github` tool in
/// the importing document shadows the fragment's, so nothing is reported.
pub fn validate_imported_toolsets(
    config: &WorkflowConfig,
    fragment: &WorkflowConfig,
    rules: &RuleTable,
) -> Vec<Violation> {
    let mut out = Vec::new();
    if config.tool("github").is_none() && fragment.tool("github").is_some() {
        missing_scopes(&fragment.github_toolsets(), config, rules, &mut out);
    }
    out
}

fn missing_scopes(
    toolsets: &[String],
    config: &WorkflowConfig,
    rules: &RuleTable,
    out: &mut Vec<Violation>,
) {
    let mut reported = BTreeSet::new();
    for toolset in toolsets {
        let Some(scopes) = rules.toolset_scopes(toolset) else {
            continue;
        };
        for scope in scopes {
            if config.grants_read(scope) || !reported.insert(scope.clone()) {
                continue;
            }
            out.push(Violation::MissingImpliedPermission {
                location: "tools.github".to_string(),
                toolset: toolset.clone(),
                scope: scope.clone(),
            });
        }
    }
}

fn check_allow_lists(config: &WorkflowConfig, out: &mut Vec<Violation>) {
    let Some(servers) = config.mcp_servers.present() else {
        return;
    };
    for server in servers {
        let empty = server
            .value
            .as_mapping()
            .and_then(|m| m.get("allowed"))
            .and_then(Value::as_sequence)
            .is_some_and(|s| s.is_empty());
        if empty {
            out.push(Violation::EmptyAllowList {
                location: format!("{}.allowed", server.location),
                server: server.name.clone(),
            });
        }
    }
}
