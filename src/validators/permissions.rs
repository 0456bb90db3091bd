//! Permission gate
//!
//! Strict mode is always on: declared permissions may only read. Mutations
//! go through `safe-outputs`, whose jobs receive write scopes at emit time.

use serde_yaml::Value;

use super::malformed_section;
use crate::errors::Violation;
use crate::field::Presence;
use crate::rules::{find_similar, RuleTable};
use crate::workflow::{PermissionEntry, PermissionSet, WorkflowConfig};

const READ_LEVELS: &[&str] = &["read", "none"];
const WRITE_LEVELS: &[&str] = &["write"];

pub fn validate_permissions(config: &WorkflowConfig, rules: &RuleTable) -> Vec<Violation> {
    let mut out = Vec::new();
    if malformed_section(
        &config.permissions,
        "permissions",
        "a mapping of scopes or 'read-all'",
        &mut out,
    ) {
        return out;
    }

    match config.permissions.present() {
        None | Some(PermissionSet::ReadAll) => {}
        Some(PermissionSet::WriteAll) => out.push(Violation::WritePermission {
            location: "permissions".to_string(),
            scope: "all".to_string(),
            level: "write-all".to_string(),
        }),
        Some(PermissionSet::Shorthand(s)) => out.push(Violation::WrongShape {
            location: "permissions".to_string(),
            expected: "a mapping of scopes or 'read-all'".to_string(),
            found: format!("'{}'", s),
        }),
        Some(PermissionSet::Scopes(entries)) => {
            for entry in entries {
                check_entry(entry, rules, &mut out);
            }
        }
    }
    out
}

fn check_entry(entry: &PermissionEntry, rules: &RuleTable, out: &mut Vec<Violation>) {
    if !rules.is_permission_scope(&entry.scope) {
        out.push(Violation::UnknownPermissionScope {
            location: entry.location.clone(),
            scope: entry.scope.clone(),
            suggestions: find_similar(&entry.scope, &rules.permission_scopes, 3),
        });
    }

    match &entry.level {
        Presence::Value(Value::String(level)) if WRITE_LEVELS.contains(&level.as_str()) => {
            out.push(Violation::WritePermission {
                location: entry.location.clone(),
                scope: entry.scope.clone(),
                level: level.clone(),
            });
        }
        Presence::Value(Value::String(level)) if READ_LEVELS.contains(&level.as_str()) => {}
        Presence::Value(Value::String(level)) => out.push(Violation::InvalidAccessLevel {
            location: entry.location.clone(),
            level: level.clone(),
        }),
        other => out.push(Violation::WrongShape {
            location: entry.location.clone(),
            expected: "an access level (read or none)".to_string(),
            found: other.describe().to_string(),
        }),
    }
}
