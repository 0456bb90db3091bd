//! Workflow configuration model
//!
//! [`WorkflowConfig::lift`] turns parsed frontmatter into typed declarations
//! without rejecting anything: wrong container types become
//! [`Section::Malformed`] and every entry keeps its [`Presence`], so the
//! validators can report all problems in one pass.

use serde_yaml::{Mapping, Value};

use crate::field::{describe_value, Presence, Section};
use crate::frontmatter::{key_string, Frontmatter};

/// Trigger kinds the compiler knows how to emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerKind {
    WorkflowDispatch,
    Schedule,
    PullRequest,
    Issues,
    IssueComment,
    Discussion,
    Release,
    Push,
    WorkflowRun,
}

impl TriggerKind {
    pub const ALL: [TriggerKind; 9] = [
        TriggerKind::WorkflowDispatch,
        TriggerKind::Schedule,
        TriggerKind::PullRequest,
        TriggerKind::Issues,
        TriggerKind::IssueComment,
        TriggerKind::Discussion,
        TriggerKind::Release,
        TriggerKind::Push,
        TriggerKind::WorkflowRun,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TriggerKind::WorkflowDispatch => "workflow_dispatch",
            TriggerKind::Schedule => "schedule",
            TriggerKind::PullRequest => "pull_request",
            TriggerKind::Issues => "issues",
            TriggerKind::IssueComment => "issue_comment",
            TriggerKind::Discussion => "discussion",
            TriggerKind::Release => "release",
            TriggerKind::Push => "push",
            TriggerKind::WorkflowRun => "workflow_run",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    pub fn names() -> Vec<String> {
        Self::ALL.iter().map(|k| k.name().to_string()).collect()
    }
}

/// One entry under `on`
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerDeclaration {
    pub name: String,
    pub kind: Option<TriggerKind>,
    pub value: Presence<Value>,
    pub location: String,
}

/// One entry under `tools`
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDeclaration {
    pub name: String,
    pub value: Presence<Value>,
    pub location: String,
}

/// One entry under `mcp-servers`
#[derive(Debug, Clone, PartialEq)]
pub struct McpServerDeclaration {
    pub name: String,
    pub value: Presence<Value>,
    pub location: String,
}

/// One entry under `safe-outputs`
#[derive(Debug, Clone, PartialEq)]
pub struct SafeOutputDeclaration {
    pub name: String,
    pub value: Presence<Value>,
    pub location: String,
}

/// One `scope: level` entry under `permissions`
#[derive(Debug, Clone, PartialEq)]
pub struct PermissionEntry {
    pub scope: String,
    pub level: Presence<Value>,
    pub location: String,
}

impl PermissionEntry {
    pub fn level_str(&self) -> Option<&str> {
        self.level.value().and_then(Value::as_str)
    }
}

/// The `permissions` section
#[derive(Debug, Clone, PartialEq)]
pub enum PermissionSet {
    ReadAll,
    WriteAll,
    Scopes(Vec<PermissionEntry>),
    /// Any other string shorthand
    Shorthand(String),
}

/// One entry of the `imports` sequence, parsed later
#[derive(Debug, Clone, PartialEq)]
pub struct ImportDeclaration {
    pub value: Value,
    pub location: String,
}

/// Typed frontmatter of one workflow document
#[derive(Debug, Clone, Default)]
pub struct WorkflowConfig {
    pub name: Option<String>,
    pub description: Option<String>,
    pub triggers: Section<Vec<TriggerDeclaration>>,
    pub engine: Presence<Value>,
    pub permissions: Section<PermissionSet>,
    pub tools: Section<Vec<ToolDeclaration>>,
    pub mcp_servers: Section<Vec<McpServerDeclaration>>,
    pub safe_outputs: Section<Vec<SafeOutputDeclaration>>,
    pub network: Presence<Value>,
    pub imports: Section<Vec<ImportDeclaration>>,
    pub timeout_minutes: Presence<Value>,
    /// Every top-level key in document order
    pub keys: Vec<String>,
}

impl WorkflowConfig {
    /// Lift parsed frontmatter into typed declarations
    pub fn lift(fm: &Frontmatter) -> Self {
        Self {
            name: fm.get("name").and_then(Value::as_str).map(String::from),
            description: fm
                .get("description")
                .and_then(Value::as_str)
                .map(String::from),
            triggers: lift_triggers(fm),
            engine: fm.presence("engine", fm.get("engine")),
            permissions: lift_permissions(fm),
            tools: lift_entries(fm, "tools", |name, value, location| ToolDeclaration {
                name,
                value,
                location,
            }),
            mcp_servers: lift_entries(fm, "mcp-servers", |name, value, location| {
                McpServerDeclaration {
                    name,
                    value,
                    location,
                }
            }),
            safe_outputs: lift_entries(fm, "safe-outputs", |name, value, location| {
                SafeOutputDeclaration {
                    name,
                    value,
                    location,
                }
            }),
            network: fm.presence("network", fm.get("network")),
            imports: lift_imports(fm),
            timeout_minutes: fm.presence("timeout-minutes", fm.get("timeout-minutes")),
            keys: fm.keys().collect(),
        }
    }

    /// Engine id (`copilot` when not declared)
    pub fn engine_id(&self) -> &str {
        match &self.engine {
            Presence::Value(Value::String(s)) => s.as_str(),
            Presence::Value(Value::Mapping(m)) => {
                m.get("id").and_then(Value::as_str).unwrap_or("copilot")
            }
            _ => "copilot",
        }
    }

    /// Model override from `engine.model`
    pub fn engine_model(&self) -> Option<&str> {
        self.engine
            .as_mapping()
            .and_then(|m| m.get("model"))
            .and_then(Value::as_str)
    }

    pub fn tool(&self, name: &str) -> Option<&ToolDeclaration> {
        self.tools.present()?.iter().find(|t| t.name == name)
    }

    /// Toolsets requested for the `github` tool. A bare `github` means `default`.
    pub fn github_toolsets(&self) -> Vec<String> {
        let Some(github) = self.tool("github") else {
            return Vec::new();
        };
        let declared = github
            .value
            .as_mapping()
            .and_then(|m| m.get("toolsets"))
            .and_then(Value::as_sequence)
            .map(|seq| {
                seq.iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        if declared.is_empty() {
            vec!["default".to_string()]
        } else {
            declared
        }
    }

    /// Read scopes declared in `permissions` (`read-all` covers every scope)
    pub fn grants_read(&self, scope: &str) -> bool {
        match self.permissions.present() {
            Some(PermissionSet::ReadAll) | Some(PermissionSet::WriteAll) => true,
            Some(PermissionSet::Scopes(entries)) => entries
                .iter()
                .any(|e| e.scope == scope && matches!(e.level_str(), Some("read" | "write"))),
            _ => false,
        }
    }

    /// Timeout for the agent job in minutes
    pub fn timeout(&self) -> u64 {
        self.timeout_minutes
            .value()
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_TIMEOUT_MINUTES)
    }
}

pub const DEFAULT_TIMEOUT_MINUTES: u64 = 15;

/// Resolve a top-level key that must hold a mapping
fn section_mapping(fm: &Frontmatter, key: &str) -> Section<Mapping> {
    match fm.presence(key, fm.get(key)) {
        Presence::Absent => Section::Absent,
        Presence::Marker | Presence::Value(Value::Null) => Section::Present(Mapping::new()),
        Presence::Value(Value::Mapping(m)) => Section::Present(m),
        Presence::Value(other) => Section::Malformed {
            found: describe_value(&other),
        },
    }
}

fn lift_entries<T>(
    fm: &Frontmatter,
    key: &str,
    build: impl Fn(String, Presence<Value>, String) -> T,
) -> Section<Vec<T>> {
    match section_mapping(fm, key) {
        Section::Absent => Section::Absent,
        Section::Malformed { found } => Section::Malformed { found },
        Section::Present(m) => Section::Present(
            m.iter()
                .map(|(k, v)| {
                    let name = key_string(k);
                    let location = format!("{}.{}", key, name);
                    let value = fm.presence(&location, Some(v));
                    build(name, value, location)
                })
                .collect(),
        ),
    }
}

fn lift_triggers(fm: &Frontmatter) -> Section<Vec<TriggerDeclaration>> {
    let marker = |name: &str| TriggerDeclaration {
        name: name.to_string(),
        kind: TriggerKind::from_name(name),
        value: Presence::Marker,
        location: format!("on.{}", name),
    };

    match fm.get("on") {
        Some(Value::String(name)) => Section::Present(vec![marker(name.as_str())]),
        Some(Value::Sequence(seq)) if seq.iter().all(Value::is_string) => Section::Present(
            seq.iter()
                .filter_map(Value::as_str)
                .map(marker)
                .collect(),
        ),
        _ => lift_entries(fm, "on", |name, value, location| TriggerDeclaration {
            kind: TriggerKind::from_name(&name),
            name,
            value,
            location,
        }),
    }
}

fn lift_permissions(fm: &Frontmatter) -> Section<PermissionSet> {
    match fm.get("permissions") {
        Some(Value::String(s)) => Section::Present(match s.as_str() {
            "read-all" => PermissionSet::ReadAll,
            "write-all" => PermissionSet::WriteAll,
            other => PermissionSet::Shorthand(other.to_string()),
        }),
        _ => match lift_entries(fm, "permissions", |scope, level, location| PermissionEntry {
            scope,
            level,
            location,
        }) {
            Section::Absent => Section::Absent,
            Section::Malformed { found } => Section::Malformed { found },
            Section::Present(entries) => Section::Present(PermissionSet::Scopes(entries)),
        },
    }
}

fn lift_imports(fm: &Frontmatter) -> Section<Vec<ImportDeclaration>> {
    match fm.presence("imports", fm.get("imports")) {
        Presence::Absent => Section::Absent,
        Presence::Marker | Presence::Value(Value::Null) => Section::Present(Vec::new()),
        Presence::Value(Value::Sequence(seq)) => Section::Present(
            seq.into_iter()
                .enumerate()
                .map(|(i, value)| ImportDeclaration {
                    value,
                    location: format!("imports[{}]", i),
                })
                .collect(),
        ),
        Presence::Value(other) => Section::Malformed {
            found: describe_value(&other),
        },
    }
}
