//! Shape pass: value kinds, identifiers and option schemas

use std::collections::HashMap;

use jsonschema::Validator;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::Value;

use super::malformed_section;
use crate::error::{AwcError, Result};
use crate::errors::Violation;
use crate::field::{describe_value, Presence};
use crate::frontmatter::key_string;
use crate::imports::{ImportReference, ImportShapeError};
use crate::rules::{find_similar, RuleTable, ToolShape};
use crate::workflow::{SafeOutputDeclaration, ToolDeclaration, WorkflowConfig};

static DOMAIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\*\.)?([a-z0-9]([a-z0-9\-]*[a-z0-9])?\.)+[a-z]{2,}$").expect("domain regex")
});

static IMAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9._\-/]*(:[A-Za-z0-9._\-]+)?(@sha256:[a-f0-9]{64})?$")
        .expect("image regex")
});

const ENGINE_KEYS: &[&str] = &["id", "model", "version", "steps", "env", "max-turns"];

/// Compiled option schemas, one per safe output kind
pub struct OptionSchemas {
    schemas: HashMap<String, Validator>,
}

impl OptionSchemas {
    /// Compile every `options` schema in the rule table
    pub fn compile(rules: &RuleTable) -> Result<Self> {
        let mut schemas = HashMap::new();
        for (kind, rule) in &rules.safe_outputs {
            if let Some(schema) = &rule.options {
                let compiled = jsonschema::validator_for(schema).map_err(|e| AwcError::Rules {
                    reason: format!("invalid options schema for '{}': {}", kind, e),
                })?;
                schemas.insert(kind.clone(), compiled);
            }
        }
        Ok(Self { schemas })
    }

    /// Error messages for `options` under a safe output kind
    fn check(&self, kind: &str, options: &Value) -> Vec<String> {
        let Some(schema) = self.schemas.get(kind) else {
            return Vec::new();
        };
        let instance = match serde_json::to_value(options) {
            Ok(v) => v,
            Err(e) => return vec![e.to_string()],
        };
        let messages = schema
            .iter_errors(&instance)
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() {
                    e.to_string()
                } else {
                    format!("{}: {}", path.trim_start_matches('/'), e)
                }
            })
            .collect();
        messages
    }
}

/// Run every shape check
pub fn validate_shape(
    config: &WorkflowConfig,
    rules: &RuleTable,
    schemas: &OptionSchemas,
) -> Vec<Violation> {
    let mut errors = Vec::new();
    validate_keys(config, rules, &mut errors);
    validate_tools(config, rules, &mut errors);
    validate_mcp_servers(config, &mut errors);
    validate_safe_outputs(config, rules, schemas, &mut errors);
    validate_engine(config, rules, &mut errors);
    validate_network(config, rules, &mut errors);
    validate_timeout(config, &mut errors);
    validate_imports(config, &mut errors);
    errors
}

/// Shape checks for an imported fragment: only contributed sections
pub fn validate_fragment_keys(
    config: &WorkflowConfig,
    rules: &RuleTable,
    import: &str,
) -> Vec<Violation> {
    let mut out = Vec::new();
    for key in &config.keys {
        if !rules.is_fragment_key(key) {
            out.push(Violation::IgnoredImportKey {
                location: key.clone(),
                key: key.clone(),
                import: import.to_string(),
            });
        }
    }
    validate_tools(config, rules, &mut out);
    validate_mcp_servers(config, &mut out);
    validate_imports(config, &mut out);
    out
}

fn validate_keys(config: &WorkflowConfig, rules: &RuleTable, out: &mut Vec<Violation>) {
    for key in &config.keys {
        if !rules.is_frontmatter_key(key) {
            out.push(Violation::UnknownField {
                location: key.clone(),
                field: key.clone(),
                suggestions: find_similar(key, &rules.frontmatter_keys, 3),
            });
        }
    }
}

fn validate_tools(config: &WorkflowConfig, rules: &RuleTable, out: &mut Vec<Violation>) {
    if malformed_section(&config.tools, "tools", "a mapping of tool names", out) {
        return;
    }
    let Some(tools) = config.tools.present() else {
        return;
    };

    for tool in tools {
        if let Some(reason) = rules.disallowed_reason(&tool.name) {
            out.push(Violation::DisallowedTool {
                location: tool.location.clone(),
                tool: tool.name.clone(),
                reason: reason.to_string(),
            });
            continue;
        }

        match rules.tool_shape(&tool.name) {
            None => out.push(Violation::UnknownTool {
                location: tool.location.clone(),
                tool: tool.name.clone(),
                suggestions: find_similar(&tool.name, rules.tools.keys(), 3),
            }),
            Some(ToolShape::Marker) => {
                if !tool.value.is_marker() {
                    out.push(Violation::PresenceOnly {
                        location: tool.location.clone(),
                        field: tool.name.clone(),
                        found: tool.value.describe().to_string(),
                    });
                }
            }
            Some(ToolShape::Commands) => check_commands(tool, out),
            Some(ToolShape::Object) | Some(ToolShape::MarkerOrObject) => {
                match &tool.value {
                    Presence::Marker => {}
                    Presence::Value(Value::Mapping(_)) => {
                        if tool.name == "github" {
                            check_github(tool, rules, out);
                        }
                    }
                    other => out.push(Violation::WrongShape {
                        location: tool.location.clone(),
                        expected: "a mapping".to_string(),
                        found: other.describe().to_string(),
                    }),
                }
            }
        }
    }
}

fn check_commands(tool: &ToolDeclaration, out: &mut Vec<Violation>) {
    match &tool.value {
        Presence::Marker | Presence::Value(Value::Bool(true)) => {}
        Presence::Value(Value::Sequence(seq)) => {
            for (i, item) in seq.iter().enumerate() {
                if !item.is_string() {
                    out.push(Violation::WrongShape {
                        location: format!("{}[{}]", tool.location, i),
                        expected: "a command string".to_string(),
                        found: describe_value(item).to_string(),
                    });
                }
            }
        }
        other => out.push(Violation::WrongShape {
            location: tool.location.clone(),
            expected: "a bare key, true, or a sequence of commands".to_string(),
            found: other.describe().to_string(),
        }),
    }
}

fn check_github(tool: &ToolDeclaration, rules: &RuleTable, out: &mut Vec<Violation>) {
    let Some(toolsets) = tool.value.as_mapping().and_then(|m| m.get("toolsets")) else {
        return;
    };
    let location = format!("{}.toolsets", tool.location);
    let Some(seq) = toolsets.as_sequence() else {
        out.push(Violation::WrongShape {
            location,
            expected: "a sequence of toolset names".to_string(),
            found: describe_value(toolsets).to_string(),
        });
        return;
    };
    for item in seq {
        match item.as_str() {
            Some(name) if rules.toolset_scopes(name).is_some() => {}
            Some(name) => out.push(Violation::InvalidOption {
                location: location.clone(),
                details: format!("unknown github toolset '{}'", name),
            }),
            None => out.push(Violation::WrongShape {
                location: location.clone(),
                expected: "a toolset name".to_string(),
                found: describe_value(item).to_string(),
            }),
        }
    }
}

fn validate_mcp_servers(config: &WorkflowConfig, out: &mut Vec<Violation>) {
    if malformed_section(
        &config.mcp_servers,
        "mcp-servers",
        "a mapping of server names",
        out,
    ) {
        return;
    }
    let Some(servers) = config.mcp_servers.present() else {
        return;
    };

    for server in servers {
        let Some(m) = server.value.as_mapping() else {
            out.push(Violation::WrongShape {
                location: server.location.clone(),
                expected: "a mapping with 'container' or 'command'".to_string(),
                found: server.value.describe().to_string(),
            });
            continue;
        };

        match (m.get("container"), m.get("command")) {
            (Some(Value::String(image)), _) => {
                if !IMAGE.is_match(image) {
                    out.push(Violation::WrongShape {
                        location: format!("{}.container", server.location),
                        expected: "an image coordinate (name[:tag][@sha256:digest])".to_string(),
                        found: format!("'{}'", image),
                    });
                }
            }
            (None, Some(Value::String(_))) => {}
            (Some(other), _) | (None, Some(other)) => out.push(Violation::WrongShape {
                location: server.location.clone(),
                expected: "'container' or 'command' as a string".to_string(),
                found: describe_value(other).to_string(),
            }),
            (None, None) => out.push(Violation::WrongShape {
                location: server.location.clone(),
                expected: "'container' or 'command'".to_string(),
                found: "neither".to_string(),
            }),
        }

        if let Some(allowed) = m.get("allowed") {
            let ok = allowed
                .as_sequence()
                .is_some_and(|seq| seq.iter().all(Value::is_string));
            if !ok {
                out.push(Violation::WrongShape {
                    location: format!("{}.allowed", server.location),
                    expected: "a sequence of operation names".to_string(),
                    found: describe_value(allowed).to_string(),
                });
            }
        }
    }
}

fn validate_safe_outputs(
    config: &WorkflowConfig,
    rules: &RuleTable,
    schemas: &OptionSchemas,
    out: &mut Vec<Violation>,
) {
    if malformed_section(
        &config.safe_outputs,
        "safe-outputs",
        "a mapping of output kinds",
        out,
    ) {
        return;
    }
    let Some(outputs) = config.safe_outputs.present() else {
        return;
    };

    for output in outputs {
        if output.name.contains('_') {
            out.push(Violation::UnderscoreIdentifier {
                location: output.location.clone(),
                name: output.name.clone(),
                hyphenated: output.name.replace('_', "-"),
            });
            continue;
        }
        if rules.safe_output(&output.name).is_none() {
            out.push(Violation::UnknownSafeOutput {
                location: output.location.clone(),
                name: output.name.clone(),
                suggestions: find_similar(&output.name, rules.safe_outputs.keys(), 3),
            });
            continue;
        }
        check_safe_output_value(output, schemas, out);
    }
}

fn check_safe_output_value(
    output: &SafeOutputDeclaration,
    schemas: &OptionSchemas,
    out: &mut Vec<Violation>,
) {
    match &output.value {
        Presence::Absent | Presence::Marker | Presence::Value(Value::Null) => {}
        Presence::Value(options @ Value::Mapping(_)) => {
            for details in schemas.check(&output.name, options) {
                out.push(Violation::InvalidOption {
                    location: output.location.clone(),
                    details,
                });
            }
        }
        other => out.push(Violation::WrongShape {
            location: output.location.clone(),
            expected: "a bare key or an option mapping".to_string(),
            found: other.describe().to_string(),
        }),
    }
}

const CUSTOM_ENGINE: &str = "custom";

/// The custom engine runs only its own `engine.steps`
fn missing_steps(found: &str) -> Violation {
    Violation::WrongShape {
        location: "engine.steps".to_string(),
        expected: "a non-empty list of steps for the custom engine".to_string(),
        found: found.to_string(),
    }
}

fn validate_engine(config: &WorkflowConfig, rules: &RuleTable, out: &mut Vec<Violation>) {
    let unknown = |engine: &str| Violation::UnknownEngine {
        location: "engine".to_string(),
        engine: engine.to_string(),
        suggestions: find_similar(engine, &rules.engines, 3),
    };

    match &config.engine {
        Presence::Absent => {}
        Presence::Value(Value::String(id)) => {
            if !rules.is_engine(id) {
                out.push(unknown(id));
            } else if id == CUSTOM_ENGINE {
                out.push(missing_steps("nothing"));
            }
        }
        Presence::Value(Value::Mapping(m)) => {
            match m.get("id") {
                Some(Value::String(id)) if id == CUSTOM_ENGINE => match m.get("steps") {
                    Some(Value::Sequence(steps)) if !steps.is_empty() => {}
                    Some(Value::Sequence(_)) => out.push(missing_steps("an empty list")),
                    other => out.push(missing_steps(other.map(describe_value).unwrap_or("nothing"))),
                },
                Some(Value::String(id)) if rules.is_engine(id) => {}
                Some(Value::String(id)) => out.push(unknown(id)),
                other => out.push(Violation::WrongShape {
                    location: "engine.id".to_string(),
                    expected: "an engine name".to_string(),
                    found: other.map(describe_value).unwrap_or("nothing").to_string(),
                }),
            }
            for key in m.keys().map(key_string) {
                if !ENGINE_KEYS.contains(&key.as_str()) {
                    out.push(Violation::UnknownField {
                        location: format!("engine.{}", key),
                        suggestions: find_similar(
                            &key,
                            &ENGINE_KEYS.iter().map(|k| k.to_string()).collect::<Vec<_>>(),
                            3,
                        ),
                        field: key,
                    });
                }
            }
        }
        other => out.push(Violation::WrongShape {
            location: "engine".to_string(),
            expected: "an engine name or a mapping with 'id'".to_string(),
            found: other.describe().to_string(),
        }),
    }
}

fn validate_network(config: &WorkflowConfig, rules: &RuleTable, out: &mut Vec<Violation>) {
    let expected = "'defaults' or a mapping with 'allowed'";
    match &config.network {
        Presence::Absent => {}
        Presence::Value(Value::String(s)) if s == "defaults" => {}
        Presence::Value(Value::Mapping(m)) => {
            for key in m.keys().map(key_string) {
                if key != "allowed" {
                    out.push(Violation::UnknownField {
                        location: format!("network.{}", key),
                        field: key,
                        suggestions: vec!["allowed".to_string()],
                    });
                }
            }
            match m.get("allowed") {
                None => {}
                Some(Value::Sequence(seq)) => {
                    for item in seq {
                        match item.as_str() {
                            Some(d) if rules.is_ecosystem(d) || DOMAIN.is_match(d) => {}
                            Some(d) => out.push(Violation::InvalidDomain {
                                location: "network.allowed".to_string(),
                                domain: d.to_string(),
                            }),
                            None => out.push(Violation::WrongShape {
                                location: "network.allowed".to_string(),
                                expected: "a domain name".to_string(),
                                found: describe_value(item).to_string(),
                            }),
                        }
                    }
                }
                Some(other) => out.push(Violation::WrongShape {
                    location: "network.allowed".to_string(),
                    expected: "a sequence of domains".to_string(),
                    found: describe_value(other).to_string(),
                }),
            }
        }
        other => out.push(Violation::WrongShape {
            location: "network".to_string(),
            expected: expected.to_string(),
            found: match other {
                Presence::Value(Value::String(s)) => format!("'{}'", s),
                _ => other.describe().to_string(),
            },
        }),
    }
}

fn validate_timeout(config: &WorkflowConfig, out: &mut Vec<Violation>) {
    match &config.timeout_minutes {
        Presence::Absent => {}
        Presence::Value(v) if v.as_u64().is_some_and(|n| n > 0) => {}
        other => out.push(Violation::WrongShape {
            location: "timeout-minutes".to_string(),
            expected: "a positive integer".to_string(),
            found: other.describe().to_string(),
        }),
    }
}

fn validate_imports(config: &WorkflowConfig, out: &mut Vec<Violation>) {
    if malformed_section(&config.imports, "imports", "a sequence of imports", out) {
        return;
    }
    let Some(imports) = config.imports.present() else {
        return;
    };

    for import in imports {
        let reference = match &import.value {
            Value::String(s) => s.clone(),
            other => serde_yaml::to_string(other)
                .map(|s| s.trim().to_string())
                .unwrap_or_default(),
        };
        match ImportReference::parse(&import.value) {
            Ok(_) => {}
            Err(ImportShapeError::RawLocator) => out.push(Violation::RawLocatorImport {
                location: import.location.clone(),
                reference,
            }),
            Err(ImportShapeError::Malformed(reason)) => out.push(Violation::MalformedImport {
                location: import.location.clone(),
                reference,
                reason,
            }),
        }
    }
}
