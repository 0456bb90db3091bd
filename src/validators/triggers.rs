//! Trigger rules, per kind

use serde_yaml::{Mapping, Value};

use super::malformed_section;
use crate::cron::validate_cron;
use crate::errors::Violation;
use crate::field::{describe_value, Presence};
use crate::frontmatter::key_string;
use crate::rules::find_similar;
use crate::workflow::{TriggerDeclaration, TriggerKind, WorkflowConfig};

const INPUT_TYPES: &[&str] = &["string", "boolean", "choice", "number", "environment"];

pub fn validate_triggers(config: &WorkflowConfig) -> Vec<Violation> {
    let mut out = Vec::new();
    if malformed_section(
        &config.triggers,
        "on",
        "a trigger name, a list of names, or a mapping",
        &mut out,
    ) {
        return out;
    }

    let triggers = match config.triggers.present() {
        Some(t) if !t.is_empty() => t,
        _ => {
            out.push(Violation::NoTriggers {
                location: "on".to_string(),
            });
            return out;
        }
    };

    for trigger in triggers {
        match trigger.kind {
            None => out.push(Violation::UnknownTrigger {
                location: trigger.location.clone(),
                trigger: trigger.name.clone(),
                suggestions: find_similar(&trigger.name, &TriggerKind::names(), 3),
            }),
            Some(TriggerKind::PullRequest) => check_pull_request(trigger, &mut out),
            Some(TriggerKind::WorkflowDispatch) => check_dispatch(trigger, &mut out),
            Some(TriggerKind::Schedule) => check_schedule(trigger, &mut out),
            Some(
                TriggerKind::Issues
                | TriggerKind::IssueComment
                | TriggerKind::Discussion
                | TriggerKind::Release,
            ) => {
                if let Some(m) = marker_or_mapping(trigger, &mut out) {
                    check_optional_types(trigger, m, &mut out);
                }
            }
            Some(TriggerKind::Push | TriggerKind::WorkflowRun) => {
                marker_or_mapping(trigger, &mut out);
            }
        }
    }
    out
}

/// Exactly one error unless `types` is a non-empty list
fn check_pull_request(trigger: &TriggerDeclaration, out: &mut Vec<Violation>) {
    let types = trigger.value.as_mapping().and_then(|m| m.get("types"));
    match types {
        Some(Value::Sequence(seq)) if !seq.is_empty() => {
            check_type_names(trigger, seq, out);
        }
        _ => out.push(Violation::MissingTriggerTypes {
            location: trigger.location.clone(),
            trigger: trigger.name.clone(),
        }),
    }
}

fn check_dispatch(trigger: &TriggerDeclaration, out: &mut Vec<Violation>) {
    let Some(m) = marker_or_mapping(trigger, out) else {
        return;
    };
    let Some(inputs) = m.get("inputs") else {
        return;
    };
    let location = format!("{}.inputs", trigger.location);
    let Some(inputs) = inputs.as_mapping() else {
        out.push(Violation::WrongShape {
            location,
            expected: "a mapping of input names".to_string(),
            found: describe_value(inputs).to_string(),
        });
        return;
    };

    for (name, spec) in inputs {
        let name = key_string(name);
        let input_location = format!("{}.{}", location, name);
        let Some(spec) = spec.as_mapping() else {
            out.push(Violation::WrongShape {
                location: input_location,
                expected: "an input mapping".to_string(),
                found: describe_value(spec).to_string(),
            });
            continue;
        };
        check_input(&name, &input_location, spec, out);
    }
}

fn check_input(name: &str, location: &str, spec: &Mapping, out: &mut Vec<Violation>) {
    let input_type = match spec.get("type") {
        None => "string",
        Some(Value::String(t)) if INPUT_TYPES.contains(&t.as_str()) => t.as_str(),
        Some(other) => {
            out.push(Violation::InvalidInputType {
                location: format!("{}.type", location),
                input: name.to_string(),
                input_type: match other {
                    Value::String(s) => s.clone(),
                    _ => describe_value(other).to_string(),
                },
            });
            return;
        }
    };

    match input_type {
        "boolean" => {
            if let Some(Value::Bool(value)) = spec.get("default") {
                out.push(Violation::BooleanDefault {
                    location: format!("{}.default", location),
                    input: name.to_string(),
                    value: *value,
                });
            }
        }
        "choice" => {
            let has_options = spec
                .get("options")
                .and_then(Value::as_sequence)
                .is_some_and(|s| !s.is_empty());
            if !has_options {
                out.push(Violation::WrongShape {
                    location: format!("{}.options", location),
                    expected: "a non-empty list of choices".to_string(),
                    found: spec
                        .get("options")
                        .map(describe_value)
                        .unwrap_or("nothing")
                        .to_string(),
                });
            }
        }
        _ => {}
    }
}

fn check_schedule(trigger: &TriggerDeclaration, out: &mut Vec<Violation>) {
    let expected = "a list of { cron: \"...\" } entries";
    let Some(Value::Sequence(entries)) = trigger.value.value() else {
        out.push(Violation::WrongShape {
            location: trigger.location.clone(),
            expected: expected.to_string(),
            found: trigger.value.describe().to_string(),
        });
        return;
    };
    if entries.is_empty() {
        out.push(Violation::WrongShape {
            location: trigger.location.clone(),
            expected: expected.to_string(),
            found: "an empty sequence".to_string(),
        });
    }

    for (i, entry) in entries.iter().enumerate() {
        let location = format!("{}[{}].cron", trigger.location, i);
        match entry.as_mapping().and_then(|m| m.get("cron")) {
            Some(Value::String(expression)) => {
                if let Err(reason) = validate_cron(expression) {
                    out.push(Violation::InvalidCron {
                        location,
                        expression: expression.clone(),
                        reason,
                    });
                }
            }
            other => out.push(Violation::WrongShape {
                location,
                expected: "a cron expression string".to_string(),
                found: other.map(describe_value).unwrap_or("nothing").to_string(),
            }),
        }
    }
}

/// Accept a marker or a mapping. Explicit null and booleans are ambiguous.
fn marker_or_mapping<'a>(
    trigger: &'a TriggerDeclaration,
    out: &mut Vec<Violation>,
) -> Option<&'a Mapping> {
    match &trigger.value {
        Presence::Absent | Presence::Marker => None,
        Presence::Value(Value::Mapping(m)) => Some(m),
        Presence::Value(v @ (Value::Null | Value::Bool(_))) => {
            out.push(Violation::AmbiguousTrigger {
                location: trigger.location.clone(),
                trigger: trigger.name.clone(),
                found: describe_value(v).to_string(),
            });
            None
        }
        Presence::Value(other) => {
            out.push(Violation::WrongShape {
                location: trigger.location.clone(),
                expected: "a bare key or a mapping".to_string(),
                found: describe_value(other).to_string(),
            });
            None
        }
    }
}

fn check_optional_types(trigger: &TriggerDeclaration, m: &Mapping, out: &mut Vec<Violation>) {
    match m.get("types") {
        None => {}
        Some(Value::Sequence(seq)) if !seq.is_empty() => check_type_names(trigger, seq, out),
        Some(_) => out.push(Violation::MissingTriggerTypes {
            location: format!("{}.types", trigger.location),
            trigger: trigger.name.clone(),
        }),
    }
}

fn check_type_names(trigger: &TriggerDeclaration, seq: &[Value], out: &mut Vec<Violation>) {
    for (i, item) in seq.iter().enumerate() {
        if !item.is_string() {
            out.push(Violation::WrongShape {
                location: format!("{}.types[{}]", trigger.location, i),
                expected: "an activity type name".to_string(),
                found: describe_value(item).to_string(),
            });
        }
    }
}
