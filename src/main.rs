//! awc CLI - agentic workflow compiler

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;

use awc::compiler::{self, CompileOptions, Compiler, LockState, LockStatus};
use awc::{AwcConfig, AwcError, FixSuggestion, ValidationResult, Validator, Violation};

#[derive(Parser)]
#[command(name = "awc")]
#[command(about = "Compile markdown agentic workflows into locked CI workflows")]
#[command(version)]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile one workflow, or every workflow in the directory
    Compile {
        /// Workflow name or path
        name: Option<String>,

        /// Refetch imports and rewrite lock files even when unchanged
        #[arg(long)]
        force: bool,

        /// Workflows directory
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Validate a workflow without compiling it
    Validate {
        /// Workflow name or path
        name: String,

        #[arg(long, value_enum, default_value = "text")]
        format: Format,

        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// List workflows with their triggers and lock status
    List {
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Create a new workflow from the template
    New {
        name: String,

        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[tokio::main]
async fn main() {
    // Load .env file (ignore if not present)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            print_error(&e);
            std::process::exit(1);
        }
    }
}

fn print_error(e: &anyhow::Error) {
    eprintln!("{} {:#}", "Error:".red().bold(), e);
    if let Some(suggestion) = e.downcast_ref::<AwcError>().and_then(|e| e.fix_suggestion()) {
        eprintln!("  {} {}", "Fix:".yellow(), suggestion);
    }
}

/// `Ok(false)` when diagnostics contained errors
async fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = AwcConfig::load()
        .and_then(AwcConfig::with_env)
        .context("loading configuration")?;
    let workflows_dir = |dir: Option<PathBuf>| dir.unwrap_or_else(|| config.compile.workflows_dir.clone());

    match cli.command {
        Commands::Compile { name, force, dir } => {
            compile(&config, &workflows_dir(dir), name.as_deref(), force).await
        }
        Commands::Validate { name, format, dir } => {
            validate(&config, &workflows_dir(dir), &name, format)
        }
        Commands::List { dir } => list(&config, &workflows_dir(dir)),
        Commands::New { name, dir } => {
            let created = awc::init::new_workflow(&name, &workflows_dir(dir))?;
            println!("{} Created {}", "✓".green(), created.path.display());
            println!("  Next: edit the prompt, then run 'awc compile {}'", name);
            Ok(true)
        }
    }
}

async fn compile(config: &AwcConfig, dir: &Path, name: Option<&str>, force: bool) -> anyhow::Result<bool> {
    let pipeline = Compiler::from_config(config)?;
    let files = match name {
        Some(name) => vec![compiler::find_workflow(dir, name)?],
        None => compiler::workflow_files(dir)
            .with_context(|| format!("listing workflows in {}", dir.display()))?,
    };
    if files.is_empty() {
        println!("{} No workflows in {}", "→".cyan(), dir.display());
        return Ok(true);
    }

    let options = CompileOptions { force };
    let mut ok = true;
    for file in &files {
        // One unreadable file does not stop the rest of the batch
        let outcome = match pipeline
            .compile_file(file, options)
            .await
            .with_context(|| format!("compiling {}", file.display()))
        {
            Ok(outcome) => outcome,
            Err(e) => {
                print_error(&e);
                ok = false;
                continue;
            }
        };
        print_diagnostics(&outcome.result);

        match outcome.lock {
            LockStatus::Written => println!(
                "{} {} → {}",
                "✓".green(),
                file.display(),
                outcome.lock_path.display()
            ),
            LockStatus::Unchanged => println!(
                "{} {} (unchanged)",
                "✓".green(),
                outcome.lock_path.display()
            ),
            LockStatus::Skipped => {
                ok = false;
                println!(
                    "{} {} not compiled: {} error(s)",
                    "✗".red(),
                    file.display(),
                    outcome.result.errors.len()
                );
            }
        }
    }
    Ok(ok)
}

fn validate(config: &AwcConfig, dir: &Path, name: &str, format: Format) -> anyhow::Result<bool> {
    let validator = match &config.compile.rules {
        Some(path) => Validator::from_file(path)?,
        None => Validator::with_builtin_rules()?,
    };
    let path = compiler::find_workflow(dir, name)?;
    let result = validator.validate_file(&path)?;

    match format {
        Format::Json => {
            let report = serde_json::json!({
                "file": result.file_path,
                "valid": result.is_valid(),
                "diagnostics": result.reports(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Format::Text => {
            print_diagnostics(&result);
            if result.is_valid() {
                println!("{} {} is valid", "✓".green(), path.display());
            } else {
                println!(
                    "{} {} has {} error(s)",
                    "✗".red(),
                    path.display(),
                    result.errors.len()
                );
            }
        }
    }
    Ok(result.is_valid())
}

fn list(config: &AwcConfig, dir: &Path) -> anyhow::Result<bool> {
    let validator = match &config.compile.rules {
        Some(path) => Validator::from_file(path)?,
        None => Validator::with_builtin_rules()?,
    };
    let files = compiler::workflow_files(dir)?;
    if files.is_empty() {
        println!("{} No workflows in {}", "→".cyan(), dir.display());
        return Ok(true);
    }

    for file in files {
        let status = compiler::workflow_status(&validator, &file);
        let state = match status.state {
            LockState::Compiled => status.state.to_string().green(),
            LockState::Stale => status.state.to_string().yellow(),
            LockState::NotCompiled => status.state.to_string().dimmed(),
            LockState::Invalid => status.state.to_string().red(),
        };
        let stem = file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        println!(
            "{:<24} {:<14} {}",
            stem.bold(),
            state,
            status.triggers.join(", ")
        );
    }
    Ok(true)
}

fn print_diagnostics(result: &ValidationResult) {
    for error in &result.errors {
        print_violation(&result.file_path, error, "error".red().bold());
    }
    for warning in &result.warnings {
        print_violation(&result.file_path, warning, "warning".yellow().bold());
    }
}

fn print_violation(file: &str, violation: &Violation, label: colored::ColoredString) {
    println!(
        "{}: {}:{}: {}",
        label,
        file,
        violation.location().cyan(),
        violation
    );
    if let Some(suggestion) = violation.suggestion() {
        println!("  {} {}", "Fix:".yellow(), suggestion);
    }
}
