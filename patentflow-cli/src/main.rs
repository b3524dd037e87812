//! Patentflow CLI - drafts a patent application from one document
//!
//! Usage:
//!   patentflow run <document>      Run all nine stages on a document
//!   patentflow stages              Print the stage table
//!   patentflow check <project-id>  Validate every stage's outputs

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use patentflow::prelude::*;
use patentflow::coordinator::DATA_DIR;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "patentflow")]
#[command(author, version, about = "Draft a patent application with a pipeline of agent stages")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Configuration file (JSON)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Workspace root (overrides the configuration)
    #[arg(long, global = true, value_name = "DIR")]
    workspace: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline on a document
    Run {
        /// The invention disclosure to draft from
        document: PathBuf,

        /// Project id (defaults to the current Unix timestamp)
        #[arg(long)]
        project_id: Option<String>,

        /// Model name (deepseek-chat, gpt-5, gpt-5-mini)
        #[arg(long)]
        model: Option<String>,
    },

    /// Print the stage table
    Stages,

    /// Validate the required outputs of every stage in a project
    Check {
        /// Project id, as in temp_<id>
        project_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs);

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    config = config.apply_env().context("applying environment overrides")?;
    if let Some(root) = cli.workspace {
        config = config.with_workspace_root(root);
    }

    match cli.command {
        Commands::Run {
            document,
            project_id,
            model,
        } => {
            if let Some(name) = model {
                config = config.with_model(ModelConfig::for_model(&name)?);
            }
            run(config, &document, project_id).await
        }
        Commands::Stages => {
            print_stages();
            Ok(ExitCode::SUCCESS)
        }
        Commands::Check { project_id } => check(&config, &project_id),
    }
}

fn init_logging(verbose: bool, json: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(config: PipelineConfig, document: &Path, project_id: Option<String>) -> Result<ExitCode> {
    let store = Arc::new(
        ArtifactStore::open(&config.workspace_root)
            .with_context(|| format!("opening workspace {}", config.workspace_root.display()))?,
    );
    let staged = stage_document(&store, document)?;

    let providers = CapabilityProviders::from_config(&config, Arc::clone(&store));
    let client: Arc<dyn ChatClient> =
        Arc::new(OpenAiClient::from_config(&config.model).context("configuring the model client")?);
    let workers = WorkerSet::agents(&config, &providers, client)?;
    let bridge = ExecutionBridge::new(PipelineCoordinator::new(config, store, workers)?);

    let events = bridge.start(staged, project_id)?;
    let handle = events.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            handle.cancel("interrupted");
        }
    });

    let printer = bridge.clone();
    let state = tokio::task::spawn_blocking(move || {
        let mut failure = None;
        for event in events {
            match event {
                Ok(event) => render(&event),
                Err(err) => failure = Some(err),
            }
        }
        (printer.wait(), failure)
    })
    .await
    .context("event loop panicked")?;

    match state {
        (RunState::FinishedSuccess, _) => {
            if let Some(report) = bridge.report() {
                println!();
                println!(
                    "Project {} finished: {} delegations, {} ms",
                    report.project.id(),
                    report.delegations,
                    report.duration_ms()
                );
                for artifact in &report.artifacts {
                    let short = artifact.sha256.get(..12).unwrap_or(&artifact.sha256);
                    println!("  {short}  {:>8} B  {}", artifact.bytes, artifact.path.display());
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        (RunState::Cancelled, _) => {
            eprintln!("Run cancelled.");
            Ok(ExitCode::from(130))
        }
        (_, Some(err)) => {
            eprintln!("Run failed: {err}");
            Ok(ExitCode::FAILURE)
        }
        (other, None) => bail!("run ended in state {other} without an error"),
    }
}

/// Copies the document into `<workspace>/data/` and returns its file name.
fn stage_document(store: &ArtifactStore, document: &Path) -> Result<PathBuf> {
    let name = document
        .file_name()
        .with_context(|| format!("{} has no file name", document.display()))?;
    let data = store.root().join(DATA_DIR);
    std::fs::create_dir_all(&data).with_context(|| format!("creating {}", data.display()))?;

    let target = data.join(name);
    let source = document
        .canonicalize()
        .with_context(|| format!("reading {}", document.display()))?;
    if source != target {
        std::fs::copy(&source, &target)
            .with_context(|| format!("copying {} into {}", source.display(), data.display()))?;
    }
    info!(document = %target.display(), "document staged");
    Ok(PathBuf::from(name))
}

fn render(event: &ProgressEvent) {
    match event {
        ProgressEvent::Todos { stage: None, todos } => {
            println!("{}", TodoList::from(todos.clone()).summary());
            for item in todos {
                let mark = match item.status {
                    TodoStatus::Pending => "[ ]",
                    TodoStatus::InProgress => "[>]",
                    TodoStatus::Completed => "[x]",
                    TodoStatus::Cancelled => "[-]",
                };
                println!("  {mark} {}", item.content);
            }
        }
        ProgressEvent::Todos {
            stage: Some(stage),
            todos,
        } => println!("  {stage}: {}", TodoList::from(todos.clone()).summary()),
        ProgressEvent::Message { stage: Some(stage), text } => println!("  {stage}: {text}"),
        ProgressEvent::Message { stage: None, text } => println!("{text}"),
    }
}

fn print_stages() {
    for (index, def) in stages().iter().enumerate() {
        println!("{}. {} ({}/, {:?} temperature)", index + 1, def.name, def.dir, def.tier);
        let inputs: Vec<_> = def.inputs.iter().map(|input| input.name()).collect();
        let caps: Vec<_> = def.capabilities.iter().map(ToString::to_string).collect();
        println!("   inputs:       {}", inputs.join(", "));
        println!("   outputs:      {}", def.outputs.join(", "));
        println!("   capabilities: {}", caps.join(", "));
    }
}

fn check(config: &PipelineConfig, project_id: &str) -> Result<ExitCode> {
    let store = ArtifactStore::open(&config.workspace_root)?;
    let project = Project::new(project_id, store.root())?;
    if !project.root().is_dir() {
        bail!("no project at {}", project.root().display());
    }

    let complete = audit(&store, &project, &mut std::io::stdout().lock())?;
    Ok(if complete {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Writes one line per stage and returns whether every stage is clean.
fn audit(store: &ArtifactStore, project: &Project, out: &mut impl Write) -> Result<bool> {
    let mut complete = true;
    for def in stages() {
        let report = validate_outputs(store, project, def);
        if report.is_clean() {
            writeln!(out, "ok    {}", def.name)?;
        } else {
            complete = false;
            writeln!(out, "FAIL  {}: {}", def.name, report.reason())?;
        }
    }
    Ok(complete)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn audit_lines(store: &ArtifactStore, project: &Project) -> (bool, Vec<String>) {
        let mut out = Vec::new();
        let complete = audit(store, project, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        (complete, text.lines().map(str::to_string).collect())
    }

    #[test]
    fn test_audit_reports_malformed_json() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        let project = Project::new("p1", store.root()).unwrap();
        store
            .write_text(project.artifact_path("01_input", "parsed_info.json"), "{not json")
            .unwrap();

        let (complete, lines) = audit_lines(&store, &project);
        assert!(!complete);
        assert_eq!(lines.len(), stages().len());
        assert!(lines[0].starts_with("FAIL  input_parser: "));
        assert!(lines[0].contains("parsed_info.json"));
    }

    #[test]
    fn test_audit_passes_complete_project() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        let project = Project::new("p1", store.root()).unwrap();
        for def in stages() {
            for path in def.output_paths(&project) {
                let body = if path.extension().is_some_and(|e| e == "json") {
                    "{}"
                } else {
                    "text"
                };
                store.write_text(&path, body).unwrap();
            }
        }

        let (complete, lines) = audit_lines(&store, &project);
        assert!(complete);
        assert!(lines.iter().all(|line| line.starts_with("ok    ")));
    }
}
