//! CLI binary for linting, linearizing, and running form-filling graphs, and
//! for running invitation campaigns.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use filler_campaign::{BrowserPortal, CampaignConfig, CampaignRunner, CampaignSink};
use filler_chromium::{ChromiumConfig, ChromiumSession};
use filler_engine::action::ensure_runnable;
use filler_engine::{
    load_actions, preflight, Action, AutoContinue, ConsoleBreakpoint, EngineConfig,
    JsonDataSource, PreflightOptions, ProgressUpdate, WebFiller,
};
use filler_graph::{FillerGraph, GraphDocument, Severity};

#[derive(Parser)]
#[command(name = "filler", version, about = "Declarative form filling over a headless browser")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Lint a graph document
    Validate {
        /// Path to the graph .json file
        graph: PathBuf,

        /// Named patch to overlay on the base nodes
        #[arg(long)]
        patch: Option<String>,
    },

    /// Show information about a graph document
    Info {
        graph: PathBuf,

        #[arg(long)]
        patch: Option<String>,
    },

    /// Linearize a graph against a data file and print the action list
    Preflight {
        graph: PathBuf,

        /// JSON data the graph's keys are looked up in
        #[arg(short, long)]
        data: PathBuf,

        #[arg(long)]
        patch: Option<String>,

        /// Stop after the node with this name
        #[arg(long)]
        pause_at: Option<String>,

        /// Write the actions here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Fill a form in a browser, from a graph plus data or from an action list
    Run {
        /// Path to the graph .json file
        #[arg(required_unless_present = "actions")]
        graph: Option<PathBuf>,

        #[arg(short, long, requires = "graph")]
        data: Option<PathBuf>,

        /// Pre-computed action list (output of `preflight`)
        #[arg(long, conflicts_with = "graph")]
        actions: Option<PathBuf>,

        #[arg(long)]
        patch: Option<String>,

        #[arg(long)]
        pause_at: Option<String>,

        /// Engine settings file (timeouts, delays, limits)
        #[arg(short, long, env = "FILLER_ENGINE_CONFIG")]
        config: Option<PathBuf>,

        /// Show the browser window
        #[arg(long)]
        headed: bool,

        /// Per-operation timeout in milliseconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Directory for failure screenshots
        #[arg(long, env = "FILLER_SCREENSHOT_DIR")]
        screenshots: Option<PathBuf>,

        /// Wait for Enter at every pause without a duration
        #[arg(long)]
        step: bool,
    },

    /// Invite candidates for the job posts in a campaign file
    Invite {
        #[arg(short, long, env = "FILLER_CAMPAIGN")]
        config: PathBuf,

        #[arg(long)]
        headed: bool,
    },

    /// Shift node ids at or above FROM by BY
    Renumber {
        graph: PathBuf,

        #[arg(long)]
        from: u32,

        #[arg(long)]
        by: u32,

        /// Write here instead of overwriting the input
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Validate { graph, patch } => {
            cmd_validate(&graph, patch.as_deref())?;
        }
        Commands::Info { graph, patch } => {
            cmd_info(&graph, patch.as_deref())?;
        }
        Commands::Preflight {
            graph,
            data,
            patch,
            pause_at,
            output,
        } => {
            cmd_preflight(&graph, &data, patch.as_deref(), pause_at, output.as_deref())?;
        }
        Commands::Run {
            graph,
            data,
            actions,
            patch,
            pause_at,
            config,
            headed,
            timeout,
            screenshots,
            step,
        } => {
            let actions = match (actions, graph) {
                (Some(path), _) => load_actions(&path)?,
                (None, Some(graph)) => {
                    let data = data.ok_or_else(|| anyhow::anyhow!("--data is required with a graph"))?;
                    linearize(&graph, &data, patch.as_deref(), pause_at)?
                }
                (None, None) => anyhow::bail!("either a graph or --actions is required"),
            };
            let mut engine = match config {
                Some(path) => EngineConfig::load(&path)?,
                None => EngineConfig::default(),
            };
            if let Some(ms) = timeout {
                engine.timeout_ms = ms;
            }
            if let Some(dir) = screenshots {
                engine.screenshot_dir = dir;
            }
            cmd_run(actions, engine, headed, step).await?;
        }
        Commands::Invite { config, headed } => {
            cmd_invite(&config, headed).await?;
        }
        Commands::Renumber {
            graph,
            from,
            by,
            output,
        } => {
            cmd_renumber(&graph, from, by, output.as_deref())?;
        }
    }

    Ok(())
}

fn cmd_validate(path: &Path, patch: Option<&str>) -> anyhow::Result<()> {
    let graph = FillerGraph::load(path, patch)?;
    let diagnostics = filler_graph::validate(&graph);

    if diagnostics.is_empty() {
        println!("Graph is valid");
        return Ok(());
    }

    let mut has_error = false;
    for diag in &diagnostics {
        let severity = match diag.severity {
            Severity::Error => {
                has_error = true;
                "ERROR"
            }
            Severity::Warning => "WARN",
            Severity::Info => "INFO",
        };
        println!("[{}] {}: {}", severity, diag.rule, diag.message);
        if let Some(fix) = &diag.fix {
            println!("        fix: {fix}");
        }
    }

    if has_error {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_info(path: &Path, patch: Option<&str>) -> anyhow::Result<()> {
    let graph = FillerGraph::load(path, patch)?;

    println!("Graph: {}", path.display());
    println!("Nodes: {}", graph.len());
    let transitions: usize = graph.nodes().map(|n| n.transitions.len()).sum();
    println!("Transitions: {}", transitions);
    if let Some(entrance) = graph.entrance() {
        println!("Entrance: {} ({})", entrance.id, entrance.name);
    }

    println!("\nNodes:");
    for node in graph.nodes() {
        let action = node.action.map(|k| k.as_str()).unwrap_or("(none)");
        let mut flags = Vec::new();
        if node.is_optional {
            flags.push("optional");
        }
        if node.skip {
            flags.push("skip");
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", flags.join(","))
        };
        println!(
            "  {} {} action={} data={}{}",
            node.id,
            node.name,
            action,
            node.data.as_ref().map(|d| d.to_string()).unwrap_or_default(),
            flags
        );
    }
    Ok(())
}

fn linearize(
    graph: &Path,
    data: &Path,
    patch: Option<&str>,
    pause_at: Option<String>,
) -> anyhow::Result<Vec<Action>> {
    let graph = FillerGraph::load(graph, patch)?;
    filler_graph::validate_or_raise(&graph)?;
    let source = JsonDataSource::load(data)?;
    let options = PreflightOptions {
        pause_at,
        ..Default::default()
    };
    Ok(preflight(&graph, &source, options)?)
}

fn cmd_preflight(
    graph: &Path,
    data: &Path,
    patch: Option<&str>,
    pause_at: Option<String>,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let actions = linearize(graph, data, patch, pause_at)?;
    let json = serde_json::to_string_pretty(&actions)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)?;
            println!("Wrote {} actions to {}", actions.len(), path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

async fn cmd_run(actions: Vec<Action>, engine: EngineConfig, headed: bool, step: bool) -> anyhow::Result<()> {
    ensure_runnable(&actions)?;

    let browser = ChromiumConfig {
        timeout_ms: engine.timeout_ms,
        ..ChromiumConfig::default()
    }
    .headed(headed);
    let session = ChromiumSession::launch(browser).await?;

    let filler = WebFiller::new(engine).progress(|update: ProgressUpdate| {
        let message = &update.message;
        match &message.error {
            Some(error) => tracing::error!(progress = update.progress, error = %error, "Action failed"),
            None => tracing::info!(
                progress = update.progress,
                action = %message.action,
                name = %message.name,
                "Progress"
            ),
        }
    });
    let filler = if step {
        filler.breakpoint(ConsoleBreakpoint)
    } else {
        filler.breakpoint(AutoContinue)
    };

    let outcome = filler.run(&actions, &session).await;
    if let Err(e) = session.close().await {
        tracing::warn!(error = %e, "Browser did not close cleanly");
    }
    let summary = outcome?;

    println!("Completed {} steps", summary.steps);
    if let Some(url) = &summary.summary_url {
        println!("Summary: {url}");
    }
    if !summary.context.is_empty() {
        println!("{}", serde_json::to_string_pretty(&summary.context)?);
    }
    Ok(())
}

struct LogSink;

impl CampaignSink for LogSink {
    fn job_started(&self, index: usize, total: usize, job_post_id: &str) {
        println!("Job post {job_post_id} ({}/{total})", index + 1);
    }

    fn candidate(&self, row: usize, total: usize) {
        tracing::debug!(row, total, "Checking candidate");
    }

    fn job_finished(&self, job_post_id: &str, invited: usize) {
        println!("Job post {job_post_id}: {invited} invitation(s) sent");
    }
}

async fn cmd_invite(path: &Path, headed: bool) -> anyhow::Result<()> {
    let mut config = CampaignConfig::load(path)?;
    if headed {
        config.headless = false;
    }
    config.validate()?;

    let browser = ChromiumConfig {
        headless: config.headless,
        timeout_ms: config.timeout_ms,
        ..ChromiumConfig::default()
    };
    let session = ChromiumSession::launch(browser).await?;
    let portal = BrowserPortal::new(session, &config);

    let outcome = CampaignRunner::new(&portal, &config)
        .sink(&LogSink)
        .run(&config)
        .await;
    if let Err(e) = portal.into_session().close().await {
        tracing::warn!(error = %e, "Browser did not close cleanly");
    }
    let report = outcome?;

    println!("{}", report.summary());
    for error in &report.errors {
        println!("  error: {error}");
    }
    Ok(())
}

fn cmd_renumber(path: &Path, from: u32, by: u32, output: Option<&Path>) -> anyhow::Result<()> {
    let doc: GraphDocument = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    let mut graph = FillerGraph::from_document(&doc, None)?;
    let moved = graph.renumber(from, by)?;

    // Patches are carried over verbatim; their ids are not shifted.
    let mut out = graph.to_document();
    out.patches = doc.patches;
    if !out.patches.is_empty() {
        tracing::warn!(patches = out.patches.len(), "Patch node ids were left unchanged");
    }
    let target = output.unwrap_or(path);
    std::fs::write(target, serde_json::to_string_pretty(&out)?)?;
    println!("Renumbered {moved} node(s) into {}", target.display());
    Ok(())
}
