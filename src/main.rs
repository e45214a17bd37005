//! prdloop - checklist-driven task loop for a coding agent

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use colored::Colorize;

use prdloop::config::LoopSettings;
use prdloop::history::{
    format_duration_ms, ExportFormat, HistoryExporter, HistoryStore, ReportFormat, ReportPeriod,
};
use prdloop::orchestrator::LoopOrchestrator;
use prdloop::prd::{self, PrdDocument, TaskStats, TaskStatus};
use prdloop::runner::CommandAgent;
use prdloop::ui::{
    SurfaceKind, SurfaceSink, TerminalPrompter, TerminalSink, UiBroadcaster, UiSink,
};
use prdloop::LoopError;

#[derive(Parser)]
#[command(name = "prdloop")]
#[command(version = "0.1.0")]
#[command(about = "Drive a coding agent through a PRD checklist, one task at a time", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Project directory (defaults to current directory)
    #[arg(short, long, global = true, default_value = ".")]
    project: PathBuf,

    /// Completion history file (defaults to the per-user data directory)
    #[arg(long, global = true, env = "PRDLOOP_HISTORY")]
    history: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the task loop until every task is done or the loop is stopped
    Run {
        /// Maximum iterations (0 for unlimited)
        #[arg(short, long)]
        max_iterations: Option<u32>,

        /// Seconds to wait between tasks
        #[arg(short, long)]
        countdown: Option<u32>,

        /// Sidebar-style output: only status, stats and highlighted log lines
        #[arg(long)]
        compact: bool,
    },

    /// List the tasks in the PRD
    Tasks {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write default settings to .prdloop/settings.json
    Init {
        /// Overwrite existing settings
        #[arg(short, long)]
        force: bool,
    },

    /// Productivity report over a period
    Report {
        /// today, week, month or custom
        #[arg(long, default_value = "week")]
        period: ReportPeriod,

        /// First day of a custom period (YYYY-MM-DD)
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Last day of a custom period (YYYY-MM-DD)
        #[arg(long)]
        end: Option<NaiveDate>,

        /// markdown or json
        #[arg(short, long, default_value = "markdown")]
        format: ReportFormat,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Daily completion summaries
    History {
        /// Number of days to show
        #[arg(short, long, default_value = "7")]
        days: u32,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Export the completion history
    Export {
        /// json or csv
        #[arg(short, long, default_value = "json")]
        format: ExportFormat,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "prdloop=debug,info"
    } else {
        "prdloop=info,warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        let Some(err) = e.downcast_ref::<LoopError>() else {
            std::process::exit(1);
        };
        if err.is_input_error() {
            eprintln!("   Run with {} for usage", "--help".cyan());
        }
        std::process::exit(err.exit_code());
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Resolve project path
    let project_path = cli.project.canonicalize().unwrap_or(cli.project.clone());

    if !project_path.is_dir() {
        anyhow::bail!(
            "Project directory does not exist: {}",
            project_path.display()
        );
    }

    let history = cli
        .history
        .clone()
        .map_or_else(HistoryStore::at_default_location, HistoryStore::new);

    match cli.command {
        Commands::Run {
            max_iterations,
            countdown,
            compact,
        } => {
            let mut settings = LoopSettings::load(&project_path)?;
            if let Some(max) = max_iterations {
                settings.max_iterations = max;
            }
            if let Some(seconds) = countdown {
                settings.countdown_seconds = seconds;
            }
            run_loop(&project_path, settings, history, compact).await;
        }

        Commands::Tasks { json } => {
            let settings = LoopSettings::load(&project_path)?;
            let document = PrdDocument::new(settings.prd_path(&project_path));
            let content = document
                .try_read()
                .await
                .map_err(|_| LoopError::MissingDocument {
                    path: document.path().to_path_buf(),
                })?;
            let tasks = prd::parse(&content);

            if json {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else {
                for task in &tasks {
                    let marker = match task.status {
                        TaskStatus::Complete => "x".green(),
                        TaskStatus::InProgress => "~".cyan(),
                        TaskStatus::Blocked => "!".red(),
                        TaskStatus::Skipped => "s".dimmed(),
                        TaskStatus::Pending => " ".normal(),
                    };
                    println!("[{}] {:<9} {}", marker, task.id, task.title());
                }
                print_stats(&TaskStats::from_tasks(&tasks));
            }
        }

        Commands::Init { force } => {
            let path = LoopSettings::settings_path(&project_path);
            if path.exists() && !force {
                eprintln!(
                    "{} {} already exists. Use --force to overwrite.",
                    "Warning:".yellow().bold(),
                    path.display()
                );
                std::process::exit(1);
            }
            LoopSettings::default().save(&project_path)?;
            println!("{} Wrote {}", "OK".green().bold(), path.display());
        }

        Commands::Report {
            period,
            start,
            end,
            format,
            output,
        } => {
            let report = history.generate_report(period, start, end)?;
            let content = HistoryExporter::render_report(&report, format)?;
            emit(&content, output.as_deref())?;
        }

        Commands::History { days, json } => {
            let summaries = history.daily_summaries(days);
            if json {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            } else {
                println!("\n{} Last {} days", "History:".cyan().bold(), days);
                println!("{}", "─".repeat(40));
                for day in summaries.iter().filter(|d| d.total_tasks > 0) {
                    println!(
                        "   {}  {:>3} tasks  {:>8}  avg {}",
                        day.date,
                        day.total_tasks,
                        format_duration_ms(day.total_duration_ms),
                        format_duration_ms(day.average_duration_ms)
                    );
                }
                let total: usize = summaries.iter().map(|d| d.total_tasks).sum();
                println!("   Total: {} tasks", total);
            }
        }

        Commands::Export { format, output } => {
            let content = HistoryExporter::export(&history.records(), format)?;
            emit(&content, output.as_deref())?;
        }
    }

    Ok(())
}

/// Run the loop headless until it goes idle or Ctrl-C stops it.
async fn run_loop(
    project_path: &Path,
    settings: LoopSettings,
    history: HistoryStore,
    compact: bool,
) {
    let sink: Arc<dyn UiSink> = if compact {
        let terminal = TerminalSink::new();
        let sidebar = SurfaceSink::new(SurfaceKind::Sidebar, move |m| terminal.deliver(m));
        sidebar.set_visible(true);
        Arc::new(sidebar)
    } else {
        Arc::new(TerminalSink::new())
    };

    let agent = Arc::new(CommandAgent::new(settings.agent.clone(), project_path));
    let mut orchestrator =
        LoopOrchestrator::new(project_path, settings, agent, Arc::new(TerminalPrompter))
            .with_history(history)
            .with_ui(UiBroadcaster::new().with_sink(sink));

    let handle = orchestrator.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.shutdown();
        }
    });

    orchestrator.start().await;
    while orchestrator.is_running() && orchestrator.step().await {}
}

fn print_stats(stats: &TaskStats) {
    println!("{}", "─".repeat(40));
    println!(
        "   {} total, {} done, {} pending, {} blocked, {} skipped ({:.0}%)",
        stats.total,
        stats.complete,
        stats.actionable(),
        stats.blocked,
        stats.skipped,
        stats.percent_done()
    );
}

fn emit(content: &str, output: Option<&Path>) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)?;
            println!("{} Wrote {}", "OK".green().bold(), path.display());
        }
        None => println!("{content}"),
    }
    Ok(())
}
