//! Resinker CLI
//!
//! Run, validate, or inspect a simulation spec.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use resinker_core::{load_spec, validate_spec, CommerceProvider, DiagnosticLevel, SpecDocument};
use resinker_sim::{run_simulation, EngineOptions};

/// Configuration-driven simulator for realistic event streams.
#[derive(Parser, Debug)]
#[command(name = "resinker")]
#[command(about = "Synthesize realistic, stateful event streams from a YAML spec")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a simulation
    Run {
        /// Path to the YAML spec file
        #[arg(short = 'c', long = "config")]
        config: PathBuf,

        /// Enable verbose logging
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a spec file and report every error found
    Validate {
        /// Path to the YAML spec file
        #[arg(short = 'c', long = "config")]
        config: PathBuf,
    },

    /// Summarize what a spec file declares
    Info {
        /// Path to the YAML spec file
        #[arg(short = 'c', long = "config")]
        config: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn load_validated(config: &PathBuf) -> Result<SpecDocument, ()> {
    let spec = match load_spec(config) {
        Ok(spec) => spec,
        Err(e) => {
            error!("failed to load spec: {e}");
            return Err(());
        }
    };
    let errors = validate_spec(&spec);
    if !errors.is_empty() {
        for e in &errors {
            error!("validation: {e}");
        }
        error!("spec failed validation with {} error(s)", errors.len());
        return Err(());
    }
    Ok(spec)
}

async fn run_command(config: PathBuf, verbose: bool) -> i32 {
    init_tracing(verbose);
    info!(config = %config.display(), "loading spec");
    let Ok(spec) = load_validated(&config) else {
        return 1;
    };

    // First signal: cooperative stop after the current commit. Second
    // signal: hard abort.
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, finishing current commit and flushing sinks");
                shutdown.store(true, Ordering::Relaxed);
            }
            if tokio::signal::ctrl_c().await.is_ok() {
                error!("second interrupt, aborting");
                std::process::exit(1);
            }
        });
    }

    match run_simulation(
        spec,
        Box::new(CommerceProvider::new()),
        EngineOptions::default(),
        shutdown,
    )
    .await
    {
        Ok(outcome) => {
            for diagnostic in &outcome.diagnostics {
                match diagnostic.level {
                    DiagnosticLevel::Error => error!("{}", diagnostic.message),
                    DiagnosticLevel::Warning => warn!("{}", diagnostic.message),
                    DiagnosticLevel::Info => info!("{}", diagnostic.message),
                }
            }
            info!(
                "emitted {} events in {:.2}s ({})",
                outcome.report.events_emitted,
                outcome.report.duration_observed.as_secs_f64(),
                outcome.report.termination_reason
            );
            0
        }
        Err(e) => {
            error!("simulation failed: {e}");
            1
        }
    }
}

fn validate_command(config: PathBuf) -> i32 {
    init_tracing(false);
    info!(config = %config.display(), "validating spec");
    match load_validated(&config) {
        Ok(spec) => {
            info!(version = %spec.version, "spec is valid");
            0
        }
        Err(()) => 1,
    }
}

fn info_command(config: PathBuf) -> i32 {
    init_tracing(false);
    let Ok(spec) = load_validated(&config) else {
        return 1;
    };

    println!("Resinker spec: {}", config.display());
    println!("  version:      {}", spec.version);

    let settings = &spec.simulation_settings;
    println!(
        "  duration:     {}",
        settings.duration.as_deref().unwrap_or("unbounded")
    );
    println!(
        "  total events: {}",
        settings
            .total_events
            .map_or_else(|| "unbounded".to_string(), |n| n.to_string())
    );
    println!(
        "  random seed:  {}",
        settings
            .random_seed
            .map_or_else(|| "from entropy".to_string(), |s| s.to_string())
    );
    println!("  start time:   {}", settings.time_progression.start_time);

    if !settings.initial_entity_counts.is_empty() {
        println!("  initial entities:");
        for (kind, count) in &settings.initial_entity_counts {
            println!("    {kind}: {count}");
        }
    }

    println!("  schemas:      {}", spec.schemas.len());
    println!("  entities:     {}", spec.entities.len());
    for kind in spec.entities.keys() {
        println!("    - {kind}");
    }
    println!("  event types:  {}", spec.event_types.len());
    for name in spec.event_types.keys() {
        println!("    - {name}");
    }
    if !spec.scenarios.is_empty() {
        println!("  scenarios:    {}", spec.scenarios.len());
        for name in spec.scenarios.keys() {
            println!("    - {name}");
        }
    }
    if !spec.outputs.is_empty() {
        println!("  outputs:      {}", spec.outputs.len());
        for output in &spec.outputs {
            let state = if output.enabled() { "enabled" } else { "disabled" };
            println!("    - {} ({state})", output.kind());
        }
    }
    0
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = match cli.command {
        Commands::Run { config, verbose } => run_command(config, verbose).await,
        Commands::Validate { config } => validate_command(config),
        Commands::Info { config } => info_command(config),
    };
    if code != 0 {
        std::process::exit(code);
    }
}
