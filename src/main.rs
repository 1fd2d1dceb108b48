//! OfSM Orchestrator - command-line entry point
//!
//! Generates posts and comments on the configured GPU worker pool and
//! manages the persona registry.

mod cli;

use clap::Parser;
use tracing::info;

use ofsm_orchestrator::config::{self, OrchestratorConfig};
use ofsm_orchestrator::error::{Error, ErrorCode, Result};
use ofsm_orchestrator::logging::{self, LogGuards};
use ofsm_orchestrator::persona::{JsonFileStore, Persona, PersonaRegistry};
use ofsm_orchestrator::types::{BatchOutcome, BatchReport};
use ofsm_orchestrator::{version, Orchestrator};

use crate::cli::{Cli, Commands, ConfigSubcommand, GenerateSubcommand, PersonaSubcommand};

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprint!("{}", e.format_for_terminal());
        std::process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<()> {
    // Commands that don't need config or full logging
    match &cli.command {
        Commands::Version => {
            version::print_version();
            return Ok(());
        }
        Commands::Config { subcommand } => {
            logging::init_simple(tracing::Level::WARN)?;
            return handle_config_command(subcommand.clone(), cli.config.as_deref());
        }
        _ => {}
    }

    let config = OrchestratorConfig::load(cli.config.as_deref())?;

    // Keep the guards alive so file logs are flushed on exit
    let log_guards = init_logging_from_config(&config, cli.verbose, cli.quiet)?;

    let build = version::build_info();
    info!(
        version = %build.full_version(),
        backend = %config.backend.kind,
        devices = config.pool.device_count,
        "Starting OfSM orchestrator"
    );

    match cli.command {
        Commands::Persona { subcommand } => handle_persona_command(&config, subcommand),
        Commands::Generate { subcommand } => {
            let runtime = build_runtime()?;
            let outcome = runtime.block_on(run_generate(&config, subcommand))?;
            if matches!(outcome, BatchOutcome::NoContent | BatchOutcome::Degraded) {
                drop(runtime);
                drop(log_guards);
                std::process::exit(ErrorCode::GenerationFailed.exit_code());
            }
            Ok(())
        }
        Commands::Health => {
            let runtime = build_runtime()?;
            runtime.block_on(run_health(&config))
        }
        Commands::Version | Commands::Config { .. } => Ok(()),
    }
}

fn init_logging_from_config(config: &OrchestratorConfig, verbose: u8, quiet: bool) -> Result<LogGuards> {
    logging::init_logging(&config.logging, verbose, quiet)
}

fn build_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(num_cpus::get().clamp(2, 8))
        .thread_name("ofsm-orchestrator")
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create async runtime: {}", e)))
}

fn open_registry(config: &OrchestratorConfig) -> Result<PersonaRegistry> {
    let store = JsonFileStore::new(config.persona_store_path());
    PersonaRegistry::load_or_seed(Box::new(store))
}

// ─────────────────────────────────────────────────────────────────
// Generation
// ─────────────────────────────────────────────────────────────────

/// Run one batch and print it; returns the batch outcome
async fn run_generate(config: &OrchestratorConfig, subcommand: GenerateSubcommand) -> Result<BatchOutcome> {
    let orchestrator = Orchestrator::from_config(config)?;

    let (report, json) = match subcommand {
        GenerateSubcommand::Posts { topic, count, json } => {
            let count = count.unwrap_or_else(|| orchestrator.default_post_count());
            (orchestrator.generate_posts(&topic, count).await, json)
        }
        GenerateSubcommand::Comments { content, personas, json } => {
            let registry = open_registry(config)?;
            let report = if personas.is_empty() {
                orchestrator.generate_comments_for_active(&content, &registry).await
            } else {
                let selected = personas
                    .iter()
                    .map(|name| {
                        registry
                            .find(name)
                            .ok_or_else(|| Error::validation("name", format!("no persona named '{}'", name)))
                    })
                    .collect::<Result<Vec<Persona>>>()?;
                orchestrator.generate_comments(&content, &selected).await
            };
            (report, json)
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(report.outcome())
}

fn print_report(report: &BatchReport) {
    for (i, result) in report.results.iter().enumerate() {
        let who = result
            .job
            .persona_name()
            .map(|n| format!(" {}", n))
            .unwrap_or_default();
        match (&result.sanitized_text, &result.error) {
            (Some(text), _) => println!("[{}]{} {}", i + 1, who, text),
            (None, Some(err)) => eprintln!("[{}]{} failed ({}): {}", i + 1, who, err.code, err.message),
            (None, None) => eprintln!("[{}]{} failed", i + 1, who),
        }
    }
    eprintln!(
        "{} of {} succeeded ({:?})",
        report.success_count(),
        report.results.len(),
        report.outcome()
    );
}

async fn run_health(config: &OrchestratorConfig) -> Result<()> {
    let orchestrator = Orchestrator::from_config(config)?;
    let mut healthy = true;

    for (device_id, health) in orchestrator.health().await {
        let status = if health.operational { "ok" } else { "DOWN" };
        healthy &= health.operational;
        println!(
            "device {}: {} model={} latency={}ms{}",
            device_id,
            status,
            health.model.as_deref().unwrap_or("-"),
            health.latency_ms,
            health.error.map(|e| format!(" ({})", e)).unwrap_or_default()
        );
    }

    if healthy {
        Ok(())
    } else {
        Err(Error::Internal("one or more devices are not operational".to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────
// Personas
// ─────────────────────────────────────────────────────────────────

fn handle_persona_command(config: &OrchestratorConfig, subcommand: PersonaSubcommand) -> Result<()> {
    let registry = open_registry(config)?;

    match subcommand {
        PersonaSubcommand::List { json } => {
            let personas = registry.list();
            if json {
                println!("{}", serde_json::to_string_pretty(&personas)?);
            } else {
                for (i, persona) in personas.iter().enumerate() {
                    println!("{}: {}", i, persona);
                }
            }
        }
        PersonaSubcommand::Add { name, style } => {
            let persona = registry.add(&name, &style)?;
            println!("Added persona {} at index {}", persona.name, registry.len() - 1);
        }
        PersonaSubcommand::Update { index, name, style } => {
            let persona = registry.update(index, &name, &style)?;
            println!("Updated persona {}: {}", index, persona);
        }
        PersonaSubcommand::Delete { index } => {
            let persona = registry.delete(index)?;
            println!("Deleted persona {}", persona.name);
        }
    }

    Ok(())
}

// ─────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────

fn handle_config_command(subcommand: ConfigSubcommand, config_path: Option<&str>) -> Result<()> {
    match subcommand {
        ConfigSubcommand::Show => {
            let cfg = OrchestratorConfig::load(config_path)?;
            println!("{}", toml::to_string_pretty(&cfg)?);
        }
        ConfigSubcommand::Init { path, force } => {
            let written = config::init_config(path.as_deref().or(config_path), force)?;
            println!("Configuration written to {}", written.display());
        }
        ConfigSubcommand::Validate => {
            OrchestratorConfig::load(config_path)?;
            println!("Configuration is valid.");
        }
    }

    Ok(())
}
