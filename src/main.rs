use std::path::Path;
use std::sync::{Arc, Mutex};

use adaptive_analyzer::agents::{run_agents_list, run_agents_show};
use adaptive_analyzer::cli::{AgentCommands, Cli, Commands, ProfileCommands, command_label};
use adaptive_analyzer::config::{
    Credentials, RuntimeConfig, load_profiles, resolve_runtime_config, run_profiles_list,
    run_profiles_show,
};
use adaptive_analyzer::controller::{AdaptiveController, ControllerError, RunOutcome};
use adaptive_analyzer::doctor::run_doctor;
use adaptive_analyzer::error::{categorize_error, format_cli_error};
use adaptive_analyzer::interactive::{Console, is_wordy, validate_product_name};
use adaptive_analyzer::provider::resolve_model;
use adaptive_analyzer::report::save_report;
use adaptive_analyzer::search::SerperClient;
use adaptive_analyzer::telemetry::TelemetrySink;
use adaptive_analyzer::theme::{
    BOLD, BOLD_GREEN, DIM, GREEN, RESET, print_failure, print_progress, print_results,
    print_startup_banner, render_interrupted, render_strategy_menu, rule,
};
use adaptive_analyzer::workflow::{AnalysisPipeline, current_month_year, run_analysis};
use anyhow::{Context, Result};
use clap::Parser;
use tracing::level_filters::LevelFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let show_sensitive_config = cli.show_sensitive_config;
    if let Err(err) = run_cli(cli).await {
        eprintln!("{}", format_cli_error(&err, show_sensitive_config));
        tracing::error!(category = %categorize_error(&err).code(), error = %err, "command failed");
        std::process::exit(1);
    }

    Ok(())
}

async fn run_cli(cli: Cli) -> Result<()> {
    init_tracing(&cli.log_filter)?;
    let profiles = load_profiles(&cli.config_path)?;
    let cfg = resolve_runtime_config(&cli, &profiles)?;
    let command = cli.command.unwrap_or_else(Commands::interactive);
    let telemetry = TelemetrySink::new(&cfg, command_label(&command));
    tracing::info!(profile = %cfg.profile, model = %cfg.model, "resolved runtime configuration");

    match command {
        Commands::Analyze { product, yes, save } => {
            run_analyze(&cfg, &telemetry, product, yes, save).await?;
        }
        Commands::Doctor { probe } => {
            run_doctor(&cfg, probe).await?;
        }
        Commands::Strategies => {
            println!("{}", render_strategy_menu(&cfg.strategies));
            println!(
                "Retries per strategy: {} (base {}s, doubling, max {}s, overload floor {}s)",
                cfg.retry.max_retries,
                cfg.retry.base_delay.as_secs(),
                cfg.retry.max_delay.as_secs(),
                cfg.retry.overload_floor.as_secs()
            );
        }
        Commands::Agents { command } => match command {
            AgentCommands::List => run_agents_list()?,
            AgentCommands::Show { name } => run_agents_show(name)?,
        },
        Commands::Profiles { command } => match command {
            ProfileCommands::List => run_profiles_list(&profiles, &cfg)?,
            ProfileCommands::Show => run_profiles_show(&cfg)?,
        },
    }

    Ok(())
}

async fn run_analyze(
    cfg: &RuntimeConfig,
    telemetry: &TelemetrySink,
    product: Option<String>,
    yes: bool,
    save: bool,
) -> Result<()> {
    print_startup_banner(&cfg.model);
    let credentials = Credentials::from_env().context("startup check failed")?;
    println!("{GREEN}✓{RESET} API keys found");

    let model = resolve_model(cfg, &credentials.google_api_key)?;
    let search = Arc::new(SerperClient::new(
        credentials.serper_api_key.clone(),
        cfg.serper_base_url.clone(),
        cfg.request_timeout,
    )?);

    // Ctrl+C exits 0 with a notice, at a prompt or mid-run.
    let interrupted_product = Arc::new(Mutex::new(None));
    spawn_interrupt_watcher(telemetry.clone(), interrupted_product.clone());

    let mut console = Console::stdio();
    let product = match product {
        Some(raw) => {
            let name = validate_product_name(&raw)?;
            if !yes {
                if is_wordy(&name) && !console.confirm("Long product name. Continue anyway?")? {
                    println!("Analysis cancelled.");
                    return Ok(());
                }
                if !console.confirm(&format!("Start analysis of '{name}'?"))? {
                    println!("Analysis cancelled.");
                    return Ok(());
                }
            }
            name
        }
        None => {
            println!("{}", render_strategy_menu(&cfg.strategies));
            console.read_product_name()?
        }
    };

    if let Ok(mut slot) = interrupted_product.lock() {
        *slot = Some(product.clone());
    }

    println!();
    println!("{DIM}• The analyzer adapts automatically if APIs are slow or overloaded{RESET}");
    println!("{DIM}• Press Ctrl+C to interrupt{RESET}");
    println!();
    println!("{BOLD}Starting adaptive analysis for '{product}'{RESET}");
    println!("{}", rule());

    let controller = AdaptiveController::new(cfg.strategies.clone(), cfg.retry.clone())?;
    let pipeline = AnalysisPipeline::new(
        model,
        search,
        product.clone(),
        cfg.search_results,
        current_month_year(),
    );

    let mut on_event = print_progress;
    let report = run_analysis(&controller, &pipeline, telemetry, &mut on_event).await;

    if let RunOutcome::Succeeded {
        strategy, output, ..
    } = &report.outcome
    {
        print_results(output);
        println!("{}", rule());
        println!("{DIM}Completed with {strategy}.{RESET}");

        let should_save = save || (!yes && console.confirm("\nSave results to file?")?);
        if should_save {
            let path = save_report(Path::new(&cfg.output_dir), &product, output)?;
            println!("Results saved to: {}", path.display());
        }
        println!();
        println!("{BOLD_GREEN}Analysis completed successfully!{RESET}");
        return Ok(());
    }

    print_failure(&report);
    // Exhaustion is a reported outcome; only a fatal abort fails the command.
    match report.into_result() {
        Err(err @ ControllerError::Aborted { .. }) => Err(err.into()),
        _ => Ok(()),
    }
}

fn spawn_interrupt_watcher(telemetry: TelemetrySink, product: Arc<Mutex<Option<String>>>) {
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "failed to listen for Ctrl+C");
            return;
        }
        let product = product.lock().map(|slot| slot.clone()).unwrap_or_default();
        telemetry.emit_interrupted(product.as_deref());
        println!("{}", render_interrupted());
        std::process::exit(0);
    });
}

fn init_tracing(log_filter: &str) -> Result<()> {
    let level = log_filter
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::ERROR);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_env_filter(log_filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing subscriber: {e}"))
}
