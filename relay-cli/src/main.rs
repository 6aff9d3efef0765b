// relay-cli/src/main.rs
mod display;
mod models;
mod repl;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use colored::*;
use relay_core::{
    ArtifactWriter, InMemoryChatHistoryStore, InMemorySettingsStore, ModelCatalog, ModelRanker, ProviderRouter,
    RankQuery, RelayConfig, RelayService, ReplyLimits, ResilientChatClient,
};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{Level, error, info};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, time::LocalTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::display::{print_build_outcome, print_delivery, print_ranking, print_response_meta, spinner};
use crate::models::cli::{Cli, Commands};

const CONFIG_FILENAME: &str = "Relay.toml";
const LOG_FILE_NAME: &str = "relay.log";

/// Walks up from `start` to the nearest directory holding `Relay.toml`.
fn find_config(start: &Path) -> Result<PathBuf> {
    let mut current = start;
    loop {
        let config_path = current.join(CONFIG_FILENAME);
        if config_path.is_file() {
            return Ok(config_path);
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => {
                return Err(anyhow!(
                    "Could not find '{}' in current directory or any parent directory.",
                    CONFIG_FILENAME
                ));
            }
        }
    }
}

fn load_config(explicit: Option<&Path>) -> Result<RelayConfig> {
    let config_path = match explicit {
        Some(path) => path.to_path_buf(),
        None => find_config(&env::current_dir().context("Failed to get current directory")?)?,
    };
    info!("Found configuration file at: {:?}", config_path);
    let content = fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read config file: {:?}", config_path))?;
    let config = RelayConfig::from_toml_str(&content).context("Failed to parse or validate configuration content")?;
    let base_dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok(config.with_base_dir(&base_dir))
}

fn build_service(config: &RelayConfig) -> Result<RelayService> {
    let catalog = ModelCatalog::load(&config.catalog_path)
        .with_context(|| format!("Failed to load model catalog from {:?}", config.catalog_path))?;
    let http_client = reqwest::Client::builder()
        .build()
        .context("Failed to build HTTP client")?;
    let router = ProviderRouter::from_config(config, http_client, |name| env::var(name).ok())
        .context("Failed to set up provider adapters")?;
    let writer = ArtifactWriter::new(&config.artifacts_dir).context("Failed to prepare artifacts directory")?;

    Ok(RelayService::new(
        ResilientChatClient::from_config(router, config),
        Arc::new(catalog),
        Arc::new(InMemorySettingsStore::new(config.default_model.clone())),
        Arc::new(InMemoryChatHistoryStore::new(config.history_limit)),
        writer,
        ReplyLimits::from_config(config),
    ))
}

async fn run_command(service: &RelayService, owner_id: &str, command: Option<Commands>) -> Result<()> {
    match command {
        None => repl::run_interactive(service, owner_id).await,
        Some(Commands::Chat { text }) => {
            let pb = spinner("Thinking...")?;
            let outcome = service.chat(owner_id, &text.join(" ")).await;
            pb.finish_and_clear();
            let outcome = outcome?;
            print_response_meta(&outcome.response);
            print_delivery(&outcome.delivery);
            Ok(())
        }
        Some(Commands::Build { text }) => {
            let pb = spinner("Generating your code...")?;
            let outcome = service.build(owner_id, &text.join(" ")).await;
            pb.finish_and_clear();
            print_build_outcome(&outcome?);
            Ok(())
        }
        Some(Commands::Rank {
            metric,
            provider,
            tier,
            limit,
        }) => {
            let query = RankQuery::new(metric).provider(provider).power_tier(tier).limit(limit);
            print_ranking(&ModelRanker::new(service.catalog()).rank(&query), metric);
            Ok(())
        }
        Some(Commands::Health) => {
            let pb = spinner("Checking providers...")?;
            let results = service.health().await;
            pb.finish_and_clear();
            let mut all_healthy = true;
            for (provider, healthy) in results {
                let status = if healthy { "ok".green() } else { "unreachable".red() };
                println!("{:<12} {}", provider.label(), status);
                all_healthy &= healthy;
            }
            if all_healthy {
                Ok(())
            } else {
                Err(anyhow!("One or more providers failed the healthcheck"))
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    colored::control::set_override(true);

    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // --- Logging Setup ---
    let default_level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::default().add_directive(default_level.into()));

    let log_dir = match dirs::cache_dir()
        .or_else(dirs::runtime_dir)
        .or_else(|| Some(env::temp_dir()))
        .map(|d| d.join("relay"))
    {
        Some(dir) => dir,
        None => {
            eprintln!("{}", "Error: Could not determine a suitable directory for log files.".red());
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = fs::create_dir_all(&log_dir) {
        eprintln!("{} Failed to create log directory {}: {}", "Error:".red(), log_dir.display(), e);
        return ExitCode::FAILURE;
    }
    let log_path = log_dir.join(LOG_FILE_NAME);

    let file_appender = tracing_appender::rolling::never(&log_dir, LOG_FILE_NAME);
    let (non_blocking_writer, _guard) = tracing_appender::non_blocking(file_appender);

    let time_format_desc = match time::format_description::parse(
        "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]",
    ) {
        Ok(desc) => desc,
        Err(e) => {
            eprintln!("{} Failed to parse log time format: {}", "Error:".red(), e);
            return ExitCode::FAILURE;
        }
    };
    let local_timer = LocalTime::new(time_format_desc);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_writer)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true)
        .with_timer(local_timer.clone());
    let stderr_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_timer(local_timer)
        .with_target(false)
        .with_level(true);

    if let Err(e) = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
    {
        eprintln!("{} Failed to initialize logging: {}", "Error:".red(), e);
        return ExitCode::FAILURE;
    }
    colored::control::unset_override();

    info!(
        "Logging initialized. Level determined by RUST_LOG or -v flags (default: {}). Logging to stderr and {}",
        default_level,
        log_path.display()
    );
    // --- End Logging Setup ---

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            eprintln!(
                "{} Could not find or load '{}': {:#}",
                "Error:".red(),
                CONFIG_FILENAME,
                e
            );
            return ExitCode::FAILURE;
        }
    };

    let service = match build_service(&config) {
        Ok(service) => service,
        Err(e) => {
            error!("Failed to start relay: {:#}", e);
            eprintln!("{} {:#}", "Error:".red(), e);
            return ExitCode::FAILURE;
        }
    };

    match run_command(&service, &cli.owner, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("{} {:#}", "Error:".red(), e);
            ExitCode::FAILURE
        }
    }
}
