// relay-cli/src/repl.rs

//! Interactive session: slash commands for settings, plain text for chat.

use crate::display::{
    print_build_outcome, print_delivery, print_error, print_models_page, print_ranking,
    print_response_meta, print_settings, print_suggest_build, spinner,
};
use anyhow::{Context, Result, anyhow};
use colored::*;
use relay_core::utils::paginate;
use relay_core::{
    ModelMetric, ModelRanker, PendingInput, PowerTier, ProviderFilter, ProviderId, RankQuery, RelayService,
    TextOutcome,
};
use rustyline::error::ReadlineError;
use rustyline::{Config, DefaultEditor};
use std::fs;
use tracing::{debug, error, info, warn};

pub const MODELS_PAGE_SIZE: usize = 6;
pub const PICK_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Exit,
    Help,
    /// `None` makes the next message the build task.
    Build(Option<String>),
    /// `None` makes the next message the system prompt.
    PromptSet(Option<String>),
    PromptView,
    PromptReset,
    Power(PowerTier),
    Select(ProviderId, String),
    /// Zero-based page index.
    Models(usize),
    Pick {
        metric: ModelMetric,
        provider: ProviderFilter,
        tier: Option<PowerTier>,
    },
    Info,
    Clear,
    Text(String),
}

fn rest_of(parts: &[&str]) -> Option<String> {
    let joined = parts.join(" ");
    let trimmed = joined.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub fn parse_line(line: &str) -> Result<ReplCommand, String> {
    let trimmed = line.trim();
    if trimmed.eq_ignore_ascii_case("exit") || trimmed.eq_ignore_ascii_case("quit") {
        return Ok(ReplCommand::Exit);
    }
    if !trimmed.starts_with('/') {
        return Ok(ReplCommand::Text(trimmed.to_string()));
    }

    let parts: Vec<&str> = trimmed.split_whitespace().collect();
    let args = &parts[1..];
    match parts[0].to_lowercase().as_str() {
        "/help" => Ok(ReplCommand::Help),
        "/build" => Ok(ReplCommand::Build(rest_of(args))),
        "/prompt" => match args.first().map(|a| a.to_lowercase()) {
            None => Ok(ReplCommand::PromptSet(None)),
            Some(sub) if sub == "set" => Ok(ReplCommand::PromptSet(rest_of(&args[1..]))),
            Some(sub) if sub == "view" => Ok(ReplCommand::PromptView),
            Some(sub) if sub == "reset" => Ok(ReplCommand::PromptReset),
            Some(other) => Err(format!("Unknown /prompt action '{}'. Use set, view or reset.", other)),
        },
        "/power" => {
            let tier = args.first().ok_or("Usage: /power <Low|Medium|High|eHigh>")?;
            Ok(ReplCommand::Power(tier.parse()?))
        }
        "/select" => match args {
            [provider, model] => Ok(ReplCommand::Select(provider.parse()?, model.to_string())),
            _ => Err("Usage: /select <provider> <model-id>".to_string()),
        },
        "/models" => {
            let page = match args.first() {
                Some(raw) => raw
                    .parse::<usize>()
                    .map_err(|_| format!("Invalid page number '{}'", raw))?,
                None => 1,
            };
            Ok(ReplCommand::Models(page.saturating_sub(1)))
        }
        "/pick" => {
            let metric = args
                .first()
                .ok_or("Usage: /pick <metric> [provider|all] [tier]")?
                .parse()?;
            let provider = match args.get(1) {
                Some(raw) => raw.parse()?,
                None => ProviderFilter::All,
            };
            let tier = args.get(2).map(|raw| raw.parse()).transpose()?;
            Ok(ReplCommand::Pick {
                metric,
                provider,
                tier,
            })
        }
        "/info" => Ok(ReplCommand::Info),
        "/clear" => Ok(ReplCommand::Clear),
        other => Err(format!("Unknown command '{}'. Type /help for the list.", other)),
    }
}

fn print_help() {
    println!("\n{}", "Commands".bold());
    for (usage, description) in [
        ("/build [task]", "generate project files (asks for the task if omitted)"),
        ("/prompt [set <text>|view|reset]", "manage the system prompt"),
        ("/power <tier>", "choose Low, Medium, High or eHigh"),
        ("/select <provider> <model>", "choose a catalog model"),
        ("/models [page]", "browse the catalog"),
        ("/pick <metric> [provider] [tier]", "rank models by a metric"),
        ("/info", "show current settings and model card"),
        ("/clear", "forget the conversation history"),
        ("exit", "leave the session"),
    ] {
        println!("  {:<34} {}", usage.cyan(), description.dimmed());
    }
    println!();
}

fn print_welcome_message(owner_id: &str) {
    println!("\n{}", "Relay - LLM chat relay".cyan().bold());
    println!("{}: {}", "Owner".cyan(), owner_id);
    println!(
        "{}",
        "Type a message to chat, /help for commands, 'exit' or Ctrl-D to quit.".dimmed()
    );
    println!();
}

/// Runs one REPL command. Only I/O-level failures escape; core errors are printed.
async fn execute(service: &RelayService, owner_id: &str, command: ReplCommand) -> Result<()> {
    match command {
        ReplCommand::Exit => {}
        ReplCommand::Help => print_help(),
        ReplCommand::Text(text) => {
            let pb = spinner("Thinking...")?;
            let outcome = service.handle_text(owner_id, &text).await;
            pb.finish_and_clear();
            match outcome {
                Ok(TextOutcome::SystemPromptSaved) => println!("{}", "System prompt saved.".green()),
                Ok(TextOutcome::SuggestBuild) => print_suggest_build(),
                Ok(TextOutcome::Built(outcome)) => print_build_outcome(&outcome),
                Ok(TextOutcome::Chatted(outcome)) => {
                    print_response_meta(&outcome.response);
                    print_delivery(&outcome.delivery);
                }
                Err(e) => {
                    error!(error = %e, "Request failed.");
                    print_error("Request failed", &e);
                }
            }
        }
        ReplCommand::Build(None) => {
            service.await_input(owner_id, PendingInput::BuildRequest).await?;
            println!("{}", "Describe what to build in your next message.".cyan());
        }
        ReplCommand::Build(Some(task)) => {
            let pb = spinner("Generating your code...")?;
            let outcome = service.build(owner_id, &task).await;
            pb.finish_and_clear();
            match outcome {
                Ok(outcome) => print_build_outcome(&outcome),
                Err(e) => {
                    error!(error = %e, "Build failed.");
                    print_error("/build failed", &e);
                }
            }
        }
        ReplCommand::PromptSet(None) => {
            service.await_input(owner_id, PendingInput::SystemPrompt).await?;
            println!("{}", "Send the new system prompt in your next message.".cyan());
        }
        ReplCommand::PromptSet(Some(prompt)) => match service.set_system_prompt(owner_id, &prompt).await {
            Ok(()) => println!("{}", "System prompt saved.".green()),
            Err(e) => print_error("Could not save the system prompt", &e),
        },
        ReplCommand::PromptView => {
            let settings = service.settings(owner_id).await?;
            match settings.system_prompt() {
                Some(prompt) => println!("{}\n{}", "System prompt:".bold(), prompt),
                None => println!("{}", "No system prompt set.".dimmed()),
            }
        }
        ReplCommand::PromptReset => {
            service.reset_system_prompt(owner_id).await?;
            println!("{}", "System prompt cleared.".green());
        }
        ReplCommand::Power(tier) => match service.select_power_tier(owner_id, tier).await? {
            Some(model) => println!(
                "{} {} ({})",
                format!("Power tier set to {}. Model:", tier).green(),
                model.title.bold(),
                model.model_id
            ),
            None => println!(
                "{}",
                format!("Power tier set to {}. No catalog model for the current provider.", tier).yellow()
            ),
        },
        ReplCommand::Select(provider, model_id) => match service.select_model(owner_id, provider, &model_id).await {
            Ok(model) => println!("{} {}", "Selected".green(), model.title.bold()),
            Err(e) => print_error("Could not select the model", &e),
        },
        ReplCommand::Models(page_index) => {
            let models = service.catalog().list_all(None);
            print_models_page(&paginate(&models, page_index, MODELS_PAGE_SIZE));
        }
        ReplCommand::Pick {
            metric,
            provider,
            tier,
        } => {
            let query = RankQuery::new(metric)
                .provider(provider)
                .power_tier(tier)
                .limit(PICK_LIMIT);
            let ranking = ModelRanker::new(service.catalog()).rank(&query);
            print_ranking(&ranking, metric);
            if let Some(best) = ranking.models.first() {
                println!(
                    "{}",
                    format!("Use /select {} {} to switch.", best.provider, best.model_id).dimmed()
                );
            }
        }
        ReplCommand::Info => {
            if let Err(e) = service.resolve_active_model(owner_id).await {
                warn!(error = %e, "No active model.");
            }
            let settings = service.settings(owner_id).await?;
            let model = service
                .catalog()
                .model(settings.selected_provider, &settings.selected_model);
            print_settings(&settings, model);
        }
        ReplCommand::Clear => {
            service.clear_history(owner_id).await?;
            println!("{}", "Conversation history cleared.".green());
        }
    }
    Ok(())
}

pub async fn run_interactive(service: &RelayService, owner_id: &str) -> Result<()> {
    print_welcome_message(owner_id);

    let rl_config = Config::builder()
        .history_ignore_space(true)
        .completion_type(rustyline::CompletionType::List)
        .edit_mode(rustyline::EditMode::Emacs)
        .auto_add_history(true)
        .build();
    let mut rl = DefaultEditor::with_config(rl_config)?;

    let history_dir = dirs::cache_dir()
        .map(|d| d.join("relay"))
        .ok_or_else(|| anyhow!("Could not determine cache directory for history file"))?;
    fs::create_dir_all(&history_dir).context("Failed to create history directory")?;
    let history_file_path = history_dir.join("cli_history.txt");
    if rl.load_history(&history_file_path).is_err() {
        debug!(path = %history_file_path.display(), "No previous CLI history found or error loading.");
    }

    let prompt = format!("{} ", ">".green().bold());
    loop {
        match rl.readline(&prompt) {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let command = match parse_line(&line) {
                    Ok(command) => command,
                    Err(message) => {
                        eprintln!("{}", message.red());
                        continue;
                    }
                };
                if command == ReplCommand::Exit {
                    info!("Exit command entered, leaving interactive mode.");
                    break;
                }
                execute(service, owner_id, command).await?;
            }
            Err(ReadlineError::Interrupted) => {
                println!("{}", "^C".yellow());
                continue;
            }
            Err(ReadlineError::Eof) => {
                info!("EOF detected, exiting interactive mode.");
                break;
            }
            Err(err) => {
                error!("Readline error: {:?}", err);
                eprintln!("Error reading input: {}", err.to_string().red());
                break;
            }
        }
    }

    if let Err(e) = rl.save_history(&history_file_path) {
        warn!(path = %history_file_path.display(), error = %e, "Failed to save CLI history.");
    } else {
        debug!(path = %history_file_path.display(), "Saved CLI history.");
    }
    println!("\n{}\n", "Bye.".cyan());
    Ok(())
}
