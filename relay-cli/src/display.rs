// relay-cli/src/display.rs

//! Turns core outcomes into terminal text.

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use relay_core::artifacts::format_run_instructions;
use relay_core::ranking::Ranking;
use relay_core::render::render_model_card;
use relay_core::utils::Page;
use relay_core::{BuildOutcome, ChatCompletionResponse, Delivery, ModelDescriptor, ModelMetric, UserSettings};
use std::time::Duration;
use tracing::debug;

/// Spinner shown while a provider call is in flight.
pub fn spinner(message: &str) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")?
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "-"]),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

pub fn print_response_meta(response: &ChatCompletionResponse) {
    let tokens = response
        .usage
        .as_ref()
        .and_then(|usage| usage.total_tokens)
        .map(|total| format!(", {} tokens", total))
        .unwrap_or_default();
    println!(
        "{}",
        format!(
            "[{} / {} in {} ms{}]",
            response.provider, response.model, response.latency_ms, tokens
        )
        .dimmed()
    );
}

pub fn print_delivery(delivery: &Delivery) {
    match delivery {
        Delivery::Inline { chunks } => {
            for chunk in chunks {
                println!("{}", chunk);
            }
        }
        Delivery::SavedToFile {
            filename,
            path,
            preview,
        } => {
            println!("{}", "The reply is large, it was saved to a file.".yellow());
            println!("{} {}", "File:".bold(), filename);
            println!("{} {}", "Path:".bold(), path.display());
            println!("\n{}\n{}", "Preview:".bold(), preview);
        }
    }
}

pub fn print_build_outcome(outcome: &BuildOutcome) {
    match outcome {
        BuildOutcome::Materialized {
            bundle,
            written,
            report,
            response,
        } => {
            print_response_meta(response);
            println!("{}", "Done. Files created.".green().bold());
            println!("{} {}", "Folder:".bold(), written.base_dir.display());
            println!("{} {}", "Files:".bold(), written.files.len());
            for file in &written.files {
                println!("  {}", file.relative_path.cyan());
            }
            println!("{} {}", "Summary:".bold(), bundle.summary);
            println!("\n{}", format_run_instructions(&bundle.run_instructions));
            if let Some(notes) = &bundle.notes {
                println!("\n{}\n{}", "Notes:".bold(), notes);
            }
            if !report.coerced_paths.is_empty() || !report.dropped_files.is_empty() {
                debug!(?report, "Bundle normalization details.");
                println!(
                    "{}",
                    format!(
                        "{} binary path(s) converted to text, {} unusable file entr(ies) skipped.",
                        report.coerced_paths.len(),
                        report.dropped_files.len()
                    )
                    .dimmed()
                );
            }
            println!("{}", "Use /build again for the next generation.".dimmed());
        }
        BuildOutcome::RawFallback {
            response,
            reason,
            delivery,
        } => {
            print_response_meta(response);
            println!(
                "{} ({})",
                "Could not get structured files from the reply. Showing the raw answer.".yellow(),
                reason
            );
            print_delivery(delivery);
        }
    }
}

pub fn print_suggest_build() {
    println!("{}", "To generate code use /build.".yellow());
    println!("{}", "Example: /build Make a pizzeria landing page in index.html".dimmed());
}

pub fn print_ranking(ranking: &Ranking<'_>, metric: ModelMetric) {
    if ranking.power_tier_relaxed {
        println!(
            "{}",
            "No models in the requested tier, showing all tiers.".yellow()
        );
    }
    if ranking.models.is_empty() {
        println!("{}", "No models match.".yellow());
        return;
    }
    println!("\n{}", format!("Top models by {}:", metric).bold());
    for (index, model) in ranking.models.iter().enumerate() {
        println!(
            "{:>2}. {} {} {}",
            index + 1,
            model.title.bold(),
            format!("[{} / {}]", model.provider, model.model_id).dimmed(),
            format!("{}: {:.1}", metric, model.score(metric)).cyan()
        );
    }
}

pub fn print_models_page(page: &Page<'_, &ModelDescriptor>) {
    println!(
        "\n{}",
        format!("Models (page {}/{}):", page.index + 1, page.total_pages).bold()
    );
    for model in page.items {
        println!(
            "  {} {} {}",
            model.title.bold(),
            format!("[{} / {}]", model.provider, model.model_id).dimmed(),
            model.power_tier.to_string().cyan()
        );
    }
    if page.has_next() {
        println!("{}", format!("Next: /models {}", page.index + 2).dimmed());
    }
}

pub fn print_settings(settings: &UserSettings, model: Option<&ModelDescriptor>) {
    let updated = settings.updated_at.with_timezone(&chrono::Local);
    println!("\n{}", "Current settings".bold());
    println!("Provider:      {}", settings.selected_provider);
    println!("Model:         {}", settings.selected_model);
    println!("Power tier:    {}", settings.selected_power_tier);
    println!(
        "System prompt: {}",
        if settings.system_prompt().is_some() { "set" } else { "not set" }
    );
    println!("Updated:       {}", updated.format("%Y-%m-%d %H:%M:%S"));
    match model {
        Some(model) => println!("\n{}", render_model_card(model)),
        None => println!("{}", "The selected model is not in the catalog.".yellow()),
    }
}

pub fn print_error(context: &str, error: &dyn std::fmt::Display) {
    eprintln!("{}: {}", context.red(), error);
}
