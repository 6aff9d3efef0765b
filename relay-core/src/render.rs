// relay-core/src/render.rs

//! Plain-text model cards.

use crate::models::catalog::{ModelDescriptor, ModelStars};

fn star_bar(count: u8) -> String {
    "★".repeat(usize::from(count.min(ModelStars::MAX)))
}

fn star_line(label: &str, count: u8) -> String {
    format!("{:<14}{} ({}/{})", label, star_bar(count), count, ModelStars::MAX)
}

pub fn render_model_card(model: &ModelDescriptor) -> String {
    let stars = &model.stars;
    let tags = if model.tags.is_empty() {
        "-".to_string()
    } else {
        model.tags.join(", ")
    };
    [
        model.title.clone(),
        format!("Provider: {}", model.provider.label()),
        format!("Model ID: {}", model.model_id),
        format!("Power Tier: {}", model.power_tier),
        format!("Overall: {:.1} / 5.0", stars.balanced()),
        format!("Tags: {}", tags),
        String::new(),
        star_line("Coding:", stars.coding),
        star_line("Reasoning:", stars.reasoning),
        star_line("Multilingual:", stars.multilingual),
        star_line("Speed:", stars.speed),
        star_line("Safety:", stars.safety),
    ]
    .join("\n")
}
