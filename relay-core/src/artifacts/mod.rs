// relay-core/src/artifacts/mod.rs

//! Project files recovered from a model answer and written to disk.
//!
//! [`extract`] turns untrusted model text into an [`ArtifactBundle`];
//! [`ArtifactWriter`] materializes a bundle inside a per-owner sandbox.

pub mod extract;
pub mod instruction;
pub mod writer;

pub use extract::{ExtractionError, JsonSource, NormalizationReport, extract, extract_with_report};
pub use instruction::{artifact_instruction, build_task_message, is_artifact_request};
pub use writer::{ArtifactWriter, WrittenArtifactBundle, WrittenArtifactFile, sanitize_relative_path};

use serde::Serialize;

/// One generated file. `path` is relative and never names a binary format.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedArtifactFile {
    pub path: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A validated bundle. `files` is never empty.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactBundle {
    pub summary: String,
    pub files: Vec<GeneratedArtifactFile>,
    pub run_instructions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Renders run instructions as a numbered list for the user.
pub fn format_run_instructions(steps: &[String]) -> String {
    if steps.is_empty() {
        return "Run instructions: not specified.".to_string();
    }
    let mut lines = vec!["Run instructions:".to_string()];
    lines.extend(
        steps
            .iter()
            .enumerate()
            .map(|(index, step)| format!("{}. {}", index + 1, step)),
    );
    lines.join("\n")
}
