// relay-core/src/artifacts/extract.rs

//! Recovers an [`ArtifactBundle`] from free-form model output.
//!
//! Three candidate sources are tried in order: the whole text, the first
//! fenced code block, and the span from the first `{` to the last `}`.
//! The first candidate that parses as a JSON object wins; its fields are
//! then normalized and anything unusable is dropped and reported.

use super::writer::sanitize_relative_path;
use super::{ArtifactBundle, GeneratedArtifactFile};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_SUMMARY: &str = "Готово. Файлы созданы.";

/// Extensions that cannot be delivered as text and are rewritten to `.txt`.
pub const BINARY_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "webp", "gif", "bmp", "ico", "pdf", "zip", "exe",
];

lazy_static! {
    static ref FENCED_BLOCK: Regex = Regex::new(r"(?is)```(?:json)?\s*(.*?)```").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonSource {
    WholeText,
    FencedBlock,
    BraceSpan,
}

impl fmt::Display for JsonSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JsonSource::WholeText => "whole text",
            JsonSource::FencedBlock => "fenced block",
            JsonSource::BraceSpan => "brace span",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    NotAnObject,
    MissingPath,
    MissingContent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedFile {
    /// Position in the model's `files` array.
    pub index: usize,
    pub reason: DropReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoercedPath {
    pub from: String,
    pub to: String,
}

/// What normalization changed or threw away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizationReport {
    pub source: JsonSource,
    pub files_missing: bool,
    pub summary_defaulted: bool,
    pub dropped_files: Vec<DroppedFile>,
    pub coerced_paths: Vec<CoercedPath>,
    pub dropped_run_instructions: usize,
}

impl NormalizationReport {
    fn new(source: JsonSource) -> Self {
        Self {
            source,
            files_missing: false,
            summary_defaulted: false,
            dropped_files: Vec::new(),
            coerced_paths: Vec::new(),
            dropped_run_instructions: 0,
        }
    }

    pub fn is_clean(&self) -> bool {
        !self.files_missing
            && !self.summary_defaulted
            && self.dropped_files.is_empty()
            && self.coerced_paths.is_empty()
            && self.dropped_run_instructions == 0
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("Model response did not contain a JSON object")]
    NoJsonObject,

    #[error("Model response contained no usable files ({} dropped)", .0.dropped_files.len())]
    NoValidFiles(NormalizationReport),
}

pub fn extract(raw: &str) -> Result<ArtifactBundle, ExtractionError> {
    extract_with_report(raw).map(|(bundle, _)| bundle)
}

pub fn extract_with_report(raw: &str) -> Result<(ArtifactBundle, NormalizationReport), ExtractionError> {
    let Some((object, source)) = find_json_object(raw) else {
        debug!(chars = raw.chars().count(), "No JSON object found in model response.");
        return Err(ExtractionError::NoJsonObject);
    };
    debug!(%source, "Found artifact JSON.");

    let (bundle, report) = normalize(object, source)?;
    if !report.is_clean() {
        warn!(
            dropped_files = report.dropped_files.len(),
            coerced_paths = report.coerced_paths.len(),
            summary_defaulted = report.summary_defaulted,
            "Artifact bundle needed normalization."
        );
    }
    Ok((bundle, report))
}

fn find_json_object(raw: &str) -> Option<(Map<String, Value>, JsonSource)> {
    if let Some(object) = parse_object(raw) {
        return Some((object, JsonSource::WholeText));
    }

    if let Some(block) = FENCED_BLOCK.captures(raw).and_then(|caps| caps.get(1)) {
        if let Some(object) = parse_object(block.as_str().trim()) {
            return Some((object, JsonSource::FencedBlock));
        }
    }

    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    parse_object(&raw[start..=end]).map(|object| (object, JsonSource::BraceSpan))
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(object)) => Some(object),
        _ => None,
    }
}

fn non_blank(value: Option<&Value>) -> Option<String> {
    let text = value?.as_str()?.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn normalize(
    mut object: Map<String, Value>,
    source: JsonSource,
) -> Result<(ArtifactBundle, NormalizationReport), ExtractionError> {
    let mut report = NormalizationReport::new(source);

    let summary = non_blank(object.get("summary")).unwrap_or_else(|| {
        report.summary_defaulted = true;
        DEFAULT_SUMMARY.to_string()
    });

    let raw_files = match object.remove("files") {
        Some(Value::Array(items)) => items,
        _ => {
            report.files_missing = true;
            Vec::new()
        }
    };

    let mut files = Vec::with_capacity(raw_files.len());
    for (index, item) in raw_files.iter().enumerate() {
        match normalize_file(item) {
            Ok((file, coerced)) => {
                if let Some(coerced) = coerced {
                    report.coerced_paths.push(coerced);
                }
                files.push(file);
            }
            Err(reason) => report.dropped_files.push(DroppedFile { index, reason }),
        }
    }

    if files.is_empty() {
        return Err(ExtractionError::NoValidFiles(report));
    }

    let run_instructions = match object.get("runInstructions") {
        Some(Value::Array(steps)) => {
            let kept: Vec<String> = steps.iter().filter_map(|step| non_blank(Some(step))).collect();
            report.dropped_run_instructions = steps.len() - kept.len();
            kept
        }
        _ => Vec::new(),
    };

    let notes = non_blank(object.get("notes"));

    Ok((
        ArtifactBundle {
            summary,
            files,
            run_instructions,
            notes,
        },
        report,
    ))
}

fn normalize_file(item: &Value) -> Result<(GeneratedArtifactFile, Option<CoercedPath>), DropReason> {
    let Some(fields) = item.as_object() else {
        return Err(DropReason::NotAnObject);
    };
    let path = non_blank(fields.get("path")).ok_or(DropReason::MissingPath)?;
    let content = match fields.get("content").and_then(Value::as_str) {
        Some(content) if !content.trim().is_empty() => content.to_string(),
        _ => return Err(DropReason::MissingContent),
    };
    let language = non_blank(fields.get("language"));
    let mut description = non_blank(fields.get("description"));

    let path = sanitize_relative_path(&path);
    let (path, coerced) = match coerce_binary_path(&path) {
        Some((text_path, extension)) => {
            if description.is_none() {
                description = Some(format!(
                    "Converted from binary-like file extension .{} to text output.",
                    extension
                ));
            }
            let coerced = CoercedPath {
                from: path,
                to: text_path.clone(),
            };
            (text_path, Some(coerced))
        }
        None => (path, None),
    };

    Ok((
        GeneratedArtifactFile {
            path,
            content,
            language,
            description,
        },
        coerced,
    ))
}

/// Replaces a binary extension with `.txt`. Returns the new path and the
/// lowercased original extension, or `None` when the path is already text.
pub fn coerce_binary_path(path: &str) -> Option<(String, String)> {
    let dot = path.rfind('.')?;
    let extension = &path[dot + 1..];
    if extension.is_empty() || extension.contains(['/', '\\']) {
        return None;
    }
    let stem = &path[..dot];
    // Dotfiles such as `.png` have no extension.
    if stem.is_empty() || stem.ends_with(['/', '\\']) {
        return None;
    }
    let lowered = extension.to_ascii_lowercase();
    if !BINARY_EXTENSIONS.contains(&lowered.as_str()) {
        return None;
    }
    Some((format!("{}.txt", stem), lowered))
}
