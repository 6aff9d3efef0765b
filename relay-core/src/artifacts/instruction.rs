// relay-core/src/artifacts/instruction.rs

//! Prompt text that asks a model for a JSON artifact bundle, and the
//! heuristic that decides whether a plain message is really a build request.

use crate::models::chat::ChatMessage;

const ARTIFACT_KEYWORDS: &[&str] = &[
    "напиши код",
    "создай код",
    "сделай сайт",
    "landing",
    "лендинг",
    "index.html",
    "react",
    "next.js",
    "node.js",
    "python script",
    "создай файл",
    "write code",
    "generate code",
    "create file",
    ".html",
    ".css",
    ".js",
    ".ts",
    ".tsx",
    ".py",
    ".go",
    ".java",
    ".md",
];

pub const TASK_SEPARATOR: &str = "\n\nUSER TASK:\n";

/// The fixed directive sent ahead of every build request.
pub fn artifact_instruction() -> String {
    [
        "You are a code generator. Return ONLY a single valid JSON object, no markdown fences and no text around it.",
        "The JSON object must follow this schema:",
        r#"{"summary": string, "files": [{"path": string, "content": string, "language"?: string, "description"?: string}], "runInstructions": string[], "notes"?: string}"#,
        "Rules:",
        "- Write \"summary\" in Russian.",
        "- Every file must contain its full contents. No placeholders, no \"...\", no omitted sections.",
        "- \"path\" is relative to the project root and uses forward slashes.",
        "- For a simple landing page, produce a single self-contained index.html.",
        "- Produce text files only. Never emit binary files (jpg, jpeg, png, webp, gif, pdf, zip, exe).",
        "- For images use inline SVG files (for example assets/pizza.svg) or remote image URLs.",
        "- Do not add disclaimers or apologies.",
        "- Do not wrap the JSON in markdown.",
    ]
    .join("\n")
}

/// Wraps a user's build request with [`artifact_instruction`].
pub fn build_task_message(request: &str) -> ChatMessage {
    ChatMessage::user(format!("{}{}{}", artifact_instruction(), TASK_SEPARATOR, request.trim()))
}

/// True when the text looks like a request to generate code or files.
pub fn is_artifact_request(text: &str) -> bool {
    let lowered = text.to_lowercase();
    ARTIFACT_KEYWORDS.iter().any(|keyword| lowered.contains(keyword))
}
