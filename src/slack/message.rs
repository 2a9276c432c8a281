//! Chat wire types (chat.postMessage) and message formatting.

use serde::{Deserialize, Serialize};

use crate::models::{AlertStatus, Severity};

/// Outbound chat.postMessage payload.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    /// Channel the message is addressed to.
    pub channel: String,
    /// Plain message body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Colour strip and fields.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<ChatAttachment>,
    /// Thread root timestamp; absent for a new root message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatAttachment {
    pub color: String,
    pub title: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer_icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<ChatField>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatField {
    pub title: String,
    pub value: String,
    /// Narrow width, two per row.
    pub short: bool,
}

/// Provider response; `ok` must be checked, `ts` addresses the thread.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub ok: bool,
    #[serde(default)]
    pub ts: String,
    #[serde(default)]
    pub error: String,
}

/// Colour strip for an alert card, keyed by status then severity.
#[must_use]
pub fn color_for(status: AlertStatus, severity: Option<Severity>) -> &'static str {
    if status == AlertStatus::Resolved {
        return "#36a64f"; // green
    }
    match severity {
        Some(Severity::Critical) => "#dc3545", // red
        Some(Severity::Warning) => "#ffc107",  // amber
        _ => "#17a2b8",                        // blue
    }
}

#[must_use]
pub const fn emoji_for(status: AlertStatus) -> &'static str {
    match status {
        AlertStatus::Firing => "\u{1f525}",   // 🔥
        AlertStatus::Resolved => "\u{2705}", // ✅
    }
}

/// Amber strip used for flap warnings.
pub const FLAPPING_COLOR: &str = "#ffc107";

/// Normalise inline markdown for the chat provider: `**bold**` becomes
/// `*bold*` and `### heading` becomes `*heading*`, while inline-code and
/// fenced-code spans pass through verbatim.
#[must_use]
pub fn to_chat_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, segment) in text.split("```").enumerate() {
        if i > 0 {
            out.push_str("```");
        }
        if i % 2 == 1 {
            // Inside a fenced block.
            out.push_str(segment);
        } else {
            out.push_str(&normalize_segment(segment));
        }
    }
    out
}

fn normalize_segment(segment: &str) -> String {
    segment
        .split('\n')
        .map(normalize_line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn normalize_line(line: &str) -> String {
    let hashes = line.bytes().take_while(|b| *b == b'#').count();
    if (1..=6).contains(&hashes) && line.as_bytes().get(hashes) == Some(&b' ') {
        return format!("*{}*", convert_bold(line[hashes + 1..].trim()));
    }
    convert_bold(line)
}

fn convert_bold(line: &str) -> String {
    line.split('`')
        .enumerate()
        .map(|(i, span)| {
            if i % 2 == 0 {
                span.replace("**", "*")
            } else {
                span.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("`")
}
