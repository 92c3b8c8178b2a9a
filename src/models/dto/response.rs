use serde::{Deserialize, Serialize};

/// Reply returned to the transport adapter: plain text, or a structured
/// "next question" payload the adapter can render as interactive buttons.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplyPayload {
    Text {
        text: String,
    },
    Question {
        text: String,
        question_number: usize,
        total_questions: usize,
    },
}

impl ReplyPayload {
    pub fn text(text: impl Into<String>) -> Self {
        ReplyPayload::Text { text: text.into() }
    }

    /// The user-visible message body, regardless of payload shape.
    pub fn body(&self) -> &str {
        match self {
            ReplyPayload::Text { text } => text,
            ReplyPayload::Question { text, .. } => text,
        }
    }
}
