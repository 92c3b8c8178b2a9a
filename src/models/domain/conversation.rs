use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Closed set of conversational phases. Unrecognized states are rejected at
/// the serde boundary rather than carried around as free strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    Idle,
    CourseSelection,
    ModuleSelection,
    Learning,
    QuizActive,
}

impl std::fmt::Display for ConversationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversationState::Idle => write!(f, "idle"),
            ConversationState::CourseSelection => write!(f, "course_selection"),
            ConversationState::ModuleSelection => write!(f, "module_selection"),
            ConversationState::Learning => write!(f, "learning"),
            ConversationState::QuizActive => write!(f, "quiz_active"),
        }
    }
}

/// Whether an answer was locally gradable. `Unknown` means the module carries
/// no reference answer text and the remote LMS is the grading authority.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LocalCorrectness {
    Correct,
    Incorrect,
    Unknown,
}

impl LocalCorrectness {
    pub fn is_correct(self) -> bool {
        self == LocalCorrectness::Correct
    }

    pub fn is_unknown(self) -> bool {
        self == LocalCorrectness::Unknown
    }
}

/// One captured quiz answer. The question text and option texts are
/// snapshotted at answer time: the remote LMS re-shuffles options and
/// regenerates field names per attempt, so replaying the answer later must
/// match on text, never on position.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct AnswerRecord {
    pub question_id: String,
    pub selected_letter: String,
    pub local_correct: LocalCorrectness,
    pub question_text: String,
    pub options: Vec<String>,
}

impl AnswerRecord {
    /// Zero-based option index for the selected letter (A=0 .. D=3).
    pub fn selected_index(&self) -> Option<usize> {
        let letter = self.selected_letter.chars().next()?;
        if letter.is_ascii_uppercase() {
            Some(letter as usize - 'A' as usize)
        } else {
            None
        }
    }

    /// Text of the option the user picked, from the snapshot.
    pub fn selected_option_text(&self) -> Option<&str> {
        self.options
            .get(self.selected_index()?)
            .map(String::as_str)
    }
}

/// Phase-scoped auxiliary fields, stored in the same `context_data` document
/// field the legacy system used, but decoded into a structured record and
/// validated on every read and write.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct PhaseData {
    #[validate(length(max = 300))]
    pub course_name: Option<String>,
    #[validate(length(max = 300))]
    pub module_name: Option<String>,
    pub quiz_id: Option<String>,
    pub remote_quiz_id: Option<i64>,
    #[validate(length(max = 10))]
    pub quiz_question_ids: Vec<String>,
}

impl PhaseData {
    /// Auxiliary fields that survive leaving the quiz phase.
    pub fn without_quiz(&self) -> Self {
        Self {
            course_name: self.course_name.clone(),
            module_name: self.module_name.clone(),
            ..Default::default()
        }
    }
}

/// Durable per-user conversation state, one document per user. Created on the
/// first inbound message and mutated exclusively by the orchestrator.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ConversationContext {
    pub user_id: String,
    pub channel_address: String,
    pub conversation_state: ConversationState,
    pub current_course_id: Option<String>,
    pub current_module_id: Option<String>,
    pub current_quiz_id: Option<String>,
    pub current_question_index: i32,
    pub quiz_answers: Vec<AnswerRecord>,
    pub context_data: PhaseData,
    pub last_message_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ConversationContext {
    pub fn new(user_id: &str, channel_address: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            channel_address: channel_address.to_string(),
            conversation_state: ConversationState::Idle,
            current_course_id: None,
            current_module_id: None,
            current_quiz_id: None,
            current_question_index: 0,
            quiz_answers: Vec::new(),
            context_data: PhaseData::default(),
            last_message_at: Utc::now(),
            created_at: Some(Utc::now()),
            updated_at: Some(Utc::now()),
        }
    }
}
