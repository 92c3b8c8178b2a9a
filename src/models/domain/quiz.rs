use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct QuizDefinition {
    pub id: String,
    pub name: String,
    /// Identifier of the counterpart quiz inside the remote LMS.
    pub remote_quiz_id: i64,
    pub questions: Vec<QuestionDefinition>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct QuestionDefinition {
    pub id: String,
    pub text: String,
    pub question_type: QuestionType,
    pub options: Vec<String>,
    /// Reference answer text when local grading is possible. Absent when the
    /// remote LMS is the sole grading authority.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub known_correct_text: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    SingleChoice,
    TrueFalse,
}
