use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::domain::conversation::AnswerRecord;

/// Locally recorded quiz attempt. Written as soon as the conversational quiz
/// finishes; the sync bridge later annotates it with the remote attempt id
/// and the authoritative remote grade.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct QuizAttempt {
    pub id: String,
    pub user_id: String,
    pub module_id: String,
    pub quiz_id: String,
    pub attempt_number: i16,
    pub score: i16,
    pub total_questions: i16,
    pub passed: bool,
    pub answers: Vec<AnswerRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_attempt_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_grade: Option<f64>,
    pub submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

impl QuizAttempt {
    pub fn new(
        user_id: &str,
        module_id: &str,
        quiz_id: &str,
        attempt_number: i16,
        score: i16,
        total_questions: i16,
        passed: bool,
        answers: Vec<AnswerRecord>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            module_id: module_id.to_string(),
            quiz_id: quiz_id.to_string(),
            attempt_number,
            score,
            total_questions,
            passed,
            answers,
            remote_attempt_id: None,
            remote_grade: None,
            submitted_at: Utc::now(),
            created_at: Some(Utc::now()),
            modified_at: Some(Utc::now()),
        }
    }
}
