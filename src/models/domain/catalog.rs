use serde::{Deserialize, Serialize};

/// A course as presented in the conversational menu, with its modules in
/// teaching order.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Course {
    pub id: String,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub sequence_order: i16,
    pub modules: Vec<CourseModule>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct CourseModule {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub sequence_order: i16,
    pub quiz_id: Option<String>,
}

impl CourseModule {
    pub fn has_quiz(&self) -> bool {
        self.quiz_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_has_quiz_follows_quiz_id() {
        let with_quiz = CourseModule {
            id: "m-1".to_string(),
            name: "Entrepreneurship".to_string(),
            description: None,
            sequence_order: 1,
            quiz_id: Some("quiz-1".to_string()),
        };
        let without_quiz = CourseModule {
            quiz_id: None,
            ..with_quiz.clone()
        };

        assert!(with_quiz.has_quiz());
        assert!(!without_quiz.has_quiz());
    }
}
