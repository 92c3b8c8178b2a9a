pub mod fixtures {
    use crate::models::domain::{
        AnswerRecord, Course, CourseModule, LocalCorrectness, QuestionDefinition, QuestionType,
        QuizDefinition,
    };
    use crate::services::course_catalog::CourseCatalog;

    /// Gradable quiz: five questions, the reference answer is always the
    /// second option, so answering "B" is always locally correct.
    pub fn gradable_quiz() -> QuizDefinition {
        QuizDefinition {
            id: "quiz-1".to_string(),
            name: "Entrepreneurship Quiz".to_string(),
            remote_quiz_id: 4,
            questions: (1..=5)
                .map(|i| QuestionDefinition {
                    id: format!("q-{}", i),
                    text: format!("Question number {} about entrepreneurship basics?", i),
                    question_type: QuestionType::SingleChoice,
                    options: vec![
                        format!("Wrong option one for {}", i),
                        format!("Right option for {}", i),
                        format!("Wrong option three for {}", i),
                        format!("Wrong option four for {}", i),
                    ],
                    known_correct_text: Some(format!("Right option for {}", i)),
                })
                .collect(),
        }
    }

    /// Remote-authoritative quiz: no reference answers, so every answer
    /// grades as unknown locally.
    pub fn remote_only_quiz() -> QuizDefinition {
        QuizDefinition {
            id: "quiz-2".to_string(),
            name: "Assessment Strategies Quiz".to_string(),
            remote_quiz_id: 7,
            questions: (1..=2)
                .map(|i| QuestionDefinition {
                    id: format!("tf-{}", i),
                    text: format!("Statement {} about assessment is accurate?", i),
                    question_type: QuestionType::TrueFalse,
                    options: vec!["True".to_string(), "False".to_string()],
                    known_correct_text: None,
                })
                .collect(),
        }
    }

    pub fn sample_catalog() -> CourseCatalog {
        let courses = vec![
            Course {
                id: "course-1".to_string(),
                code: "BSE".to_string(),
                name: "Business Studies & Entrepreneurship".to_string(),
                description: Some("Foundations of running a business".to_string()),
                sequence_order: 1,
                modules: vec![
                    CourseModule {
                        id: "module-1".to_string(),
                        name: "Entrepreneurship & Business Ideas".to_string(),
                        description: None,
                        sequence_order: 1,
                        quiz_id: Some("quiz-1".to_string()),
                    },
                    CourseModule {
                        id: "module-2".to_string(),
                        name: "Market Research Basics".to_string(),
                        description: None,
                        sequence_order: 2,
                        quiz_id: None,
                    },
                ],
            },
            Course {
                id: "course-2".to_string(),
                code: "TPD".to_string(),
                name: "Teachers Professional Development".to_string(),
                description: None,
                sequence_order: 2,
                modules: vec![CourseModule {
                    id: "module-3".to_string(),
                    name: "Assessment Strategies".to_string(),
                    description: None,
                    sequence_order: 1,
                    quiz_id: Some("quiz-2".to_string()),
                }],
            },
        ];

        CourseCatalog::from_parts(courses, vec![gradable_quiz(), remote_only_quiz()])
    }

    pub fn answer_record(
        question_id: &str,
        question_text: &str,
        letter: &str,
        options: &[&str],
        local_correct: LocalCorrectness,
    ) -> AnswerRecord {
        AnswerRecord {
            question_id: question_id.to_string(),
            selected_letter: letter.to_string(),
            local_correct,
            question_text: question_text.to_string(),
            options: options.iter().map(|o| o.to_string()).collect(),
        }
    }
}

pub mod memory {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::Value;
    use tokio::sync::RwLock;

    use crate::errors::{AppError, AppResult};
    use crate::models::domain::{ConversationContext, QuizAttempt};
    use crate::repositories::{
        ContextUpdate, ConversationRepository, ProgressRepository, QuizAttemptRepository,
    };
    use crate::services::certificate_service::CertificateIssuer;
    use crate::services::moodle_client::MoodleApi;

    pub struct InMemoryConversationRepository {
        contexts: Arc<RwLock<HashMap<String, ConversationContext>>>,
    }

    impl InMemoryConversationRepository {
        pub fn new() -> Self {
            Self {
                contexts: Arc::new(RwLock::new(HashMap::new())),
            }
        }

        pub async fn get(&self, user_id: &str) -> Option<ConversationContext> {
            self.contexts.read().await.get(user_id).cloned()
        }
    }

    pub fn apply_update(context: &mut ConversationContext, update: ContextUpdate) {
        if let Some(state) = update.conversation_state {
            context.conversation_state = state;
        }
        if let Some(course_id) = update.current_course_id {
            context.current_course_id = course_id;
        }
        if let Some(module_id) = update.current_module_id {
            context.current_module_id = module_id;
        }
        if let Some(quiz_id) = update.current_quiz_id {
            context.current_quiz_id = quiz_id;
        }
        if let Some(index) = update.current_question_index {
            context.current_question_index = index;
        }
        if let Some(answers) = update.quiz_answers {
            context.quiz_answers = answers;
        }
        if let Some(data) = update.context_data {
            context.context_data = data;
        }
        context.last_message_at = Utc::now();
        context.updated_at = Some(Utc::now());
    }

    #[async_trait]
    impl ConversationRepository for InMemoryConversationRepository {
        async fn get_or_create(
            &self,
            user_id: &str,
            channel_address: &str,
        ) -> AppResult<ConversationContext> {
            let mut contexts = self.contexts.write().await;
            let context = contexts
                .entry(user_id.to_string())
                .or_insert_with(|| ConversationContext::new(user_id, channel_address));
            Ok(context.clone())
        }

        async fn update(&self, user_id: &str, update: ContextUpdate) -> AppResult<()> {
            let mut contexts = self.contexts.write().await;
            let context = contexts.get_mut(user_id).ok_or_else(|| {
                AppError::NotFound(format!(
                    "Conversation context for user '{}' not found",
                    user_id
                ))
            })?;
            apply_update(context, update);
            Ok(())
        }
    }

    pub struct InMemoryQuizAttemptRepository {
        attempts: Arc<RwLock<Vec<QuizAttempt>>>,
    }

    impl InMemoryQuizAttemptRepository {
        pub fn new() -> Self {
            Self {
                attempts: Arc::new(RwLock::new(Vec::new())),
            }
        }

        pub async fn all(&self) -> Vec<QuizAttempt> {
            self.attempts.read().await.clone()
        }
    }

    #[async_trait]
    impl QuizAttemptRepository for InMemoryQuizAttemptRepository {
        async fn create(&self, attempt: QuizAttempt) -> AppResult<QuizAttempt> {
            let mut attempts = self.attempts.write().await;
            if attempts.iter().any(|a| a.id == attempt.id) {
                return Err(AppError::DatabaseError(format!(
                    "duplicate attempt id '{}'",
                    attempt.id
                )));
            }
            attempts.push(attempt.clone());
            Ok(attempt)
        }

        async fn find_by_id(&self, id: &str) -> AppResult<Option<QuizAttempt>> {
            let attempts = self.attempts.read().await;
            Ok(attempts.iter().find(|a| a.id == id).cloned())
        }

        async fn count_user_attempts(&self, user_id: &str, module_id: &str) -> AppResult<usize> {
            let attempts = self.attempts.read().await;
            Ok(attempts
                .iter()
                .filter(|a| a.user_id == user_id && a.module_id == module_id)
                .count())
        }

        async fn set_remote_result(
            &self,
            attempt_id: &str,
            remote_attempt_id: i64,
            remote_grade: Option<f64>,
        ) -> AppResult<()> {
            let mut attempts = self.attempts.write().await;
            let attempt = attempts
                .iter_mut()
                .find(|a| a.id == attempt_id)
                .ok_or_else(|| {
                    AppError::NotFound(format!("Quiz attempt with id '{}' not found", attempt_id))
                })?;
            attempt.remote_attempt_id = Some(remote_attempt_id);
            if remote_grade.is_some() {
                attempt.remote_grade = remote_grade;
            }
            attempt.modified_at = Some(Utc::now());
            Ok(())
        }
    }

    pub struct RecordingProgressRepository {
        pub started: Arc<RwLock<Vec<(String, String)>>>,
        pub completed: Arc<RwLock<Vec<(String, String)>>>,
    }

    impl RecordingProgressRepository {
        pub fn new() -> Self {
            Self {
                started: Arc::new(RwLock::new(Vec::new())),
                completed: Arc::new(RwLock::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl ProgressRepository for RecordingProgressRepository {
        async fn start_module(&self, user_id: &str, module_id: &str) -> AppResult<()> {
            self.started
                .write()
                .await
                .push((user_id.to_string(), module_id.to_string()));
            Ok(())
        }

        async fn complete_module(&self, user_id: &str, module_id: &str) -> AppResult<()> {
            self.completed
                .write()
                .await
                .push((user_id.to_string(), module_id.to_string()));
            Ok(())
        }
    }

    pub struct NoopCertificateIssuer;

    #[async_trait]
    impl CertificateIssuer for NoopCertificateIssuer {
        async fn issue(
            &self,
            _user_id: &str,
            _module_id: &str,
            attempt_id: &str,
        ) -> AppResult<String> {
            Ok(format!("http://localhost:3002/certificates/{}.pdf", attempt_id))
        }
    }

    /// Stand-in for the LMS when sync is disabled in a test.
    pub struct NoopMoodleApi;

    #[async_trait]
    impl MoodleApi for NoopMoodleApi {
        async fn call(&self, wsfunction: &str, _params: &[(String, String)]) -> AppResult<Value> {
            Err(AppError::RemoteProtocol(format!(
                "{}: no remote configured",
                wsfunction
            )))
        }
    }
}
