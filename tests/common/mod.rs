#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use elimu_server::errors::{AppError, AppResult};
use elimu_server::models::domain::{
    ConversationContext, Course, CourseModule, QuestionDefinition, QuestionType, QuizAttempt,
    QuizDefinition,
};
use elimu_server::repositories::{
    ContextUpdate, ConversationRepository, ProgressRepository, QuizAttemptRepository,
};
use elimu_server::services::certificate_service::CertificateIssuer;
use elimu_server::services::content_service::ContentResponder;
use elimu_server::services::course_catalog::CourseCatalog;
use elimu_server::services::moodle_client::MoodleApi;
use elimu_server::services::moodle_sync_service::MoodleSyncService;
use elimu_server::services::orchestrator_service::ConversationOrchestrator;

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
    async fn issue(&self, _user_id: &str, _module_id: &str, attempt_id: &str) -> AppResult<String> {
        Ok(format!("http://localhost:3002/certificates/{}.pdf", attempt_id))
    }
}

pub struct CannedContentResponder {
    pub reply: String,
}

#[async_trait]
impl ContentResponder for CannedContentResponder {
    async fn answer(&self, _user_id: &str, _query: &str, _module_name: &str) -> AppResult<String> {
        Ok(self.reply.clone())
    }
}

/// Plays back per-function response queues and records every call made, so
/// tests can assert both the protocol order and the submitted form fields.
pub struct ScriptedMoodleApi {
    responses: Mutex<HashMap<String, VecDeque<AppResult<Value>>>>,
    calls: Mutex<Vec<(String, Vec<(String, String)>)>>,
}

impl ScriptedMoodleApi {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub async fn script(&self, wsfunction: &str, response: AppResult<Value>) {
        self.responses
            .lock()
            .await
            .entry(wsfunction.to_string())
            .or_default()
            .push_back(response);
    }

    pub async fn calls_for(&self, wsfunction: &str) -> Vec<Vec<(String, String)>> {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|(name, _)| name == wsfunction)
            .map(|(_, params)| params.clone())
            .collect()
    }
}

#[async_trait]
impl MoodleApi for ScriptedMoodleApi {
    async fn call(&self, wsfunction: &str, params: &[(String, String)]) -> AppResult<Value> {
        self.calls
            .lock()
            .await
            .push((wsfunction.to_string(), params.to_vec()));

        self.responses
            .lock()
            .await
            .get_mut(wsfunction)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| {
                Err(AppError::RemoteProtocol(format!(
                    "{}: unscripted call",
                    wsfunction
                )))
            })
    }
}

/// Gradable quiz: the reference answer is always the second option, so "B"
/// is always locally correct.
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

pub struct TestHarness {
    pub orchestrator: ConversationOrchestrator,
    pub conversations: Arc<InMemoryConversationRepository>,
    pub attempts: Arc<InMemoryQuizAttemptRepository>,
    pub progress: Arc<RecordingProgressRepository>,
}

pub fn harness() -> TestHarness {
    let conversations = Arc::new(InMemoryConversationRepository::new());
    let attempts = Arc::new(InMemoryQuizAttemptRepository::new());
    let progress = Arc::new(RecordingProgressRepository::new());

    let api = Arc::new(ScriptedMoodleApi::new());
    let moodle_sync = Arc::new(MoodleSyncService::new(api, attempts.clone(), false));

    let orchestrator = ConversationOrchestrator::new(
        conversations.clone(),
        attempts.clone(),
        progress.clone(),
        Arc::new(sample_catalog()),
        Arc::new(CannedContentResponder {
            reply: "Here is what I found in the module materials.".to_string(),
        }),
        moodle_sync,
        Arc::new(NoopCertificateIssuer),
    );

    TestHarness {
        orchestrator,
        conversations,
        attempts,
        progress,
    }
}

/// Render one question the way the LMS does: a sequencecheck hidden input
/// plus radio options labelled through aria association.
pub fn moodle_question_html(
    field_prefix: &str,
    question_text: &str,
    options: &[(&str, &str)],
) -> String {
    let mut html = format!(
        r#"<div class="que multichoice">
            <input type="hidden" name="{prefix}_:sequencecheck" value="1">
            <div class="qtext">{text}</div>
            <div class="answer">"#,
        prefix = field_prefix,
        text = question_text,
    );
    for (index, (value, label)) in options.iter().enumerate() {
        html.push_str(&format!(
            r#"<div class="r{index}">
                <input type="radio" name="{prefix}_answer" value="{value}" id="{prefix}_answer{index}" aria-labelledby="{prefix}_answer{index}label">
                <div id="{prefix}_answer{index}label"><p>{label}</p></div>
            </div>"#,
            index = index,
            prefix = field_prefix,
            value = value,
            label = label,
        ));
    }
    html.push_str("</div></div>");
    html
}
