//! Top-level conversational state machine: course selection → module
//! selection → learning → quiz, with the remote sync dispatched after a
//! quiz completes. Every transition is persisted through the conversation
//! store; in-memory session shadows are deliberately absent so restarts and
//! multiple instances see the same state.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    errors::{AppError, AppResult},
    models::{
        domain::{
            AnswerRecord, ConversationContext, ConversationState, Course, PhaseData,
            QuestionDefinition, QuizAttempt,
        },
        dto::ReplyPayload,
    },
    repositories::{
        ContextUpdate, ConversationRepository, ProgressRepository, QuizAttemptRepository,
    },
    services::{
        certificate_service::CertificateIssuer,
        content_service::ContentResponder,
        course_catalog::CourseCatalog,
        moodle_sync_service::MoodleSyncService,
        quiz_service::{self, REMOTE_PASS_GRADE},
    },
};

/// The user can always escape to course selection, whatever the state.
static RESTART_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(hi|hello|hey|start|teach me|begin|restart)$")
        .expect("restart pattern is valid")
});
static GREETING_PREFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(hi|hello|hey|start|teach me|learn|help)")
        .expect("greeting pattern is valid")
});

const GENERIC_APOLOGY: &str =
    "Sorry, something went wrong. Please try again or type 'help' for assistance.";
const NO_QUIZ_MESSAGE: &str =
    "Quiz not available for this module yet. Continue learning and check back later!";

pub struct ConversationOrchestrator {
    conversations: Arc<dyn ConversationRepository>,
    attempts: Arc<dyn QuizAttemptRepository>,
    progress: Arc<dyn ProgressRepository>,
    catalog: Arc<CourseCatalog>,
    content: Arc<dyn ContentResponder>,
    moodle_sync: Arc<MoodleSyncService>,
    certificates: Arc<dyn CertificateIssuer>,
}

impl ConversationOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        conversations: Arc<dyn ConversationRepository>,
        attempts: Arc<dyn QuizAttemptRepository>,
        progress: Arc<dyn ProgressRepository>,
        catalog: Arc<CourseCatalog>,
        content: Arc<dyn ContentResponder>,
        moodle_sync: Arc<MoodleSyncService>,
        certificates: Arc<dyn CertificateIssuer>,
    ) -> Self {
        Self {
            conversations,
            attempts,
            progress,
            catalog,
            content,
            moodle_sync,
            certificates,
        }
    }

    /// Handle one inbound message. Never returns an error to the transport:
    /// anything unrecoverable becomes a generic apology, and since stored
    /// state is only written on successful transitions, retrying the same
    /// input is safe.
    pub async fn handle_message(
        &self,
        user_id: &str,
        channel_address: &str,
        text: &str,
    ) -> ReplyPayload {
        match self.dispatch(user_id, channel_address, text).await {
            Ok(reply) => reply,
            Err(err) => {
                log::error!("Error handling message for user {}: {}", user_id, err);
                ReplyPayload::text(GENERIC_APOLOGY)
            }
        }
    }

    async fn dispatch(
        &self,
        user_id: &str,
        channel_address: &str,
        text: &str,
    ) -> AppResult<ReplyPayload> {
        let context = self
            .conversations
            .get_or_create(user_id, channel_address)
            .await?;
        let trimmed = text.trim();

        if RESTART_RE.is_match(trimmed) {
            log::info!(
                "Restart command from user {} in state {}",
                user_id,
                context.conversation_state
            );
            return self.restart(user_id).await;
        }

        match context.conversation_state {
            ConversationState::Idle => self.handle_idle(user_id, trimmed).await,
            ConversationState::CourseSelection => {
                self.handle_course_selection(user_id, trimmed).await
            }
            ConversationState::ModuleSelection => {
                self.handle_module_selection(user_id, trimmed, &context).await
            }
            ConversationState::Learning => self.handle_learning(user_id, trimmed, &context).await,
            ConversationState::QuizActive => {
                self.handle_quiz_answer(user_id, trimmed, &context).await
            }
        }
    }

    /// Reset to course selection, clearing course/module/quiz fields.
    async fn restart(&self, user_id: &str) -> AppResult<ReplyPayload> {
        self.conversations
            .update(
                user_id,
                ContextUpdate {
                    conversation_state: Some(ConversationState::CourseSelection),
                    current_course_id: Some(None),
                    current_module_id: Some(None),
                    current_quiz_id: Some(None),
                    current_question_index: Some(0),
                    quiz_answers: Some(Vec::new()),
                    context_data: Some(PhaseData::default()),
                },
            )
            .await?;
        Ok(self.course_list())
    }

    async fn handle_idle(&self, user_id: &str, text: &str) -> AppResult<ReplyPayload> {
        if GREETING_PREFIX_RE.is_match(text) {
            self.conversations
                .update(
                    user_id,
                    ContextUpdate {
                        conversation_state: Some(ConversationState::CourseSelection),
                        ..Default::default()
                    },
                )
                .await?;
            return Ok(self.course_list());
        }

        Ok(ReplyPayload::text(
            "👋 Welcome! Type 'teach me' to start learning, or 'help' for options.",
        ))
    }

    async fn handle_course_selection(&self, user_id: &str, text: &str) -> AppResult<ReplyPayload> {
        let Some(course) = self.parse_course_reference(text) else {
            let listing = self
                .catalog
                .courses()
                .iter()
                .enumerate()
                .map(|(i, c)| format!("{}. {}", i + 1, c.name))
                .collect::<Vec<_>>()
                .join("\n");
            return Ok(ReplyPayload::text(format!(
                "Please select a course by number:\n{}",
                listing
            )));
        };

        self.conversations
            .update(
                user_id,
                ContextUpdate {
                    conversation_state: Some(ConversationState::ModuleSelection),
                    current_course_id: Some(Some(course.id.clone())),
                    context_data: Some(PhaseData {
                        course_name: Some(course.name.clone()),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            )
            .await?;

        Ok(Self::module_list(course))
    }

    async fn handle_module_selection(
        &self,
        user_id: &str,
        text: &str,
        context: &ConversationContext,
    ) -> AppResult<ReplyPayload> {
        let course = match context
            .current_course_id
            .as_deref()
            .and_then(|id| self.catalog.course_by_id(id))
        {
            Some(course) => course,
            // The stored course no longer exists in the catalog; start over.
            None => return self.restart(user_id).await,
        };

        let Some(module) = Self::parse_module_reference(text, course) else {
            let listing = course
                .modules
                .iter()
                .enumerate()
                .map(|(i, m)| format!("{}. {}", i + 1, m.name))
                .collect::<Vec<_>>()
                .join("\n");
            return Ok(ReplyPayload::text(format!(
                "Please select a module by number:\n{}",
                listing
            )));
        };

        // Progress first, context second: a failed write must leave the
        // stored state where a retry of the same message works.
        self.progress.start_module(user_id, &module.id).await?;

        self.conversations
            .update(
                user_id,
                ContextUpdate {
                    conversation_state: Some(ConversationState::Learning),
                    current_module_id: Some(Some(module.id.clone())),
                    context_data: Some(PhaseData {
                        course_name: Some(course.name.clone()),
                        module_name: Some(module.name.clone()),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            )
            .await?;

        let mut intro = format!("🎓 *{}*\n\n✅ Great! You've started learning!\n\n", module.name);
        intro.push_str("💬 Ask me anything about this module.\n\n");
        intro.push_str("📊 Ready to test your knowledge? Type *\"quiz\"*\n");
        intro.push_str("🔄 Type *\"menu\"* to go back to courses");

        Ok(ReplyPayload::text(intro))
    }

    async fn handle_learning(
        &self,
        user_id: &str,
        text: &str,
        context: &ConversationContext,
    ) -> AppResult<ReplyPayload> {
        let lower = text.to_lowercase();

        if lower == "menu" || lower == "back" {
            self.conversations
                .update(
                    user_id,
                    ContextUpdate {
                        conversation_state: Some(ConversationState::CourseSelection),
                        current_module_id: Some(None),
                        ..Default::default()
                    },
                )
                .await?;
            return Ok(self.course_list());
        }

        if lower.contains("quiz") {
            return self.start_quiz(user_id, context).await;
        }

        let module_name = context
            .context_data
            .module_name
            .clone()
            .unwrap_or_default();

        match self.content.answer(user_id, text, &module_name).await {
            Ok(answer) => Ok(ReplyPayload::text(format!(
                "{}\n\n💡 _Ask another question or type \"quiz\" to test your knowledge!_",
                answer
            ))),
            Err(err) => {
                log::warn!("Content query failed for user {}: {}", user_id, err);
                Ok(ReplyPayload::text(
                    "Sorry, I couldn't process your question. Please try again or type 'menu' to go back.",
                ))
            }
        }
    }

    async fn start_quiz(
        &self,
        user_id: &str,
        context: &ConversationContext,
    ) -> AppResult<ReplyPayload> {
        let module = match context
            .current_module_id
            .as_deref()
            .and_then(|id| self.catalog.find_module(id))
        {
            Some((_, module)) => module,
            None => return self.restart(user_id).await,
        };

        let Some(quiz_id) = &module.quiz_id else {
            return Ok(ReplyPayload::text(NO_QUIZ_MESSAGE));
        };
        let Some(quiz) = self.catalog.quiz(quiz_id) else {
            log::warn!("Module {} references unknown quiz {}", module.id, quiz_id);
            return Ok(ReplyPayload::text(NO_QUIZ_MESSAGE));
        };
        if quiz.questions.is_empty() {
            return Ok(ReplyPayload::text(
                "No questions found for this quiz yet. Please contact an administrator.",
            ));
        }

        let selected = quiz_service::select_questions(quiz);
        let total = selected.len();

        self.conversations
            .update(
                user_id,
                ContextUpdate {
                    conversation_state: Some(ConversationState::QuizActive),
                    current_quiz_id: Some(Some(quiz.id.clone())),
                    current_question_index: Some(0),
                    quiz_answers: Some(Vec::new()),
                    context_data: Some(PhaseData {
                        course_name: context.context_data.course_name.clone(),
                        module_name: context.context_data.module_name.clone(),
                        quiz_id: Some(quiz.id.clone()),
                        remote_quiz_id: Some(quiz.remote_quiz_id),
                        quiz_question_ids: selected.iter().map(|q| q.id.clone()).collect(),
                    }),
                    ..Default::default()
                },
            )
            .await?;

        let text = format!(
            "📝 *Quiz Started!*\n\nYou'll answer {} questions. Pass threshold: {}%\n\n{}",
            total,
            quiz_service::PASS_THRESHOLD_PERCENT,
            quiz_service::format_question(&selected[0], 1, total)
        );

        Ok(ReplyPayload::Question {
            text,
            question_number: 1,
            total_questions: total,
        })
    }

    async fn handle_quiz_answer(
        &self,
        user_id: &str,
        text: &str,
        context: &ConversationContext,
    ) -> AppResult<ReplyPayload> {
        if text.eq_ignore_ascii_case("menu") {
            log::info!("Menu requested mid-quiz by user {}", user_id);
            return self.restart(user_id).await;
        }

        let Some(letter) = quiz_service::normalize_answer(text) else {
            return Ok(ReplyPayload::text(
                "Please reply with A, B, C, or D only, or type 'menu' to exit the quiz.",
            ));
        };

        let questions = self.selected_questions(context)?;
        let index = context.current_question_index.max(0) as usize;
        let Some(question) = questions.get(index) else {
            return Err(AppError::InternalError(format!(
                "quiz index {} out of range for user {}",
                index, user_id
            )));
        };

        let local_correct = quiz_service::grade_answer(question, &letter);
        let mut answers = context.quiz_answers.clone();
        answers.push(AnswerRecord {
            question_id: question.id.clone(),
            selected_letter: letter.clone(),
            local_correct,
            question_text: question.text.clone(),
            options: question.options.clone(),
        });

        if index + 1 >= questions.len() {
            return self.complete_quiz(user_id, context, answers).await;
        }

        self.conversations
            .update(
                user_id,
                ContextUpdate {
                    current_question_index: Some((index + 1) as i32),
                    quiz_answers: Some(answers),
                    ..Default::default()
                },
            )
            .await?;

        let body = format!(
            "✓ Answer recorded: {}\n\n{}",
            letter,
            quiz_service::format_question(questions[index + 1], index + 2, questions.len())
        );

        Ok(ReplyPayload::Question {
            text: body,
            question_number: index + 2,
            total_questions: questions.len(),
        })
    }

    async fn complete_quiz(
        &self,
        user_id: &str,
        context: &ConversationContext,
        answers: Vec<AnswerRecord>,
    ) -> AppResult<ReplyPayload> {
        let module_id = context.current_module_id.clone().unwrap_or_default();
        let quiz_id = context.current_quiz_id.clone().unwrap_or_default();
        let total = answers.len() as i16;

        let (score, all_known) = quiz_service::local_score(&answers);
        let passed = quiz_service::is_passing(score, total);

        let attempt_number = self.attempts.count_user_attempts(user_id, &module_id).await? as i16 + 1;
        let attempt = self
            .attempts
            .create(QuizAttempt::new(
                user_id,
                &module_id,
                &quiz_id,
                attempt_number,
                score,
                total,
                passed,
                answers,
            ))
            .await?;

        // Back to learning before the sync is even dispatched: a remote
        // failure must never roll the conversation back into the quiz.
        self.conversations
            .update(
                user_id,
                ContextUpdate {
                    conversation_state: Some(ConversationState::Learning),
                    current_quiz_id: Some(None),
                    current_question_index: Some(0),
                    quiz_answers: Some(Vec::new()),
                    context_data: Some(context.context_data.without_quiz()),
                    ..Default::default()
                },
            )
            .await?;

        let remote_quiz_id = context.context_data.remote_quiz_id;
        let will_sync = remote_quiz_id.is_some() && self.moodle_sync.is_enabled();
        self.spawn_post_completion(attempt, remote_quiz_id, passed);

        Ok(ReplyPayload::text(quiz_service::format_results(
            score, total, all_known, passed, will_sync,
        )))
    }

    /// Remote sync, progress completion and certificate issuance run
    /// detached: the user already has the local-score reply in hand.
    fn spawn_post_completion(
        &self,
        attempt: QuizAttempt,
        remote_quiz_id: Option<i64>,
        local_passed: bool,
    ) {
        let sync = Arc::clone(&self.moodle_sync);
        let progress = Arc::clone(&self.progress);
        let certificates = Arc::clone(&self.certificates);

        tokio::spawn(async move {
            let mut final_passed = local_passed;

            match remote_quiz_id {
                Some(remote_quiz_id) if sync.is_enabled() => {
                    match sync.sync_quiz_attempt(&attempt, remote_quiz_id).await {
                        Ok(outcome) => {
                            if let Some(grade) = outcome.remote_grade {
                                final_passed = grade >= REMOTE_PASS_GRADE;
                            }
                        }
                        Err(err) => {
                            // Local results stand; the remote grade is simply
                            // unavailable for this attempt.
                            log::warn!(
                                "⚠️ Failed to sync quiz attempt {} to Moodle: {}",
                                attempt.id,
                                err
                            );
                        }
                    }
                }
                _ => log::info!(
                    "Moodle sync skipped for attempt {} (disabled or no remote quiz)",
                    attempt.id
                ),
            }

            if final_passed {
                if let Err(err) = progress
                    .complete_module(&attempt.user_id, &attempt.module_id)
                    .await
                {
                    log::warn!(
                        "Failed to mark module {} completed for user {}: {}",
                        attempt.module_id,
                        attempt.user_id,
                        err
                    );
                }

                match certificates
                    .issue(&attempt.user_id, &attempt.module_id, &attempt.id)
                    .await
                {
                    Ok(url) => log::info!(
                        "Certificate generated for user {}: {}",
                        attempt.user_id,
                        url
                    ),
                    Err(err) => log::warn!("Failed to generate certificate: {}", err),
                }
            }
        });
    }

    /// Resolve the persisted question id selection back into definitions,
    /// preserving the selection order.
    fn selected_questions(&self, context: &ConversationContext) -> AppResult<Vec<&QuestionDefinition>> {
        let quiz_id = context
            .current_quiz_id
            .as_deref()
            .or(context.context_data.quiz_id.as_deref())
            .ok_or_else(|| {
                AppError::InternalError(format!(
                    "user {} is in quiz state without an active quiz",
                    context.user_id
                ))
            })?;

        let quiz = self.catalog.quiz(quiz_id).ok_or_else(|| {
            AppError::InternalError(format!("active quiz '{}' missing from catalog", quiz_id))
        })?;

        let by_id: HashMap<&str, &QuestionDefinition> =
            quiz.questions.iter().map(|q| (q.id.as_str(), q)).collect();

        context
            .context_data
            .quiz_question_ids
            .iter()
            .map(|id| {
                by_id.get(id.as_str()).copied().ok_or_else(|| {
                    AppError::InternalError(format!(
                        "selected question '{}' missing from quiz '{}'",
                        id, quiz_id
                    ))
                })
            })
            .collect()
    }

    fn course_list(&self) -> ReplyPayload {
        let mut message = String::from("🎓 *Select a Course*\n\n");
        for (index, course) in self.catalog.courses().iter().enumerate() {
            message.push_str(&format!("{}. 📖 {}\n", index + 1, course.name));
        }
        message.push_str("\n💬 Reply with the course number to select");
        ReplyPayload::text(message)
    }

    fn module_list(course: &Course) -> ReplyPayload {
        let mut message = format!("📘 *{}*\n\n*Select a Module:*\n\n", course.name);
        for (index, module) in course.modules.iter().enumerate() {
            message.push_str(&format!("{}. 📑 {}\n", index + 1, module.name));
        }
        message.push_str("\n💬 Reply with the module number to select");
        ReplyPayload::text(message)
    }

    fn parse_course_reference(&self, text: &str) -> Option<&Course> {
        let lower = text.trim().to_lowercase();

        if lower.chars().all(|c| c.is_ascii_digit()) {
            return lower
                .parse::<usize>()
                .ok()
                .and_then(|position| self.catalog.course_by_position(position));
        }

        if lower.len() < 3 {
            return None;
        }
        self.catalog.courses().iter().find(|course| {
            let name = course.name.to_lowercase();
            name.contains(&lower) || lower.contains(&name)
        })
    }

    fn parse_module_reference<'a>(
        text: &str,
        course: &'a Course,
    ) -> Option<&'a crate::models::domain::CourseModule> {
        let trimmed = text.trim();

        // Interactive list replies arrive as "module_<id>".
        if let Some(id) = trimmed.strip_prefix("module_") {
            return course.modules.iter().find(|m| m.id == id);
        }

        let lower = trimmed.to_lowercase();
        if lower.chars().all(|c| c.is_ascii_digit()) {
            return lower
                .parse::<usize>()
                .ok()
                .and_then(|position| position.checked_sub(1))
                .and_then(|index| course.modules.get(index));
        }

        if lower.len() < 3 {
            return None;
        }
        course.modules.iter().find(|module| {
            let name = module.name.to_lowercase();
            name.contains(&lower) || lower.contains(&name)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::content_service::MockContentResponder;
    use crate::test_utils::fixtures;
    use crate::test_utils::memory::{
        InMemoryConversationRepository, InMemoryQuizAttemptRepository, NoopCertificateIssuer,
        NoopMoodleApi, RecordingProgressRepository,
    };

    fn orchestrator_with_content(content: MockContentResponder) -> ConversationOrchestrator {
        let conversations = Arc::new(InMemoryConversationRepository::new());
        let attempts = Arc::new(InMemoryQuizAttemptRepository::new());
        let moodle_sync = Arc::new(MoodleSyncService::new(
            Arc::new(NoopMoodleApi),
            attempts.clone(),
            false,
        ));

        ConversationOrchestrator::new(
            conversations,
            attempts,
            Arc::new(RecordingProgressRepository::new()),
            Arc::new(fixtures::sample_catalog()),
            Arc::new(content),
            moodle_sync,
            Arc::new(NoopCertificateIssuer),
        )
    }

    async fn advance_to_learning(orchestrator: &ConversationOrchestrator, user: &str) {
        orchestrator.handle_message(user, "+255700000001", "hi").await;
        orchestrator.handle_message(user, "+255700000001", "1").await;
        orchestrator.handle_message(user, "+255700000001", "1").await;
    }

    #[tokio::test]
    async fn learning_turn_forwards_to_content_collaborator_with_module_name() {
        let mut content = MockContentResponder::new();
        content
            .expect_answer()
            .withf(|user_id, query, module_name| {
                user_id == "user-1"
                    && query == "What is entrepreneurship?"
                    && module_name == "Entrepreneurship & Business Ideas"
            })
            .times(1)
            .returning(|_, _, _| Ok("Entrepreneurship is spotting opportunities.".to_string()));

        let orchestrator = orchestrator_with_content(content);
        advance_to_learning(&orchestrator, "user-1").await;

        let reply = orchestrator
            .handle_message("user-1", "+255700000001", "What is entrepreneurship?")
            .await;

        assert!(reply.body().contains("Entrepreneurship is spotting opportunities."));
        assert!(reply.body().contains("type \"quiz\""));
    }

    #[tokio::test]
    async fn content_failure_yields_friendly_message_not_apology() {
        let mut content = MockContentResponder::new();
        content
            .expect_answer()
            .times(1)
            .returning(|_, _, _| Err(AppError::RemoteProtocol("search down".into())));

        let orchestrator = orchestrator_with_content(content);
        advance_to_learning(&orchestrator, "user-1").await;

        let reply = orchestrator
            .handle_message("user-1", "+255700000001", "tell me more")
            .await;

        assert!(reply.body().contains("couldn't process your question"));
        assert!(!reply.body().contains("something went wrong"));
    }
}
