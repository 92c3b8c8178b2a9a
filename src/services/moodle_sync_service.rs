//! Replays a finished local quiz into the remote LMS quiz-attempt workflow.
//!
//! The protocol is strictly sequential: every request depends on the parsed
//! response of the previous one, and the LMS races against itself if calls
//! arrive back-to-back, so short delays separate the steps. Local results
//! are recorded before this service runs; nothing here ever rolls the
//! conversation back.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::{
    errors::{AppError, AppResult},
    models::domain::{AnswerRecord, QuizAttempt},
    repositories::QuizAttemptRepository,
    services::{answer_matcher, moodle_client::MoodleApi, retry::retry_with_backoff},
};

/// One question per page; pages are fetched until one comes back empty.
/// The cap is a safety net against a misconfigured remote quiz.
const MAX_QUIZ_PAGES: u32 = 10;
const FINISH_MAX_ATTEMPTS: u32 = 3;
const GRADE_POLL_ATTEMPTS: u32 = 3;

const STALE_STATES: [&str; 3] = ["inprogress", "inprogresspending", "overdue"];

#[derive(Clone, Debug, PartialEq)]
pub struct SyncOutcome {
    pub remote_attempt_id: i64,
    pub remote_grade: Option<f64>,
}

pub struct MoodleSyncService {
    api: Arc<dyn MoodleApi>,
    attempts: Arc<dyn QuizAttemptRepository>,
    enabled: bool,
    step_delay: Duration,
    retry_delay: Duration,
}

impl MoodleSyncService {
    pub fn new(
        api: Arc<dyn MoodleApi>,
        attempts: Arc<dyn QuizAttemptRepository>,
        enabled: bool,
    ) -> Self {
        log::info!("Moodle sync {}", if enabled { "ENABLED" } else { "DISABLED" });
        Self {
            api,
            attempts,
            enabled,
            step_delay: Duration::from_millis(500),
            retry_delay: Duration::from_secs(2),
        }
    }

    pub fn with_timing(mut self, step_delay: Duration, retry_delay: Duration) -> Self {
        self.step_delay = step_delay;
        self.retry_delay = retry_delay;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Replay a recorded attempt into the LMS and persist the remote attempt
    /// id and grade onto it.
    pub async fn sync_quiz_attempt(
        &self,
        attempt: &QuizAttempt,
        remote_quiz_id: i64,
    ) -> AppResult<SyncOutcome> {
        if !self.enabled {
            return Err(AppError::StateConflict("Moodle sync is disabled".to_string()));
        }

        log::info!(
            "🔄 Syncing quiz attempt {} for user {} (remote quiz {}, local score {}/{})",
            attempt.id,
            attempt.user_id,
            remote_quiz_id,
            attempt.score,
            attempt.total_questions
        );

        let quizid = remote_quiz_id.to_string();

        // Step 1: signal a view event.
        self.api
            .call("mod_quiz_view_quiz", &[("quizid".to_string(), quizid.clone())])
            .await?;
        tokio::time::sleep(self.step_delay).await;

        // Step 2: a stale open attempt makes the LMS reject a new one.
        self.clear_stale_attempts(&quizid).await;
        tokio::time::sleep(self.step_delay * 2).await;

        // Step 3: start the remote attempt.
        let started = self
            .api
            .call(
                "mod_quiz_start_attempt",
                &[("quizid".to_string(), quizid.clone())],
            )
            .await?;
        let remote_attempt_id = started["attempt"]["id"].as_i64().ok_or_else(|| {
            AppError::RemoteProtocol(
                "mod_quiz_start_attempt response missing attempt id".to_string(),
            )
        })?;
        log::info!("   Started remote attempt {}", remote_attempt_id);
        tokio::time::sleep(self.step_delay).await;

        // Step 4: walk the pages and reconcile answers by text.
        let pairs = self
            .collect_answer_fields(remote_attempt_id, &attempt.answers)
            .await;
        log::info!(
            "   Collected {} answer fields",
            pairs
                .iter()
                .filter(|(name, _)| !name.contains("sequencecheck"))
                .count()
        );

        // Step 5: save is best-effort; the finish call resubmits the pairs.
        let save_params = encode_pairs(
            vec![("attemptid".to_string(), remote_attempt_id.to_string())],
            &pairs,
        );
        match self.api.call("mod_quiz_save_attempt", &save_params).await {
            Ok(_) => {
                log::info!("   Saved answers to remote attempt");
                tokio::time::sleep(self.step_delay * 2).await;
            }
            Err(err) => log::warn!("   Save failed (continuing): {}", err),
        }

        // Step 6: finish (submit + grade).
        self.finish_attempt(remote_attempt_id, &pairs).await?;
        tokio::time::sleep(self.step_delay * 2).await;

        // Step 7: grading may lag the finish call.
        let remote_grade = self.poll_grade(remote_attempt_id).await;

        // Step 8: annotate the local attempt row.
        self.attempts
            .set_remote_result(&attempt.id, remote_attempt_id, remote_grade)
            .await?;

        log::info!(
            "✅ Synced attempt {} to remote attempt {} (grade: {:?})",
            attempt.id,
            remote_attempt_id,
            remote_grade
        );

        Ok(SyncOutcome {
            remote_attempt_id,
            remote_grade,
        })
    }

    /// Force-finish remote attempts stuck in an in-progress-like state.
    /// Everything here is best-effort: failures are logged, never raised.
    async fn clear_stale_attempts(&self, quizid: &str) {
        let payload = match self
            .api
            .call(
                "mod_quiz_get_user_attempts",
                &[("quizid".to_string(), quizid.to_string())],
            )
            .await
        {
            Ok(payload) => payload,
            Err(err) => {
                log::warn!("Failed to enumerate remote attempts: {}", err);
                return;
            }
        };

        // The enumeration function returns either a bare array or an object
        // wrapping an "attempts" array, depending on the LMS version.
        let attempts = payload
            .get("attempts")
            .and_then(Value::as_array)
            .or_else(|| payload.as_array())
            .cloned()
            .unwrap_or_default();

        let stale: Vec<i64> = attempts
            .iter()
            .filter(|a| {
                a.get("state")
                    .and_then(Value::as_str)
                    .map(|state| STALE_STATES.contains(&state))
                    .unwrap_or(false)
            })
            .filter_map(|a| a.get("id").and_then(Value::as_i64))
            .collect();

        if stale.is_empty() {
            return;
        }

        log::info!("Clearing {} in-progress remote attempt(s)", stale.len());
        for attempt_id in stale {
            let params = [
                ("attemptid".to_string(), attempt_id.to_string()),
                ("finishattempt".to_string(), "1".to_string()),
            ];
            match self.api.call("mod_quiz_process_attempt", &params).await {
                Ok(_) => log::info!("Cleared remote attempt {}", attempt_id),
                Err(err) => log::warn!("Failed to clear attempt {}: {}", attempt_id, err),
            }
        }
    }

    async fn collect_answer_fields(
        &self,
        remote_attempt_id: i64,
        answers: &[AnswerRecord],
    ) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        let mut used = HashSet::new();

        for page in 0..MAX_QUIZ_PAGES {
            let params = [
                ("attemptid".to_string(), remote_attempt_id.to_string()),
                ("page".to_string(), page.to_string()),
            ];
            let page_data = match self.api.call("mod_quiz_get_attempt_data", &params).await {
                Ok(payload) => payload,
                // No more pages.
                Err(_) => break,
            };

            let questions = page_data
                .get("questions")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            if questions.is_empty() {
                break;
            }

            for question in &questions {
                let Some(html) = question.get("html").and_then(Value::as_str) else {
                    continue;
                };
                let slot = question.get("slot").and_then(Value::as_i64).unwrap_or(-1);

                let parsed = answer_matcher::parse_question_fragment(html);
                let Some(index) = answer_matcher::match_answer(&parsed.stem, answers, &mut used)
                else {
                    continue;
                };
                let record = &answers[index];

                if let Some((name, value)) = &parsed.sequence_field {
                    pairs.push((name.clone(), value.clone()));
                } else {
                    log::warn!("   Q{}: no sequencecheck field in fragment", slot);
                }

                let answer_text = record.selected_option_text().unwrap_or_default();
                if let Some((name, value)) =
                    answer_matcher::choose_option(&parsed.choices, answer_text)
                {
                    log::info!(
                        "   Q{}: {} → \"{}\" → value={}",
                        slot,
                        record.selected_letter,
                        answer_text.chars().take(40).collect::<String>(),
                        value
                    );
                    pairs.push((name, value));
                }
            }
        }

        pairs
    }

    async fn finish_attempt(
        &self,
        remote_attempt_id: i64,
        pairs: &[(String, String)],
    ) -> AppResult<Value> {
        let finish_params = encode_pairs(
            vec![
                ("attemptid".to_string(), remote_attempt_id.to_string()),
                ("finishattempt".to_string(), "1".to_string()),
            ],
            pairs,
        );

        let result = retry_with_backoff(
            FINISH_MAX_ATTEMPTS,
            self.retry_delay,
            |err| err.is_remote() && !is_unsaved_work(err),
            || self.api.call("mod_quiz_process_attempt", &finish_params),
        )
        .await;

        let done = match result {
            Ok(value) => value,
            Err(err) if is_unsaved_work(&err) => {
                // The LMS wants explicit confirmation that unsaved answers
                // may be submitted as-is.
                log::info!("   Finish reported unsaved work, retrying with confirmation flag");
                let mut confirmed = finish_params.clone();
                confirmed.push((
                    "preflightdata[0][name]".to_string(),
                    "confirmdatasaved".to_string(),
                ));
                confirmed.push(("preflightdata[0][value]".to_string(), "1".to_string()));
                self.api
                    .call("mod_quiz_process_attempt", &confirmed)
                    .await?
            }
            Err(err) => return Err(err),
        };

        log::info!(
            "   Finished remote attempt: {}",
            done.get("state").and_then(Value::as_str).unwrap_or("unknown")
        );
        Ok(done)
    }

    async fn poll_grade(&self, remote_attempt_id: i64) -> Option<f64> {
        let params = [("attemptid".to_string(), remote_attempt_id.to_string())];

        let review = retry_with_backoff(GRADE_POLL_ATTEMPTS, self.retry_delay, |_| true, || {
            self.api.call("mod_quiz_get_attempt_review", &params)
        })
        .await;

        match review {
            Ok(payload) => {
                let grade = parse_grade(payload.get("grade"));
                log::info!("   Remote grade: {:?}", grade);
                grade
            }
            Err(err) => {
                log::warn!("   Could not get grade: {}", err);
                None
            }
        }
    }
}

fn encode_pairs(
    base: Vec<(String, String)>,
    pairs: &[(String, String)],
) -> Vec<(String, String)> {
    let mut params = base;
    for (index, (name, value)) in pairs.iter().enumerate() {
        params.push((format!("data[{}][name]", index), name.clone()));
        params.push((format!("data[{}][value]", index), value.clone()));
    }
    params
}

fn is_unsaved_work(err: &AppError) -> bool {
    err.is_remote() && err.to_string().to_lowercase().contains("unsaved work")
}

/// Grades arrive as a number or as a formatted string depending on the LMS
/// version.
fn parse_grade(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
