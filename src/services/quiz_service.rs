//! Quiz session logic: question selection, answer normalization, local
//! grading and the chat-facing question/result formatting.

use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use regex::Regex;

use crate::models::domain::{
    AnswerRecord, LocalCorrectness, QuestionDefinition, QuizDefinition,
};

pub const PASS_THRESHOLD_PERCENT: i32 = 70;
pub const MAX_QUIZ_QUESTIONS: usize = 5;
/// The remote LMS grades on a 0–10 scale; 7.0 mirrors the local 70% gate.
pub const REMOTE_PASS_GRADE: f64 = 7.0;

static ANSWER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-D]$").expect("answer pattern is valid"));

/// Uniformly select up to [`MAX_QUIZ_QUESTIONS`] questions without
/// replacement.
pub fn select_questions(quiz: &QuizDefinition) -> Vec<QuestionDefinition> {
    let mut questions = quiz.questions.clone();
    questions.shuffle(&mut rand::thread_rng());
    questions.truncate(MAX_QUIZ_QUESTIONS);
    questions
}

/// Normalize a quiz-state message into an answer letter. Accepts a bare
/// letter, an interactive button id (`answer_b`) or an echoed option line
/// (`"B) Some text"`). Anything else is rejected and re-prompted.
pub fn normalize_answer(text: &str) -> Option<String> {
    let trimmed = text.trim();

    let candidate = if let Some(rest) = trimmed
        .to_lowercase()
        .strip_prefix("answer_")
        .map(str::to_string)
    {
        rest
    } else if let Some((before, _)) = trimmed.split_once(')') {
        before.to_string()
    } else {
        trimmed.to_string()
    };

    let letter = candidate.trim().to_uppercase();
    if ANSWER_RE.is_match(&letter) {
        Some(letter)
    } else {
        None
    }
}

/// Local grading: compare the selected option text against the reference
/// answer text when one exists. Without a reference the LMS is the grading
/// authority and the result is `Unknown`.
pub fn grade_answer(question: &QuestionDefinition, letter: &str) -> LocalCorrectness {
    let index = letter
        .chars()
        .next()
        .and_then(|c| (c as usize).checked_sub('A' as usize));
    let selected = index.and_then(|i| question.options.get(i));

    match (&question.known_correct_text, selected) {
        (Some(reference), Some(option)) => {
            if option.trim() == reference.trim() {
                LocalCorrectness::Correct
            } else {
                LocalCorrectness::Incorrect
            }
        }
        _ => LocalCorrectness::Unknown,
    }
}

/// Count of locally confirmed correct answers, and whether every answer was
/// locally gradable.
pub fn local_score(answers: &[AnswerRecord]) -> (i16, bool) {
    let score = answers.iter().filter(|a| a.local_correct.is_correct()).count() as i16;
    let all_known = answers.iter().all(|a| !a.local_correct.is_unknown());
    (score, all_known)
}

pub fn is_passing(score: i16, total: i16) -> bool {
    total > 0 && i32::from(score) * 100 >= i32::from(total) * PASS_THRESHOLD_PERCENT
}

pub fn format_question(question: &QuestionDefinition, number: usize, total: usize) -> String {
    let mut message = format!("*Question {}/{}*\n\n{}\n\n", number, total, question.text);
    for (index, option) in question.options.iter().enumerate() {
        let letter = (b'A' + index as u8) as char;
        message.push_str(&format!("{}) {}\n", letter, option));
    }
    message.push_str("\n_Reply with A, B, C, or D_");
    message
}

/// Results message shown as soon as the quiz finishes, before the detached
/// sync confirms. Answers without a local reference are reported as pending
/// rather than counted as wrong; the LMS grade is authoritative for those.
pub fn format_results(
    score: i16,
    total: i16,
    all_known: bool,
    passed: bool,
    will_sync: bool,
) -> String {
    let percentage = if total > 0 {
        (i32::from(score) * 100) / i32::from(total)
    } else {
        0
    };

    let mut message = String::from("🎯 *Quiz Complete!*\n\n");
    message.push_str(&format!("Score: {}/{} ({}%)\n", score, total, percentage));

    if all_known {
        message.push_str(&format!(
            "Status: {}\n\n",
            if passed { "✅ PASSED" } else { "❌ FAILED" }
        ));
        if passed {
            message.push_str("🎉 *Congratulations!* You've passed the quiz!\n\n");
            message.push_str("Continue learning or type 'menu' to select another module.");
        } else {
            message.push_str(&format!(
                "📚 You need {}% to pass. Review the material and try again!\n\n",
                PASS_THRESHOLD_PERCENT
            ));
            message.push_str("Type *'quiz'* to retake, or ask more questions to learn.");
        }
    } else {
        message.push_str("Status: ⏳ PENDING\n\n");
        message.push_str(
            "Some answers could not be graded locally; your official result comes from Moodle.",
        );
    }

    if will_sync {
        message.push_str("\n\n_Your result is being recorded in Moodle._");
    } else {
        message.push_str("\n\n_Note: Could not sync to Moodle. Contact admin if needed._");
    }

    message
}
