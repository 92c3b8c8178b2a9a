mod common;

use common::harness;
use elimu_server::models::domain::ConversationState;
use elimu_server::models::dto::ReplyPayload;
use elimu_server::repositories::ConversationRepository;

const CHANNEL: &str = "+255700000001";

async fn send(h: &common::TestHarness, user: &str, text: &str) -> ReplyPayload {
    h.orchestrator.handle_message(user, CHANNEL, text).await
}

#[tokio::test]
async fn scenario_a_full_quiz_flow() {
    let h = harness();

    let reply = send(&h, "user-a", "hi").await;
    assert!(reply.body().contains("Select a Course"));
    assert!(reply.body().contains("1. 📖 Business Studies & Entrepreneurship"));

    let reply = send(&h, "user-a", "1").await;
    assert!(reply.body().contains("Select a Module"));
    assert!(reply.body().contains("Entrepreneurship & Business Ideas"));

    let reply = send(&h, "user-a", "1").await;
    assert!(reply.body().contains("You've started learning"));
    assert!(reply.body().contains("quiz"));

    let reply = send(&h, "user-a", "quiz").await;
    match &reply {
        ReplyPayload::Question {
            text,
            question_number,
            total_questions,
        } => {
            assert_eq!(*question_number, 1);
            assert_eq!(*total_questions, 5);
            assert!(text.contains("*Question 1/5*"));
            assert!(text.contains("A) "));
            assert!(text.contains("D) "));
            assert!(text.contains("Pass threshold: 70%"));
        }
        other => panic!("expected question payload, got {:?}", other),
    }

    // Four correct answers (reference is always option B), then one wrong.
    for (i, answer) in ["B", "B", "B", "B"].iter().enumerate() {
        let reply = send(&h, "user-a", answer).await;
        match &reply {
            ReplyPayload::Question {
                question_number, ..
            } => assert_eq!(*question_number, i + 2),
            other => panic!("expected next question, got {:?}", other),
        }

        let context = h.conversations.get("user-a").await.expect("context exists");
        assert_eq!(context.current_question_index as usize, i + 1);
        assert_eq!(context.quiz_answers.len(), i + 1);
    }

    let reply = send(&h, "user-a", "A").await;
    assert!(reply.body().contains("Score: 4/5"));
    assert!(reply.body().contains("✅ PASSED"));

    let context = h.conversations.get("user-a").await.expect("context exists");
    assert_eq!(context.conversation_state, ConversationState::Learning);
    assert_eq!(context.current_question_index, 0);
    assert!(context.quiz_answers.is_empty());
    assert!(context.current_quiz_id.is_none());

    let attempts = h.attempts.all().await;
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].score, 4);
    assert_eq!(attempts[0].total_questions, 5);
    assert!(attempts[0].passed);
    assert_eq!(attempts[0].attempt_number, 1);
    assert_eq!(attempts[0].answers.len(), 5);
}

#[tokio::test]
async fn scenario_b_menu_escapes_mid_quiz() {
    let h = harness();

    send(&h, "user-b", "hi").await;
    send(&h, "user-b", "1").await;
    send(&h, "user-b", "1").await;
    send(&h, "user-b", "quiz").await;
    send(&h, "user-b", "B").await;
    send(&h, "user-b", "C").await;

    let context = h.conversations.get("user-b").await.expect("context exists");
    assert_eq!(context.conversation_state, ConversationState::QuizActive);
    assert_eq!(context.current_question_index, 2);

    let reply = send(&h, "user-b", "menu").await;
    assert!(reply.body().contains("Select a Course"));
    assert!(!reply.body().contains("Quiz Complete"));

    let context = h.conversations.get("user-b").await.expect("context exists");
    assert_eq!(context.conversation_state, ConversationState::CourseSelection);
    assert!(context.current_course_id.is_none());
    assert!(context.current_module_id.is_none());
    assert!(context.current_quiz_id.is_none());
    assert!(context.quiz_answers.is_empty());

    // No completion means no attempt row.
    assert!(h.attempts.all().await.is_empty());
}

#[tokio::test]
async fn restart_resets_every_state_to_course_selection() {
    // Message sequences that park a user in each conversational state.
    let setups: [&[&str]; 5] = [
        &[],                          // idle
        &["hi"],                      // course_selection
        &["hi", "1"],                 // module_selection
        &["hi", "1", "1"],            // learning
        &["hi", "1", "1", "quiz", "B"], // quiz_active
    ];

    for (case, setup) in setups.iter().enumerate() {
        for restart_word in ["restart", "hello", "teach me"] {
            let h = harness();
            let user = format!("user-restart-{}", case);

            for message in *setup {
                send(&h, &user, message).await;
            }

            let reply = send(&h, &user, restart_word).await;
            assert!(
                reply.body().contains("Select a Course"),
                "case {} with {:?} should re-list courses",
                case,
                restart_word
            );

            let context = h.conversations.get(&user).await.expect("context exists");
            assert_eq!(
                context.conversation_state,
                ConversationState::CourseSelection,
                "case {} with {:?}",
                case,
                restart_word
            );
            assert!(context.current_course_id.is_none());
            assert!(context.current_module_id.is_none());
            assert!(context.current_quiz_id.is_none());
            assert_eq!(context.current_question_index, 0);
            assert!(context.quiz_answers.is_empty());
        }
    }
}

#[tokio::test]
async fn invalid_quiz_answers_do_not_advance() {
    let h = harness();

    send(&h, "user-c", "hi").await;
    send(&h, "user-c", "1").await;
    send(&h, "user-c", "1").await;
    send(&h, "user-c", "quiz").await;
    send(&h, "user-c", "B").await;

    for invalid in ["E", "AB", "maybe", "1", "answer_Z", "  "] {
        let reply = send(&h, "user-c", invalid).await;
        assert!(
            reply.body().contains("Please reply with A, B, C, or D"),
            "input {:?} should re-prompt",
            invalid
        );

        let context = h.conversations.get("user-c").await.expect("context exists");
        assert_eq!(context.current_question_index, 1, "input {:?}", invalid);
        assert_eq!(context.quiz_answers.len(), 1, "input {:?}", invalid);
        assert_eq!(context.conversation_state, ConversationState::QuizActive);
    }
}

#[tokio::test]
async fn quiz_request_without_configured_quiz_is_a_friendly_message() {
    let h = harness();

    send(&h, "user-d", "hi").await;
    send(&h, "user-d", "1").await;
    send(&h, "user-d", "2").await; // Market Research Basics has no quiz

    let reply = send(&h, "user-d", "quiz").await;
    assert!(reply.body().contains("Quiz not available"));

    let context = h.conversations.get("user-d").await.expect("context exists");
    assert_eq!(context.conversation_state, ConversationState::Learning);
}

#[tokio::test]
async fn remote_authoritative_quiz_reports_pending_not_failed() {
    let h = harness();

    send(&h, "user-e", "hi").await;
    send(&h, "user-e", "2").await; // Teachers Professional Development
    send(&h, "user-e", "1").await; // Assessment Strategies
    send(&h, "user-e", "quiz").await;
    send(&h, "user-e", "A").await;
    let reply = send(&h, "user-e", "B").await;

    assert!(reply.body().contains("⏳ PENDING"));
    assert!(reply.body().contains("official result comes from Moodle"));
    assert!(!reply.body().contains("FAILED"));

    let attempts = h.attempts.all().await;
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].score, 0);
}

#[tokio::test]
async fn learning_turns_get_content_answers_with_quiz_hint() {
    let h = harness();

    send(&h, "user-f", "hi").await;
    send(&h, "user-f", "1").await;
    send(&h, "user-f", "1").await;

    let reply = send(&h, "user-f", "How do I identify opportunities?").await;
    assert!(reply
        .body()
        .contains("Here is what I found in the module materials."));
    assert!(reply.body().contains("type \"quiz\""));
}

#[tokio::test]
async fn module_selection_starts_progress_record() {
    let h = harness();

    send(&h, "user-g", "hi").await;
    send(&h, "user-g", "1").await;
    send(&h, "user-g", "1").await;

    let started = h.progress.started.read().await;
    assert_eq!(
        started.as_slice(),
        &[("user-g".to_string(), "module-1".to_string())]
    );
}

#[tokio::test]
async fn non_greeting_in_idle_gets_static_prompt() {
    let h = harness();

    let reply = send(&h, "user-h", "what is this?").await;
    assert!(reply.body().contains("Welcome"));

    let context = h.conversations.get("user-h").await.expect("context exists");
    assert_eq!(context.conversation_state, ConversationState::Idle);
}

#[tokio::test]
async fn invalid_course_and_module_references_relist_options() {
    let h = harness();

    send(&h, "user-i", "hi").await;

    let reply = send(&h, "user-i", "42").await;
    assert!(reply.body().contains("Please select a course by number"));

    send(&h, "user-i", "1").await;
    let reply = send(&h, "user-i", "nonsense-module").await;
    assert!(reply.body().contains("Please select a module by number"));
    assert!(reply.body().contains("1. Entrepreneurship & Business Ideas"));
}

#[tokio::test]
async fn course_selection_accepts_name_fragments() {
    let h = harness();

    send(&h, "user-j", "hi").await;
    let reply = send(&h, "user-j", "business").await;

    assert!(reply.body().contains("Select a Module"));
    let context = h.conversations.get("user-j").await.expect("context exists");
    assert_eq!(context.current_course_id.as_deref(), Some("course-1"));
    assert_eq!(
        context.context_data.course_name.as_deref(),
        Some("Business Studies & Entrepreneurship")
    );
}

#[tokio::test]
async fn updating_missing_context_is_not_found() {
    let h = harness();

    let result = h
        .conversations
        .update("ghost-user", Default::default())
        .await;

    assert!(matches!(
        result,
        Err(elimu_server::errors::AppError::NotFound(_))
    ));
}
