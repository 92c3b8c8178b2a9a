pub mod catalog;
pub mod conversation;
pub mod quiz;
pub mod quiz_attempt;

pub use catalog::{Course, CourseModule};
pub use conversation::{
    AnswerRecord, ConversationContext, ConversationState, LocalCorrectness, PhaseData,
};
pub use quiz::{QuestionDefinition, QuestionType, QuizDefinition};
pub use quiz_attempt::QuizAttempt;
