pub mod catalog_repository;
pub mod conversation_repository;
pub mod progress_repository;
pub mod quiz_attempt_repository;

pub use catalog_repository::{CatalogRepository, MongoCatalogRepository};
pub use conversation_repository::{
    ContextUpdate, ConversationRepository, MongoConversationRepository,
};
pub use progress_repository::{MongoProgressRepository, ProgressRepository};
pub use quiz_attempt_repository::{MongoQuizAttemptRepository, QuizAttemptRepository};
