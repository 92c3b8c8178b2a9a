use async_trait::async_trait;
use chrono::Utc;
use mongodb::{
    bson::{doc, to_bson},
    options::IndexOptions,
    Collection, IndexModel,
};

use crate::{
    db::Database,
    errors::{AppError, AppResult},
    models::domain::QuizAttempt,
};

#[async_trait]
pub trait QuizAttemptRepository: Send + Sync {
    async fn create(&self, attempt: QuizAttempt) -> AppResult<QuizAttempt>;
    async fn find_by_id(&self, id: &str) -> AppResult<Option<QuizAttempt>>;
    async fn count_user_attempts(&self, user_id: &str, module_id: &str) -> AppResult<usize>;
    /// Annotate a recorded attempt with the remote attempt id and grade.
    async fn set_remote_result(
        &self,
        attempt_id: &str,
        remote_attempt_id: i64,
        remote_grade: Option<f64>,
    ) -> AppResult<()>;
}

pub struct MongoQuizAttemptRepository {
    collection: Collection<QuizAttempt>,
}

impl MongoQuizAttemptRepository {
    pub fn new(db: &Database) -> Self {
        let collection = db.get_collection("quiz_attempts");
        Self { collection }
    }

    pub async fn ensure_indexes(&self) -> AppResult<()> {
        log::info!("Creating indexes for quiz_attempts collection");

        let id_index = IndexModel::builder()
            .keys(doc! { "id": 1 })
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .name("id_unique".to_string())
                    .build(),
            )
            .build();

        let user_module_index = IndexModel::builder()
            .keys(doc! { "user_id": 1, "module_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("user_module".to_string())
                    .build(),
            )
            .build();

        self.collection.create_index(id_index).await?;
        self.collection.create_index(user_module_index).await?;
        Ok(())
    }
}

#[async_trait]
impl QuizAttemptRepository for MongoQuizAttemptRepository {
    async fn create(&self, attempt: QuizAttempt) -> AppResult<QuizAttempt> {
        self.collection.insert_one(&attempt).await?;
        Ok(attempt)
    }

    async fn find_by_id(&self, id: &str) -> AppResult<Option<QuizAttempt>> {
        let attempt = self.collection.find_one(doc! { "id": id }).await?;
        Ok(attempt)
    }

    async fn count_user_attempts(&self, user_id: &str, module_id: &str) -> AppResult<usize> {
        let count = self
            .collection
            .count_documents(doc! {
                "user_id": user_id,
                "module_id": module_id
            })
            .await?;
        Ok(count as usize)
    }

    async fn set_remote_result(
        &self,
        attempt_id: &str,
        remote_attempt_id: i64,
        remote_grade: Option<f64>,
    ) -> AppResult<()> {
        let mut set = doc! {
            "remote_attempt_id": remote_attempt_id,
            "modified_at": to_bson(&Utc::now())?,
        };
        if let Some(grade) = remote_grade {
            set.insert("remote_grade", grade);
        }

        let result = self
            .collection
            .update_one(doc! { "id": attempt_id }, doc! { "$set": set })
            .await?;

        if result.matched_count == 0 {
            return Err(AppError::NotFound(format!(
                "Quiz attempt with id '{}' not found",
                attempt_id
            )));
        }

        Ok(())
    }
}
