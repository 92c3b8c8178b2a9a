use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{bson::doc, Collection};

use crate::{
    db::Database,
    errors::AppResult,
    models::domain::{Course, QuizDefinition},
};

/// Read-only source of the course/module/quiz catalog, loaded once at
/// process start. There is no write path; catalog administration happens
/// through tooling outside this service.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn load_courses(&self) -> AppResult<Vec<Course>>;
    async fn load_quizzes(&self) -> AppResult<Vec<QuizDefinition>>;
}

pub struct MongoCatalogRepository {
    courses: Collection<Course>,
    quizzes: Collection<QuizDefinition>,
}

impl MongoCatalogRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            courses: db.get_collection("courses"),
            quizzes: db.get_collection("quizzes"),
        }
    }
}

#[async_trait]
impl CatalogRepository for MongoCatalogRepository {
    async fn load_courses(&self) -> AppResult<Vec<Course>> {
        let courses = self
            .courses
            .find(doc! {})
            .sort(doc! { "sequence_order": 1 })
            .await?
            .try_collect()
            .await?;
        Ok(courses)
    }

    async fn load_quizzes(&self) -> AppResult<Vec<QuizDefinition>> {
        let quizzes = self.quizzes.find(doc! {}).await?.try_collect().await?;
        Ok(quizzes)
    }
}
