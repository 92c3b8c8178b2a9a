use async_trait::async_trait;
use chrono::Utc;
use mongodb::{
    bson::{doc, to_bson, Document},
    Collection,
};

use crate::{db::Database, errors::AppResult};

/// Per-user module progress. Started when a module is entered from the
/// conversation; completed when a quiz attempt for the module passes.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    async fn start_module(&self, user_id: &str, module_id: &str) -> AppResult<()>;
    async fn complete_module(&self, user_id: &str, module_id: &str) -> AppResult<()>;
}

pub struct MongoProgressRepository {
    collection: Collection<Document>,
}

impl MongoProgressRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.get_collection("user_progress"),
        }
    }
}

#[async_trait]
impl ProgressRepository for MongoProgressRepository {
    async fn start_module(&self, user_id: &str, module_id: &str) -> AppResult<()> {
        let now = to_bson(&Utc::now())?;
        self.collection
            .update_one(
                doc! { "user_id": user_id, "module_id": module_id },
                doc! {
                    "$set": { "status": "in_progress", "last_activity_at": now.clone() },
                    "$setOnInsert": { "started_at": now },
                },
            )
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn complete_module(&self, user_id: &str, module_id: &str) -> AppResult<()> {
        let now = to_bson(&Utc::now())?;
        self.collection
            .update_one(
                doc! { "user_id": user_id, "module_id": module_id },
                doc! {
                    "$set": {
                        "status": "completed",
                        "completed_at": now.clone(),
                        "last_activity_at": now,
                    },
                },
            )
            .upsert(true)
            .await?;
        Ok(())
    }
}
