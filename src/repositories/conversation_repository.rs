use async_trait::async_trait;
use chrono::Utc;
use mongodb::{
    bson::{doc, to_bson, Bson, Document},
    options::IndexOptions,
    Collection, IndexModel,
};
use validator::Validate;

use crate::{
    db::Database,
    errors::{AppError, AppResult},
    models::domain::{AnswerRecord, ConversationContext, ConversationState, PhaseData},
};

/// Partial update of a conversation document. `None` leaves a field
/// untouched; for the nullable id fields, `Some(None)` clears the stored
/// value.
#[derive(Clone, Debug, Default)]
pub struct ContextUpdate {
    pub conversation_state: Option<ConversationState>,
    pub current_course_id: Option<Option<String>>,
    pub current_module_id: Option<Option<String>>,
    pub current_quiz_id: Option<Option<String>>,
    pub current_question_index: Option<i32>,
    pub quiz_answers: Option<Vec<AnswerRecord>>,
    pub context_data: Option<PhaseData>,
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Load the context for a user, creating an idle one on first contact.
    async fn get_or_create(
        &self,
        user_id: &str,
        channel_address: &str,
    ) -> AppResult<ConversationContext>;

    /// Apply a partial update. Always refreshes `last_message_at`.
    async fn update(&self, user_id: &str, update: ContextUpdate) -> AppResult<()>;
}

pub struct MongoConversationRepository {
    collection: Collection<ConversationContext>,
}

impl MongoConversationRepository {
    pub fn new(db: &Database) -> Self {
        let collection = db.get_collection("conversation_contexts");
        Self { collection }
    }

    pub async fn ensure_indexes(&self) -> AppResult<()> {
        log::info!("Creating indexes for conversation_contexts collection");

        let user_index = IndexModel::builder()
            .keys(doc! { "user_id": 1 })
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .name("user_id_unique".to_string())
                    .build(),
            )
            .build();

        self.collection.create_index(user_index).await?;
        Ok(())
    }

    fn update_document(update: &ContextUpdate) -> AppResult<Document> {
        fn nullable(value: &Option<String>) -> Bson {
            match value {
                Some(v) => Bson::String(v.clone()),
                None => Bson::Null,
            }
        }

        let mut set = doc! {
            "last_message_at": to_bson(&Utc::now())?,
            "updated_at": to_bson(&Utc::now())?,
        };

        if let Some(state) = update.conversation_state {
            set.insert("conversation_state", to_bson(&state)?);
        }
        if let Some(course_id) = &update.current_course_id {
            set.insert("current_course_id", nullable(course_id));
        }
        if let Some(module_id) = &update.current_module_id {
            set.insert("current_module_id", nullable(module_id));
        }
        if let Some(quiz_id) = &update.current_quiz_id {
            set.insert("current_quiz_id", nullable(quiz_id));
        }
        if let Some(index) = update.current_question_index {
            set.insert("current_question_index", index);
        }
        if let Some(answers) = &update.quiz_answers {
            set.insert("quiz_answers", to_bson(answers)?);
        }
        if let Some(data) = &update.context_data {
            set.insert("context_data", to_bson(data)?);
        }

        Ok(doc! { "$set": set })
    }
}

#[async_trait]
impl ConversationRepository for MongoConversationRepository {
    async fn get_or_create(
        &self,
        user_id: &str,
        channel_address: &str,
    ) -> AppResult<ConversationContext> {
        if let Some(context) = self
            .collection
            .find_one(doc! { "user_id": user_id })
            .await?
        {
            context.context_data.validate()?;
            return Ok(context);
        }

        let context = ConversationContext::new(user_id, channel_address);
        self.collection.insert_one(&context).await?;
        log::info!("Created conversation context for user {}", user_id);
        Ok(context)
    }

    async fn update(&self, user_id: &str, update: ContextUpdate) -> AppResult<()> {
        if let Some(data) = &update.context_data {
            data.validate()?;
        }

        let result = self
            .collection
            .update_one(doc! { "user_id": user_id }, Self::update_document(&update)?)
            .await?;

        if result.matched_count == 0 {
            return Err(AppError::NotFound(format!(
                "Conversation context for user '{}' not found",
                user_id
            )));
        }

        Ok(())
    }
}
