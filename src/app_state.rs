use std::sync::Arc;

use crate::{
    config::Config,
    db::Database,
    errors::AppResult,
    repositories::{
        MongoCatalogRepository, MongoConversationRepository, MongoProgressRepository,
        MongoQuizAttemptRepository,
    },
    services::{
        certificate_service::HttpCertificateIssuer, content_service::HttpContentResponder,
        course_catalog::CourseCatalog, moodle_client::HttpMoodleApi,
        moodle_sync_service::MoodleSyncService, orchestrator_service::ConversationOrchestrator,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ConversationOrchestrator>,
    pub db: Database,
    pub config: Arc<Config>,
}

impl AppState {
    pub async fn new(config: Config) -> AppResult<Self> {
        let db = Database::connect(&config).await?;

        let conversations = Arc::new(MongoConversationRepository::new(&db));
        conversations.ensure_indexes().await?;

        let attempts = Arc::new(MongoQuizAttemptRepository::new(&db));
        attempts.ensure_indexes().await?;

        let progress = Arc::new(MongoProgressRepository::new(&db));

        let catalog_repository = MongoCatalogRepository::new(&db);
        let catalog = Arc::new(CourseCatalog::load(&catalog_repository).await?);

        let moodle_api = Arc::new(HttpMoodleApi::new(&config));
        let moodle_sync = Arc::new(MoodleSyncService::new(
            moodle_api,
            attempts.clone(),
            config.moodle_sync_enabled,
        ));

        let orchestrator = Arc::new(ConversationOrchestrator::new(
            conversations,
            attempts,
            progress,
            catalog,
            Arc::new(HttpContentResponder::new(&config)),
            moodle_sync,
            Arc::new(HttpCertificateIssuer::new(&config)),
        ));

        Ok(Self {
            orchestrator,
            db,
            config: Arc::new(config),
        })
    }
}
