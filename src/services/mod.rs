pub mod answer_matcher;
pub mod certificate_service;
pub mod content_service;
pub mod course_catalog;
pub mod moodle_client;
pub mod moodle_sync_service;
pub mod orchestrator_service;
pub mod quiz_service;
pub mod retry;
