use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{
    config::Config,
    errors::{AppError, AppResult},
};

/// Retrieval-augmented content collaborator consulted during free-text
/// learning turns. Retrieval and response generation themselves live in a
/// separate service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentResponder: Send + Sync {
    async fn answer(&self, user_id: &str, query: &str, module_name: &str) -> AppResult<String>;
}

pub struct HttpContentResponder {
    http: reqwest::Client,
    base_url: String,
}

impl HttpContentResponder {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.content_service_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ContentResponder for HttpContentResponder {
    async fn answer(&self, user_id: &str, query: &str, module_name: &str) -> AppResult<String> {
        let payload: Value = self
            .http
            .post(format!("{}/api/answers", self.base_url))
            .json(&json!({
                "user_id": user_id,
                "query": query,
                "module": module_name,
            }))
            .send()
            .await?
            .json()
            .await?;

        payload
            .get("answer")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                AppError::RemoteProtocol("content service response missing answer".to_string())
            })
    }
}
