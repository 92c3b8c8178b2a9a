use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::{
    config::Config,
    errors::{AppError, AppResult},
};

pub const MOODLE_REST_PATH: &str = "/webservice/rest/server.php";

/// The LMS web-service surface: one REST endpoint, form-encoded POST, the
/// function selected by a parameter. The JSON envelope carries an
/// `exception` key on remote errors.
#[async_trait]
pub trait MoodleApi: Send + Sync {
    async fn call(&self, wsfunction: &str, params: &[(String, String)]) -> AppResult<Value>;
}

pub struct HttpMoodleApi {
    http: reqwest::Client,
    base_url: String,
    token: SecretString,
}

impl HttpMoodleApi {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.moodle_base_url.trim_end_matches('/').to_string(),
            token: config.moodle_token.clone(),
        }
    }
}

#[async_trait]
impl MoodleApi for HttpMoodleApi {
    async fn call(&self, wsfunction: &str, params: &[(String, String)]) -> AppResult<Value> {
        let mut form: Vec<(String, String)> = vec![
            ("wstoken".to_string(), self.token.expose_secret().to_string()),
            ("wsfunction".to_string(), wsfunction.to_string()),
            ("moodlewsrestformat".to_string(), "json".to_string()),
        ];
        form.extend_from_slice(params);

        let response = self
            .http
            .post(format!("{}{}", self.base_url, MOODLE_REST_PATH))
            .form(&form)
            .send()
            .await?;

        let payload: Value = response.json().await?;

        if payload.get("exception").is_some() {
            let message = payload
                .get("message")
                .and_then(Value::as_str)
                .or_else(|| payload.get("errorcode").and_then(Value::as_str))
                .unwrap_or("unknown remote error");
            return Err(AppError::RemoteProtocol(format!(
                "{}: {}",
                wsfunction, message
            )));
        }

        Ok(payload)
    }
}
