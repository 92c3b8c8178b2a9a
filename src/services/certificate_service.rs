use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{
    config::Config,
    errors::{AppError, AppResult},
};

/// Downstream certificate collaborator, invoked once a module's quiz attempt
/// passes. Rendering happens in a separate service; this returns the
/// download URL.
#[async_trait]
pub trait CertificateIssuer: Send + Sync {
    async fn issue(&self, user_id: &str, module_id: &str, attempt_id: &str) -> AppResult<String>;
}

pub struct HttpCertificateIssuer {
    http: reqwest::Client,
    base_url: String,
}

impl HttpCertificateIssuer {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config
                .certificate_service_url
                .trim_end_matches('/')
                .to_string(),
        }
    }
}

#[async_trait]
impl CertificateIssuer for HttpCertificateIssuer {
    async fn issue(&self, user_id: &str, module_id: &str, attempt_id: &str) -> AppResult<String> {
        let payload: Value = self
            .http
            .post(format!("{}/api/certificates", self.base_url))
            .json(&json!({
                "user_id": user_id,
                "module_id": module_id,
                "attempt_id": attempt_id,
            }))
            .send()
            .await?
            .json()
            .await?;

        payload
            .get("url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                AppError::RemoteProtocol("certificate service response missing url".to_string())
            })
    }
}
