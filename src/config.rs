use secrecy::SecretString;
use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub mongo_conn_string: String,
    pub mongo_db_name: String,
    pub web_server_host: String,
    pub web_server_port: u16,
    pub moodle_base_url: String,
    pub moodle_token: SecretString,
    pub moodle_sync_enabled: bool,
    pub content_service_url: String,
    pub certificate_service_url: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            mongo_conn_string: env::var("MONGO_CONN_STRING")
                .unwrap_or_else(|_| "mongodb://localhost:27017".to_string()),
            mongo_db_name: env::var("MONGO_DB_NAME").unwrap_or_else(|_| "elimu-local".to_string()),
            web_server_host: env::var("WEB_SERVER_HOST")
                .unwrap_or_else(|_| "localhost".to_string()),
            web_server_port: env::var("WEB_SERVER_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            moodle_base_url: env::var("MOODLE_BASE_URL")
                .unwrap_or_else(|_| "https://localhost:8443".to_string()),
            moodle_token: SecretString::from(
                env::var("MOODLE_TOKEN").unwrap_or_else(|_| "dev_moodle_token".to_string()),
            ),
            moodle_sync_enabled: env::var("MOODLE_SYNC_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            content_service_url: env::var("CONTENT_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:3001".to_string()),
            certificate_service_url: env::var("CERTIFICATE_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:3002".to_string()),
        }
    }

    /// Validate that production-critical configuration is set
    /// Panics if required secrets are using default values
    pub fn validate_for_production(&self) {
        use secrecy::ExposeSecret;

        if self.moodle_sync_enabled {
            let token = self.moodle_token.expose_secret();

            if token == "dev_moodle_token" {
                panic!(
                    "FATAL: MOODLE_TOKEN is using default value! Set MOODLE_TOKEN environment variable to a web service token."
                );
            }

            if self.moodle_base_url.contains("localhost") {
                panic!(
                    "FATAL: MOODLE_BASE_URL points at localhost while Moodle sync is enabled. Set MOODLE_BASE_URL."
                );
            }
        }
    }

    #[cfg(test)]
    pub fn test_config() -> Self {
        Self {
            mongo_conn_string: "mongodb://localhost:27017".to_string(),
            mongo_db_name: "elimu-test".to_string(),
            web_server_host: "127.0.0.1".to_string(),
            web_server_port: 8080,
            moodle_base_url: "http://localhost:8443".to_string(),
            moodle_token: SecretString::from("test_moodle_token".to_string()),
            moodle_sync_enabled: false,
            content_service_url: "http://localhost:3001".to_string(),
            certificate_service_url: "http://localhost:3002".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env_with_defaults() {
        let config = Config::from_env();

        // Should use env vars if set, or fall back to defaults
        assert!(!config.mongo_conn_string.is_empty());
        assert!(!config.mongo_db_name.is_empty());
        assert!(!config.moodle_base_url.is_empty());
    }

    #[test]
    fn test_test_config() {
        let config = Config::test_config();

        assert_eq!(config.mongo_db_name, "elimu-test");
        assert!(!config.moodle_sync_enabled);
    }
}
