use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub server_host: String,
    pub server_port: u16,
    pub environment: String,
    pub log_level: String,

    // Backend API configuration
    pub api_base_url: String,
    pub api_token: Option<String>,
    pub http_timeout_secs: u64,

    // Session configuration
    pub session_subject_id: Option<String>,
    pub session_subject_type: String,

    // Sync configuration
    pub poll_interval_secs: u64,

    // Preference storage
    pub preferences_path: String,

    // CORS configuration
    pub cors_allowed_origins: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Config {
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3100".to_string())
                .parse()?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            log_level: env::var("LOG_LEVEL")
                .unwrap_or_else(|_| "booking_notify=debug,tower_http=debug".to_string()),

            api_base_url: env::var("API_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080/api".to_string()),
            api_token: env::var("API_TOKEN").ok().filter(|t| !t.is_empty()),
            http_timeout_secs: env::var("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,

            session_subject_id: env::var("SESSION_SUBJECT_ID").ok(),
            session_subject_type: env::var("SESSION_SUBJECT_TYPE")
                .unwrap_or_else(|_| "HOST".to_string()),

            poll_interval_secs: env::var("POLL_INTERVAL_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,

            preferences_path: env::var("PREFERENCES_PATH")
                .unwrap_or_else(|_| ".booking-notify/preferences.json".to_string()),

            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
        };

        if config.poll_interval_secs == 0 {
            anyhow::bail!("POLL_INTERVAL_SECS must be greater than zero");
        }

        Ok(config)
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.poll_interval_secs)
    }

    pub fn http_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.http_timeout_secs)
    }
}

#[cfg(test)]
impl Default for Config {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            server_port: 3100,
            environment: "test".to_string(),
            log_level: "booking_notify=debug".to_string(),
            api_base_url: "http://localhost:8080/api".to_string(),
            api_token: None,
            http_timeout_secs: 5,
            session_subject_id: Some("1".to_string()),
            session_subject_type: "HOST".to_string(),
            poll_interval_secs: 10,
            preferences_path: ".booking-notify/preferences.json".to_string(),
            cors_allowed_origins: "http://localhost:3000".to_string(),
        }
    }
}
