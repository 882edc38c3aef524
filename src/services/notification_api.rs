use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, error};

use crate::{
    config::Config,
    error::{AppError, Result},
    models::notification::{Notification, Subject},
};

/// 通知后端接口
///
/// 后端总是返回主体的完整通知列表，没有分页或服务端游标。
/// 标记已读是幂等的。
#[async_trait]
pub trait NotificationBackend: Send + Sync {
    async fn fetch_notifications(&self, subject: &Subject) -> Result<Vec<Notification>>;

    async fn mark_notification_read(&self, notification_id: i64) -> Result<()>;
}

/// 基于 REST API 的后端实现
#[derive(Clone)]
pub struct HttpNotificationBackend {
    http_client: Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpNotificationBackend {
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_base_url(
            &config.api_base_url,
            config.api_token.clone(),
            config.http_timeout(),
        )
    }

    pub fn with_base_url(base_url: &str, api_token: Option<String>, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        }
    }

    async fn check_status(response: reqwest::Response, action: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        error!("Backend rejected {}: {} {}", action, status, body);

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AppError::Authentication(
                format!("Backend refused {} ({})", action, status),
            )),
            StatusCode::NOT_FOUND => Err(AppError::NotFound(format!(
                "Backend resource for {} not found",
                action
            ))),
            _ => Err(AppError::ExternalService(format!(
                "{} failed with status {}",
                action, status
            ))),
        }
    }
}

#[async_trait]
impl NotificationBackend for HttpNotificationBackend {
    async fn fetch_notifications(&self, subject: &Subject) -> Result<Vec<Notification>> {
        let url = format!("{}/notifications", self.base_url);
        debug!("Fetching notifications for {}", subject);

        let request = self.http_client.get(&url).query(&[
            ("subjectId", subject.id.to_string()),
            ("subjectType", subject.subject_type.as_str().to_string()),
        ]);

        let response = self.authorize(request).send().await?;
        let response = Self::check_status(response, "fetch notifications").await?;
        let notifications = response.json::<Vec<Notification>>().await?;

        debug!("Fetched {} notifications for {}", notifications.len(), subject);
        Ok(notifications)
    }

    async fn mark_notification_read(&self, notification_id: i64) -> Result<()> {
        let url = format!("{}/notifications/{}/read", self.base_url, notification_id);
        debug!("Acknowledging notification {}", notification_id);

        let response = self.authorize(self.http_client.post(&url)).send().await?;
        Self::check_status(response, "mark notification read").await?;

        Ok(())
    }
}
