use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

/// 后端返回的通知，客户端只持有只读缓存（`is_read` 除外）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    pub title: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<i64>,
}

impl Notification {
    /// 关联实体的跳转目标，例如 `support-ticket/42`
    pub fn jump_target(&self) -> Option<String> {
        let entity_type = self.entity_type.as_deref()?;
        let reference_id = self.reference_id?;

        let segment = entity_type
            .trim()
            .to_ascii_lowercase()
            .replace(['_', ' '], "-");
        if segment.is_empty() {
            return None;
        }

        Some(format!("{}/{}", segment, reference_id))
    }
}

/// 通知主体类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum SubjectType {
    Host,
    User,
}

impl SubjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectType::Host => "HOST",
            SubjectType::User => "USER",
        }
    }
}

impl fmt::Display for SubjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubjectType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HOST" => Ok(SubjectType::Host),
            "USER" => Ok(SubjectType::User),
            other => Err(AppError::Parse(format!("Unknown subject type: {}", other))),
        }
    }
}

/// 拉取通知时使用的主体（房东或用户）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: i64,
    pub subject_type: SubjectType,
}

impl Subject {
    pub fn new(id: i64, subject_type: SubjectType) -> Self {
        Self { id, subject_type }
    }

    pub fn host(id: i64) -> Self {
        Self::new(id, SubjectType::Host)
    }

    pub fn user(id: i64) -> Self {
        Self::new(id, SubjectType::User)
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.subject_type, self.id)
    }
}

/// 新通知到达时的弹窗事件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPopup {
    pub notification: Notification,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jump_target: Option<String>,
    pub dispatched_at: DateTime<Utc>,
}

impl NotificationPopup {
    pub fn new(notification: Notification) -> Self {
        let jump_target = notification.jump_target();
        Self {
            notification,
            jump_target,
            dispatched_at: Utc::now(),
        }
    }
}

/// 本地缓存的快照
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationList {
    pub items: Vec<Notification>,
    pub unread_count: usize,
    pub last_known_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_backend_payload() {
        let payload = json!({
            "id": 12,
            "title": "New booking",
            "message": "Room 4 booked for 3 nights",
            "createdAt": "2024-05-01T10:00:00Z",
            "isRead": false,
            "entityType": "SUPPORT_TICKET",
            "referenceId": 42
        });

        let notification: Notification = serde_json::from_value(payload).unwrap();
        assert_eq!(notification.id, 12);
        assert!(!notification.is_read);
        assert_eq!(notification.reference_id, Some(42));
        assert_eq!(notification.jump_target().as_deref(), Some("support-ticket/42"));
    }

    #[test]
    fn test_missing_optional_fields() {
        let payload = json!({
            "id": 3,
            "title": "Payment received",
            "message": "Proof accepted",
            "createdAt": "2024-05-01T10:00:00Z"
        });

        let notification: Notification = serde_json::from_value(payload).unwrap();
        assert!(!notification.is_read);
        assert_eq!(notification.entity_type, None);
        assert_eq!(notification.jump_target(), None);
    }

    #[test]
    fn test_subject_type_parsing() {
        assert_eq!("host".parse::<SubjectType>().unwrap(), SubjectType::Host);
        assert_eq!(" USER ".parse::<SubjectType>().unwrap(), SubjectType::User);
        assert!("ADMIN".parse::<SubjectType>().is_err());
        assert_eq!(serde_json::to_string(&SubjectType::Host).unwrap(), "\"HOST\"");
        assert_eq!(Subject::user(9).to_string(), "USER:9");
    }
}
