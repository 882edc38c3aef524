//! Booking platform notification sync agent.
//!
//! 定期从 REST 后端拉取房东/用户的通知，以游标识别新通知并派发弹窗，
//! 同时维护与服务端最终一致的已读状态缓存。

pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

pub use config::Config;
pub use error::{AppError, Result};
pub use models::notification::{Notification, NotificationPopup, Subject, SubjectType};
pub use models::session::Session;
pub use services::{
    HttpNotificationBackend, NotificationBackend, NotificationPoller, NotificationSyncAgent,
    PollOutcome, PopupPreference,
};
