use std::sync::Arc;

use crate::{
    config::Config,
    services::{preferences::PopupPreference, sync::NotificationSyncAgent},
};

/// 应用程序的共享状态
#[derive(Clone)]
pub struct AppState {
    /// 应用配置
    pub config: Config,

    /// 通知同步代理
    pub agent: Arc<NotificationSyncAgent>,
}

impl AppState {
    pub fn new(config: Config, agent: Arc<NotificationSyncAgent>) -> Self {
        Self { config, agent }
    }

    pub fn popup_preference(&self) -> &PopupPreference {
        self.agent.preference()
    }

    /// 检查是否为开发环境
    pub fn is_development(&self) -> bool {
        self.config.is_development()
    }
}
