//! 测试用的可编排后端

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use std::{
    collections::{HashSet, VecDeque},
    sync::Arc,
    time::Duration,
};
use tokio::sync::Notify;

use crate::{
    error::{AppError, Result},
    models::notification::{Notification, Subject},
    services::notification_api::NotificationBackend,
};

pub fn notification(id: i64) -> Notification {
    Notification {
        id,
        title: format!("Notification {}", id),
        message: format!("Booking update #{}", id),
        created_at: Utc.timestamp_opt(1_700_000_000 + id * 60, 0).unwrap(),
        is_read: false,
        entity_type: None,
        reference_id: None,
    }
}

pub trait NotificationExt {
    fn read(self) -> Self;
}

impl NotificationExt for Notification {
    fn read(mut self) -> Self {
        self.is_read = true;
        self
    }
}

/// 按顺序返回预设的拉取结果，脚本耗尽后重复最后一次成功结果
#[derive(Default)]
pub struct ScriptedBackend {
    responses: Mutex<VecDeque<Option<Vec<Notification>>>>,
    last_success: Mutex<Vec<Notification>>,
    fetches: Mutex<usize>,
    acked: Mutex<Vec<i64>>,
    failing_acks: Mutex<HashSet<i64>>,
    fetch_gate: Mutex<Option<Arc<Notify>>>,
    ack_gate: Mutex<Option<Arc<Notify>>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, notifications: Vec<Notification>) {
        self.responses.lock().push_back(Some(notifications));
    }

    pub fn push_ids(&self, ids: &[i64]) {
        self.push(ids.iter().copied().map(notification).collect());
    }

    pub fn push_failure(&self) {
        self.responses.lock().push_back(None);
    }

    pub fn fail_ack(&self, id: i64) {
        self.failing_acks.lock().insert(id);
    }

    /// 之后的拉取会阻塞，直到返回的 `Notify` 被唤醒
    pub fn hold_fetches(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.fetch_gate.lock() = Some(gate.clone());
        gate
    }

    pub fn hold_acks(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.ack_gate.lock() = Some(gate.clone());
        gate
    }

    pub fn fetch_count(&self) -> usize {
        *self.fetches.lock()
    }

    pub fn acked(&self) -> Vec<i64> {
        self.acked.lock().clone()
    }

    pub async fn wait_for_fetch_requests(&self, count: usize) {
        wait_until(|| self.fetch_count() >= count).await;
    }

    pub async fn wait_for_ack_requests(&self, count: usize) {
        wait_until(|| self.acked.lock().len() >= count).await;
    }
}

async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(120), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[async_trait]
impl NotificationBackend for ScriptedBackend {
    async fn fetch_notifications(&self, _subject: &Subject) -> Result<Vec<Notification>> {
        *self.fetches.lock() += 1;

        let gate = self.fetch_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let next = self.responses.lock().pop_front();
        match next {
            Some(Some(notifications)) => {
                *self.last_success.lock() = notifications.clone();
                Ok(notifications)
            }
            Some(None) => Err(AppError::ExternalService("scripted failure".to_string())),
            None => Ok(self.last_success.lock().clone()),
        }
    }

    async fn mark_notification_read(&self, notification_id: i64) -> Result<()> {
        self.acked.lock().push(notification_id);

        let gate = self.ack_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.failing_acks.lock().contains(&notification_id) {
            return Err(AppError::ExternalService(format!(
                "ack {} rejected",
                notification_id
            )));
        }
        Ok(())
    }
}
