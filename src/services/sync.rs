use futures::future::join_all;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::{
    error::Result,
    models::{
        notification::{Notification, NotificationList, NotificationPopup, Subject},
        session::Session,
    },
    services::{notification_api::NotificationBackend, preferences::PopupPreference},
};

const POPUP_CHANNEL_CAPACITY: usize = 64;

/// 已观察到的最大通知 id，只增不减
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncCursor {
    last_known_id: i64,
}

impl SyncCursor {
    pub fn last_known_id(&self) -> i64 {
        self.last_known_id
    }

    /// 仅在 `newest` 更大时前移，返回是否前移
    pub fn advance(&mut self, newest: i64) -> bool {
        if newest > self.last_known_id {
            self.last_known_id = newest;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Default)]
struct SyncState {
    notifications: Vec<Notification>,
    cursor: SyncCursor,
}

/// 一次拉取的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PollOutcome {
    /// 首次加载完成，不触发弹窗
    Initialized { total: usize, last_known_id: i64 },
    /// 没有比游标更新的通知
    Unchanged { total: usize },
    /// 有新通知到达
    NewArrivals {
        count: usize,
        newest_id: i64,
        popup_dispatched: bool,
    },
    /// 拉取失败，缓存和游标保持不变
    Failed,
    /// 已有拉取在进行中
    Skipped,
    /// 代理已关闭，结果被丢弃
    Detached,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkReadOutcome {
    pub found_locally: bool,
    pub acknowledged: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkAllOutcome {
    pub marked: usize,
    pub failed: usize,
}

/// 通知同步代理
///
/// 定期拉取主体的完整通知列表，以游标识别新到达的通知，
/// 并在开启弹窗时为每轮最新的一条通知派发弹窗事件。
///
/// 本地缓存与服务端最终一致：已读操作先乐观地修改缓存，
/// 后端确认失败时不回滚，由下一次拉取以服务端数据为准覆盖。
pub struct NotificationSyncAgent {
    backend: Arc<dyn NotificationBackend>,
    subject: Subject,
    preference: PopupPreference,
    state: RwLock<SyncState>,
    poll_lock: Mutex<()>,
    active: AtomicBool,
    popup_tx: broadcast::Sender<NotificationPopup>,
}

impl NotificationSyncAgent {
    /// 未登录的会话无法启动代理
    pub fn new(
        backend: Arc<dyn NotificationBackend>,
        session: &Session,
        preference: PopupPreference,
    ) -> Result<Self> {
        let subject = *session.subject()?;
        let (popup_tx, _) = broadcast::channel(POPUP_CHANNEL_CAPACITY);

        Ok(Self {
            backend,
            subject,
            preference,
            state: RwLock::new(SyncState::default()),
            poll_lock: Mutex::new(()),
            active: AtomicBool::new(true),
            popup_tx,
        })
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    pub fn preference(&self) -> &PopupPreference {
        &self.preference
    }

    /// 首次加载，从不触发弹窗
    pub async fn initialize(&self) -> PollOutcome {
        let Ok(_guard) = self.poll_lock.try_lock() else {
            debug!("Initial load skipped for {}: poll already in flight", self.subject);
            return PollOutcome::Skipped;
        };
        if !self.is_active() {
            return PollOutcome::Detached;
        }

        let Some(mut fetched) = self.fetch().await else {
            return self.failed_or_detached();
        };
        if !self.is_active() {
            return PollOutcome::Detached;
        }

        sort_newest_first(&mut fetched);
        let total = fetched.len();

        let mut state = self.state.write();
        if let Some(newest) = fetched.first().map(|n| n.id) {
            state.cursor.advance(newest);
        }
        state.notifications = fetched;
        let last_known_id = state.cursor.last_known_id();

        info!(
            "Loaded {} notifications for {} (cursor {})",
            total, self.subject, last_known_id
        );
        PollOutcome::Initialized { total, last_known_id }
    }

    /// 定时拉取
    ///
    /// 已有拉取在进行中时直接跳过；拉取失败时缓存与游标都不变。
    pub async fn poll(&self) -> PollOutcome {
        let Ok(_guard) = self.poll_lock.try_lock() else {
            debug!("Poll skipped for {}: previous poll still in flight", self.subject);
            return PollOutcome::Skipped;
        };
        if !self.is_active() {
            return PollOutcome::Detached;
        }

        let Some(fetched) = self.fetch().await else {
            return self.failed_or_detached();
        };
        if !self.is_active() {
            debug!("Discarding poll result for {}: agent shut down", self.subject);
            return PollOutcome::Detached;
        }

        self.apply_poll(fetched)
    }

    fn apply_poll(&self, mut fetched: Vec<Notification>) -> PollOutcome {
        sort_newest_first(&mut fetched);
        let total = fetched.len();

        let mut state = self.state.write();
        let previous = state.cursor.last_known_id();

        let newest = fetched.first().filter(|first| first.id > previous).cloned();
        let Some(newest) = newest else {
            state.notifications = fetched;
            return PollOutcome::Unchanged { total };
        };

        // 列表已按 id 降序排列，新通知都在前面
        let count = fetched.iter().take_while(|n| n.id > previous).count();
        state.cursor.advance(newest.id);
        state.notifications = fetched;
        drop(state);

        info!(
            "{} new notification(s) for {}, cursor {} -> {}",
            count, self.subject, previous, newest.id
        );

        let newest_id = newest.id;
        let popup_dispatched = self.preference.is_enabled() && self.dispatch_popup(newest);

        PollOutcome::NewArrivals {
            count,
            newest_id,
            popup_dispatched,
        }
    }

    fn dispatch_popup(&self, notification: Notification) -> bool {
        let id = notification.id;
        match self.popup_tx.send(NotificationPopup::new(notification)) {
            Ok(receivers) => debug!("Popup for notification {} sent to {} listener(s)", id, receivers),
            Err(_) => debug!("Popup for notification {} dispatched with no listeners", id),
        }
        true
    }

    /// 乐观地标记单条已读，后端失败只记录日志
    pub async fn mark_as_read(&self, notification_id: i64) -> MarkReadOutcome {
        if !self.is_active() {
            return MarkReadOutcome {
                found_locally: false,
                acknowledged: false,
            };
        }

        let found_locally = {
            let mut state = self.state.write();
            match state.notifications.iter_mut().find(|n| n.id == notification_id) {
                Some(notification) => {
                    notification.is_read = true;
                    true
                }
                None => false,
            }
        };

        let acknowledged = match self.backend.mark_notification_read(notification_id).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to acknowledge notification {}: {}", notification_id, e);
                false
            }
        };

        MarkReadOutcome {
            found_locally,
            acknowledged,
        }
    }

    /// 本地全部标记已读后，逐条向后端确认
    pub async fn mark_all_read(&self) -> MarkAllOutcome {
        if !self.is_active() {
            return MarkAllOutcome { marked: 0, failed: 0 };
        }

        let ids: Vec<i64> = {
            let mut state = self.state.write();
            state
                .notifications
                .iter_mut()
                .filter(|n| !n.is_read)
                .map(|n| {
                    n.is_read = true;
                    n.id
                })
                .collect()
        };

        let results = join_all(
            ids.iter()
                .map(|id| self.backend.mark_notification_read(*id)),
        )
        .await;

        let failed = results
            .iter()
            .zip(&ids)
            .filter_map(|(result, id)| result.as_ref().err().map(|e| (id, e)))
            .inspect(|(id, e)| warn!("Failed to acknowledge notification {}: {}", id, e))
            .count();

        debug!("Marked {} notification(s) read for {}, {} failed", ids.len(), self.subject, failed);
        MarkAllOutcome {
            marked: ids.len(),
            failed,
        }
    }

    pub fn snapshot(&self) -> NotificationList {
        let state = self.state.read();
        NotificationList {
            items: state.notifications.clone(),
            unread_count: state.notifications.iter().filter(|n| !n.is_read).count(),
            last_known_id: state.cursor.last_known_id(),
        }
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.state.read().notifications.clone()
    }

    pub fn unread_count(&self) -> usize {
        self.state.read().notifications.iter().filter(|n| !n.is_read).count()
    }

    pub fn last_known_id(&self) -> i64 {
        self.state.read().cursor.last_known_id()
    }

    pub fn subscribe_popups(&self) -> broadcast::Receiver<NotificationPopup> {
        self.popup_tx.subscribe()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// 关闭后不再修改缓存，也不再派发弹窗
    pub fn shutdown(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            info!("Notification sync stopped for {}", self.subject);
        }
    }

    async fn fetch(&self) -> Option<Vec<Notification>> {
        match self.backend.fetch_notifications(&self.subject).await {
            Ok(notifications) => Some(notifications),
            Err(e) => {
                warn!("Failed to fetch notifications for {}: {}", self.subject, e);
                None
            }
        }
    }

    fn failed_or_detached(&self) -> PollOutcome {
        if self.is_active() {
            PollOutcome::Failed
        } else {
            PollOutcome::Detached
        }
    }
}

fn sort_newest_first(notifications: &mut [Notification]) {
    notifications.sort_by(|a, b| b.id.cmp(&a.id));
}
