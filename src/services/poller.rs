use std::{sync::Arc, time::Duration};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, error, info};

use crate::services::sync::{NotificationSyncAgent, PollOutcome};

/// 定时拉取任务
///
/// 每个代理只有一个拉取任务。拉取在任务内串行执行，不会重叠；
/// 错过的定时点直接跳过而不是补发。
pub struct NotificationPoller;

impl NotificationPoller {
    /// 启动定时任务，第一次拉取在一个周期之后（初始加载由 `initialize` 完成）
    pub fn spawn(agent: Arc<NotificationSyncAgent>, period: Duration) -> PollerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let task_agent = agent.clone();

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!(
                "Notification poller started for {} every {:?}",
                task_agent.subject(),
                period
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown_rx.changed() => break,
                }

                // 关闭时直接丢弃进行中的请求
                tokio::select! {
                    outcome = task_agent.poll() => log_outcome(&outcome),
                    _ = shutdown_rx.changed() => break,
                }
            }

            debug!("Notification poller for {} exited", task_agent.subject());
        });

        PollerHandle {
            agent,
            shutdown_tx,
            task: Some(task),
        }
    }
}

fn log_outcome(outcome: &PollOutcome) {
    match outcome {
        PollOutcome::NewArrivals { count, newest_id, popup_dispatched } => debug!(
            "Poll found {} new notification(s), newest {}, popup: {}",
            count, newest_id, popup_dispatched
        ),
        PollOutcome::Failed => debug!("Poll failed, retrying on next tick"),
        other => debug!("Poll finished: {:?}", other),
    }
}

/// 拉取任务句柄，关闭或丢弃时停止任务
pub struct PollerHandle {
    agent: Arc<NotificationSyncAgent>,
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    pub fn is_running(&self) -> bool {
        self.task.as_ref().map_or(false, |task| !task.is_finished())
    }

    /// 停止定时任务并让代理忽略之后到达的结果
    pub async fn shutdown(mut self) {
        self.signal();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Notification poller task failed: {}", e);
            }
        }
    }

    fn signal(&self) {
        self.agent.shutdown();
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.signal();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{notification::Subject, session::Session},
        services::{preferences::PopupPreference, testing::ScriptedBackend},
    };

    fn agent(backend: Arc<ScriptedBackend>) -> Arc<NotificationSyncAgent> {
        Arc::new(
            NotificationSyncAgent::new(
                backend,
                &Session::Authenticated(Subject::host(7)),
                PopupPreference::fixed(true),
            )
            .unwrap(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_on_each_tick() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_ids(&[1]);
        backend.push_ids(&[2, 1]);
        backend.push_ids(&[3, 2, 1]);
        let agent = agent(backend.clone());
        let mut popups = agent.subscribe_popups();
        agent.initialize().await;

        let handle = NotificationPoller::spawn(agent.clone(), Duration::from_secs(10));
        assert!(handle.is_running());

        assert_eq!(popups.recv().await.unwrap().notification.id, 2);
        assert_eq!(popups.recv().await.unwrap().notification.id, 3);
        assert_eq!(agent.last_known_id(), 3);

        handle.shutdown().await;
        assert!(!agent.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_poll_waits_one_period() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_ids(&[1]);
        let agent = agent(backend.clone());
        agent.initialize().await;

        let handle = NotificationPoller::spawn(agent, Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(backend.fetch_count(), 1);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(backend.fetch_count(), 2);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_in_flight_poll() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_ids(&[1]);
        backend.push_ids(&[5, 1]);
        let agent = agent(backend.clone());
        agent.initialize().await;

        let _gate = backend.hold_fetches();
        let handle = NotificationPoller::spawn(agent.clone(), Duration::from_secs(10));
        backend.wait_for_fetch_requests(2).await;

        handle.shutdown().await;

        assert_eq!(agent.last_known_id(), 1);
        assert_eq!(agent.poll().await, PollOutcome::Detached);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_polling() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_ids(&[1]);
        let agent = agent(backend.clone());
        agent.initialize().await;

        drop(NotificationPoller::spawn(agent.clone(), Duration::from_secs(10)));
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert!(!agent.is_active());
        assert_eq!(backend.fetch_count(), 1);
    }
}
