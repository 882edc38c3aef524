use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::{
    error::{AppError, Result},
    models::{notification::NotificationList, response::ApiResponse},
    services::sync::{MarkAllOutcome, MarkReadOutcome, PollOutcome},
    state::AppState,
};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        // 通知列表
        .route("/", get(list_notifications))
        .route("/refresh", post(refresh_notifications))

        // 已读操作
        .route("/:id/read", post(mark_read))
        .route("/read-all", post(mark_all_read))

        // 弹窗设置
        .route(
            "/preferences/popup",
            get(get_popup_preference).put(update_popup_preference),
        )

        // 弹窗推送
        .route("/popups/ws", get(super::websocket::popup_stream))
}

/// 获取缓存的通知列表
async fn list_notifications(
    State(state): State<Arc<AppState>>,
) -> Json<ApiResponse<NotificationList>> {
    Json(ApiResponse::success(state.agent.snapshot()))
}

/// 立即拉取一次
async fn refresh_notifications(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<PollOutcome>>> {
    debug!("Manual refresh requested for {}", state.agent.subject());

    match state.agent.poll().await {
        PollOutcome::Detached => Err(AppError::internal("Notification sync has been stopped")),
        outcome => Ok(Json(ApiResponse::success(outcome))),
    }
}

/// 标记单条已读
async fn mark_read(
    State(state): State<Arc<AppState>>,
    Path(notification_id): Path<i64>,
) -> Result<Json<ApiResponse<MarkReadOutcome>>> {
    if notification_id <= 0 {
        return Err(AppError::bad_request("Notification id must be positive"));
    }

    let outcome = state.agent.mark_as_read(notification_id).await;
    Ok(Json(ApiResponse::success(outcome)))
}

/// 全部标记已读
async fn mark_all_read(
    State(state): State<Arc<AppState>>,
) -> Json<ApiResponse<MarkAllOutcome>> {
    let outcome = state.agent.mark_all_read().await;
    let message = format!("{} notification(s) marked as read", outcome.marked);
    Json(ApiResponse::success_with_message(outcome, message))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PopupPreferencePayload {
    pub enabled: bool,
}

async fn get_popup_preference(
    State(state): State<Arc<AppState>>,
) -> Json<ApiResponse<PopupPreferencePayload>> {
    Json(ApiResponse::success(PopupPreferencePayload {
        enabled: state.popup_preference().is_enabled(),
    }))
}

async fn update_popup_preference(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PopupPreferencePayload>,
) -> Result<Json<ApiResponse<PopupPreferencePayload>>> {
    state.popup_preference().set_enabled(payload.enabled).await?;
    info!("Popup preference updated to {}", payload.enabled);

    Ok(Json(ApiResponse::success(payload)))
}
