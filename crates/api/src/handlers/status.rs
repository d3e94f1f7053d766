use axum::{extract::State, Json};
use models::EngineStatus;
use tracing::{debug, warn};

use crate::state::AppState;

/// 引擎状态，查询失败时返回 `ERROR` 状态而不是错误码
pub async fn get_status(State(state): State<AppState>) -> Json<EngineStatus> {
    let status = state.engine.status().await;
    if status.is_degraded() {
        warn!(target: "api::handlers", "GET /status 返回降级状态");
    } else {
        debug!(target: "api::handlers", "GET /status -> {}", status.status);
    }
    Json(status)
}
