use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use tracing::{error, info};

use super::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct WithdrawResponse {
    pub tx_hash: String,
}

/// 提取合约中的利润
pub async fn withdraw(
    State(state): State<AppState>,
) -> (StatusCode, Json<ApiResponse<WithdrawResponse>>) {
    info!(target: "api::handlers", "POST /withdraw");

    match state.engine.withdraw().await {
        Ok(tx_hash) => (
            StatusCode::OK,
            Json(ApiResponse::success(WithdrawResponse {
                tx_hash: format!("{:?}", tx_hash),
            })),
        ),
        Err(e) => {
            error!(target: "api::handlers", "withdraw 失败: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(e.to_string())),
            )
        }
    }
}
