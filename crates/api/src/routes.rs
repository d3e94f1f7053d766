use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::handlers;
use crate::state::AppState;

/// 创建 API 路由
pub fn create_server(state: AppState) -> Router {
    // CORS 配置
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/status", get(handlers::get_status))
        .route("/withdraw", post(handlers::withdraw))
        .layer(cors)
        .with_state(state)
}

/// 启动服务器，Ctrl-C 时优雅退出
pub async fn start_server(app: Router, host: &str, port: u16) -> Result<()> {
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("API 服务器启动: http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("收到退出信号，API 服务器停止");
        })
        .await
        .context("API server error")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use ethers::types::H256;
    use executor::EngineStatusSource;
    use http_body_util::BodyExt;
    use models::{EngineError, EngineStatus, EndpointHealthSnapshot};
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    /// 余额查询总是失败的引擎
    struct BrokenEngine;

    #[async_trait]
    impl EngineStatusSource for BrokenEngine {
        async fn status(&self) -> EngineStatus {
            EngineStatus::degraded(
                3,
                42,
                vec![EndpointHealthSnapshot {
                    url: "https://mainnet.base.org".to_string(),
                    priority: 1,
                    successes: 0,
                    failures: 5,
                    consecutive_failures: 5,
                    last_latency_ms: 0,
                }],
            )
        }

        async fn withdraw(&self) -> Result<H256, EngineError> {
            Err(EngineError::TransportExhausted {
                operation: "get_pending_nonce",
                attempts: 1,
                last_error: "connection refused".to_string(),
            })
        }
    }

    fn app() -> Router {
        create_server(AppState::new(Arc::new(BrokenEngine)))
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_degraded_status() {
        let response = app()
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ERROR");
        assert_eq!(json["wins"], 3);
        assert_eq!(json["idle_secs"], 42);
        assert!(json.get("wallet_eth").is_none());
        assert_eq!(json["endpoints"][0]["failures"], 5);
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_withdraw_failure_payload() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/withdraw")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert!(json["error"].as_str().unwrap().contains("connection refused"));
    }
}
