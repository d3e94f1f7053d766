//! Mempool WebSocket 订阅模块
//!
//! 订阅 newPendingTransactions，把交易哈希推入有界通道

use ethers::types::H256;
use futures_util::{SinkExt, StreamExt};
use models::EngineError;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;
use tokio::time::{interval_at, sleep, timeout, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use utils::record_pending_hash;

use crate::EngineState;

/// 订阅配置
#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub ws_url: String,
    /// WebSocket ping 间隔
    pub heartbeat_interval: Duration,
    /// 断线后重连等待
    pub reconnect_delay: Duration,
    /// 握手加订阅的超时
    pub connect_timeout: Duration,
}

/// 单次连接结束的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// 对端关闭或读到流结尾
    Closed,
    /// 外部要求重建连接
    Restarted,
    /// 下游通道已关闭，整个订阅退出
    ConsumerGone,
}

/// Mempool 订阅器
///
/// 每次断线都丢弃旧连接并新建，不尝试原地修复
pub struct PendingTxStream {
    settings: StreamSettings,
    state: Arc<EngineState>,
    restart: Arc<Notify>,
}

impl PendingTxStream {
    pub fn new(settings: StreamSettings, state: Arc<EngineState>, restart: Arc<Notify>) -> Self {
        Self {
            settings,
            state,
            restart,
        }
    }

    /// 运行订阅循环，直到接收端被丢弃
    pub async fn run(&self, sender: mpsc::Sender<H256>) {
        info!(target: "pending_stream", "[STREAM] 连接到 {}", self.settings.ws_url);

        loop {
            let end = self.run_session(&sender).await;
            self.state.set_stream_connected(false);

            match end {
                Ok(SessionEnd::ConsumerGone) => {
                    info!(target: "pending_stream", "[STREAM] 下游已关闭，停止订阅");
                    return;
                }
                Ok(SessionEnd::Restarted) => {
                    warn!(target: "pending_stream", "[STREAM] 收到重建请求，丢弃当前连接");
                }
                Ok(SessionEnd::Closed) => {
                    warn!(target: "pending_stream", "[STREAM] 连接已关闭");
                }
                Err(e) => {
                    error!(target: "pending_stream", "[STREAM] 连接错误: {}", e);
                }
            }

            if sender.is_closed() {
                return;
            }

            info!(
                target: "pending_stream",
                "[STREAM] {}秒后重连...",
                self.settings.reconnect_delay.as_secs_f64()
            );
            sleep(self.settings.reconnect_delay).await;
        }
    }

    /// 运行单次连接
    async fn run_session(&self, sender: &mpsc::Sender<H256>) -> Result<SessionEnd, EngineError> {
        let restart = self.restart.notified();
        tokio::pin!(restart);

        let handshake = async {
            let (ws_stream, _) = connect_async(self.settings.ws_url.as_str())
                .await
                .map_err(|e| EngineError::StreamDisconnected(e.to_string()))?;
            let (mut write, read) = ws_stream.split();

            let subscribe = json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "eth_subscribe",
                "params": ["newPendingTransactions"]
            });
            write
                .send(Message::Text(subscribe.to_string()))
                .await
                .map_err(|e| EngineError::StreamDisconnected(e.to_string()))?;
            Ok::<_, EngineError>((write, read))
        };

        // 握手阶段同样响应重建请求
        let (mut write, mut read) = tokio::select! {
            res = timeout(self.settings.connect_timeout, handshake) => match res {
                Ok(connected) => connected?,
                Err(_) => {
                    return Err(EngineError::StreamDisconnected(format!(
                        "handshake timed out after {}s",
                        self.settings.connect_timeout.as_secs_f64()
                    )))
                }
            },
            _ = &mut restart => return Ok(SessionEnd::Restarted),
        };

        self.state.set_stream_connected(true);
        info!(target: "pending_stream", "[STREAM] 已订阅 newPendingTransactions");

        let period = self.settings.heartbeat_interval;
        let mut heartbeat = interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    write
                        .send(Message::Ping(Vec::new()))
                        .await
                        .map_err(|e| EngineError::StreamDisconnected(format!("ping failed: {}", e)))?;
                }
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        let Some(hash) = parse_pending_notification(&text) else {
                            continue;
                        };
                        record_pending_hash();
                        match sender.try_send(hash) {
                            Ok(()) => {}
                            Err(TrySendError::Full(_)) => {
                                debug!(target: "pending_stream", "候选通道已满，丢弃 {:?}", hash);
                            }
                            Err(TrySendError::Closed(_)) => return Ok(SessionEnd::ConsumerGone),
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!(target: "pending_stream", "[STREAM] 收到关闭帧: {:?}", frame);
                        return Ok(SessionEnd::Closed);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(EngineError::StreamDisconnected(e.to_string())),
                    None => return Ok(SessionEnd::Closed),
                },
                _ = &mut restart => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(SessionEnd::Restarted);
                }
            }
        }
    }
}

/// 解析 eth_subscription 推送
///
/// 兼容只推哈希和推完整交易对象两种格式，其余消息 (如订阅确认) 返回 None
pub fn parse_pending_notification(text: &str) -> Option<H256> {
    let value: Value = serde_json::from_str(text).ok()?;
    let result = value.get("params")?.get("result")?;

    let hash = match result {
        Value::String(s) => s.as_str(),
        Value::Object(obj) => obj.get("hash")?.as_str()?,
        _ => return None,
    };

    hash.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    fn notification(hash: H256) -> String {
        json!({
            "jsonrpc": "2.0",
            "method": "eth_subscription",
            "params": { "subscription": "0x1", "result": format!("{:?}", hash) }
        })
        .to_string()
    }

    #[test]
    fn test_parse_pending_notification() {
        let hash = H256::from_low_u64_be(0xabc);

        assert_eq!(parse_pending_notification(&notification(hash)), Some(hash));

        let full_tx = json!({
            "jsonrpc": "2.0",
            "method": "eth_subscription",
            "params": { "subscription": "0x1", "result": { "hash": format!("{:?}", hash), "value": "0x0" } }
        });
        assert_eq!(parse_pending_notification(&full_tx.to_string()), Some(hash));

        assert_eq!(parse_pending_notification(r#"{"jsonrpc":"2.0","id":1,"result":"0x1"}"#), None);
        assert_eq!(parse_pending_notification("not json"), None);
    }

    #[tokio::test]
    async fn test_session_restarts_after_server_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let first = H256::from_low_u64_be(1);
        let second = H256::from_low_u64_be(2);

        // 第一次连接推送一笔后关闭，第二次连接推送一笔后保持
        let server = tokio::spawn(async move {
            for (session, hash) in [first, second].into_iter().enumerate() {
                let (socket, _) = listener.accept().await.unwrap();
                let mut ws = accept_async(socket).await.unwrap();

                let subscribe = ws.next().await.unwrap().unwrap();
                assert!(subscribe.to_text().unwrap().contains("newPendingTransactions"));

                ws.send(Message::Text(notification(hash))).await.unwrap();

                if session == 0 {
                    ws.close(None).await.unwrap();
                } else {
                    while ws.next().await.is_some() {}
                }
            }
        });

        let state = Arc::new(EngineState::new());
        let stream = Arc::new(PendingTxStream::new(
            StreamSettings {
                ws_url: format!("ws://{}", addr),
                heartbeat_interval: Duration::from_secs(30),
                reconnect_delay: Duration::from_millis(20),
                connect_timeout: Duration::from_secs(5),
            },
            state.clone(),
            Arc::new(Notify::new()),
        ));

        let (tx, mut rx) = mpsc::channel(16);
        let runner = {
            let stream = stream.clone();
            tokio::spawn(async move { stream.run(tx).await })
        };

        let wait = Duration::from_secs(5);
        assert_eq!(tokio::time::timeout(wait, rx.recv()).await.unwrap(), Some(first));
        assert_eq!(tokio::time::timeout(wait, rx.recv()).await.unwrap(), Some(second));
        assert!(state.stream_connected());

        runner.abort();
        server.abort();
    }

    #[tokio::test]
    async fn test_restart_request_drops_session() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let mut sessions = 0;
            loop {
                let (socket, _) = listener.accept().await.unwrap();
                let mut ws = accept_async(socket).await.unwrap();
                let _ = ws.next().await;
                sessions += 1;
                ws.send(Message::Text(notification(H256::from_low_u64_be(sessions))))
                    .await
                    .unwrap();
                tokio::spawn(async move { while ws.next().await.is_some() {} });
            }
        });

        let restart = Arc::new(Notify::new());
        let stream = Arc::new(PendingTxStream::new(
            StreamSettings {
                ws_url: format!("ws://{}", addr),
                heartbeat_interval: Duration::from_secs(30),
                reconnect_delay: Duration::from_millis(20),
                connect_timeout: Duration::from_secs(5),
            },
            Arc::new(EngineState::new()),
            restart.clone(),
        ));

        let (tx, mut rx) = mpsc::channel(16);
        let runner = {
            let stream = stream.clone();
            tokio::spawn(async move { stream.run(tx).await })
        };

        let wait = Duration::from_secs(5);
        assert_eq!(
            tokio::time::timeout(wait, rx.recv()).await.unwrap(),
            Some(H256::from_low_u64_be(1))
        );

        restart.notify_waiters();
        assert_eq!(
            tokio::time::timeout(wait, rx.recv()).await.unwrap(),
            Some(H256::from_low_u64_be(2))
        );

        runner.abort();
        server.abort();
    }

    /// 接受 TCP 连接但不完成 WebSocket 握手
    async fn hold_without_handshake(listener: &TcpListener) -> tokio::net::TcpStream {
        let (socket, _) = listener.accept().await.unwrap();
        socket
    }

    async fn serve_one_hash(listener: &TcpListener, hash: H256) {
        let (socket, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(socket).await.unwrap();
        let _ = ws.next().await;
        ws.send(Message::Text(notification(hash))).await.unwrap();
        while ws.next().await.is_some() {}
    }

    #[tokio::test]
    async fn test_stalled_handshake_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hash = H256::from_low_u64_be(7);

        let server = tokio::spawn(async move {
            let _stalled = hold_without_handshake(&listener).await;
            serve_one_hash(&listener, hash).await;
        });

        let state = Arc::new(EngineState::new());
        let stream = Arc::new(PendingTxStream::new(
            StreamSettings {
                ws_url: format!("ws://{}", addr),
                heartbeat_interval: Duration::from_secs(30),
                reconnect_delay: Duration::from_millis(20),
                connect_timeout: Duration::from_millis(200),
            },
            state.clone(),
            Arc::new(Notify::new()),
        ));

        let (tx, mut rx) = mpsc::channel(16);
        let runner = {
            let stream = stream.clone();
            tokio::spawn(async move { stream.run(tx).await })
        };

        let got = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        assert_eq!(got, Some(hash));
        assert!(state.stream_connected());

        runner.abort();
        server.abort();
    }

    #[tokio::test]
    async fn test_restart_interrupts_stalled_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hash = H256::from_low_u64_be(8);
        let (accepted_tx, accepted_rx) = tokio::sync::oneshot::channel();

        let server = tokio::spawn(async move {
            let _stalled = hold_without_handshake(&listener).await;
            let _ = accepted_tx.send(());
            serve_one_hash(&listener, hash).await;
        });

        let restart = Arc::new(Notify::new());
        let stream = Arc::new(PendingTxStream::new(
            StreamSettings {
                ws_url: format!("ws://{}", addr),
                heartbeat_interval: Duration::from_secs(30),
                reconnect_delay: Duration::from_millis(20),
                // 超时远大于等待时间，只能靠重建请求脱困
                connect_timeout: Duration::from_secs(600),
            },
            Arc::new(EngineState::new()),
            restart.clone(),
        ));

        let (tx, mut rx) = mpsc::channel(16);
        let runner = {
            let stream = stream.clone();
            tokio::spawn(async move { stream.run(tx).await })
        };

        let wait = Duration::from_secs(5);
        tokio::time::timeout(wait, accepted_rx).await.unwrap().unwrap();
        restart.notify_waiters();

        assert_eq!(tokio::time::timeout(wait, rx.recv()).await.unwrap(), Some(hash));

        runner.abort();
        server.abort();
    }
}
