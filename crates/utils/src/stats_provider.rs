use ethers::providers::{Http, JsonRpcClient, ProviderError};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;
use tokio::task::JoinHandle;
use url::Url;

use crate::api_stats::{log_api_stats, record_rpc_request};

/// 带统计功能的 HTTP 传输层
#[derive(Debug, Clone)]
pub struct StatsHttp {
    inner: Http,
}

impl StatsHttp {
    pub fn new(url: &str) -> Result<Self, ProviderError> {
        let parsed_url: Url = url.parse().map_err(|e| {
            ProviderError::CustomError(format!("Invalid URL: {}", e))
        })?;
        let inner = Http::new(parsed_url);
        Ok(Self { inner })
    }
}

#[async_trait::async_trait]
impl JsonRpcClient for StatsHttp {
    type Error = <Http as JsonRpcClient>::Error;

    async fn request<T, R>(&self, method: &str, params: T) -> Result<R, Self::Error>
    where
        T: Debug + Serialize + Send + Sync,
        R: DeserializeOwned + Send,
    {
        record_rpc_request();
        JsonRpcClient::request(&self.inner, method, params).await
    }
}

/// RPC 统计定时日志任务
///
/// 所有节点共用一份进程级统计，由该任务周期性写入 rpc_stats.log
pub struct StatsLogger {
    log_task: Option<JoinHandle<()>>,
}

impl StatsLogger {
    /// `log_interval_secs` 为 0 时不启动定时任务
    pub fn start(log_interval_secs: u64) -> Self {
        let log_task = if log_interval_secs > 0 {
            Some(tokio::spawn(async move {
                let period = tokio::time::Duration::from_secs(log_interval_secs);
                let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
                loop {
                    interval.tick().await;
                    log_api_stats();
                }
            }))
        } else {
            None
        };

        Self { log_task }
    }

    pub fn is_running(&self) -> bool {
        self.log_task.as_ref().map_or(false, |h| !h.is_finished())
    }

    /// 停止统计日志任务并输出最终统计
    pub fn stop(&mut self) {
        log_api_stats();

        if let Some(handle) = self.log_task.take() {
            handle.abort();
        }
    }
}

impl Drop for StatsLogger {
    fn drop(&mut self) {
        if let Some(handle) = self.log_task.take() {
            handle.abort();
        }
    }
}
