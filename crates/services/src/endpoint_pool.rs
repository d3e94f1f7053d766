//! RPC 节点池
//!
//! 按优先级查询节点: 失败立即切换下一个，卡顿超过 stall timeout 则并行请求下一个，
//! 第一个成功的结果直接返回 (quorum = 1)

use async_trait::async_trait;
use config_crate::RpcEndpointConfig;
use ethers::prelude::*;
use futures_util::stream::{FuturesUnordered, StreamExt};
use models::{EndpointHealthSnapshot, EngineError};
use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, warn};
use ::utils::StatsHttp;

/// 节点池需要的最小查询接口
#[async_trait]
pub trait NodeClient: Send + Sync + 'static {
    async fn balance_of(&self, address: Address) -> Result<U256, ProviderError>;

    async fn transaction_by_hash(&self, hash: H256) -> Result<Option<Transaction>, ProviderError>;

    /// 包含 pending 交易的 nonce
    async fn pending_transaction_count(&self, address: Address) -> Result<U256, ProviderError>;
}

#[async_trait]
impl<P: JsonRpcClient + 'static> NodeClient for Provider<P> {
    async fn balance_of(&self, address: Address) -> Result<U256, ProviderError> {
        self.get_balance(address, None).await
    }

    async fn transaction_by_hash(&self, hash: H256) -> Result<Option<Transaction>, ProviderError> {
        self.get_transaction(hash).await
    }

    async fn pending_transaction_count(&self, address: Address) -> Result<U256, ProviderError> {
        self.get_transaction_count(address, Some(BlockNumber::Pending.into()))
            .await
    }
}

/// 节点健康计数，丢失少量更新可以接受
#[derive(Debug, Default)]
pub struct EndpointHealth {
    successes: AtomicU64,
    failures: AtomicU64,
    consecutive_failures: AtomicU32,
    last_latency_ms: AtomicU64,
}

impl EndpointHealth {
    fn record_success(&self, latency: Duration) {
        self.successes.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.last_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
    }
}

/// 节点池中的单个节点
pub struct PoolEndpoint<C> {
    pub url: String,
    pub priority: u32,
    /// 单次调用超时
    pub timeout: Duration,
    pub client: Arc<C>,
    health: EndpointHealth,
}

impl<C> PoolEndpoint<C> {
    pub fn new(url: impl Into<String>, priority: u32, timeout: Duration, client: Arc<C>) -> Self {
        Self {
            url: url.into(),
            priority,
            timeout,
            client,
            health: EndpointHealth::default(),
        }
    }

    pub fn snapshot(&self) -> EndpointHealthSnapshot {
        EndpointHealthSnapshot {
            url: self.url.clone(),
            priority: self.priority,
            successes: self.health.successes.load(Ordering::Relaxed),
            failures: self.health.failures.load(Ordering::Relaxed),
            consecutive_failures: self.health.consecutive_failures.load(Ordering::Relaxed),
            last_latency_ms: self.health.last_latency_ms.load(Ordering::Relaxed),
        }
    }
}

/// RPC 节点池
pub struct EndpointPool<C> {
    /// 已按优先级排序 (数字小的在前)
    endpoints: Vec<PoolEndpoint<C>>,
    stall_timeout: Duration,
}

impl EndpointPool<Provider<StatsHttp>> {
    /// 根据配置创建带 RPC 统计的节点池
    pub fn connect(configs: &[RpcEndpointConfig], stall_timeout: Duration) -> Result<Self, ProviderError> {
        let endpoints = configs
            .iter()
            .map(|cfg| {
                let provider = Provider::new(StatsHttp::new(&cfg.url)?);
                Ok(PoolEndpoint::new(
                    cfg.url.clone(),
                    cfg.priority,
                    Duration::from_millis(cfg.timeout_ms),
                    Arc::new(provider),
                ))
            })
            .collect::<Result<Vec<_>, ProviderError>>()?;

        Ok(Self::new(endpoints, stall_timeout))
    }
}

impl<C: NodeClient> EndpointPool<C> {
    pub fn new(mut endpoints: Vec<PoolEndpoint<C>>, stall_timeout: Duration) -> Self {
        endpoints.sort_by_key(|e| e.priority);
        Self {
            endpoints,
            stall_timeout,
        }
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// 优先级最高的节点
    pub fn primary(&self) -> Option<&PoolEndpoint<C>> {
        self.endpoints.first()
    }

    pub fn health_snapshot(&self) -> Vec<EndpointHealthSnapshot> {
        self.endpoints.iter().map(|e| e.snapshot()).collect()
    }

    pub async fn get_balance(&self, address: Address) -> Result<U256, EngineError> {
        self.race("get_balance", |client| async move { client.balance_of(address).await })
            .await
    }

    pub async fn get_transaction(&self, hash: H256) -> Result<Option<Transaction>, EngineError> {
        self.race("get_transaction", |client| async move {
            client.transaction_by_hash(hash).await
        })
        .await
    }

    pub async fn get_pending_nonce(&self, address: Address) -> Result<u64, EngineError> {
        self.race("get_pending_nonce", |client| async move {
            client.pending_transaction_count(address).await
        })
        .await
        .map(|count| count.low_u64())
    }

    async fn race<T, F, Fut>(&self, operation: &'static str, call: F) -> Result<T, EngineError>
    where
        T: Send,
        F: Fn(Arc<C>) -> Fut + Send,
        Fut: Future<Output = Result<T, ProviderError>> + Send,
    {
        let mut in_flight = FuturesUnordered::new();
        let mut next_index = 0usize;
        let mut last_error = String::from("no endpoints configured");

        loop {
            if in_flight.is_empty() {
                if next_index >= self.endpoints.len() {
                    break;
                }
                in_flight.push(self.attempt(next_index, call(self.endpoints[next_index].client.clone())));
                next_index += 1;
            }

            let more = next_index < self.endpoints.len();

            tokio::select! {
                Some((index, result)) = in_flight.next() => match result {
                    Ok(value) => return Ok(value),
                    Err(e) => {
                        warn!(
                            "RPC {} 失败 [{}]: {}",
                            operation, self.endpoints[index].url, e
                        );
                        last_error = e;
                        if more {
                            in_flight.push(self.attempt(next_index, call(self.endpoints[next_index].client.clone())));
                            next_index += 1;
                        }
                    }
                },
                _ = sleep(self.stall_timeout), if more => {
                    debug!(
                        "RPC {} 等待超过 {}ms，并行请求 {}",
                        operation,
                        self.stall_timeout.as_millis(),
                        self.endpoints[next_index].url
                    );
                    in_flight.push(self.attempt(next_index, call(self.endpoints[next_index].client.clone())));
                    next_index += 1;
                }
                else => break,
            }
        }

        Err(EngineError::TransportExhausted {
            operation,
            attempts: self.endpoints.len(),
            last_error,
        })
    }

    async fn attempt<T, Fut>(&self, index: usize, call: Fut) -> (usize, Result<T, String>)
    where
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let endpoint = &self.endpoints[index];
        let started = Instant::now();

        let result = match timeout(endpoint.timeout, call).await {
            Ok(Ok(value)) => {
                endpoint.health.record_success(started.elapsed());
                Ok(value)
            }
            Ok(Err(e)) => {
                endpoint.health.record_failure();
                Err(e.to_string())
            }
            Err(_) => {
                endpoint.health.record_failure();
                Err(format!("timed out after {}ms", endpoint.timeout.as_millis()))
            }
        };

        (index, result)
    }
}
