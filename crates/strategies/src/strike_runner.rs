use ethers::types::H256;
use ethers::utils::format_ether;
use executor::{StrikeContract, StrikeExecutor};
use models::{CandidateObservation, StrikeOutcome};
use services::{EndpointPool, NodeClient};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, trace, warn};

use crate::OpportunityFilter;

/// Strike 调度器
///
/// 从通道接收交易哈希，查询交易详情并过滤，命中后交给执行器。
/// 每个哈希一个任务，并发数由信号量限制
pub struct StrikeRunner<N, C> {
    pool: Arc<EndpointPool<N>>,
    filter: OpportunityFilter,
    executor: Arc<StrikeExecutor<N, C>>,
    permits: Arc<Semaphore>,
    max_in_flight: usize,
}

impl<N: NodeClient, C: StrikeContract> StrikeRunner<N, C> {
    pub fn new(
        pool: Arc<EndpointPool<N>>,
        filter: OpportunityFilter,
        executor: Arc<StrikeExecutor<N, C>>,
        max_in_flight: usize,
    ) -> Self {
        let max_in_flight = max_in_flight.max(1);
        Self {
            pool,
            filter,
            executor,
            permits: Arc::new(Semaphore::new(max_in_flight)),
            max_in_flight,
        }
    }

    /// 运行到通道关闭，返回前等待所有在途任务结束
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<H256>) {
        info!(
            target: "strike_runner",
            "🚀 Strike 调度启动 | Router: {} | 触发金额 > {} ETH | 并发上限: {}",
            self.filter.router_count(),
            format_ether(self.filter.min_value()),
            self.max_in_flight
        );

        while let Some(hash) = rx.recv().await {
            let Ok(permit) = self.permits.clone().acquire_owned().await else {
                break;
            };

            let runner = self.clone();
            tokio::spawn(async move {
                let _permit = permit;
                runner.handle(hash).await;
            });
        }

        // 拿到全部许可即所有任务已结束
        let _ = self.permits.acquire_many(self.max_in_flight as u32).await;
        info!(target: "strike_runner", "⏹️ Strike 调度已停止");
    }

    /// 处理一笔 pending 交易，未命中过滤器返回 None
    pub async fn handle(&self, hash: H256) -> Option<StrikeOutcome> {
        let tx = match self.pool.get_transaction(hash).await {
            Ok(Some(tx)) => tx,
            Ok(None) => {
                trace!(target: "strike_runner", "交易已不在 mempool: {:?}", hash);
                return None;
            }
            Err(e) => {
                debug!(target: "strike_runner", "查询交易失败 {:?}: {}", hash, e);
                return None;
            }
        };

        let candidate = CandidateObservation::from_transaction(&tx);
        if !self.filter.accepts_observation(&candidate) {
            return None;
        }

        self.executor.state().record_candidate();
        utils::record_candidate();

        let outcome = self.executor.strike(&candidate).await;
        match &outcome {
            StrikeOutcome::Succeeded { tx_hash, nonce } => {
                info!(target: "strike_runner", "✅ {:?} -> {:?} (nonce {})", hash, tx_hash, nonce);
            }
            StrikeOutcome::Rejected { reason } => {
                debug!(target: "strike_runner", "{:?} 放弃 [{}]", hash, reason.kind());
            }
            StrikeOutcome::Failed { reason, tx_hash } => {
                warn!(
                    target: "strike_runner",
                    "{:?} 失败 [{}] tx: {:?}: {}",
                    hash,
                    reason.kind(),
                    tx_hash,
                    reason
                );
            }
        }

        Some(outcome)
    }
}
