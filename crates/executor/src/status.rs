use async_trait::async_trait;
use ethers::types::H256;
use ethers::utils::format_ether;
use models::{EngineError, EngineStatus};
use services::NodeClient;
use tracing::{debug, info, warn};

use crate::contract::StrikeContract;
use crate::executor::StrikeExecutor;

/// `/status` 与 `/withdraw` 的数据来源
#[async_trait]
pub trait EngineStatusSource: Send + Sync {
    /// 查询失败时返回降级状态，不返回错误
    async fn status(&self) -> EngineStatus;

    /// 调用合约 withdraw，nonce 与 strike 共用同一个分配器
    async fn withdraw(&self) -> Result<H256, EngineError>;
}

#[async_trait]
impl<N: NodeClient, C: StrikeContract> EngineStatusSource for StrikeExecutor<N, C> {
    async fn status(&self) -> EngineStatus {
        let wins = self.state.successful_strikes();
        let idle_secs = self.state.idle_for().as_secs();
        let endpoints = self.pool.health_snapshot();

        let balances = tokio::try_join!(
            self.pool.get_balance(self.config.sender),
            self.contract.contract_balance()
        );

        match balances {
            Ok((wallet, contract)) => EngineStatus {
                status: self.state.status_label().to_string(),
                wallet_eth: Some(format_ether(wallet)),
                contract_weth: Some(format_ether(contract)),
                wins,
                idle_secs,
                endpoints,
            },
            Err(e) => {
                warn!("状态查询失败: {}", e);
                EngineStatus::degraded(wins, idle_secs, endpoints)
            }
        }
    }

    async fn withdraw(&self) -> Result<H256, EngineError> {
        let mut slot = self.allocator.begin().await;
        let nonce = slot.next().await?;

        match self.contract.withdraw(&self.config.gas, nonce).await {
            Ok(tx_hash) => {
                info!(target: "strike", "💰 已提交 withdraw {:?} | nonce: {}", tx_hash, nonce);
                Ok(tx_hash)
            }
            Err(e) => {
                if e.requires_resync() {
                    if let Err(sync_err) = slot.resync().await {
                        debug!(target: "strike", "withdraw 失败后同步未成功，计数器已置空: {}", sync_err);
                    }
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::tests::{build_executor, FakeContract, FakeNode, ONE_ETH};
    use models::{STATUS_ERROR, STATUS_RECONNECTING};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_status_reports_balances() {
        let contract = Arc::new(FakeContract::default());
        contract.weth.store(ONE_ETH / 2, Ordering::SeqCst);
        let executor = build_executor(FakeNode::new(ONE_ETH, 0), contract);

        let status = executor.status().await;

        assert_eq!(status.status, STATUS_RECONNECTING);
        assert_eq!(status.wallet_eth.as_deref(), Some("1.000000000000000000"));
        assert_eq!(status.contract_weth.as_deref(), Some("0.500000000000000000"));
        assert_eq!(status.endpoints.len(), 1);
    }

    #[tokio::test]
    async fn test_status_degrades_on_query_failure() {
        let node = FakeNode::new(ONE_ETH, 0);
        node.fail_balance.store(true, Ordering::SeqCst);
        let executor = build_executor(node, Arc::new(FakeContract::default()));

        let status = executor.status().await;

        assert_eq!(status.status, STATUS_ERROR);
        assert!(status.wallet_eth.is_none());
        assert_eq!(status.wins, 0);
    }

    #[tokio::test]
    async fn test_withdraw_uses_allocator() {
        let contract = Arc::new(FakeContract::default());
        let executor = build_executor(FakeNode::new(ONE_ETH, 9), contract.clone());

        let tx_hash = executor.withdraw().await.unwrap();

        assert_eq!(tx_hash, H256::from_low_u64_be(9));
        assert_eq!(executor.allocator.current().await, Some(10));
    }

    #[tokio::test]
    async fn test_withdraw_conflict_resyncs() {
        let contract = Arc::new(FakeContract::default());
        contract.conflict_once.store(true, Ordering::SeqCst);
        let node = FakeNode::new(ONE_ETH, 9);
        let executor = build_executor(node.clone(), contract.clone());

        executor.allocator.resync().await.unwrap();
        node.pending.store(12, Ordering::SeqCst);

        let err = executor.withdraw().await.unwrap_err();
        assert!(matches!(err, EngineError::SequenceConflict { nonce: 9, .. }));
        assert_eq!(executor.allocator.current().await, Some(12));
    }
}
