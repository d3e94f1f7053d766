//! Strike 执行器核心实现
//!
//! 一次 strike 的流程：
//! 1. 余额检查 (可选)
//! 2. eth_call 模拟，revert 直接放弃
//! 3. 在分配器临界区内分配 nonce 并提交
//! 4. 释放锁后等待回执

use ethers::types::H256;
use ethers::utils::format_ether;
use models::{CandidateObservation, EngineError, StrikeOutcome, StrikeState};
use services::{EndpointPool, EngineState, NodeClient};
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

use crate::contract::StrikeContract;
use crate::nonce::SequenceAllocator;
use crate::types::StrikeConfig;

/// Strike 执行器
pub struct StrikeExecutor<N, C> {
    pub(crate) pool: Arc<EndpointPool<N>>,
    pub(crate) contract: Arc<C>,
    pub(crate) allocator: Arc<SequenceAllocator<N>>,
    pub(crate) state: Arc<EngineState>,
    pub(crate) config: StrikeConfig,
}

impl<N: NodeClient, C: StrikeContract> StrikeExecutor<N, C> {
    pub fn new(
        pool: Arc<EndpointPool<N>>,
        contract: Arc<C>,
        allocator: Arc<SequenceAllocator<N>>,
        state: Arc<EngineState>,
        config: StrikeConfig,
    ) -> Self {
        Self {
            pool,
            contract,
            allocator,
            state,
            config,
        }
    }

    pub fn state(&self) -> &Arc<EngineState> {
        &self.state
    }

    /// 对一笔已通过过滤的候选交易执行 strike
    pub async fn strike(&self, candidate: &CandidateObservation) -> StrikeOutcome {
        // 命中候选即视为活跃
        self.state.touch();

        info!(
            target: "strike",
            "🎯 候选交易 {:?} | value: {} ETH | 观察延迟: {}ms",
            candidate.hash,
            format_ether(candidate.value),
            candidate.age_ms()
        );

        if let Err(outcome) = self.check_balance().await {
            return outcome;
        }

        // Simulating
        debug!(target: "strike", "[{}] {:?}", StrikeState::Simulating, candidate.hash);
        if let Err(reason) = self.contract.simulate(&self.config.params).await {
            trace!(target: "strike", "模拟未通过 {:?}: {}", candidate.hash, reason);
            return StrikeOutcome::Rejected { reason };
        }

        // Committing - 分配与提交不能与其他提交交错
        debug!(target: "strike", "[{}] {:?}", StrikeState::Committing, candidate.hash);
        let (tx_hash, nonce) = {
            let mut slot = self.allocator.begin().await;

            let nonce = match slot.next().await {
                Ok(nonce) => nonce,
                Err(reason) => {
                    error!(target: "strike", "❌ Nonce 分配失败: {}", reason);
                    return StrikeOutcome::Failed { reason, tx_hash: None };
                }
            };

            match self.contract.submit(&self.config.params, &self.config.gas, nonce).await {
                Ok(tx_hash) => (tx_hash, nonce),
                Err(reason) => {
                    warn!(
                        target: "strike",
                        "❌ 提交失败 nonce {} [{}]: {}",
                        nonce,
                        reason.kind(),
                        reason
                    );
                    // pending 视图为准，不重发
                    if reason.requires_resync() {
                        if let Err(e) = slot.resync().await {
                            debug!(target: "strike", "提交失败后同步未成功，计数器已置空: {}", e);
                        }
                    }
                    return StrikeOutcome::Failed { reason, tx_hash: None };
                }
            }
        };

        info!(target: "strike", "🚀 已提交 {:?} | nonce: {}", tx_hash, nonce);

        // AwaitingConfirmation
        debug!(target: "strike", "[{}] {:?}", StrikeState::AwaitingConfirmation, tx_hash);
        self.await_confirmation(tx_hash, nonce).await
    }

    /// 余额低于下限时跳过，不消耗 nonce
    async fn check_balance(&self) -> Result<(), StrikeOutcome> {
        if self.config.balance_floor.is_zero() {
            return Ok(());
        }

        match self.pool.get_balance(self.config.sender).await {
            Ok(balance) if balance < self.config.balance_floor => {
                warn!(
                    target: "strike",
                    "⚠️ 钱包余额不足: {} ETH < {} ETH，跳过",
                    format_ether(balance),
                    format_ether(self.config.balance_floor)
                );
                Err(StrikeOutcome::Rejected {
                    reason: EngineError::InsufficientFunds(format!(
                        "wallet balance {} below floor {}",
                        balance, self.config.balance_floor
                    )),
                })
            }
            Ok(_) => Ok(()),
            Err(reason) => {
                warn!(target: "strike", "余额查询失败: {}", reason);
                Err(StrikeOutcome::Failed { reason, tx_hash: None })
            }
        }
    }

    /// 等待回执，有上限
    ///
    /// 链上 revert 时 nonce 已被消耗；其余失败都可能留下 nonce 空洞，交给分配器回收
    async fn await_confirmation(&self, tx_hash: H256, nonce: u64) -> StrikeOutcome {
        let waited = timeout(
            self.config.confirmation_timeout,
            self.contract
                .wait_for_receipt(tx_hash, self.config.confirmation_poll),
        )
        .await;

        let reason = match waited {
            Ok(Ok(true)) => {
                let wins = self.state.record_success();
                self.state.touch();
                info!(target: "strike", "✅ Strike 成功 {:?} | nonce: {} | Wins: {}", tx_hash, nonce, wins);
                return StrikeOutcome::Succeeded { tx_hash, nonce };
            }
            Ok(Ok(false)) => {
                error!(target: "strike", "❌ 交易 Revert: {:?}", tx_hash);
                return StrikeOutcome::Failed {
                    reason: EngineError::Confirmation(format!("transaction {:?} reverted", tx_hash)),
                    tx_hash: Some(tx_hash),
                };
            }
            Ok(Err(reason)) => reason,
            Err(_) => EngineError::Confirmation(format!(
                "no receipt for {:?} within {}s",
                tx_hash,
                self.config.confirmation_timeout.as_secs()
            )),
        };

        error!(target: "strike", "❌ 等待确认失败 {:?}: {}", tx_hash, reason);
        self.reclaim_nonce(nonce).await;

        StrikeOutcome::Failed {
            reason,
            tx_hash: Some(tx_hash),
        }
    }

    async fn reclaim_nonce(&self, nonce: u64) {
        match self.allocator.reclaim(nonce).await {
            Ok(Some(next)) => {
                warn!(target: "strike", "♻️ nonce {} 未进入 pending 视图，计数器回退到 {}", nonce, next);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(target: "strike", "nonce {} 回收检查失败，下次分配时重新拉取: {}", nonce, e);
            }
        }
    }
}
