//! 套利合约调用
//!
//! 节点返回的提交错误在这里分类为 `EngineError`，执行器只看分类结果

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::providers::MiddlewareError;
use models::EngineError;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::flash_arbitrage::FlashArbitrageContract;
use crate::types::{GasStrategy, StrikeParams};

/// 连续多少次轮询查不到交易才认定被丢弃
///
/// 负载均衡的公共节点刚广播后的几次查询可能落到还没收到交易的后端
const DROP_AFTER_MISSING_POLLS: u32 = 10;

/// 执行器依赖的合约接口
#[async_trait]
pub trait StrikeContract: Send + Sync + 'static {
    /// eth_call 模拟，revert 返回 `SimulationRejected`
    async fn simulate(&self, params: &StrikeParams) -> Result<(), EngineError>;

    /// 用指定 nonce 提交 EIP-1559 交易
    async fn submit(&self, params: &StrikeParams, gas: &GasStrategy, nonce: u64) -> Result<H256, EngineError>;

    /// 等待回执，返回链上执行是否成功 (status == 1)
    async fn wait_for_receipt(&self, tx_hash: H256, poll: Duration) -> Result<bool, EngineError>;

    /// 合约持有的 WETH
    async fn contract_balance(&self) -> Result<U256, EngineError>;

    async fn withdraw(&self, gas: &GasStrategy, nonce: u64) -> Result<H256, EngineError>;
}

/// 基于 ethers Middleware 的合约实现
pub struct EthersStrikeContract<M: Middleware + 'static> {
    contract: FlashArbitrageContract<M>,
    client: Arc<M>,
    sender: Address,
    chain_id: u64,
}

impl<M: Middleware + 'static> EthersStrikeContract<M> {
    pub fn new(address: Address, client: Arc<M>, sender: Address, chain_id: u64) -> Self {
        let contract = FlashArbitrageContract::new(address, client.clone());
        Self {
            contract,
            client,
            sender,
            chain_id,
        }
    }

    pub fn address(&self) -> Address {
        self.contract.address()
    }

    /// 构建并发送 EIP-1559 交易
    ///
    /// gas_limit 为 None 时由节点估算
    async fn send_eip1559(
        &self,
        data: Option<Bytes>,
        gas_limit: Option<u64>,
        gas: &GasStrategy,
        nonce: u64,
    ) -> Result<H256, EngineError> {
        let (estimated_max_fee, _) = self
            .client
            .estimate_eip1559_fees(None)
            .await
            .map_err(|e| classify_middleware_error(nonce, &e))?;

        let tx = self.build_request(data, gas_limit, gas, nonce, estimated_max_fee);
        debug!(target: "strike", "发送交易 nonce: {}, max_fee: {:?}", nonce, tx.max_fee_per_gas);

        let pending = self
            .client
            .send_transaction(tx, None)
            .await
            .map_err(|e| classify_middleware_error(nonce, &e))?;

        Ok(pending.tx_hash())
    }

    /// max fee = 节点估算的 max fee + 固定优先费
    fn build_request(
        &self,
        data: Option<Bytes>,
        gas_limit: Option<u64>,
        gas: &GasStrategy,
        nonce: u64,
        estimated_max_fee: U256,
    ) -> Eip1559TransactionRequest {
        let priority_fee = gas.priority_fee_wei();

        let mut tx = Eip1559TransactionRequest::new()
            .from(self.sender)
            .to(self.contract.address())
            .nonce(nonce)
            .max_priority_fee_per_gas(priority_fee)
            .max_fee_per_gas(estimated_max_fee + priority_fee)
            .chain_id(self.chain_id);
        if let Some(data) = data {
            tx = tx.data(data);
        }
        if let Some(gas_limit) = gas_limit {
            tx = tx.gas(gas_limit);
        }
        tx
    }
}

#[async_trait]
impl<M: Middleware + 'static> StrikeContract for EthersStrikeContract<M> {
    async fn simulate(&self, params: &StrikeParams) -> Result<(), EngineError> {
        self.contract
            .execute_flash_arbitrage(params.token_in, params.token_out, params.loan_amount)
            .from(self.sender)
            .call()
            .await
            .map_err(|e| EngineError::SimulationRejected(e.to_string()))
    }

    async fn submit(&self, params: &StrikeParams, gas: &GasStrategy, nonce: u64) -> Result<H256, EngineError> {
        let calldata = self
            .contract
            .execute_flash_arbitrage(params.token_in, params.token_out, params.loan_amount)
            .calldata();

        self.send_eip1559(calldata, Some(gas.gas_limit), gas, nonce).await
    }

    async fn wait_for_receipt(&self, tx_hash: H256, poll: Duration) -> Result<bool, EngineError> {
        let mut missing = 0u32;

        loop {
            match self.client.get_transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => return Ok(receipt.status == Some(U64::from(1))),
                Ok(None) => {
                    // 回执还没出，确认交易仍在 mempool 中
                    match self.client.get_transaction(tx_hash).await {
                        Ok(Some(_)) => {
                            missing = 0;
                            debug!(target: "strike", "等待交易确认: {:?}", tx_hash);
                        }
                        Ok(None) => {
                            missing += 1;
                            if missing >= DROP_AFTER_MISSING_POLLS {
                                return Err(EngineError::Confirmation(format!(
                                    "transaction {:?} dropped from mempool",
                                    tx_hash
                                )));
                            }
                            debug!(
                                target: "strike",
                                "节点暂未返回交易 {:?} ({}/{})",
                                tx_hash,
                                missing,
                                DROP_AFTER_MISSING_POLLS
                            );
                        }
                        Err(e) => return Err(EngineError::Confirmation(e.to_string())),
                    }
                    tokio::time::sleep(poll).await;
                }
                Err(e) => return Err(EngineError::Confirmation(e.to_string())),
            }
        }
    }

    async fn contract_balance(&self) -> Result<U256, EngineError> {
        self.contract
            .get_contract_balance()
            .call()
            .await
            .map_err(|e| EngineError::Contract(e.to_string()))
    }

    async fn withdraw(&self, gas: &GasStrategy, nonce: u64) -> Result<H256, EngineError> {
        let calldata = self.contract.withdraw().calldata();
        self.send_eip1559(calldata, None, gas, nonce).await
    }
}

fn classify_middleware_error<E: MiddlewareError>(nonce: u64, err: &E) -> EngineError {
    match err.as_error_response() {
        Some(response) => classify_submit_error(nonce, Some(response.code), &response.message),
        None => EngineError::Submission(err.to_string()),
    }
}

/// 把节点返回的提交错误归类
pub fn classify_submit_error(nonce: u64, code: Option<i64>, message: &str) -> EngineError {
    let lower = message.to_lowercase();

    const SEQUENCE_MARKERS: [&str; 6] = [
        "nonce too low",
        "nonce too high",
        "invalid nonce",
        "already known",
        "known transaction",
        "replacement transaction underpriced",
    ];

    if SEQUENCE_MARKERS.iter().any(|m| lower.contains(m)) {
        return EngineError::SequenceConflict {
            nonce,
            message: message.to_string(),
        };
    }

    if lower.contains("insufficient funds") {
        return EngineError::InsufficientFunds(message.to_string());
    }

    match code {
        Some(code) => EngineError::Submission(format!("[{}] {}", code, message)),
        None => EngineError::Submission(message.to_string()),
    }
}
