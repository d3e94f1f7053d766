use ethers::types::{Address, Transaction, H256, U256};
use std::time::Instant;

/// 候选交易 - 从 mempool 观察到并已解析的 pending 交易
///
/// 只在一次 strike 的生命周期内存在，处理完即丢弃
#[derive(Debug, Clone)]
pub struct CandidateObservation {
    /// pending 交易哈希
    pub hash: H256,
    /// 接收方地址 (None 表示合约创建)
    pub recipient: Option<Address>,
    /// 交易附带的原生代币数量 (wei)
    pub value: U256,
    /// 观察到的时间
    pub observed_at: Instant,
}

impl CandidateObservation {
    pub fn new(hash: H256, recipient: Option<Address>, value: U256) -> Self {
        Self {
            hash,
            recipient,
            value,
            observed_at: Instant::now(),
        }
    }

    /// 从节点返回的交易构建候选
    pub fn from_transaction(tx: &Transaction) -> Self {
        Self::new(tx.hash, tx.to, tx.value)
    }

    /// 观察到现在经过的毫秒数
    pub fn age_ms(&self) -> u128 {
        self.observed_at.elapsed().as_millis()
    }
}
