use thiserror::Error;

/// 引擎错误分类
///
/// 节点返回的错误只在传输层分类一次，下游只看变体，不再解析错误文本
#[derive(Debug, Error)]
pub enum EngineError {
    /// 所有节点都失败
    #[error("all {attempts} endpoints failed for {operation}: {last_error}")]
    TransportExhausted {
        operation: &'static str,
        attempts: usize,
        last_error: String,
    },

    /// 模拟执行 revert (当前无利润)，属于预期情况
    #[error("simulation rejected: {0}")]
    SimulationRejected(String),

    /// nonce 已被使用或已过期
    #[error("sequence conflict at nonce {nonce}: {message}")]
    SequenceConflict { nonce: u64, message: String },

    /// 钱包余额不足以支付 gas
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    /// 其他提交失败
    #[error("submission failed: {0}")]
    Submission(String),

    /// 等待确认期间失败 (链上 revert / 交易被丢弃 / 传输错误)
    #[error("confirmation failed: {0}")]
    Confirmation(String),

    /// mempool WebSocket 断开
    #[error("stream disconnected: {0}")]
    StreamDisconnected(String),

    /// 长时间没有有效观察
    #[error("liveness timeout: idle for {idle_secs}s")]
    LivenessTimeout { idle_secs: u64 },

    #[error("contract call failed: {0}")]
    Contract(String),
}

impl EngineError {
    /// 是否需要重新同步 nonce
    pub fn requires_resync(&self) -> bool {
        matches!(
            self,
            EngineError::SequenceConflict { .. }
                | EngineError::InsufficientFunds(_)
                | EngineError::Submission(_)
                | EngineError::TransportExhausted { .. }
        )
    }

    /// 简短的分类标签，用于日志和统计
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::TransportExhausted { .. } => "transport_exhausted",
            EngineError::SimulationRejected(_) => "simulation_rejected",
            EngineError::SequenceConflict { .. } => "sequence_conflict",
            EngineError::InsufficientFunds(_) => "insufficient_funds",
            EngineError::Submission(_) => "submission",
            EngineError::Confirmation(_) => "confirmation",
            EngineError::StreamDisconnected(_) => "stream_disconnected",
            EngineError::LivenessTimeout { .. } => "liveness_timeout",
            EngineError::Contract(_) => "contract",
        }
    }
}
