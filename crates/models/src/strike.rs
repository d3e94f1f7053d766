use ethers::types::H256;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::EngineError;

/// Strike 状态机
///
/// Simulating → Committing → AwaitingConfirmation → {Succeeded | Rejected | Failed}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrikeState {
    Simulating,
    Committing,
    AwaitingConfirmation,
    Succeeded,
    Rejected,
    Failed,
}

impl fmt::Display for StrikeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StrikeState::Simulating => "simulating",
            StrikeState::Committing => "committing",
            StrikeState::AwaitingConfirmation => "awaiting_confirmation",
            StrikeState::Succeeded => "succeeded",
            StrikeState::Rejected => "rejected",
            StrikeState::Failed => "failed",
        };
        write!(f, "{}", label)
    }
}

/// 一次 strike 的终态
#[derive(Debug)]
pub enum StrikeOutcome {
    /// 交易上链且执行成功
    Succeeded { tx_hash: H256, nonce: u64 },
    /// 未消耗 nonce 就放弃 (余额保护 / 模拟 revert)
    Rejected { reason: EngineError },
    /// 已进入提交阶段后失败，或查询失败
    Failed {
        reason: EngineError,
        tx_hash: Option<H256>,
    },
}

impl StrikeOutcome {
    pub fn state(&self) -> StrikeState {
        match self {
            StrikeOutcome::Succeeded { .. } => StrikeState::Succeeded,
            StrikeOutcome::Rejected { .. } => StrikeState::Rejected,
            StrikeOutcome::Failed { .. } => StrikeState::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StrikeOutcome::Succeeded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_states() {
        assert_eq!(StrikeState::AwaitingConfirmation.to_string(), "awaiting_confirmation");

        let outcome = StrikeOutcome::Failed {
            reason: EngineError::Confirmation("status 0".to_string()),
            tx_hash: None,
        };
        assert_eq!(outcome.state(), StrikeState::Failed);
        assert_eq!(outcome.state().to_string(), "failed");
        assert!(!outcome.is_success());
    }
}
