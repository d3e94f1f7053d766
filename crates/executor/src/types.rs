//! 执行器类型定义

use ethers::types::{Address, U256};
use std::time::Duration;

/// 闪电贷参数 - 固定策略，由配置给出
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrikeParams {
    /// 借入代币
    pub token_in: Address,
    /// 兑换代币
    pub token_out: Address,
    /// 借款金额 (wei)
    pub loan_amount: U256,
}

/// Gas 策略
#[derive(Debug, Clone)]
pub struct GasStrategy {
    /// 固定 gas limit
    pub gas_limit: u64,
    /// 优先费 (Gwei)
    pub priority_fee_gwei: f64,
}

impl GasStrategy {
    pub fn priority_fee_wei(&self) -> U256 {
        U256::from((self.priority_fee_gwei * 1_000_000_000.0) as u128)
    }
}

impl Default for GasStrategy {
    fn default() -> Self {
        Self {
            gas_limit: 850_000,
            priority_fee_gwei: 2.5,
        }
    }
}

/// 执行器配置
#[derive(Debug, Clone)]
pub struct StrikeConfig {
    /// 签名钱包地址，也是模拟调用的 from
    pub sender: Address,
    pub params: StrikeParams,
    pub gas: GasStrategy,
    /// 钱包余额下限，为 0 时不检查
    pub balance_floor: U256,
    /// 等待回执的轮询间隔
    pub confirmation_poll: Duration,
    /// 等待回执的上限，超时按确认失败处理
    pub confirmation_timeout: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_fee_wei() {
        let gas = GasStrategy::default();
        assert_eq!(gas.priority_fee_wei(), U256::from(2_500_000_000u64));

        let gas = GasStrategy {
            gas_limit: 21_000,
            priority_fee_gwei: 0.5,
        };
        assert_eq!(gas.priority_fee_wei(), U256::from(500_000_000u64));
    }
}
