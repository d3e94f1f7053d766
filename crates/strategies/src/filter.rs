use anyhow::{Context, Result};
use ethers::types::{Address, U256};
use ethers::utils::parse_ether;
use models::CandidateObservation;
use std::collections::HashSet;

/// 候选交易过滤器
///
/// 接收方在 Router 白名单内，且金额严格大于阈值
#[derive(Debug, Clone)]
pub struct OpportunityFilter {
    routers: HashSet<Address>,
    min_value: U256,
}

impl OpportunityFilter {
    pub fn new(routers: impl IntoIterator<Item = Address>, min_value: U256) -> Self {
        Self {
            routers: routers.into_iter().collect(),
            min_value,
        }
    }

    /// 从配置解析，地址按 20 字节比较，与大小写无关
    pub fn from_config(routers: &[String], min_value_eth: &str) -> Result<Self> {
        let routers = routers
            .iter()
            .map(|r| {
                r.parse::<Address>()
                    .with_context(|| format!("Invalid router address: {}", r))
            })
            .collect::<Result<Vec<_>>>()?;

        let min_value = parse_ether(min_value_eth)
            .with_context(|| format!("Invalid MIN_TRIGGER_VALUE_ETH: {}", min_value_eth))?;

        Ok(Self::new(routers, min_value))
    }

    pub fn accepts(&self, recipient: Option<Address>, value: U256) -> bool {
        match recipient {
            Some(to) => self.routers.contains(&to) && value > self.min_value,
            // 合约创建
            None => false,
        }
    }

    pub fn accepts_observation(&self, candidate: &CandidateObservation) -> bool {
        self.accepts(candidate.recipient, candidate.value)
    }

    pub fn router_count(&self) -> usize {
        self.routers.len()
    }

    pub fn min_value(&self) -> U256 {
        self.min_value
    }
}
