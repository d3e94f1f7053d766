use serde::{Deserialize, Serialize};

/// 正常运行中
pub const STATUS_HUNTING: &str = "HUNTING";
/// mempool 连接断开，正在重连
pub const STATUS_RECONNECTING: &str = "RECONNECTING";
/// 查询失败时返回的降级状态
pub const STATUS_ERROR: &str = "ERROR";

/// 单个 RPC 节点的健康快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointHealthSnapshot {
    pub url: String,
    pub priority: u32,
    pub successes: u64,
    pub failures: u64,
    pub consecutive_failures: u32,
    pub last_latency_ms: u64,
}

/// `/status` 返回的引擎状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_eth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_weth: Option<String>,
    pub wins: u64,
    pub idle_secs: u64,
    #[serde(default)]
    pub endpoints: Vec<EndpointHealthSnapshot>,
}

impl EngineStatus {
    /// 降级状态 - 任何查询失败时使用，不向调用方抛出错误
    pub fn degraded(wins: u64, idle_secs: u64, endpoints: Vec<EndpointHealthSnapshot>) -> Self {
        Self {
            status: STATUS_ERROR.to_string(),
            wallet_eth: None,
            contract_weth: None,
            wins,
            idle_secs,
            endpoints,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.status == STATUS_ERROR
    }
}
