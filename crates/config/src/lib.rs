use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::env;
use std::str::FromStr;

/// Base 主网
pub const BASE_CHAIN_ID: u64 = 8453;

/// 默认套利合约地址
pub const DEFAULT_ARBITRAGE_CONTRACT: &str = "0x83EF5c401fAa5B9674BAfAcFb089b30bAc67C9A0";

/// Base 上的默认 RPC 节点 (按优先级排列)
pub const DEFAULT_PRIMARY_RPC: &str = "https://mainnet.base.org";
pub const DEFAULT_FALLBACK_RPCS: [&str; 2] = ["https://base.drpc.org", "https://base.llamarpc.com"];

/// 默认 mempool WebSocket 节点
pub const DEFAULT_WS_URL: &str = "wss://base-rpc.publicnode.com";

/// Base 上的代币
pub const WETH_BASE: &str = "0x4200000000000000000000000000000000000006";
pub const USDC_BASE: &str = "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913";

/// 监控的 DEX Router
pub const AERODROME_ROUTER: &str = "0xcF77a3Ba9A5CA399B7c97c74d54e5b1Beb874E43";
pub const UNISWAP_V2_ROUTER_BASE: &str = "0x4752ba5DBc23f44D87826276BF6Fd6b1C372aD24";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub chain: ChainConfig,
    pub wallet: WalletConfig,
    pub strike: StrikeConfig,
    pub stream: StreamConfig,
    pub watchdog: WatchdogConfig,
    pub api: ApiConfig,
    /// 启动失败后的重试间隔 (秒)
    pub boot_retry_delay_secs: u64,
    /// RPC 统计日志输出间隔 (秒)，0 表示关闭
    pub rpc_stats_log_secs: u64,
}

/// 单个 RPC 节点配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RpcEndpointConfig {
    pub url: String,
    /// 优先级，数字越小越优先
    pub priority: u32,
    /// 单次调用超时 (毫秒)
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    /// RPC 节点池，已按优先级排序
    pub rpc_endpoints: Vec<RpcEndpointConfig>,
    /// 节点无响应多久后同时请求下一个节点 (毫秒)
    pub stall_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    pub private_key: Option<String>,
    pub arbitrage_contract_address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StrikeConfig {
    /// 监控的 Router 地址列表
    pub routers: Vec<String>,
    /// 闪电贷借入代币
    pub token_in: String,
    /// 闪电贷兑换代币
    pub token_out: String,
    /// 固定借款金额 (ETH)
    pub loan_amount_eth: String,
    /// 触发模拟的最小交易金额 (ETH)，严格大于
    pub min_trigger_value_eth: String,
    /// 钱包余额保护下限 (ETH)，"0" 表示关闭
    pub balance_floor_eth: String,
    /// 固定 gas limit
    pub gas_limit: u64,
    /// 优先费 (Gwei) - 支持小数，如 2.5
    pub priority_fee_gwei: f64,
    /// 等待回执的轮询间隔 (毫秒)
    pub confirmation_poll_ms: u64,
    /// 等待回执的上限 (秒)，超时按失败处理
    pub confirmation_timeout_secs: u64,
    /// 同时处理的候选交易上限
    pub max_in_flight: usize,
    /// mempool -> 执行器 通道容量
    pub candidate_channel_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    pub ws_url: String,
    pub heartbeat_secs: u64,
    pub reconnect_delay_secs: u64,
    /// WebSocket 握手 + 订阅的超时 (秒)
    pub connect_timeout_secs: u64,
}

/// 看门狗触发后的处理方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum WatchdogMode {
    /// 退出进程，由外部守护进程重启
    #[default]
    ExitProcess,
    /// 只重建 mempool 连接
    RestartStream,
}

impl FromStr for WatchdogMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "exit" | "exit_process" => Ok(WatchdogMode::ExitProcess),
            "restart_stream" | "stream" => Ok(WatchdogMode::RestartStream),
            other => bail!("unknown WATCHDOG_MODE: {}", other),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchdogConfig {
    pub check_interval_secs: u64,
    pub idle_ceiling_secs: u64,
    pub mode: WatchdogMode,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        // 加载 .env 文件
        dotenv::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 从任意 key-value 来源构建配置 (空字符串视为未设置)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|s| !s.trim().is_empty());

        // RPC 节点池
        let rpc_timeout_ms = parse_or(get("RPC_TIMEOUT_MS"), 10_000u64, "RPC_TIMEOUT_MS")?;
        let rpc_endpoints = match get("RPC_POOL") {
            Some(pool) => parse_endpoint_list(&pool, rpc_timeout_ms)?,
            None => {
                let primary = get("QUICKNODE_HTTP").unwrap_or_else(|| DEFAULT_PRIMARY_RPC.to_string());
                let mut urls = vec![primary];
                urls.extend(DEFAULT_FALLBACK_RPCS.iter().map(|s| s.to_string()));
                urls.into_iter()
                    .enumerate()
                    .map(|(i, url)| RpcEndpointConfig {
                        url,
                        priority: i as u32 + 1,
                        timeout_ms: rpc_timeout_ms,
                    })
                    .collect()
            }
        };

        let chain = ChainConfig {
            chain_id: parse_or(get("CHAIN_ID"), BASE_CHAIN_ID, "CHAIN_ID")?,
            rpc_endpoints,
            stall_timeout_ms: parse_or(get("RPC_STALL_TIMEOUT_MS"), 2_500u64, "RPC_STALL_TIMEOUT_MS")?,
        };

        // 钱包配置
        let wallet = WalletConfig {
            private_key: get("TREASURY_PRIVATE_KEY").or_else(|| get("PRIVATE_KEY")),
            arbitrage_contract_address: get("ARBITRAGE_CONTRACT_ADDRESS")
                .unwrap_or_else(|| DEFAULT_ARBITRAGE_CONTRACT.to_string()),
        };

        // Strike 配置
        let routers = match get("DEX_ROUTERS") {
            Some(list) => split_list(&list),
            None => vec![AERODROME_ROUTER.to_string(), UNISWAP_V2_ROUTER_BASE.to_string()],
        };
        if routers.is_empty() {
            bail!("DEX_ROUTERS must contain at least one router address");
        }

        let strike = StrikeConfig {
            routers,
            token_in: get("TOKEN_IN").unwrap_or_else(|| WETH_BASE.to_string()),
            token_out: get("TOKEN_OUT").unwrap_or_else(|| USDC_BASE.to_string()),
            loan_amount_eth: get("LOAN_AMOUNT_ETH").unwrap_or_else(|| "100".to_string()),
            min_trigger_value_eth: get("MIN_TRIGGER_VALUE_ETH").unwrap_or_else(|| "0.1".to_string()),
            balance_floor_eth: get("BALANCE_FLOOR_ETH").unwrap_or_else(|| "0.001".to_string()),
            gas_limit: parse_or(get("GAS_LIMIT"), 850_000u64, "GAS_LIMIT")?,
            priority_fee_gwei: parse_or(get("PRIORITY_FEE_GWEI"), 2.5f64, "PRIORITY_FEE_GWEI")?,
            confirmation_poll_ms: parse_or(get("CONFIRMATION_POLL_MS"), 1_000u64, "CONFIRMATION_POLL_MS")?,
            confirmation_timeout_secs: parse_or(
                get("CONFIRMATION_TIMEOUT_SECS"),
                120u64,
                "CONFIRMATION_TIMEOUT_SECS",
            )?
            .max(1),
            max_in_flight: parse_or(get("MAX_IN_FLIGHT"), 32usize, "MAX_IN_FLIGHT")?.max(1),
            candidate_channel_capacity: parse_or(
                get("CANDIDATE_CHANNEL_CAPACITY"),
                1_024usize,
                "CANDIDATE_CHANNEL_CAPACITY",
            )?
            .max(1),
        };

        // mempool 订阅配置
        let stream = StreamConfig {
            ws_url: get("QUICKNODE_WSS")
                .or_else(|| get("WS_URL"))
                .unwrap_or_else(|| DEFAULT_WS_URL.to_string()),
            heartbeat_secs: parse_or(get("WS_HEARTBEAT_SECS"), 30u64, "WS_HEARTBEAT_SECS")?.max(1),
            reconnect_delay_secs: parse_or(get("WS_RECONNECT_DELAY_SECS"), 5u64, "WS_RECONNECT_DELAY_SECS")?,
            connect_timeout_secs: parse_or(get("WS_CONNECT_TIMEOUT_SECS"), 10u64, "WS_CONNECT_TIMEOUT_SECS")?.max(1),
        };

        // 看门狗配置
        let watchdog = WatchdogConfig {
            check_interval_secs: parse_or(get("WATCHDOG_INTERVAL_SECS"), 60u64, "WATCHDOG_INTERVAL_SECS")?.max(1),
            idle_ceiling_secs: parse_or(get("IDLE_CEILING_SECS"), 600u64, "IDLE_CEILING_SECS")?,
            mode: match get("WATCHDOG_MODE") {
                Some(mode) => mode.parse()?,
                None => WatchdogMode::default(),
            },
        };

        // API 配置
        let api = ApiConfig {
            host: get("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(get("PORT"), 8080u16, "PORT")?,
        };

        Ok(Self {
            chain,
            wallet,
            strike,
            stream,
            watchdog,
            api,
            boot_retry_delay_secs: parse_or(get("BOOT_RETRY_DELAY_SECS"), 5u64, "BOOT_RETRY_DELAY_SECS")?,
            rpc_stats_log_secs: parse_or(get("RPC_STATS_LOG_SECS"), 60u64, "RPC_STATS_LOG_SECS")?,
        })
    }
}

/// 解析 RPC 节点列表
///
/// 格式: `url|priority,url|priority`，省略优先级时按出现顺序递增
pub fn parse_endpoint_list(raw: &str, timeout_ms: u64) -> Result<Vec<RpcEndpointConfig>> {
    let mut endpoints = Vec::new();

    for (index, entry) in split_list(raw).into_iter().enumerate() {
        let (url, priority) = match entry.split_once('|') {
            Some((url, priority)) => {
                let priority = priority
                    .trim()
                    .parse::<u32>()
                    .with_context(|| format!("Invalid RPC priority in '{}'", entry))?;
                (url.trim().to_string(), priority)
            }
            None => (entry.clone(), index as u32 + 1),
        };

        if !url.starts_with("http://") && !url.starts_with("https://") {
            bail!("RPC endpoint must be an http(s) URL: {}", url);
        }

        endpoints.push(RpcEndpointConfig {
            url,
            priority,
            timeout_ms,
        });
    }

    if endpoints.is_empty() {
        bail!("RPC_POOL must contain at least one endpoint");
    }

    // 稳定排序，相同优先级保持配置顺序
    endpoints.sort_by_key(|e| e.priority);
    Ok(endpoints)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn parse_or<T>(value: Option<String>, default: T, key: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Invalid {}: {} ({})", key, raw, e)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.chain.chain_id, BASE_CHAIN_ID);
        assert_eq!(config.chain.rpc_endpoints.len(), 3);
        assert_eq!(config.chain.rpc_endpoints[0].url, DEFAULT_PRIMARY_RPC);
        assert_eq!(config.chain.rpc_endpoints[2].priority, 3);
        assert_eq!(config.chain.stall_timeout_ms, 2_500);
        assert_eq!(config.strike.routers.len(), 2);
        assert_eq!(config.strike.min_trigger_value_eth, "0.1");
        assert_eq!(config.strike.gas_limit, 850_000);
        assert_eq!(config.watchdog.idle_ceiling_secs, 600);
        assert_eq!(config.watchdog.mode, WatchdogMode::ExitProcess);
        assert_eq!(config.strike.confirmation_timeout_secs, 120);
        assert_eq!(config.stream.connect_timeout_secs, 10);
        assert_eq!(config.api.port, 8080);
        assert!(config.wallet.private_key.is_none());
    }

    #[test]
    fn test_primary_override_and_private_key_fallback() {
        let config = config_from(&[
            ("QUICKNODE_HTTP", "https://example.quiknode.pro/abc"),
            ("PRIVATE_KEY", "0xabc"),
            ("WATCHDOG_MODE", "restart_stream"),
            ("DEX_ROUTERS", " 0x01 , ,0x02 "),
        ])
        .unwrap();

        assert_eq!(config.chain.rpc_endpoints[0].url, "https://example.quiknode.pro/abc");
        assert_eq!(config.chain.rpc_endpoints[0].priority, 1);
        assert_eq!(config.wallet.private_key.as_deref(), Some("0xabc"));
        assert_eq!(config.watchdog.mode, WatchdogMode::RestartStream);
        assert_eq!(config.strike.routers, vec!["0x01".to_string(), "0x02".to_string()]);
    }

    #[test]
    fn test_parse_endpoint_list_sorts_by_priority() {
        let endpoints = parse_endpoint_list(
            "https://b.example|2, https://a.example|1, https://c.example|2",
            500,
        )
        .unwrap();

        let urls: Vec<&str> = endpoints.iter().map(|e| e.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.example", "https://b.example", "https://c.example"]);
        assert!(endpoints.iter().all(|e| e.timeout_ms == 500));
    }

    #[test]
    fn test_parse_endpoint_list_rejects_bad_input() {
        assert!(parse_endpoint_list("", 500).is_err());
        assert!(parse_endpoint_list("wss://a.example|1", 500).is_err());
        assert!(parse_endpoint_list("https://a.example|high", 500).is_err());
        assert!(config_from(&[("GAS_LIMIT", "lots")]).is_err());
        assert!(config_from(&[("WATCHDOG_MODE", "reboot")]).is_err());
    }
}
