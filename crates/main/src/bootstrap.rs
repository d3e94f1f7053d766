//! 应用启动引导模块
//!
//! 封装应用初始化、服务启动和关闭逻辑

use anyhow::{bail, Context, Result};
use config_crate::{AppConfig, WatchdogMode};
use ethers::prelude::*;
use ethers::utils::{format_ether, parse_ether};
use models::EngineError;
use executor::{
    EngineStatusSource, EthersStrikeContract, GasStrategy, SequenceAllocator, StrikeConfig,
    StrikeExecutor, StrikeParams,
};
use services::{
    EndpointPool, EngineState, LivenessWatchdog, NodeClient, PendingTxStream, StreamSettings,
};
use std::sync::Arc;
use std::time::Duration;
use strategies::{OpportunityFilter, StrikeRunner};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use ::utils::{StatsHttp, StatsLogger};

type NodeProvider = Provider<StatsHttp>;
type SignerClient = SignerMiddleware<Provider<StatsHttp>, LocalWallet>;
type Engine = StrikeExecutor<NodeProvider, EthersStrikeContract<SignerClient>>;

/// 应用程序实例
///
/// 管理所有后台任务的生命周期
pub struct Application {
    config: AppConfig,
    executor: Arc<Engine>,
    stats_logger: StatsLogger,

    // 后台任务句柄
    stream_handle: JoinHandle<()>,
    runner_handle: JoinHandle<()>,
    watchdog_handle: JoinHandle<()>,
    liveness_handle: JoinHandle<()>,
}

impl Application {
    /// 初始化并启动应用
    pub async fn start() -> Result<Self> {
        // 加载配置
        info!("加载配置...");
        let config = AppConfig::load()?;
        Self::log_config(&config);

        // 初始化钱包，没有钱包无法运行
        let wallet = Self::init_wallet(&config)?;
        let sender = wallet.address();

        let contract_address: Address = config
            .wallet
            .arbitrage_contract_address
            .parse()
            .with_context(|| {
                format!("Invalid ARBITRAGE_CONTRACT_ADDRESS: {}", config.wallet.arbitrage_contract_address)
            })?;

        // RPC 节点池（带 RPC 统计）
        info!("初始化 RPC 节点池（带 RPC 统计）...");
        let pool = Arc::new(EndpointPool::connect(
            &config.chain.rpc_endpoints,
            Duration::from_millis(config.chain.stall_timeout_ms),
        )?);

        if pool.is_empty() {
            bail!("RPC_POOL is empty");
        }
        info!("RPC 节点池: {} 个节点", pool.len());

        // 合约调用走优先级最高的节点
        let primary = pool.primary().context("RPC_POOL is empty")?;
        let signer = SignerMiddleware::new((*primary.client).clone(), wallet);
        let contract = Arc::new(EthersStrikeContract::new(
            contract_address,
            Arc::new(signer),
            sender,
            config.chain.chain_id,
        ));
        info!("套利合约: {:?} (经由 {})", contract.address(), primary.url);

        let allocator = Arc::new(SequenceAllocator::new(pool.clone(), sender));

        // 启动同步：失败则一直重试
        Self::boot_sync(&pool, &allocator, config.boot_retry_delay_secs).await;

        let state = Arc::new(EngineState::new());
        let executor = Arc::new(StrikeExecutor::new(
            pool.clone(),
            contract,
            allocator,
            state.clone(),
            Self::strike_config(&config, sender)?,
        ));

        let stats_logger = StatsLogger::start(config.rpc_stats_log_secs);

        // mempool 订阅 -> 有界通道 -> Strike 调度
        let (hash_tx, hash_rx) = mpsc::channel(config.strike.candidate_channel_capacity);
        let restart = Arc::new(Notify::new());

        let stream = PendingTxStream::new(
            StreamSettings {
                ws_url: config.stream.ws_url.clone(),
                heartbeat_interval: Duration::from_secs(config.stream.heartbeat_secs),
                reconnect_delay: Duration::from_secs(config.stream.reconnect_delay_secs),
                connect_timeout: Duration::from_secs(config.stream.connect_timeout_secs),
            },
            state.clone(),
            restart.clone(),
        );
        let stream_handle = tokio::spawn(async move { stream.run(hash_tx).await });

        let filter = OpportunityFilter::from_config(
            &config.strike.routers,
            &config.strike.min_trigger_value_eth,
        )?;
        let runner = Arc::new(StrikeRunner::new(
            pool,
            filter,
            executor.clone(),
            config.strike.max_in_flight,
        ));
        let runner_handle = tokio::spawn(runner.run(hash_rx));

        // 看门狗
        let (signal_tx, signal_rx) = mpsc::channel(4);
        let watchdog = LivenessWatchdog::new(
            state,
            Duration::from_secs(config.watchdog.check_interval_secs),
            Duration::from_secs(config.watchdog.idle_ceiling_secs),
        );
        let watchdog_handle = tokio::spawn(watchdog.run(signal_tx));
        let liveness_handle = tokio::spawn(Self::handle_liveness_signals(
            signal_rx,
            config.watchdog.mode,
            restart,
        ));

        Ok(Self {
            config,
            executor,
            stats_logger,
            stream_handle,
            runner_handle,
            watchdog_handle,
            liveness_handle,
        })
    }

    /// 运行 API 服务器（阻塞）
    pub async fn run_server(&self) -> Result<()> {
        let engine: Arc<dyn EngineStatusSource> = self.executor.clone();
        let app = api::create_server(api::AppState::new(engine));

        self.log_startup_complete();

        api::start_server(app, &self.config.api.host, self.config.api.port).await
    }

    /// 停止所有服务
    pub async fn shutdown(mut self) -> Result<()> {
        info!("正在停止服务...");

        self.stats_logger.stop();

        // 先停订阅，Strike 调度在通道关闭后自行退出
        self.stream_handle.abort();
        self.watchdog_handle.abort();
        self.liveness_handle.abort();

        if tokio::time::timeout(Duration::from_secs(10), &mut self.runner_handle)
            .await
            .is_err()
        {
            warn!("在途 strike 未在 10 秒内结束，强制停止");
            self.runner_handle.abort();
        }

        let state = self.executor.state();
        info!(
            "系统已停止 | 运行 {}s | 候选: {} | Wins: {}",
            state.uptime().as_secs(),
            state.candidates_seen(),
            state.successful_strikes()
        );
        Ok(())
    }

    // ========== 私有辅助方法 ==========

    fn log_config(config: &AppConfig) {
        info!("配置加载成功");
        info!("========================================");
        info!("Chain ID: {}", config.chain.chain_id);
        for endpoint in &config.chain.rpc_endpoints {
            info!("  RPC [p{}]: {}", endpoint.priority, endpoint.url);
        }
        info!("  WS: {}", config.stream.ws_url);
        info!("========================================");
        info!("监控 Router: {:?}", config.strike.routers);
        info!("触发金额: > {} ETH", config.strike.min_trigger_value_eth);
        info!("借款金额: {} ETH", config.strike.loan_amount_eth);
        info!(
            "Gas: limit {} | 优先费 {} Gwei",
            config.strike.gas_limit, config.strike.priority_fee_gwei
        );
        info!(
            "看门狗: 每 {}s 检查，空闲上限 {}s，模式 {:?}",
            config.watchdog.check_interval_secs,
            config.watchdog.idle_ceiling_secs,
            config.watchdog.mode
        );
    }

    fn init_wallet(config: &AppConfig) -> Result<LocalWallet> {
        let Some(ref private_key) = config.wallet.private_key else {
            bail!("TREASURY_PRIVATE_KEY is not set");
        };

        let wallet = private_key
            .parse::<LocalWallet>()
            .context("Failed to parse TREASURY_PRIVATE_KEY")?
            .with_chain_id(config.chain.chain_id);

        info!("✅ 钱包已加载: {:?}", wallet.address());
        Ok(wallet)
    }

    fn strike_config(config: &AppConfig, sender: Address) -> Result<StrikeConfig> {
        let strike = &config.strike;

        Ok(StrikeConfig {
            sender,
            params: StrikeParams {
                token_in: strike
                    .token_in
                    .parse()
                    .with_context(|| format!("Invalid TOKEN_IN: {}", strike.token_in))?,
                token_out: strike
                    .token_out
                    .parse()
                    .with_context(|| format!("Invalid TOKEN_OUT: {}", strike.token_out))?,
                loan_amount: parse_ether(&strike.loan_amount_eth)
                    .with_context(|| format!("Invalid LOAN_AMOUNT_ETH: {}", strike.loan_amount_eth))?,
            },
            gas: GasStrategy {
                gas_limit: strike.gas_limit,
                priority_fee_gwei: strike.priority_fee_gwei,
            },
            balance_floor: parse_ether(&strike.balance_floor_eth)
                .with_context(|| format!("Invalid BALANCE_FLOOR_ETH: {}", strike.balance_floor_eth))?,
            confirmation_poll: Duration::from_millis(strike.confirmation_poll_ms),
            confirmation_timeout: Duration::from_secs(strike.confirmation_timeout_secs),
        })
    }

    /// 同步 nonce 并读取钱包余额，节点不可用时按固定间隔重试
    async fn boot_sync<N: NodeClient>(
        pool: &EndpointPool<N>,
        allocator: &SequenceAllocator<N>,
        retry_delay_secs: u64,
    ) {
        loop {
            match allocator.resync().await {
                Ok(nonce) => match pool.get_balance(allocator.address()).await {
                    Ok(balance) => {
                        info!(
                            "✅ 启动同步完成 | nonce: {} | 余额: {} ETH",
                            nonce,
                            format_ether(balance)
                        );
                        return;
                    }
                    Err(e) => warn!("读取钱包余额失败: {}", e),
                },
                Err(e) => warn!("启动同步 nonce 失败: {}", e),
            }

            warn!("{} 秒后重试启动同步...", retry_delay_secs);
            tokio::time::sleep(Duration::from_secs(retry_delay_secs)).await;
        }
    }

    /// 处理看门狗信号
    async fn handle_liveness_signals(
        mut signal_rx: mpsc::Receiver<EngineError>,
        mode: WatchdogMode,
        restart: Arc<Notify>,
    ) {
        while let Some(signal) = signal_rx.recv().await {
            match mode {
                WatchdogMode::ExitProcess => {
                    error!(target: "watchdog", "💀 {}，退出进程等待外部重启", signal);
                    std::process::exit(1);
                }
                WatchdogMode::RestartStream => {
                    warn!(target: "watchdog", "🔄 {}，重建 mempool 连接", signal);
                    restart.notify_waiters();
                }
            }
        }
    }

    fn log_startup_complete(&self) {
        info!("========================================");
        info!("  系统启动完成");
        info!(
            "  API 地址: http://{}:{}",
            self.config.api.host, self.config.api.port
        );
        info!("  mempool 订阅: {}", self.config.stream.ws_url);
        info!("  Strike 并发上限: {}", self.config.strike.max_in_flight);
        info!("========================================");
    }
}

/// 设置 panic hook
pub fn setup_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        error!("========================================");
        error!("!!! 系统发生 PANIC !!!");
        error!("========================================");
        error!("Panic 信息: {:?}", panic_info);
        if let Some(location) = panic_info.location() {
            error!(
                "发生位置: {}:{}:{}",
                location.file(),
                location.line(),
                location.column()
            );
        }
        if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            error!("Panic 消息: {}", s);
        }
        error!("========================================");
    }));
}
