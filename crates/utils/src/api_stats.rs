//! API 请求统计模块
//!
//! 统计 RPC 请求、mempool 待处理交易和命中的候选交易

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::info;

/// 最长统计窗口，更早的事件只计入总数
const MAX_WINDOW: Duration = Duration::from_secs(3600);

/// 滑动窗口计数器
struct SlidingCounter {
    events: RwLock<VecDeque<Instant>>,
    total: AtomicU64,
}

impl SlidingCounter {
    fn new() -> Self {
        Self {
            events: RwLock::new(VecDeque::with_capacity(4096)),
            total: AtomicU64::new(0),
        }
    }

    fn record(&self) {
        let now = Instant::now();
        self.total.fetch_add(1, Ordering::Relaxed);

        let mut events = self.events.write();
        events.push_back(now);
        if let Some(horizon) = now.checked_sub(MAX_WINDOW) {
            while events.front().map_or(false, |ts| *ts < horizon) {
                events.pop_front();
            }
        }
    }

    /// `window` 内的事件数，进程运行时间不足一个窗口时返回全部
    fn count_within(&self, window: Duration) -> u64 {
        let events = self.events.read();
        match Instant::now().checked_sub(window) {
            Some(horizon) => events.iter().rev().take_while(|ts| **ts >= horizon).count() as u64,
            None => events.len() as u64,
        }
    }

    fn snapshot(&self, uptime: u64) -> CounterSnapshot {
        let total = self.total.load(Ordering::Relaxed);
        CounterSnapshot {
            last_1s: self.count_within(Duration::from_secs(1)),
            last_1m: self.count_within(Duration::from_secs(60)),
            last_1h: self.count_within(MAX_WINDOW),
            total,
            avg_per_sec: if uptime > 0 { total as f64 / uptime as f64 } else { 0.0 },
        }
    }
}

/// API 统计器
pub struct ApiStats {
    /// 启动时间
    start_time: Instant,
    /// RPC 请求统计
    rpc: SlidingCounter,
    /// mempool 推送的交易哈希
    pending_hashes: SlidingCounter,
    /// 通过过滤器的候选交易
    candidates: SlidingCounter,
}

impl ApiStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            rpc: SlidingCounter::new(),
            pending_hashes: SlidingCounter::new(),
            candidates: SlidingCounter::new(),
        }
    }

    /// 记录 RPC 请求
    pub fn record_rpc(&self) {
        self.rpc.record();
    }

    /// 记录 mempool 交易哈希
    pub fn record_pending_hash(&self) {
        self.pending_hashes.record();
    }

    /// 记录候选交易
    pub fn record_candidate(&self) {
        self.candidates.record();
    }

    /// 获取统计快照
    pub fn get_stats(&self) -> ApiStatsSnapshot {
        let uptime = self.start_time.elapsed().as_secs();

        ApiStatsSnapshot {
            uptime_seconds: uptime,
            rpc: self.rpc.snapshot(uptime),
            pending_hashes: self.pending_hashes.snapshot(uptime),
            candidates: self.candidates.snapshot(uptime),
        }
    }

    /// 输出统计日志
    pub fn log_stats(&self) {
        let s = self.get_stats();

        info!(
            target: "rpc_stats",
            uptime_secs = s.uptime_seconds,
            rpc_1m = s.rpc.last_1m,
            rpc_total = s.rpc.total,
            rpc_avg = format!("{:.2}", s.rpc.avg_per_sec),
            pending_1m = s.pending_hashes.last_1m,
            pending_total = s.pending_hashes.total,
            candidates_1h = s.candidates.last_1h,
            candidates_total = s.candidates.total,
            "API统计"
        );
    }
}

impl Default for ApiStats {
    fn default() -> Self {
        Self::new()
    }
}

/// 单项计数器快照
#[derive(Debug, Clone)]
pub struct CounterSnapshot {
    pub last_1s: u64,
    pub last_1m: u64,
    pub last_1h: u64,
    pub total: u64,
    pub avg_per_sec: f64,
}

/// API 统计快照
#[derive(Debug, Clone)]
pub struct ApiStatsSnapshot {
    pub uptime_seconds: u64,
    pub rpc: CounterSnapshot,
    pub pending_hashes: CounterSnapshot,
    pub candidates: CounterSnapshot,
}

impl std::fmt::Display for ApiStatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "运行{}s | RPC: {}次(avg {:.2}/s) | Mempool: {}笔 | 候选: {}笔",
            self.uptime_seconds,
            self.rpc.total,
            self.rpc.avg_per_sec,
            self.pending_hashes.total,
            self.candidates.total,
        )
    }
}

/// 全局 API 统计实例
pub static API_STATS: Lazy<ApiStats> = Lazy::new(ApiStats::new);

/// 记录 RPC 请求
pub fn record_rpc_request() {
    API_STATS.record_rpc();
}

/// 记录 mempool 交易哈希
pub fn record_pending_hash() {
    API_STATS.record_pending_hash();
}

/// 记录候选交易
pub fn record_candidate() {
    API_STATS.record_candidate();
}

/// 获取统计快照
pub fn get_api_stats() -> ApiStatsSnapshot {
    API_STATS.get_stats()
}

/// 输出统计日志
pub fn log_api_stats() {
    API_STATS.log_stats();
}
