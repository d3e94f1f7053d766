use models::{STATUS_HUNTING, STATUS_RECONNECTING};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// 引擎共享状态
///
/// 由执行器、mempool 订阅和看门狗写入，`/status` 只读
#[derive(Debug)]
pub struct EngineState {
    /// 成功的 strike 次数
    successful_strikes: AtomicU64,
    /// 通过过滤器的候选交易数
    candidates_seen: AtomicU64,
    /// 最近一次有效活动
    last_activity: Mutex<Instant>,
    /// mempool 订阅是否在线
    stream_connected: AtomicBool,
    started_at: Instant,
}

impl EngineState {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            successful_strikes: AtomicU64::new(0),
            candidates_seen: AtomicU64::new(0),
            last_activity: Mutex::new(now),
            stream_connected: AtomicBool::new(false),
            started_at: now,
        }
    }

    /// 重置空闲计时
    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    pub fn record_success(&self) -> u64 {
        self.successful_strikes.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn successful_strikes(&self) -> u64 {
        self.successful_strikes.load(Ordering::Relaxed)
    }

    pub fn record_candidate(&self) -> u64 {
        self.candidates_seen.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn candidates_seen(&self) -> u64 {
        self.candidates_seen.load(Ordering::Relaxed)
    }

    pub fn set_stream_connected(&self, connected: bool) {
        self.stream_connected.store(connected, Ordering::Relaxed);
    }

    pub fn stream_connected(&self) -> bool {
        self.stream_connected.load(Ordering::Relaxed)
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// `/status` 的状态标签
    pub fn status_label(&self) -> &'static str {
        if self.stream_connected() {
            STATUS_HUNTING
        } else {
            STATUS_RECONNECTING
        }
    }
}

impl Default for EngineState {
    fn default() -> Self {
        Self::new()
    }
}
