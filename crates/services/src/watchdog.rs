use models::EngineError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant};
use tracing::{info, warn};

use crate::EngineState;

pub use config_crate::WatchdogMode;

/// 存活看门狗
///
/// 周期检查空闲时间，超过上限时发出 `LivenessTimeout`，由启动层决定退出进程还是重建订阅
pub struct LivenessWatchdog {
    state: Arc<EngineState>,
    check_interval: Duration,
    idle_ceiling: Duration,
}

impl LivenessWatchdog {
    pub fn new(state: Arc<EngineState>, check_interval: Duration, idle_ceiling: Duration) -> Self {
        Self {
            state,
            check_interval,
            idle_ceiling,
        }
    }

    pub async fn run(self, signal_tx: mpsc::Sender<EngineError>) {
        let mut ticker = interval_at(Instant::now() + self.check_interval, self.check_interval);

        loop {
            ticker.tick().await;

            let idle = self.state.idle_for();
            info!(
                target: "watchdog",
                "[SCAN] Active. Idle: {}s | Wins: {}",
                idle.as_secs(),
                self.state.successful_strikes()
            );

            if idle > self.idle_ceiling {
                warn!(
                    target: "watchdog",
                    "⚠️ 空闲 {}s 超过上限 {}s，触发重启",
                    idle.as_secs(),
                    self.idle_ceiling.as_secs()
                );
                self.state.touch();

                let signal = EngineError::LivenessTimeout {
                    idle_secs: idle.as_secs(),
                };
                if signal_tx.send(signal).await.is_err() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn_watchdog(state: Arc<EngineState>) -> mpsc::Receiver<EngineError> {
        let (tx, rx) = mpsc::channel(4);
        let watchdog = LivenessWatchdog::new(state, Duration::from_secs(60), Duration::from_secs(600));
        tokio::spawn(watchdog.run(tx));
        rx
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_between_ceiling_and_one_period_later() {
        let state = Arc::new(EngineState::new());
        let started = Instant::now();
        let mut rx = spawn_watchdog(state.clone());

        let signal = rx.recv().await.unwrap();
        let elapsed = started.elapsed();

        assert!(matches!(signal, EngineError::LivenessTimeout { idle_secs } if idle_secs > 600));
        assert!(elapsed > Duration::from_secs(600));
        assert!(elapsed <= Duration::from_secs(660));
        assert_eq!(state.idle_for(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_keeps_watchdog_quiet() {
        let state = Arc::new(EngineState::new());
        let mut rx = spawn_watchdog(state.clone());

        let toucher = {
            let state = state.clone();
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(Duration::from_secs(300)).await;
                    state.touch();
                }
            })
        };

        let quiet = tokio::time::timeout(Duration::from_secs(3_000), rx.recv()).await;
        assert!(quiet.is_err());

        toucher.abort();
        let signal = rx.recv().await.unwrap();
        assert!(matches!(signal, EngineError::LivenessTimeout { .. }));
    }
}
