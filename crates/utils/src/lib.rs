mod logger;
mod api_stats;
mod stats_provider;

pub use logger::LoggerManager;
pub use api_stats::{
    record_rpc_request, record_pending_hash, record_candidate,
    get_api_stats, log_api_stats, ApiStatsSnapshot, CounterSnapshot,
};
pub use stats_provider::{StatsHttp, StatsLogger};
