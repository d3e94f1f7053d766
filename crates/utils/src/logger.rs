use std::fs;
use time::format_description::well_known::Rfc3339;
use time::macros::offset;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::filter::{FilterFn, LevelFilter};
use tracing_subscriber::fmt::{self, time::OffsetTime};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;
type Timer = OffsetTime<Rfc3339>;

/// 单独落盘的日志文件
struct LogRoute {
    file: &'static str,
    targets: &'static [&'static str],
    level: LevelFilter,
}

/// 按 target 分流的日志文件，命中的 target 不再进入 app.log
const LOG_ROUTES: [LogRoute; 4] = [
    // 定时输出的 RPC 请求统计
    LogRoute {
        file: "rpc_stats.log",
        targets: &["rpc_stats"],
        level: LevelFilter::TRACE,
    },
    // 候选交易与 strike 执行，含 trace 级别的模拟拒绝
    LogRoute {
        file: "strike.log",
        targets: &["strike", "strike_runner"],
        level: LevelFilter::TRACE,
    },
    LogRoute {
        file: "stream.log",
        targets: &["pending_stream", "watchdog"],
        level: LevelFilter::DEBUG,
    },
    LogRoute {
        file: "api.log",
        targets: &["api::handlers"],
        level: LevelFilter::TRACE,
    },
];

fn is_routed(target: &str) -> bool {
    LOG_ROUTES
        .iter()
        .any(|route| route.targets.iter().any(|t| *t == target))
}

/// 日志管理器 - 基于target分类的日志系统
///
/// 持有各文件写入线程的 guard，drop 时刷新缓冲
pub struct LoggerManager {
    _guards: Vec<WorkerGuard>,
}

impl LoggerManager {
    /// 初始化日志系统，日志写入 `logs/`
    ///
    /// - 控制台: INFO
    /// - app.log: 未被分流的通用日志
    /// - rpc_stats.log / strike.log / stream.log / api.log: 按 target 分流
    pub fn init() -> Self {
        Self::init_in("logs")
    }

    pub fn init_in(dir: &str) -> Self {
        let mut guards = Vec::with_capacity(LOG_ROUTES.len() + 1);

        if let Err(e) = fs::create_dir_all(dir) {
            eprintln!("创建日志目录 {} 失败: {}", dir, e);
        }

        // 东八区时间
        let timer: Timer = OffsetTime::new(offset!(+8), Rfc3339);

        let mut layers: Vec<BoxedLayer> = Vec::with_capacity(LOG_ROUTES.len() + 2);

        layers.push(
            fmt::layer()
                .compact()
                .with_target(true)
                .with_timer(timer.clone())
                .with_filter(LevelFilter::INFO)
                .boxed(),
        );

        let (app_writer, app_guard) = non_blocking(rolling::daily(dir, "app.log"));
        guards.push(app_guard);
        layers.push(
            fmt::layer()
                .compact()
                .with_writer(app_writer)
                .with_ansi(false)
                .with_target(true)
                .with_timer(timer.clone())
                .with_filter(LevelFilter::INFO)
                .with_filter(FilterFn::new(|metadata| !is_routed(metadata.target())))
                .boxed(),
        );

        for route in &LOG_ROUTES {
            layers.push(route_layer(dir, route, timer.clone(), &mut guards));
        }

        tracing_subscriber::registry().with(layers).init();

        Self { _guards: guards }
    }
}

fn route_layer(dir: &str, route: &LogRoute, timer: Timer, guards: &mut Vec<WorkerGuard>) -> BoxedLayer {
    let (writer, guard) = non_blocking(rolling::daily(dir, route.file));
    guards.push(guard);

    let targets = route.targets;
    fmt::layer()
        .compact()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_timer(timer)
        .with_filter(route.level)
        .with_filter(FilterFn::new(move |metadata| {
            targets.iter().any(|t| *t == metadata.target())
        }))
        .boxed()
}
