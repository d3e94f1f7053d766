mod bootstrap;

use anyhow::Result;
use tracing::{error, info};
use utils::LoggerManager;

use crate::bootstrap::{setup_panic_hook, Application};

#[tokio::main]
async fn main() -> Result<()> {
    let _logger = LoggerManager::init();
    setup_panic_hook();

    info!("========================================");
    info!("  Mempool Strike Engine v{}", env!("CARGO_PKG_VERSION"));
    info!("========================================");

    // 启动同步会一直重试，返回错误只可能是配置或钱包问题
    let app = Application::start().await?;

    // 阻塞到 Ctrl-C
    let served = app.run_server().await;
    if let Err(ref e) = served {
        error!("API 服务器异常退出: {:#}", e);
    }

    app.shutdown().await?;
    served
}
