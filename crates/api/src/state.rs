use executor::EngineStatusSource;
use std::sync::Arc;

/// API 应用状态
#[derive(Clone)]
pub struct AppState {
    /// 引擎状态来源 (只读，withdraw 除外)
    pub engine: Arc<dyn EngineStatusSource>,
}

impl AppState {
    pub fn new(engine: Arc<dyn EngineStatusSource>) -> Self {
        Self { engine }
    }
}
