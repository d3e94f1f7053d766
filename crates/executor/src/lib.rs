//! Strike 执行器模块
//!
//! 负责调用链上套利合约，串行分配 nonce
//!
//! ## 模块结构
//!
//! - `executor`: 模拟 -> 提交 -> 确认 的执行流程
//! - `nonce`: 进程内唯一的 nonce 分配器
//! - `contract`: 合约调用接口及基于 ethers 的实现
//! - `flash_arbitrage`: 套利合约 ABI 绑定
//! - `status`: `/status` 和 `/withdraw` 的数据来源

mod flash_arbitrage;
mod contract;
mod executor;
mod nonce;
mod status;
mod types;

pub use flash_arbitrage::FlashArbitrageContract;
pub use contract::{classify_submit_error, EthersStrikeContract, StrikeContract};
pub use executor::StrikeExecutor;
pub use nonce::{CommitSlot, SequenceAllocator};
pub use status::EngineStatusSource;
pub use types::{GasStrategy, StrikeConfig, StrikeParams};
