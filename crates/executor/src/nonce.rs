use ethers::types::Address;
use models::EngineError;
use services::{EndpointPool, NodeClient};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

/// 进程内唯一的 nonce 分配器
///
/// 计数器为 None 表示未知 (启动同步失败或重新同步失败)，下次分配时从节点拉取
pub struct SequenceAllocator<N> {
    pool: Arc<EndpointPool<N>>,
    address: Address,
    counter: Mutex<Option<u64>>,
}

impl<N: NodeClient> SequenceAllocator<N> {
    pub fn new(pool: Arc<EndpointPool<N>>, address: Address) -> Self {
        Self {
            pool,
            address,
            counter: Mutex::new(None),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// 进入临界区，持有期间其他分配和提交都会等待
    pub async fn begin(&self) -> CommitSlot<'_, N> {
        CommitSlot {
            guard: self.counter.lock().await,
            pool: &self.pool,
            address: self.address,
        }
    }

    pub async fn next(&self) -> Result<u64, EngineError> {
        self.begin().await.next().await
    }

    /// 从节点的 pending 视图重新同步
    pub async fn resync(&self) -> Result<u64, EngineError> {
        self.begin().await.resync().await
    }

    /// 已分配的 `nonce` 确认失败后调用
    ///
    /// 节点 pending 视图仍停在 `nonce` 或更早时，计数器回退到 pending 值，
    /// 下次分配会补上这个空洞。nonce 已被网络计入时返回 None
    pub async fn reclaim(&self, nonce: u64) -> Result<Option<u64>, EngineError> {
        let mut guard = self.counter.lock().await;
        match self.pool.get_pending_nonce(self.address).await {
            Ok(pending) if pending <= nonce => {
                *guard = Some(pending);
                Ok(Some(pending))
            }
            Ok(_) => Ok(None),
            Err(e) => {
                *guard = None;
                Err(e)
            }
        }
    }

    /// 下一个将被分配的 nonce
    pub async fn current(&self) -> Option<u64> {
        *self.counter.lock().await
    }
}

/// 持有分配器锁的提交窗口
pub struct CommitSlot<'a, N> {
    guard: MutexGuard<'a, Option<u64>>,
    pool: &'a EndpointPool<N>,
    address: Address,
}

impl<'a, N: NodeClient> CommitSlot<'a, N> {
    pub async fn next(&mut self) -> Result<u64, EngineError> {
        let nonce = match *self.guard {
            Some(nonce) => nonce,
            None => self.pool.get_pending_nonce(self.address).await?,
        };
        *self.guard = Some(nonce + 1);
        Ok(nonce)
    }

    pub async fn resync(&mut self) -> Result<u64, EngineError> {
        match self.pool.get_pending_nonce(self.address).await {
            Ok(nonce) => {
                *self.guard = Some(nonce);
                info!(target: "strike", "🔄 Nonce 已同步: {}", nonce);
                Ok(nonce)
            }
            Err(e) => {
                *self.guard = None;
                warn!(target: "strike", "Nonce 同步失败，下次分配时重试: {}", e);
                Err(e)
            }
        }
    }
}
