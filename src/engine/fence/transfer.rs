//! ### English
//! Plain-data fence hand-off between threads or processes.
//!
//! ### 中文
//! 线程/进程之间以纯数据形式传递 fence。

use std::time::Instant;

use crossbeam_channel as channel;

use super::{Fence, FenceBackend, FenceError, SyncBackendKind};

/// ### English
/// A fence converted to plain data by [`Fence::transfer`](super::Fence::transfer).
///
/// Owns the native sync object until reconstructed with [`Fence::from_transferable`] or
/// released with [`Self::release`]. Being plain data it has no drop glue, so dropping it
/// otherwise leaks the native object.
///
/// ### 中文
/// 由 [`Fence::transfer`](super::Fence::transfer) 转换得到的纯数据 fence。
///
/// 在通过 [`Fence::from_transferable`] 重建或通过 [`Self::release`] 释放之前，它持有原生
/// sync 对象。作为纯数据它没有 drop 逻辑，其它方式丢弃都会泄漏该原生对象。
#[derive(Debug, PartialEq, Eq)]
#[must_use = "dropping a transferable fence leaks the native sync object"]
pub struct TransferableFence {
    pub kind: SyncBackendKind,
    /// ### English
    /// Exported native handle (never `0`).
    ///
    /// ### 中文
    /// 导出的原生句柄（永不为 `0`）。
    pub raw: u64,
    pub created_at: Instant,
}

impl TransferableFence {
    /// ### English
    /// Deletes the native sync object through `backend` without waiting on it.
    ///
    /// ### 中文
    /// 通过 `backend` 删除原生 sync 对象，不等待它。
    pub fn release(self, backend: &FenceBackend) -> Result<(), RejectedTransfer> {
        Fence::from_transferable(backend, self).map(drop)
    }
}

/// ### English
/// A transfer the receiving backend could not reconstruct; still owns the native handle.
///
/// ### 中文
/// 接收侧 backend 无法重建的传递；仍持有原生句柄。
#[derive(thiserror::Error, Debug)]
#[error("{error}")]
#[must_use = "the rejected fence still owns its native sync object"]
pub struct RejectedTransfer {
    pub error: FenceError,
    pub fence: TransferableFence,
}

impl RejectedTransfer {
    pub(super) fn new(error: FenceError, fence: TransferableFence) -> Self {
        Self { error, fence }
    }

    pub fn into_fence(self) -> TransferableFence {
        self.fence
    }
}

/// ### English
/// One message on a fence channel: the fence guarding `frame_id`'s GPU work.
///
/// ### 中文
/// fence 通道上的一条消息：保护 `frame_id` 对应 GPU 工作的 fence。
#[derive(Debug)]
pub struct FenceHandoff {
    pub frame_id: u64,
    pub fence: TransferableFence,
}

pub type FenceSender = channel::Sender<FenceHandoff>;
pub type FenceReceiver = channel::Receiver<FenceHandoff>;

/// ### English
/// Creates an unbounded channel carrying fences from the producer to a consumer thread.
///
/// ### 中文
/// 创建一个无界通道，用于把 fence 从生产者传给消费者线程。
pub fn fence_channel() -> (FenceSender, FenceReceiver) {
    channel::unbounded()
}
