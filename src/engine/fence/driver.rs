//! ### English
//! Driver seams: the GPU context capability query and per-backend sync drivers.
//!
//! ### 中文
//! 驱动接缝：GPU 上下文能力查询与各 backend 的同步驱动。

use std::sync::Arc;
use std::time::Duration;

use super::{FenceError, GpuCapabilities, SyncBackendKind};

/// ### English
/// Native sync handle (`GLsync` / `EGLSync` / vendor fence name cast to `u64`). `0` is never valid.
///
/// ### 中文
/// 原生同步句柄（`GLsync` / `EGLSync` / 厂商 fence 名转为 `u64`）。`0` 永远无效。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NativeSync(pub u64);

/// ### English
/// Status reported by a driver query or wait.
///
/// ### 中文
/// 驱动查询或等待返回的状态。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncStatus {
    Signaled,
    Unsignaled,
    TimeoutExpired,
    Failed,
}

/// ### English
/// One synchronization mechanism of a GPU context.
///
/// All methods are called on the thread where the owning context is current.
///
/// ### 中文
/// GPU 上下文的一种同步机制。
///
/// 所有方法都在所属上下文为 current 的线程上调用。
pub trait SyncDriver: Send + Sync {
    fn kind(&self) -> SyncBackendKind;

    /// ### English
    /// Inserts a fence into the current command stream.
    ///
    /// ### 中文
    /// 向当前命令流插入一个 fence。
    fn insert_fence(&self) -> Result<NativeSync, FenceError>;

    /// ### English
    /// Non-blocking status query.
    ///
    /// ### 中文
    /// 非阻塞状态查询。
    fn poll(&self, sync: NativeSync) -> SyncStatus;

    /// ### English
    /// Blocks until signaled, failed or `timeout` (`None` = forever) expires.
    ///
    /// ### 中文
    /// 阻塞直到 signal、失败或 `timeout`（`None` 表示永久）到期。
    fn client_wait(&self, sync: NativeSync, timeout: Option<Duration>) -> SyncStatus;

    fn supports_server_wait(&self) -> bool {
        true
    }

    /// ### English
    /// Makes subsequent GPU work wait on the fence without blocking the CPU.
    ///
    /// ### 中文
    /// 让后续 GPU 工作等待该 fence，而不阻塞 CPU。
    fn server_wait(&self, sync: NativeSync);

    fn delete(&self, sync: NativeSync);

    /// ### English
    /// Converts a handle into a value that can cross a thread/process boundary.
    ///
    /// ### 中文
    /// 将句柄转换为可跨线程/进程传递的值。
    fn export(&self, sync: NativeSync) -> Result<u64, FenceError> {
        Ok(sync.0)
    }

    /// ### English
    /// Reconstructs a handle from an exported value on the receiving side.
    ///
    /// ### 中文
    /// 在接收侧由导出的值重建句柄。
    fn import(&self, raw: u64) -> Result<NativeSync, FenceError> {
        if raw == 0 {
            return Err(FenceError::InvalidHandle(raw));
        }
        Ok(NativeSync(raw))
    }
}

/// ### English
/// GPU context collaborator: capability query, sync drivers and pipeline flush control.
///
/// ### 中文
/// GPU 上下文协作者：能力查询、同步驱动以及管线 flush 控制。
pub trait GpuContext: Send + Sync {
    fn capabilities(&self) -> GpuCapabilities;

    /// ### English
    /// Returns the driver for `kind`, if this context can provide one.
    ///
    /// ### 中文
    /// 若该上下文可提供，则返回 `kind` 对应的驱动。
    fn sync_driver(&self, kind: SyncBackendKind) -> Option<Arc<dyn SyncDriver>>;

    /// ### English
    /// Submits buffered commands (`glFlush`).
    ///
    /// ### 中文
    /// 提交已缓冲的命令（`glFlush`）。
    fn flush(&self);

    /// ### English
    /// Full pipeline flush (`glFinish`), used when no fence backend exists.
    ///
    /// ### 中文
    /// 完整管线 flush（`glFinish`），在没有 fence backend 时使用。
    fn finish(&self);
}
