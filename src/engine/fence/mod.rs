//! ### English
//! GPU completion fences.
//!
//! A [`FenceBackend`] is selected once per GPU context from the detected capabilities
//! (cross-vendor sync object, then platform EGL sync, then a vendor fence extension) and creates
//! [`Fence`]s for submitted command batches. Fences cross thread/process boundaries only as
//! plain-data [`TransferableFence`] values.
//!
//! ### 中文
//! GPU 完成信号 fence。
//!
//! [`FenceBackend`] 根据探测到的能力为每个 GPU 上下文选择一次（跨厂商 sync 对象 → 平台 EGL sync
//! → 厂商 fence 扩展），并为已提交的命令批次创建 [`Fence`]。fence 只能以纯数据的
//! [`TransferableFence`] 形式跨线程/进程传递。
mod backend;
mod caps;
mod driver;
mod gpu_fence;
mod transfer;

use std::fmt;
use std::time::Duration;

pub use backend::{FenceBackend, FenceConfig};
pub use caps::{GlVersion, GpuCapabilities, parse_gl_version};
pub use driver::{GpuContext, NativeSync, SyncDriver, SyncStatus};
pub use gpu_fence::Fence;
pub use transfer::{
    FenceHandoff, FenceReceiver, FenceSender, RejectedTransfer, TransferableFence, fence_channel,
};

/// ### English
/// Synchronization mechanism backing a fence (selected once per backend).
///
/// ### 中文
/// fence 使用的同步机制（每个 backend 只选择一次）。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SyncBackendKind {
    /// ### English
    /// Cross-vendor GL sync objects (`GL_ARB_sync`, core since GL 3.2 / GLES 3.0).
    ///
    /// ### 中文
    /// 跨厂商 GL sync 对象（`GL_ARB_sync`，GL 3.2 / GLES 3.0 起为核心特性）。
    ArbSync = 0,
    /// ### English
    /// Platform sync tied to the display binding (`EGL_KHR_fence_sync`).
    ///
    /// ### 中文
    /// 与显示绑定关联的平台同步原语（`EGL_KHR_fence_sync`）。
    EglSync = 1,
    /// ### English
    /// Vendor fence extension (`GL_NV_fence` / `GL_APPLE_fence`), last resort.
    ///
    /// ### 中文
    /// 厂商 fence 扩展（`GL_NV_fence` / `GL_APPLE_fence`），最后的兜底。
    VendorSync = 2,
}

impl SyncBackendKind {
    /// ### English
    /// Preference order used by backend selection.
    ///
    /// ### 中文
    /// backend 选择时使用的优先级顺序。
    pub const PREFERENCE: [SyncBackendKind; 3] = [
        SyncBackendKind::ArbSync,
        SyncBackendKind::EglSync,
        SyncBackendKind::VendorSync,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SyncBackendKind::ArbSync => "ARB_SYNC",
            SyncBackendKind::EglSync => "EGL_SYNC",
            SyncBackendKind::VendorSync => "VENDOR_SYNC",
        }
    }
}

impl fmt::Display for SyncBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ### English
/// Fence lifecycle state. Monotonic: `Pending -> {Signaled | Error}`, never reverts.
///
/// ### 中文
/// fence 生命周期状态。单调变化：`Pending -> {Signaled | Error}`，不会回退。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FenceState {
    Pending,
    Signaled,
    /// ### English
    /// The backend query failed; the fence is treated as complete.
    ///
    /// ### 中文
    /// backend 查询失败；该 fence 按“已完成”处理。
    Error,
}

/// ### English
/// Result of a client-side or server-side wait.
///
/// ### 中文
/// CPU 侧或 GPU 侧等待的结果。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    /// ### English
    /// The fence is signaled.
    ///
    /// ### 中文
    /// fence 已 signal。
    Signaled,
    /// ### English
    /// A GPU-side wait was queued; the CPU was not blocked.
    ///
    /// ### 中文
    /// 已插入 GPU 侧等待；CPU 未被阻塞。
    QueuedOnGpu,
    /// ### English
    /// The fence was not committed to the command stream yet; the wait was skipped.
    ///
    /// ### 中文
    /// fence 尚未提交到命令流；本次等待被跳过。
    Skipped,
    /// ### English
    /// The backend query failed; treated as complete to avoid a deadlock.
    ///
    /// ### 中文
    /// backend 查询失败；为避免死锁按“已完成”处理。
    QueryFailed,
}

/// ### English
/// Fence errors.
///
/// ### 中文
/// fence 相关错误。
#[derive(thiserror::Error, Debug)]
pub enum FenceError {
    /// ### English
    /// No synchronization backend is available; callers must use the flush + fixed wait fallback.
    ///
    /// ### 中文
    /// 没有可用的同步 backend；调用方必须使用 flush + 固定等待的兜底路径。
    #[error("no GPU synchronization backend is available")]
    Unsupported,

    #[error("failed to insert {kind} fence: {reason}")]
    InsertFailed { kind: SyncBackendKind, reason: String },

    /// ### English
    /// A client wait expired. Indicates a driver/hardware hang; the host must recreate the context.
    ///
    /// ### 中文
    /// CPU 等待超时。意味着驱动/硬件挂起；宿主必须重建上下文。
    #[error("{kind} fence wait timed out after {waited:?} (GPU hang)")]
    WaitTimeout {
        kind: SyncBackendKind,
        waited: Duration,
    },

    #[error("transferred fence uses {found} but this backend uses {expected}")]
    BackendMismatch {
        expected: SyncBackendKind,
        found: SyncBackendKind,
    },

    #[error("invalid native fence handle {0:#x}")]
    InvalidHandle(u64),
}

impl FenceError {
    /// ### English
    /// Driver-hang class errors are the only ones that must surface to the host.
    ///
    /// ### 中文
    /// 只有驱动挂起类错误需要上抛给宿主。
    pub fn is_fatal(&self) -> bool {
        matches!(self, FenceError::WaitTimeout { .. })
    }
}
