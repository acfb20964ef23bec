//! ### English
//! Crate-level error type aggregating the per-component error taxonomies.
//!
//! Timing and state errors are resolved locally by the scheduler/surface; only driver-hang class
//! fence errors are expected to reach the hosting application.
//!
//! ### 中文
//! crate 级错误类型，聚合各组件的错误分类。
//!
//! 时序与状态错误由调度器/表面在本地处理；只有驱动挂起类的 fence 错误才应上抛给宿主应用。

use crate::engine::fence::FenceError;
use crate::engine::output::BindingError;
use crate::engine::scheduler::SchedulerError;
use crate::engine::surface::SurfaceError;

/// ### English
/// Convenience result type used across the engine.
///
/// ### 中文
/// 引擎内通用的 Result 别名。
pub type FrameSyncResult<T> = Result<T, FrameSyncError>;

/// ### English
/// Top-level error returned by operations that span several components.
///
/// ### 中文
/// 跨多个组件的操作所返回的顶层错误。
#[derive(thiserror::Error, Debug)]
pub enum FrameSyncError {
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Fence(#[from] FenceError),

    #[error(transparent)]
    Surface(#[from] SurfaceError),

    #[error(transparent)]
    Binding(#[from] BindingError),

    /// ### English
    /// Failed to spawn a runtime thread.
    ///
    /// ### 中文
    /// 创建运行时线程失败。
    #[error("failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl FrameSyncError {
    /// ### English
    /// Returns whether the hosting application must recreate the GPU context.
    ///
    /// ### 中文
    /// 返回宿主应用是否必须重建 GPU 上下文。
    pub fn is_fatal(&self) -> bool {
        match self {
            FrameSyncError::Fence(err) => err.is_fatal(),
            FrameSyncError::Surface(SurfaceError::Fence(err)) => err.is_fatal(),
            _ => false,
        }
    }
}
