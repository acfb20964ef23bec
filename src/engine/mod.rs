/// ### English
/// Engine internal modules (fences, presentation surface, vsync, output binding, scheduling and
/// the producer-thread runtime).
///
/// ### 中文
/// 引擎内部模块（fence、呈现表面、vsync、输出绑定、调度以及生产者线程运行时）。
pub mod error;
pub mod fence;
pub mod flags;
pub mod gl;
pub mod output;
pub mod runtime;
pub mod scheduler;
pub mod surface;
pub mod vsync;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{FrameSyncError, FrameSyncResult};
pub use fence::{
    Fence, FenceBackend, FenceConfig, FenceError, FenceHandoff, FenceState, GpuCapabilities,
    GpuContext, NativeSync, RejectedTransfer, SyncBackendKind, SyncDriver, SyncStatus,
    TransferableFence, WaitOutcome, fence_channel,
};
pub use gl::{GlowArbSyncDriver, GlowGpuContext};
pub use output::{
    BindingError, OutputSurfaceBinding, OutputSurfaceClient, Reflector, SurfaceId,
    SurfaceRegistry,
};
pub use runtime::{FrameCycle, FrameLoop, FrameLoopClient, FramePipeline, FrameProducer};
pub use scheduler::{
    FailedDrawResetPolicy, FrameRequest, FrameScheduler, IgnoreReason, SchedulerError,
    SchedulerSettings, SchedulerState, SchedulerStats, TickOutcome,
};
pub use surface::{
    Buffer, BufferRole, DamageRect, DrawableHandle, NativeBufferHandle, PresentOutcome, PresentWait,
    PresentationSurface, SurfaceConfig, SurfaceError, SurfacePlatform,
};
pub use vsync::{
    ObserverId, SyntheticVSync, TimerPrecision, VSyncObserver, VSyncParameters, VSyncSource,
};
