//! ### English
//! Bitflags controlling scheduler cadence.
//!
//! These are passed through the C ABI as a `u32` bitmask and mapped onto
//! [`SchedulerSettings`](crate::engine::scheduler::SchedulerSettings).
//!
//! ### 中文
//! 控制调度节奏的位标志（bitflags）。
//!
//! 通过 C ABI 以 `u32` 位掩码传入，并映射到
//! [`SchedulerSettings`](crate::engine::scheduler::SchedulerSettings)。

/// ### English
/// Frames begin on external vsync ticks (BeginFrame scheduling).
///
/// When unset, the embedder is expected to drive ticks from a synthetic timer and the deadline
/// ignores the draw-cost estimate.
///
/// ### 中文
/// 帧由外部 vsync tick 驱动开始（BeginFrame 调度）。
///
/// 未设置时，宿主应使用合成计时器驱动 tick，deadline 不再扣除绘制耗时估计。
pub const XIAN_FRAME_SYNC_FLAG_BEGIN_FRAME_SCHEDULING: u32 = 1 << 0;

/// ### English
/// Backpressure: ignore ticks while the previous frame has not been presented.
///
/// ### 中文
/// 背压：上一帧尚未呈现完成时忽略新的 tick。
pub const XIAN_FRAME_SYNC_FLAG_THROTTLE_FRAME_PRODUCTION: u32 = 1 << 1;

/// ### English
/// Battery saving: synthetic vsync timers drop the high-resolution spin tail.
///
/// ### 中文
/// 省电模式：合成 vsync 计时器不再使用高精度自旋尾段。
pub const XIAN_FRAME_SYNC_FLAG_BATTERY_SAVING_DISABLES_HI_RES_TIMERS: u32 = 1 << 2;

/// ### English
/// Reset the consecutive failed-draw counter only when a frame is presented
/// (default: reset on any successful draw).
///
/// ### 中文
/// 仅在帧被呈现后才重置连续失败绘制计数（默认：任意一次成功绘制即重置）。
pub const XIAN_FRAME_SYNC_FLAG_RESET_FAILED_DRAWS_ON_PRESENT: u32 = 1 << 3;

/// ### English
/// Default flag set used by embedders that do not care.
///
/// ### 中文
/// 宿主不关心时使用的默认标志集合。
pub const XIAN_FRAME_SYNC_DEFAULT_FLAGS: u32 =
    XIAN_FRAME_SYNC_FLAG_BEGIN_FRAME_SCHEDULING | XIAN_FRAME_SYNC_FLAG_THROTTLE_FRAME_PRODUCTION;
