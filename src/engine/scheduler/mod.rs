//! ### English
//! Frame scheduling: when a frame begins, its deadline, throttling and failed-draw recovery.
//!
//! State machine:
//! `Idle -> FrameRequested -> FrameDrawing -> FramePendingSwap -> Idle`, with
//! `FrameDrawing -> FramePendingDraw -> FrameDrawing` retrying a failed draw.
//!
//! ### 中文
//! 帧调度：帧何时开始、deadline、节流以及失败绘制恢复。
//!
//! 状态机：
//! `Idle -> FrameRequested -> FrameDrawing -> FramePendingSwap -> Idle`，其中
//! `FrameDrawing -> FramePendingDraw -> FrameDrawing` 用于重试失败的绘制。
mod estimate;
mod machine;
mod settings;
mod state;
mod stats;


pub use machine::FrameScheduler;
pub use settings::{FailedDrawResetPolicy, SchedulerSettings};
pub use state::{FrameRequest, IgnoreReason, SchedulerError, SchedulerState, TickOutcome};
pub use stats::SchedulerStats;
