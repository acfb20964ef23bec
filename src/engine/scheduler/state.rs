use std::fmt;
use std::time::Instant;

/// ### English
/// Frame production state.
///
/// ### 中文
/// 帧生产状态。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    /// ### English
    /// A request was issued; the client has not started drawing.
    ///
    /// ### 中文
    /// 已发出请求；客户端尚未开始绘制。
    FrameRequested,
    /// ### English
    /// The last draw failed; the request is kept for a retry.
    ///
    /// ### 中文
    /// 上一次绘制失败；请求被保留以便重试。
    FramePendingDraw,
    FrameDrawing,
    /// ### English
    /// The frame was drawn; waiting for the swap to be acknowledged.
    ///
    /// ### 中文
    /// 帧已绘制完成；等待 swap 被确认。
    FramePendingSwap,
}

impl SchedulerState {
    pub fn as_str(self) -> &'static str {
        match self {
            SchedulerState::Idle => "Idle",
            SchedulerState::FrameRequested => "FrameRequested",
            SchedulerState::FramePendingDraw => "FramePendingDraw",
            SchedulerState::FrameDrawing => "FrameDrawing",
            SchedulerState::FramePendingSwap => "FramePendingSwap",
        }
    }
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ### English
/// One frame the client is asked to produce.
///
/// ### 中文
/// 要求客户端生产的一帧。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameRequest {
    /// ### English
    /// Monotonic id, starting at 1.
    ///
    /// ### 中文
    /// 单调递增的 id，从 1 开始。
    pub frame_id: u64,
    pub requested_at: Instant,
    pub deadline: Instant,
    /// ### English
    /// Issued by failed-draw recovery, bypassing throttling.
    ///
    /// ### 中文
    /// 由失败绘制恢复机制发出，绕过节流。
    pub forced: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    /// ### English
    /// A request is already outstanding.
    ///
    /// ### 中文
    /// 已有未完成的请求。
    InFlight,
    /// ### English
    /// Backpressure: the previous frame has not been presented.
    ///
    /// ### 中文
    /// 背压：上一帧尚未呈现。
    Throttled,
    SurfaceNotReady,
}

/// ### English
/// Decision taken for one vsync tick.
///
/// ### 中文
/// 针对一次 vsync tick 做出的决定。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// ### English
    /// A new request was created.
    ///
    /// ### 中文
    /// 创建了新的请求。
    BeginFrame(FrameRequest),
    /// ### English
    /// The outstanding request after a failed draw should be drawn again.
    ///
    /// ### 中文
    /// 绘制失败后保留的请求应再次绘制。
    RetryFrame(FrameRequest),
    Ignored(IgnoreReason),
}

impl TickOutcome {
    /// ### English
    /// The request to draw now, if any.
    ///
    /// ### 中文
    /// 当前需要绘制的请求（如果有）。
    pub fn request(&self) -> Option<FrameRequest> {
        match self {
            TickOutcome::BeginFrame(request) | TickOutcome::RetryFrame(request) => Some(*request),
            TickOutcome::Ignored(_) => None,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerError {
    /// ### English
    /// A notification arrived in a state that does not accept it; the state is unchanged.
    ///
    /// ### 中文
    /// 通知到达时所处状态不接受它；状态保持不变。
    #[error("{operation} called out of order in state {state}")]
    OutOfOrder {
        operation: &'static str,
        state: SchedulerState,
    },

    #[error("swap finished without a pending swap")]
    NoPendingSwap,
}
