//! ### English
//! Frame scheduler state machine.
//!
//! ### 中文
//! 帧调度状态机。

use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use super::estimate::DrawCostEstimator;
use super::{
    FailedDrawResetPolicy, FrameRequest, IgnoreReason, SchedulerError, SchedulerSettings,
    SchedulerState, SchedulerStats, TickOutcome,
};
use crate::engine::vsync::VSyncParameters;

/// ### English
/// Decides when frames begin and tracks them through draw and swap.
///
/// Driven from the producer thread: vsync ticks in, draw/swap notifications back. At most one
/// [`FrameRequest`] is outstanding; forced recovery replaces a stale one instead of adding
/// another. Out-of-order notifications are logged and rejected without changing state.
///
/// ### 中文
/// 决定帧何时开始，并跟踪其绘制与 swap 过程。
///
/// 由生产者线程驱动：vsync tick 输入，绘制/swap 通知回传。同一时刻最多只有一个
/// [`FrameRequest`]；强制恢复会替换过期请求而不是再新增一个。乱序通知会被记录并拒绝，
/// 状态不变。
#[derive(Debug)]
pub struct FrameScheduler {
    settings: SchedulerSettings,
    state: SchedulerState,
    request: Option<FrameRequest>,
    next_frame_id: u64,
    consecutive_failed_draws: u32,
    /// ### English
    /// Frames drawn but whose swap has not been acknowledged.
    ///
    /// ### 中文
    /// 已绘制但 swap 尚未被确认的帧数。
    pending_swaps: u32,
    output_surface_ready: bool,
    draw_started_at: Option<Instant>,
    draw_cost: DrawCostEstimator,
    stats: SchedulerStats,
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new(SchedulerSettings::default())
    }
}

impl FrameScheduler {
    pub fn new(settings: SchedulerSettings) -> Self {
        Self {
            settings,
            state: SchedulerState::Idle,
            request: None,
            next_frame_id: 1,
            consecutive_failed_draws: 0,
            pending_swaps: 0,
            output_surface_ready: true,
            draw_started_at: None,
            draw_cost: DrawCostEstimator::default(),
            stats: SchedulerStats::default(),
        }
    }

    pub fn settings(&self) -> SchedulerSettings {
        self.settings
    }

    pub fn set_settings(&mut self, settings: SchedulerSettings) {
        debug!(?settings, "scheduler settings updated");
        self.settings = settings;
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn current_request(&self) -> Option<FrameRequest> {
        self.request
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    pub fn consecutive_failed_draws(&self) -> u32 {
        self.consecutive_failed_draws
    }

    pub fn pending_swaps(&self) -> u32 {
        self.pending_swaps
    }

    pub fn estimated_draw_cost(&self, interval: Duration) -> Duration {
        self.draw_cost.estimate(interval)
    }

    /// ### English
    /// Returns whether the next tick will force a draw.
    ///
    /// ### 中文
    /// 返回下一次 tick 是否会强制绘制。
    pub fn forced_draw_pending(&self) -> bool {
        self.settings.forced_draw_due(self.consecutive_failed_draws)
    }

    pub fn on_vsync_tick(&mut self, params: VSyncParameters) -> TickOutcome {
        self.on_vsync_tick_at(params, Instant::now())
    }

    /// ### English
    /// Handles one vsync tick observed at `now`.
    ///
    /// ### 中文
    /// 处理在 `now` 观察到的一次 vsync tick。
    pub fn on_vsync_tick_at(&mut self, params: VSyncParameters, now: Instant) -> TickOutcome {
        let outcome = self.decide_tick(params, now);
        match outcome {
            TickOutcome::Ignored(IgnoreReason::Throttled) => self.stats.throttled_ticks += 1,
            TickOutcome::Ignored(IgnoreReason::InFlight) => self.stats.ignored_in_flight += 1,
            _ => {}
        }
        trace!(state = %self.state, ?outcome, "vsync tick");
        outcome
    }

    fn decide_tick(&mut self, params: VSyncParameters, now: Instant) -> TickOutcome {
        if !self.output_surface_ready {
            return TickOutcome::Ignored(IgnoreReason::SurfaceNotReady);
        }

        if self.forced_draw_pending() && self.state != SchedulerState::FrameDrawing {
            if let Some(stale) = self.request {
                debug!(frame_id = stale.frame_id, "forced draw replaces stale request");
            }
            self.consecutive_failed_draws = 0;
            self.stats.forced_draws += 1;
            return TickOutcome::BeginFrame(self.begin_request(params, now, true));
        }

        let throttled = self.settings.throttle_frame_production
            && self.pending_swaps >= self.settings.pending_swap_limit();

        match self.state {
            SchedulerState::FrameRequested | SchedulerState::FrameDrawing => {
                TickOutcome::Ignored(IgnoreReason::InFlight)
            }
            SchedulerState::FramePendingDraw => match self.request {
                Some(request) if self.settings.throttle_frame_production => {
                    TickOutcome::RetryFrame(request)
                }
                _ => TickOutcome::BeginFrame(self.begin_request(params, now, false)),
            },
            SchedulerState::FramePendingSwap | SchedulerState::Idle => {
                if throttled {
                    TickOutcome::Ignored(IgnoreReason::Throttled)
                } else {
                    TickOutcome::BeginFrame(self.begin_request(params, now, false))
                }
            }
        }
    }

    fn begin_request(&mut self, params: VSyncParameters, now: Instant, forced: bool) -> FrameRequest {
        let budget = if self.settings.begin_frame_scheduling_enabled {
            params
                .interval()
                .saturating_sub(self.draw_cost.estimate(params.interval()))
        } else {
            params.interval()
        };
        let request = FrameRequest {
            frame_id: self.next_frame_id,
            requested_at: now,
            deadline: params.timebase() + budget,
            forced,
        };
        self.next_frame_id += 1;
        self.request = Some(request);
        self.state = SchedulerState::FrameRequested;
        self.stats.frames_requested += 1;
        debug!(frame_id = request.frame_id, forced, "frame requested");
        request
    }

    fn reject(&self, operation: &'static str) -> SchedulerError {
        warn!(operation, state = %self.state, "scheduler notification out of order");
        SchedulerError::OutOfOrder {
            operation,
            state: self.state,
        }
    }

    pub fn notify_draw_started(&mut self) -> Result<(), SchedulerError> {
        self.notify_draw_started_at(Instant::now())
    }

    /// ### English
    /// `FrameRequested | FramePendingDraw -> FrameDrawing`.
    ///
    /// ### 中文
    /// `FrameRequested | FramePendingDraw -> FrameDrawing`。
    pub fn notify_draw_started_at(&mut self, now: Instant) -> Result<(), SchedulerError> {
        match self.state {
            SchedulerState::FrameRequested | SchedulerState::FramePendingDraw => {
                self.state = SchedulerState::FrameDrawing;
                self.draw_started_at = Some(now);
                Ok(())
            }
            _ => Err(self.reject("notify_draw_started")),
        }
    }

    pub fn notify_draw_finished(&mut self, success: bool) -> Result<(), SchedulerError> {
        self.notify_draw_finished_at(success, Instant::now())
    }

    /// ### English
    /// Ends the draw started by [`Self::notify_draw_started_at`].
    ///
    /// Success moves to `FramePendingSwap`. Failure keeps the request in `FramePendingDraw` and
    /// counts towards forced-draw recovery.
    ///
    /// ### 中文
    /// 结束由 [`Self::notify_draw_started_at`] 开始的绘制。
    ///
    /// 成功则进入 `FramePendingSwap`。失败则在 `FramePendingDraw` 中保留请求，并计入强制绘制
    /// 恢复计数。
    pub fn notify_draw_finished_at(
        &mut self,
        success: bool,
        now: Instant,
    ) -> Result<(), SchedulerError> {
        if self.state != SchedulerState::FrameDrawing {
            return Err(self.reject("notify_draw_finished"));
        }

        if let Some(started) = self.draw_started_at.take() {
            self.draw_cost.record(now.saturating_duration_since(started));
        }
        let frame_id = self.request.map(|r| r.frame_id).unwrap_or_default();
        if let Some(request) = self.request
            && now > request.deadline
        {
            self.stats.missed_deadlines += 1;
            debug!(frame_id, "draw finished after deadline");
        }

        if success {
            self.stats.successful_draws += 1;
            self.pending_swaps += 1;
            self.request = None;
            self.state = SchedulerState::FramePendingSwap;
            if self.settings.failed_draw_reset_policy == FailedDrawResetPolicy::OnSuccessfulDraw {
                self.consecutive_failed_draws = 0;
            }
            trace!(frame_id, "draw finished");
        } else {
            self.stats.failed_draws += 1;
            self.consecutive_failed_draws += 1;
            self.state = SchedulerState::FramePendingDraw;
            debug!(
                frame_id,
                consecutive = self.consecutive_failed_draws,
                "draw failed"
            );
        }
        Ok(())
    }

    /// ### English
    /// Acknowledges one presented swap. `FramePendingSwap -> Idle` once none are pending.
    ///
    /// ### 中文
    /// 确认一次已呈现的 swap。没有待确认的 swap 后 `FramePendingSwap -> Idle`。
    pub fn notify_swap_finished(&mut self) -> Result<(), SchedulerError> {
        if self.pending_swaps == 0 {
            warn!(state = %self.state, "swap finished without a pending swap");
            return Err(SchedulerError::NoPendingSwap);
        }
        self.pending_swaps -= 1;
        self.stats.frames_presented += 1;
        if self.settings.failed_draw_reset_policy == FailedDrawResetPolicy::OnPresentedFrame {
            self.consecutive_failed_draws = 0;
        }
        if self.state == SchedulerState::FramePendingSwap && self.pending_swaps == 0 {
            self.state = SchedulerState::Idle;
        }
        Ok(())
    }

    /// ### English
    /// Drops work invalidated by a surface resize and returns to `Idle`.
    ///
    /// Allowed from `FrameRequested`, `FramePendingDraw` and `FramePendingSwap`; a running draw
    /// must finish first.
    ///
    /// ### 中文
    /// 丢弃因表面 resize 而失效的工作并回到 `Idle`。
    ///
    /// 允许在 `FrameRequested`、`FramePendingDraw` 与 `FramePendingSwap` 中调用；正在进行的绘制
    /// 必须先完成。
    pub fn abandon_frame(&mut self) -> Result<(), SchedulerError> {
        match self.state {
            SchedulerState::FrameRequested | SchedulerState::FramePendingDraw => {
                self.request = None;
            }
            SchedulerState::FramePendingSwap => {
                self.pending_swaps = self.pending_swaps.saturating_sub(1);
            }
            SchedulerState::Idle | SchedulerState::FrameDrawing => {
                return Err(self.reject("abandon_frame"));
            }
        }
        self.stats.abandoned_frames += 1;
        self.state = if self.pending_swaps > 0 {
            SchedulerState::FramePendingSwap
        } else {
            SchedulerState::Idle
        };
        debug!(state = %self.state, "frame abandoned");
        Ok(())
    }

    /// ### English
    /// The output surface went away: drop the request, pending swaps and recovery state, and
    /// ignore ticks until [`Self::notify_output_surface_ready`].
    ///
    /// ### 中文
    /// 输出表面丢失：丢弃请求、待确认 swap 与恢复状态，并在
    /// [`Self::notify_output_surface_ready`] 之前忽略 tick。
    pub fn notify_output_surface_lost(&mut self) {
        debug!(state = %self.state, "output surface lost");
        if self.request.take().is_some() {
            self.stats.abandoned_frames += 1;
        }
        self.state = SchedulerState::Idle;
        self.pending_swaps = 0;
        self.consecutive_failed_draws = 0;
        self.draw_started_at = None;
        self.output_surface_ready = false;
    }

    pub fn notify_output_surface_ready(&mut self) {
        self.output_surface_ready = true;
    }

    pub fn output_surface_ready(&self) -> bool {
        self.output_surface_ready
    }
}
