//! ### English
//! C ABI bindings for the frame scheduler (create/destroy/tick/notify).
//!
//! The scheduler is single-threaded: the embedder must call every function for one handle from
//! the same producer thread.
//!
//! ### 中文
//! 帧调度器相关的 C ABI 绑定（create/destroy/tick/notify）。
//!
//! 调度器是单线程的：宿主必须在同一个生产者线程上调用同一句柄的所有函数。

use std::time::{Duration, Instant};

use crate::engine::{
    FrameRequest, FrameScheduler, SchedulerSettings, SchedulerState, SchedulerStats,
    VSyncParameters,
};

/// ### English
/// Maps the embedder's monotonic nanosecond clock onto `Instant`, anchored at the first tick.
///
/// ### 中文
/// 将宿主的单调纳秒时钟映射到 `Instant`，以第一次 tick 为锚点。
#[derive(Clone, Copy)]
struct EmbedderClock {
    anchor_ns: u64,
    anchor: Instant,
}

impl EmbedderClock {
    fn to_instant(self, ns: u64) -> Instant {
        if ns >= self.anchor_ns {
            self.anchor + Duration::from_nanos(ns - self.anchor_ns)
        } else {
            self.anchor
                .checked_sub(Duration::from_nanos(self.anchor_ns - ns))
                .unwrap_or(self.anchor)
        }
    }

    fn to_nanos(self, at: Instant) -> u64 {
        match at.checked_duration_since(self.anchor) {
            Some(after) => self.anchor_ns.saturating_add(saturating_nanos(after)),
            None => self
                .anchor_ns
                .saturating_sub(saturating_nanos(self.anchor.duration_since(at))),
        }
    }
}

fn saturating_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

#[repr(C)]
/// ### English
/// Opaque scheduler handle.
///
/// ### 中文
/// 不透明调度器句柄。
pub struct XianFrameScheduler {
    scheduler: FrameScheduler,
    clock: Option<EmbedderClock>,
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
/// ### English
/// Frame request returned by a tick that asks the embedder to draw.
///
/// ### 中文
/// tick 要求宿主绘制时返回的帧请求。
pub struct XianFrameRequest {
    /// ### English
    /// Frame id (never 0). A retried request keeps its id.
    ///
    /// ### 中文
    /// 帧 id（永不为 0）。重试的请求保留原 id。
    pub frame_id: u64,
    /// ### English
    /// Target completion time in the embedder's clock (nanoseconds).
    ///
    /// ### 中文
    /// 目标完成时间，使用宿主时钟（纳秒）。
    pub deadline_ns: u64,
    /// ### English
    /// `1` when this is a forced draw after repeated failures.
    ///
    /// ### 中文
    /// 连续失败后的强制绘制时为 `1`。
    pub forced: u8,
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
/// ### English
/// Scheduler counters mirrored for the embedder.
///
/// ### 中文
/// 提供给宿主的调度器计数器镜像。
pub struct XianFrameSchedulerStats {
    pub frames_requested: u64,
    pub frames_presented: u64,
    pub successful_draws: u64,
    pub failed_draws: u64,
    pub forced_draws: u64,
    pub missed_deadlines: u64,
    pub throttled_ticks: u64,
    pub ignored_in_flight: u64,
    pub abandoned_frames: u64,
}

impl From<SchedulerStats> for XianFrameSchedulerStats {
    fn from(value: SchedulerStats) -> Self {
        Self {
            frames_requested: value.frames_requested,
            frames_presented: value.frames_presented,
            successful_draws: value.successful_draws,
            failed_draws: value.failed_draws,
            forced_draws: value.forced_draws,
            missed_deadlines: value.missed_deadlines,
            throttled_ticks: value.throttled_ticks,
            ignored_in_flight: value.ignored_in_flight,
            abandoned_frames: value.abandoned_frames,
        }
    }
}

impl XianFrameRequest {
    fn new(request: FrameRequest, clock: EmbedderClock) -> Self {
        Self {
            frame_id: request.frame_id,
            deadline_ns: clock.to_nanos(request.deadline),
            forced: u8::from(request.forced),
        }
    }
}

#[unsafe(no_mangle)]
/// ### English
/// Creates a scheduler.
///
/// #### Parameters
/// - `flags`: `XIAN_FRAME_SYNC_FLAG_*` bitmask.
/// - `max_failed_draws`: Consecutive failed draws before a forced draw (`0` disables forcing).
///
/// ### 中文
/// 创建一个调度器。
///
/// #### 参数
/// - `flags`：`XIAN_FRAME_SYNC_FLAG_*` 位掩码。
/// - `max_failed_draws`：触发强制绘制前允许的连续失败次数（`0` 表示禁用强制绘制）。
pub extern "C" fn xian_frame_scheduler_create(
    flags: u32,
    max_failed_draws: u32,
) -> *mut XianFrameScheduler {
    let settings = SchedulerSettings::from_flags(flags, max_failed_draws);
    Box::into_raw(Box::new(XianFrameScheduler {
        scheduler: FrameScheduler::new(settings),
        clock: None,
    }))
}

#[unsafe(no_mangle)]
/// ### English
/// Destroys a scheduler created by `xian_frame_scheduler_create`.
///
/// # Safety
/// `scheduler` must be NULL or a pointer returned by `xian_frame_scheduler_create` that has not
/// been destroyed yet.
///
/// ### 中文
/// 销毁由 `xian_frame_scheduler_create` 创建的调度器。
///
/// # Safety
/// `scheduler` 必须为 NULL，或是 `xian_frame_scheduler_create` 返回且尚未销毁的指针。
pub unsafe extern "C" fn xian_frame_scheduler_destroy(scheduler: *mut XianFrameScheduler) {
    if scheduler.is_null() {
        return;
    }
    unsafe {
        drop(Box::from_raw(scheduler));
    }
}

#[unsafe(no_mangle)]
/// ### English
/// Replaces the scheduler flags. Takes effect on the next tick.
///
/// # Safety
/// `scheduler` must be NULL or a live handle.
///
/// ### 中文
/// 替换调度器标志，下一次 tick 生效。
///
/// # Safety
/// `scheduler` 必须为 NULL 或有效句柄。
pub unsafe extern "C" fn xian_frame_scheduler_set_flags(
    scheduler: *mut XianFrameScheduler,
    flags: u32,
    max_failed_draws: u32,
) -> bool {
    let Some(handle) = (unsafe { scheduler.as_mut() }) else {
        return false;
    };
    let mut settings = SchedulerSettings::from_flags(flags, max_failed_draws);
    settings.max_pending_swaps = handle.scheduler.settings().max_pending_swaps;
    handle.scheduler.set_settings(settings);
    true
}

#[unsafe(no_mangle)]
/// ### English
/// Delivers one vsync tick.
///
/// Returns `true` and fills `out_request` (if non-NULL) when the embedder should draw now.
/// Returns `false` when the tick was ignored, or when `interval_ns` is `0`.
///
/// #### Parameters
/// - `timebase_ns`: Time of the vsync edge on the embedder's monotonic clock.
/// - `interval_ns`: Refresh interval.
///
/// # Safety
/// `scheduler` must be NULL or a live handle; `out_request` must be NULL or writable.
///
/// ### 中文
/// 投递一次 vsync tick。
///
/// 宿主需要立即绘制时返回 `true`，并在 `out_request` 非 NULL 时写入请求。
/// tick 被忽略或 `interval_ns` 为 `0` 时返回 `false`。
///
/// #### 参数
/// - `timebase_ns`：vsync 边沿在宿主单调时钟上的时间。
/// - `interval_ns`：刷新间隔。
///
/// # Safety
/// `scheduler` 必须为 NULL 或有效句柄；`out_request` 必须为 NULL 或可写。
pub unsafe extern "C" fn xian_frame_scheduler_on_vsync_tick(
    scheduler: *mut XianFrameScheduler,
    timebase_ns: u64,
    interval_ns: u64,
    out_request: *mut XianFrameRequest,
) -> bool {
    let Some(handle) = (unsafe { scheduler.as_mut() }) else {
        return false;
    };
    let clock = *handle.clock.get_or_insert_with(|| EmbedderClock {
        anchor_ns: timebase_ns,
        anchor: Instant::now(),
    });
    let Some(params) = VSyncParameters::new(
        clock.to_instant(timebase_ns),
        Duration::from_nanos(interval_ns),
    ) else {
        return false;
    };

    let Some(request) = handle.scheduler.on_vsync_tick(params).request() else {
        return false;
    };
    if let Some(out) = unsafe { out_request.as_mut() } {
        *out = XianFrameRequest::new(request, clock);
    }
    true
}

#[unsafe(no_mangle)]
/// ### English
/// Reports that drawing of the current request started. Returns `false` if out of order.
///
/// # Safety
/// `scheduler` must be NULL or a live handle.
///
/// ### 中文
/// 报告当前请求开始绘制。顺序不合法时返回 `false`。
///
/// # Safety
/// `scheduler` 必须为 NULL 或有效句柄。
pub unsafe extern "C" fn xian_frame_scheduler_notify_draw_started(
    scheduler: *mut XianFrameScheduler,
) -> bool {
    let Some(handle) = (unsafe { scheduler.as_mut() }) else {
        return false;
    };
    handle.scheduler.notify_draw_started().is_ok()
}

#[unsafe(no_mangle)]
/// ### English
/// Reports the end of the current draw. Returns `false` if out of order.
///
/// # Safety
/// `scheduler` must be NULL or a live handle.
///
/// ### 中文
/// 报告当前绘制结束。顺序不合法时返回 `false`。
///
/// # Safety
/// `scheduler` 必须为 NULL 或有效句柄。
pub unsafe extern "C" fn xian_frame_scheduler_notify_draw_finished(
    scheduler: *mut XianFrameScheduler,
    success: bool,
) -> bool {
    let Some(handle) = (unsafe { scheduler.as_mut() }) else {
        return false;
    };
    handle.scheduler.notify_draw_finished(success).is_ok()
}

#[unsafe(no_mangle)]
/// ### English
/// Reports that the platform finished one swap. Returns `false` if no swap was pending.
///
/// # Safety
/// `scheduler` must be NULL or a live handle.
///
/// ### 中文
/// 报告平台完成了一次 swap。没有待确认的 swap 时返回 `false`。
///
/// # Safety
/// `scheduler` 必须为 NULL 或有效句柄。
pub unsafe extern "C" fn xian_frame_scheduler_notify_swap_finished(
    scheduler: *mut XianFrameScheduler,
) -> bool {
    let Some(handle) = (unsafe { scheduler.as_mut() }) else {
        return false;
    };
    handle.scheduler.notify_swap_finished().is_ok()
}

#[unsafe(no_mangle)]
/// ### English
/// Drops the current request or pending swap after a resize.
///
/// # Safety
/// `scheduler` must be NULL or a live handle.
///
/// ### 中文
/// resize 后丢弃当前请求或待确认的 swap。
///
/// # Safety
/// `scheduler` 必须为 NULL 或有效句柄。
pub unsafe extern "C" fn xian_frame_scheduler_abandon_frame(
    scheduler: *mut XianFrameScheduler,
) -> bool {
    let Some(handle) = (unsafe { scheduler.as_mut() }) else {
        return false;
    };
    handle.scheduler.abandon_frame().is_ok()
}

#[unsafe(no_mangle)]
/// ### English
/// Marks the output surface lost (`ready = false`) or ready again (`ready = true`).
///
/// # Safety
/// `scheduler` must be NULL or a live handle.
///
/// ### 中文
/// 将输出表面标记为丢失（`ready = false`）或重新就绪（`ready = true`）。
///
/// # Safety
/// `scheduler` 必须为 NULL 或有效句柄。
pub unsafe extern "C" fn xian_frame_scheduler_set_output_surface_ready(
    scheduler: *mut XianFrameScheduler,
    ready: bool,
) {
    let Some(handle) = (unsafe { scheduler.as_mut() }) else {
        return;
    };
    if ready {
        handle.scheduler.notify_output_surface_ready();
    } else {
        handle.scheduler.notify_output_surface_lost();
    }
}

#[unsafe(no_mangle)]
/// ### English
/// Returns the scheduler state:
/// `0` Idle, `1` FrameRequested, `2` FramePendingDraw, `3` FrameDrawing, `4` FramePendingSwap.
/// Returns `u32::MAX` for NULL.
///
/// # Safety
/// `scheduler` must be NULL or a live handle.
///
/// ### 中文
/// 返回调度器状态：
/// `0` Idle、`1` FrameRequested、`2` FramePendingDraw、`3` FrameDrawing、`4` FramePendingSwap。
/// NULL 时返回 `u32::MAX`。
///
/// # Safety
/// `scheduler` 必须为 NULL 或有效句柄。
pub unsafe extern "C" fn xian_frame_scheduler_state(scheduler: *const XianFrameScheduler) -> u32 {
    let Some(handle) = (unsafe { scheduler.as_ref() }) else {
        return u32::MAX;
    };
    match handle.scheduler.state() {
        SchedulerState::Idle => 0,
        SchedulerState::FrameRequested => 1,
        SchedulerState::FramePendingDraw => 2,
        SchedulerState::FrameDrawing => 3,
        SchedulerState::FramePendingSwap => 4,
    }
}

#[unsafe(no_mangle)]
/// ### English
/// Copies the scheduler counters into `out_stats`.
///
/// # Safety
/// `scheduler` must be NULL or a live handle; `out_stats` must be NULL or writable.
///
/// ### 中文
/// 将调度器计数器复制到 `out_stats`。
///
/// # Safety
/// `scheduler` 必须为 NULL 或有效句柄；`out_stats` 必须为 NULL 或可写。
pub unsafe extern "C" fn xian_frame_scheduler_get_stats(
    scheduler: *const XianFrameScheduler,
    out_stats: *mut XianFrameSchedulerStats,
) -> bool {
    let Some(handle) = (unsafe { scheduler.as_ref() }) else {
        return false;
    };
    let Some(out) = (unsafe { out_stats.as_mut() }) else {
        return false;
    };
    *out = handle.scheduler.stats().into();
    true
}
