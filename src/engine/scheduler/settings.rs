//! ### English
//! Scheduler cadence settings and their C ABI flag mapping.
//!
//! ### 中文
//! 调度节奏设置及其与 C ABI 标志位的映射。

use crate::engine::flags::{
    XIAN_FRAME_SYNC_FLAG_BATTERY_SAVING_DISABLES_HI_RES_TIMERS,
    XIAN_FRAME_SYNC_FLAG_BEGIN_FRAME_SCHEDULING, XIAN_FRAME_SYNC_FLAG_RESET_FAILED_DRAWS_ON_PRESENT,
    XIAN_FRAME_SYNC_FLAG_THROTTLE_FRAME_PRODUCTION,
};
use crate::engine::vsync::TimerPrecision;

/// ### English
/// When the consecutive failed-draw counter returns to zero.
///
/// ### 中文
/// 连续失败绘制计数何时归零。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailedDrawResetPolicy {
    /// ### English
    /// Any successful draw resets the counter.
    ///
    /// ### 中文
    /// 任意一次成功绘制即重置计数。
    #[default]
    OnSuccessfulDraw,
    /// ### English
    /// Only a presented frame (swap acknowledged) resets the counter.
    ///
    /// ### 中文
    /// 只有帧被呈现（swap 已确认）才重置计数。
    OnPresentedFrame,
}

/// ### English
/// Scheduler configuration. Every option changes cadence only, never state machine correctness.
///
/// ### 中文
/// 调度器配置。每个选项只影响节奏，不影响状态机的正确性。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// ### English
    /// Frames are driven by external vsync ticks and the deadline subtracts the draw-cost estimate.
    ///
    /// ### 中文
    /// 帧由外部 vsync tick 驱动，deadline 会扣除绘制耗时估计。
    pub begin_frame_scheduling_enabled: bool,
    /// ### English
    /// Ignore ticks while the previous frame has not been presented.
    ///
    /// ### 中文
    /// 上一帧尚未呈现时忽略 tick。
    pub throttle_frame_production: bool,
    /// ### English
    /// Consecutive failures after which the next tick forces a draw. `0` disables forcing.
    ///
    /// ### 中文
    /// 连续失败达到该次数后，下一次 tick 强制绘制。`0` 表示禁用强制绘制。
    pub max_failed_draws_before_forced_draw: u32,
    pub battery_saving_disables_hi_res_timers: bool,
    /// ### English
    /// Presented but unacknowledged swaps tolerated before throttling kicks in (minimum 1).
    ///
    /// ### 中文
    /// 开始节流之前允许的“已呈现但未确认”的 swap 数量（至少为 1）。
    pub max_pending_swaps: u32,
    pub failed_draw_reset_policy: FailedDrawResetPolicy,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            begin_frame_scheduling_enabled: true,
            throttle_frame_production: true,
            max_failed_draws_before_forced_draw: 3,
            battery_saving_disables_hi_res_timers: false,
            max_pending_swaps: 1,
            failed_draw_reset_policy: FailedDrawResetPolicy::OnSuccessfulDraw,
        }
    }
}

impl SchedulerSettings {
    /// ### English
    /// Builds settings from the C ABI bitmask (`XIAN_FRAME_SYNC_FLAG_*`).
    ///
    /// ### 中文
    /// 由 C ABI 位掩码（`XIAN_FRAME_SYNC_FLAG_*`）构建设置。
    pub fn from_flags(flags: u32, max_failed_draws_before_forced_draw: u32) -> Self {
        let failed_draw_reset_policy =
            if flags & XIAN_FRAME_SYNC_FLAG_RESET_FAILED_DRAWS_ON_PRESENT != 0 {
                FailedDrawResetPolicy::OnPresentedFrame
            } else {
                FailedDrawResetPolicy::OnSuccessfulDraw
            };
        Self {
            begin_frame_scheduling_enabled: flags & XIAN_FRAME_SYNC_FLAG_BEGIN_FRAME_SCHEDULING
                != 0,
            throttle_frame_production: flags & XIAN_FRAME_SYNC_FLAG_THROTTLE_FRAME_PRODUCTION != 0,
            max_failed_draws_before_forced_draw,
            battery_saving_disables_hi_res_timers: flags
                & XIAN_FRAME_SYNC_FLAG_BATTERY_SAVING_DISABLES_HI_RES_TIMERS
                != 0,
            max_pending_swaps: 1,
            failed_draw_reset_policy,
        }
    }

    pub fn to_flags(&self) -> u32 {
        let mut flags = 0;
        if self.begin_frame_scheduling_enabled {
            flags |= XIAN_FRAME_SYNC_FLAG_BEGIN_FRAME_SCHEDULING;
        }
        if self.throttle_frame_production {
            flags |= XIAN_FRAME_SYNC_FLAG_THROTTLE_FRAME_PRODUCTION;
        }
        if self.battery_saving_disables_hi_res_timers {
            flags |= XIAN_FRAME_SYNC_FLAG_BATTERY_SAVING_DISABLES_HI_RES_TIMERS;
        }
        if self.failed_draw_reset_policy == FailedDrawResetPolicy::OnPresentedFrame {
            flags |= XIAN_FRAME_SYNC_FLAG_RESET_FAILED_DRAWS_ON_PRESENT;
        }
        flags
    }

    /// ### English
    /// Timer precision for a synthetic vsync given the current power source.
    ///
    /// ### 中文
    /// 根据当前电源状态返回合成 vsync 应使用的计时精度。
    pub fn timer_precision(&self, on_battery_power: bool) -> TimerPrecision {
        if on_battery_power && self.battery_saving_disables_hi_res_timers {
            TimerPrecision::Coarse
        } else {
            TimerPrecision::HighResolution
        }
    }

    #[inline]
    pub(super) fn pending_swap_limit(&self) -> u32 {
        self.max_pending_swaps.max(1)
    }

    #[inline]
    pub(super) fn forced_draw_due(&self, consecutive_failed_draws: u32) -> bool {
        self.max_failed_draws_before_forced_draw > 0
            && consecutive_failed_draws >= self.max_failed_draws_before_forced_draw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::flags::XIAN_FRAME_SYNC_DEFAULT_FLAGS;

    #[test]
    fn default_flags_match_default_settings() {
        assert_eq!(
            SchedulerSettings::from_flags(XIAN_FRAME_SYNC_DEFAULT_FLAGS, 3),
            SchedulerSettings::default()
        );
        assert_eq!(
            SchedulerSettings::default().to_flags(),
            XIAN_FRAME_SYNC_DEFAULT_FLAGS
        );
    }

    #[test]
    fn flags_select_reset_policy_and_timers() {
        let settings = SchedulerSettings::from_flags(
            XIAN_FRAME_SYNC_FLAG_RESET_FAILED_DRAWS_ON_PRESENT
                | XIAN_FRAME_SYNC_FLAG_BATTERY_SAVING_DISABLES_HI_RES_TIMERS,
            0,
        );
        assert!(!settings.throttle_frame_production);
        assert_eq!(
            settings.failed_draw_reset_policy,
            FailedDrawResetPolicy::OnPresentedFrame
        );
        assert_eq!(settings.timer_precision(true), TimerPrecision::Coarse);
        assert_eq!(
            settings.timer_precision(false),
            TimerPrecision::HighResolution
        );
        assert!(!settings.forced_draw_due(100));
    }
}
