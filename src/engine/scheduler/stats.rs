/// ### English
/// Scheduler counters. Timing misses are reported here, never as errors.
///
/// ### 中文
/// 调度器计数器。时序未达标只在这里报告，从不作为错误。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub frames_requested: u64,
    pub frames_presented: u64,
    pub successful_draws: u64,
    pub failed_draws: u64,
    pub forced_draws: u64,
    /// ### English
    /// Draws that finished after their request's deadline.
    ///
    /// ### 中文
    /// 在请求 deadline 之后才完成的绘制。
    pub missed_deadlines: u64,
    pub throttled_ticks: u64,
    pub ignored_in_flight: u64,
    pub abandoned_frames: u64,
}
