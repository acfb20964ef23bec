//! ### English
//! Draw-cost estimate feeding frame deadlines.
//!
//! ### 中文
//! 为帧 deadline 提供输入的绘制耗时估计。

use std::time::Duration;

/// ### English
/// Weight of the newest sample in the moving average.
///
/// ### 中文
/// 移动平均中最新样本的权重。
const EMA_ALPHA: f64 = 0.2;

/// ### English
/// Exponential moving average of observed draw durations.
///
/// Before the first sample the estimate is a quarter of the refresh interval.
///
/// ### 中文
/// 已观测绘制耗时的指数移动平均。
///
/// 在第一个样本之前，估计值为刷新间隔的四分之一。
#[derive(Clone, Copy, Debug, Default)]
pub(super) struct DrawCostEstimator {
    average_ns: Option<f64>,
}

impl DrawCostEstimator {
    pub(super) fn estimate(&self, interval: Duration) -> Duration {
        match self.average_ns {
            Some(ns) => Duration::from_nanos(ns as u64),
            None => interval / 4,
        }
    }

    pub(super) fn record(&mut self, sample: Duration) {
        let sample = sample.as_nanos() as f64;
        self.average_ns = Some(match self.average_ns {
            Some(avg) => avg + EMA_ALPHA * (sample - avg),
            None => sample,
        });
    }
}
