//! ### English
//! Synthetic vsync: a timer thread ticking a [`VSyncSource`] when no display signal exists.
//!
//! ### 中文
//! 合成 vsync：没有显示信号时，由计时线程驱动 [`VSyncSource`] tick。

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use super::{VSyncParameters, VSyncSource};

/// ### English
/// Window before a deadline that is spun instead of parked (high-resolution mode only).
///
/// ### 中文
/// deadline 之前改为自旋而非 park 的时间窗口（仅高精度模式）。
const SPIN_TAIL: Duration = Duration::from_micros(500);

/// ### English
/// Spin budget before switching to `yield_now()`.
///
/// ### 中文
/// 在切换到 `yield_now()` 之前允许的自旋次数预算。
const SPIN_LIMIT: u32 = 64;

/// ### English
/// Timer precision of the synthetic vsync thread.
///
/// ### 中文
/// 合成 vsync 线程的计时精度。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerPrecision {
    /// ### English
    /// Park until shortly before the deadline, then spin.
    ///
    /// ### 中文
    /// park 到 deadline 前不久，然后自旋。
    HighResolution,
    /// ### English
    /// Park only (battery saving); ticks may land late by the OS timer slack.
    ///
    /// ### 中文
    /// 仅 park（省电）；tick 可能因系统计时器松弛而略晚。
    Coarse,
}

/// ### English
/// Spin-then-yield backoff for the tail of a wait.
///
/// ### 中文
/// 等待尾段使用的“短自旋 + 让出调度”退避。
struct Backoff {
    spins: u32,
}

impl Backoff {
    #[inline]
    fn new() -> Self {
        Self { spins: 0 }
    }

    #[inline]
    fn snooze(&mut self) {
        if self.spins < SPIN_LIMIT {
            std::hint::spin_loop();
        } else {
            thread::yield_now();
        }
        self.spins = self.spins.wrapping_add(1);
    }
}

/// ### English
/// Fixed-interval vsync generator on a dedicated thread. Stops and joins on drop.
///
/// ### 中文
/// 运行在独立线程上的固定间隔 vsync 生成器。drop 时停止并 join。
pub struct SyntheticVSync {
    shutdown: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
    thread: thread::Thread,
    join: Option<thread::JoinHandle<()>>,
}

impl SyntheticVSync {
    /// ### English
    /// Publishes `interval` on `source` (timebase = now) and starts ticking it.
    ///
    /// ### 中文
    /// 在 `source` 上发布 `interval`（timebase = 当前时间）并开始驱动 tick。
    pub fn start(
        source: Arc<VSyncSource>,
        interval: Duration,
        precision: TimerPrecision,
    ) -> io::Result<Self> {
        let params = VSyncParameters::new(Instant::now(), interval).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "vsync interval must be non-zero")
        })?;
        source.update_parameters(params);

        let shutdown = Arc::new(AtomicBool::new(false));
        let ticks = Arc::new(AtomicU64::new(0));
        let shutdown_for_thread = shutdown.clone();
        let ticks_for_thread = ticks.clone();
        let join = thread::Builder::new()
            .name("XianSyntheticVSync".to_string())
            .spawn(move || {
                run_timer(
                    source,
                    params,
                    precision,
                    shutdown_for_thread,
                    ticks_for_thread,
                )
            })?;
        let thread_handle = join.thread().clone();
        debug!(?interval, ?precision, "synthetic vsync started");

        Ok(Self {
            shutdown,
            ticks,
            thread: thread_handle,
            join: Some(join),
        })
    }

    /// ### English
    /// Number of ticks delivered so far.
    ///
    /// ### 中文
    /// 目前已投递的 tick 数。
    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

impl Drop for SyntheticVSync {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        self.thread.unpark();
        if let Some(join) = self.join.take()
            && thread::current().id() != self.thread.id()
        {
            let _ = join.join();
        }
    }
}

fn run_timer(
    source: Arc<VSyncSource>,
    params: VSyncParameters,
    precision: TimerPrecision,
    shutdown: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
) {
    let mut deadline = params.next_tick_after(Instant::now());
    loop {
        if shutdown.load(Ordering::Acquire) {
            return;
        }

        let now = Instant::now();
        if now < deadline {
            let remaining = deadline - now;
            match precision {
                TimerPrecision::HighResolution if remaining <= SPIN_TAIL => {
                    let mut backoff = Backoff::new();
                    while Instant::now() < deadline && !shutdown.load(Ordering::Acquire) {
                        backoff.snooze();
                    }
                }
                TimerPrecision::HighResolution => thread::park_timeout(remaining - SPIN_TAIL),
                TimerPrecision::Coarse => thread::park_timeout(remaining),
            }
            continue;
        }

        source.tick(now);
        ticks.fetch_add(1, Ordering::Relaxed);
        // Skip edges missed while the observers ran.
        // 跳过观察者运行期间错过的边沿。
        deadline = params.next_tick_after(Instant::now().max(deadline));
    }
}
