//! ### English
//! Display refresh timing: parameters, the observer list and the synthetic timer.
//!
//! ### 中文
//! 显示刷新时序：参数、观察者列表与合成计时器。
mod synthetic;

use std::sync::{Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use tracing::trace;

pub use synthetic::{SyntheticVSync, TimerPrecision};

/// ### English
/// Snapshot of display timing. The interval is never zero.
///
/// ### 中文
/// 显示时序快照。interval 永不为零。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VSyncParameters {
    timebase: Instant,
    interval: Duration,
}

impl VSyncParameters {
    /// ### English
    /// Returns `None` for a zero interval.
    ///
    /// ### 中文
    /// interval 为零时返回 `None`。
    pub fn new(timebase: Instant, interval: Duration) -> Option<Self> {
        if interval.is_zero() {
            return None;
        }
        Some(Self { timebase, interval })
    }

    pub fn timebase(&self) -> Instant {
        self.timebase
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// ### English
    /// Same interval anchored at `timebase`.
    ///
    /// ### 中文
    /// 以 `timebase` 为锚点、interval 不变的参数。
    pub fn rebased(&self, timebase: Instant) -> Self {
        Self {
            timebase,
            interval: self.interval,
        }
    }

    /// ### English
    /// First vsync edge strictly after `now`.
    ///
    /// ### 中文
    /// 严格晚于 `now` 的第一个 vsync 边沿。
    pub fn next_tick_after(&self, now: Instant) -> Instant {
        if now < self.timebase {
            return self.timebase;
        }
        let elapsed = now.duration_since(self.timebase).as_nanos();
        let interval = self.interval.as_nanos();
        let ticks = elapsed / interval + 1;
        self.timebase + Duration::from_nanos((ticks * interval) as u64)
    }
}

/// ### English
/// Receives display timing from a [`VSyncSource`].
///
/// ### 中文
/// 从 [`VSyncSource`] 接收显示时序。
pub trait VSyncObserver: Send + Sync {
    fn on_update_vsync_parameters(&self, params: VSyncParameters);

    /// ### English
    /// One refresh edge; `params` is rebased onto `frame_time`.
    ///
    /// ### 中文
    /// 一次刷新边沿；`params` 已以 `frame_time` 为新的 timebase。
    fn on_vsync_tick(&self, _frame_time: Instant, _params: VSyncParameters) {}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

struct SourceState {
    params: Option<VSyncParameters>,
    observers: Vec<(ObserverId, Weak<dyn VSyncObserver>)>,
    next_id: u64,
}

/// ### English
/// Fan-out of display timing to weakly held observers, in registration order.
///
/// Observers are called outside the internal lock, so they may call back into the source.
///
/// ### 中文
/// 按注册顺序把显示时序分发给弱引用持有的观察者。
///
/// 观察者在内部锁之外被调用，因此可以回调本 source。
pub struct VSyncSource {
    state: Mutex<SourceState>,
}

impl Default for VSyncSource {
    fn default() -> Self {
        Self::new()
    }
}

impl VSyncSource {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SourceState {
                params: None,
                observers: Vec::new(),
                next_id: 1,
            }),
        }
    }

    pub fn with_parameters(params: VSyncParameters) -> Self {
        let source = Self::new();
        source.lock().params = Some(params);
        source
    }

    fn lock(&self) -> MutexGuard<'_, SourceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn parameters(&self) -> Option<VSyncParameters> {
        self.lock().params
    }

    /// ### English
    /// Registers an observer. If parameters are known it receives them immediately.
    ///
    /// ### 中文
    /// 注册观察者。若参数已知，会立即把参数发给它。
    pub fn add_observer(&self, observer: Weak<dyn VSyncObserver>) -> ObserverId {
        let (id, params) = {
            let mut state = self.lock();
            let id = ObserverId(state.next_id);
            state.next_id += 1;
            state.observers.push((id, observer.clone()));
            (id, state.params)
        };
        if let (Some(params), Some(observer)) = (params, observer.upgrade()) {
            observer.on_update_vsync_parameters(params);
        }
        id
    }

    /// ### English
    /// Removes an observer; returns `false` if it was not registered.
    ///
    /// ### 中文
    /// 移除观察者；未注册时返回 `false`。
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        let mut state = self.lock();
        let before = state.observers.len();
        state.observers.retain(|(observer_id, _)| *observer_id != id);
        state.observers.len() != before
    }

    pub fn observer_count(&self) -> usize {
        let mut state = self.lock();
        state.observers.retain(|(_, o)| o.strong_count() > 0);
        state.observers.len()
    }

    /// ### English
    /// Stores new parameters and notifies every observer.
    ///
    /// ### 中文
    /// 保存新参数并通知所有观察者。
    pub fn update_parameters(&self, params: VSyncParameters) {
        self.broadcast(params, None);
    }

    /// ### English
    /// Stores new parameters reported by observer `origin` and notifies the others.
    ///
    /// ### 中文
    /// 保存由观察者 `origin` 上报的新参数，并通知其余观察者。
    pub fn update_parameters_from(&self, origin: ObserverId, params: VSyncParameters) {
        self.broadcast(params, Some(origin));
    }

    fn broadcast(&self, params: VSyncParameters, skip: Option<ObserverId>) {
        let observers = {
            let mut state = self.lock();
            state.params = Some(params);
            self.live_observers(&mut state)
        };
        for (id, observer) in observers {
            if Some(id) != skip {
                observer.on_update_vsync_parameters(params);
            }
        }
    }

    /// ### English
    /// Delivers one refresh edge to every observer; returns how many were notified.
    ///
    /// Does nothing before parameters are known.
    ///
    /// ### 中文
    /// 向所有观察者投递一次刷新边沿；返回被通知的数量。
    ///
    /// 参数未知之前不做任何事。
    pub fn tick(&self, frame_time: Instant) -> usize {
        let (params, observers) = {
            let mut state = self.lock();
            let Some(params) = state.params else {
                return 0;
            };
            (params.rebased(frame_time), self.live_observers(&mut state))
        };
        trace!(observers = observers.len(), "vsync tick");
        for (_, observer) in &observers {
            observer.on_vsync_tick(frame_time, params);
        }
        observers.len()
    }

    fn live_observers(
        &self,
        state: &mut SourceState,
    ) -> Vec<(ObserverId, std::sync::Arc<dyn VSyncObserver>)> {
        let mut live = Vec::with_capacity(state.observers.len());
        state.observers.retain(|(id, weak)| match weak.upgrade() {
            Some(observer) => {
                live.push((*id, observer));
                true
            }
            None => false,
        });
        live
    }
}
