//! ### English
//! Synchronous producer-thread frame cycle: tick, draw, fence, present.
//!
//! ### 中文
//! 生产者线程上的同步帧循环：tick、绘制、fence、呈现。

use std::sync::Arc;
use std::time::Instant;

use dpi::PhysicalSize;
use tracing::{debug, error, trace, warn};

use crate::engine::error::{FrameSyncError, FrameSyncResult};
use crate::engine::fence::FenceBackend;
use crate::engine::output::OutputSurfaceBinding;
use crate::engine::scheduler::{
    FrameRequest, FrameScheduler, IgnoreReason, SchedulerSettings, SchedulerState, TickOutcome,
};
use crate::engine::surface::{DrawableHandle, PresentOutcome, SurfaceError};
use crate::engine::vsync::VSyncParameters;

/// ### English
/// The external draw producer (rasterizer / compositor client).
///
/// ### 中文
/// 外部绘制生产者（光栅化器 / 合成客户端）。
pub trait FrameProducer: Send {
    /// ### English
    /// Records GPU commands for `request` into `target`. Returns `false` when the draw failed
    /// (for example missing content), which the scheduler retries.
    ///
    /// ### 中文
    /// 将 `request` 的 GPU 命令记录到 `target`。绘制失败（例如内容缺失）时返回 `false`，
    /// 调度器会重试。
    fn draw_frame(&mut self, target: &DrawableHandle, request: &FrameRequest) -> bool;
}

/// ### English
/// What one tick produced.
///
/// ### 中文
/// 一次 tick 的产出。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameCycle {
    Skipped(IgnoreReason),
    DrawFailed { frame_id: u64, consecutive: u32 },
    /// ### English
    /// The surface was resized underneath the draw; the result was discarded.
    ///
    /// ### 中文
    /// 绘制过程中表面被 resize；结果已丢弃。
    Abandoned { frame_id: u64 },
    Presented {
        frame_id: u64,
        forced: bool,
        outcome: PresentOutcome,
    },
}

/// ### English
/// Wires scheduler, draw producer, fence backend and bound surface into one frame cycle per tick.
///
/// ### 中文
/// 将调度器、绘制生产者、fence backend 与已绑定表面串成每次 tick 一个帧循环。
pub struct FramePipeline<P: FrameProducer> {
    scheduler: FrameScheduler,
    producer: P,
    fences: FenceBackend,
    binding: Arc<OutputSurfaceBinding>,
    /// ### English
    /// When set, swaps stay pending until [`Self::notify_swap_finished`] (platform acknowledges
    /// asynchronously). Otherwise each present is acknowledged immediately.
    ///
    /// ### 中文
    /// 设置后，swap 会保持待确认状态直到 [`Self::notify_swap_finished`]（平台异步确认）。
    /// 否则每次呈现后立即确认。
    defer_swap_ack: bool,
}

impl<P: FrameProducer> FramePipeline<P> {
    pub fn new(
        settings: SchedulerSettings,
        producer: P,
        fences: FenceBackend,
        binding: Arc<OutputSurfaceBinding>,
    ) -> Self {
        Self {
            scheduler: FrameScheduler::new(settings),
            producer,
            fences,
            binding,
            defer_swap_ack: false,
        }
    }

    pub fn with_deferred_swap_ack(mut self, defer: bool) -> Self {
        self.defer_swap_ack = defer;
        self
    }

    pub fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut FrameScheduler {
        &mut self.scheduler
    }

    pub fn producer_mut(&mut self) -> &mut P {
        &mut self.producer
    }

    pub fn binding(&self) -> &Arc<OutputSurfaceBinding> {
        &self.binding
    }

    pub fn run_cycle(&mut self, params: VSyncParameters) -> FrameSyncResult<FrameCycle> {
        self.run_cycle_at(params, Instant::now())
    }

    /// ### English
    /// Runs one complete cycle for a vsync tick observed at `now`.
    ///
    /// Only fatal fence errors and unexpected surface errors are returned; timing misses and
    /// failed draws are reported through [`FrameCycle`] and the scheduler stats. A fence that
    /// cannot be inserted degrades that frame to the finish + fixed wait fallback. The draw is
    /// timed on the same clock as `now`.
    ///
    /// ### 中文
    /// 针对在 `now` 观察到的 vsync tick 执行一次完整循环。
    ///
    /// 只返回致命 fence 错误与意外的表面错误；时序未达标与绘制失败通过 [`FrameCycle`] 与调度器
    /// 统计报告。无法插入 fence 时，该帧退化为 finish + 固定等待的兜底路径。绘制耗时以与 `now`
    /// 相同的时钟计量。
    pub fn run_cycle_at(
        &mut self,
        params: VSyncParameters,
        now: Instant,
    ) -> FrameSyncResult<FrameCycle> {
        let request = match self.scheduler.on_vsync_tick_at(params, now) {
            TickOutcome::Ignored(reason) => return Ok(FrameCycle::Skipped(reason)),
            TickOutcome::BeginFrame(request) | TickOutcome::RetryFrame(request) => request,
        };

        let target = match self.binding.lock_surface().get_draw_target() {
            Ok(target) => target,
            Err(err) => {
                self.scheduler.abandon_frame()?;
                return Err(err.into());
            }
        };

        self.scheduler.notify_draw_started_at(now)?;
        let draw_clock = Instant::now();
        let drawn = self.producer.draw_frame(&target, &request);

        if !drawn {
            self.binding.lock_surface().discard_draw(target);
            self.scheduler
                .notify_draw_finished_at(false, now + draw_clock.elapsed())?;
            return Ok(FrameCycle::DrawFailed {
                frame_id: request.frame_id,
                consecutive: self.scheduler.consecutive_failed_draws(),
            });
        }

        let fence = if self.fences.is_supported() {
            match self.fences.create(true) {
                Ok(fence) => Some(fence),
                Err(err) => {
                    warn!(
                        frame_id = request.frame_id,
                        %err,
                        "fence insert failed; finishing instead"
                    );
                    self.fences.flush_and_wait_fallback();
                    None
                }
            }
        } else {
            self.fences.flush_and_wait_fallback();
            None
        };

        let ended = self.binding.lock_surface().end_draw(target, fence);
        self.scheduler
            .notify_draw_finished_at(true, now + draw_clock.elapsed())?;
        match ended {
            Ok(()) => {}
            Err(SurfaceError::StaleDrawable { .. }) => {
                debug!(frame_id = request.frame_id, "draw outlived a resize; discarded");
                self.scheduler.abandon_frame()?;
                return Ok(FrameCycle::Abandoned {
                    frame_id: request.frame_id,
                });
            }
            Err(err) => return Err(err.into()),
        }

        let presented = self.binding.lock_surface().present(None);
        let outcome = match presented {
            Ok(outcome) => outcome,
            Err(err) => {
                let err = FrameSyncError::from(err);
                if err.is_fatal() {
                    error!(frame_id = request.frame_id, %err, "GPU hang while presenting");
                }
                return Err(err);
            }
        };

        if !self.defer_swap_ack {
            self.scheduler.notify_swap_finished()?;
        }
        trace!(frame_id = request.frame_id, buffer = outcome.buffer_id, "frame presented");
        Ok(FrameCycle::Presented {
            frame_id: request.frame_id,
            forced: request.forced,
            outcome,
        })
    }

    /// ### English
    /// Acknowledges a deferred swap.
    ///
    /// ### 中文
    /// 确认一次延迟的 swap。
    pub fn notify_swap_finished(&mut self) -> FrameSyncResult<()> {
        self.scheduler.notify_swap_finished()?;
        Ok(())
    }

    /// ### English
    /// Resizes the bound surface; a kept retry request is abandoned since its drawable is gone.
    ///
    /// Returns whether the size changed. Outstanding drawables are invalidated either way.
    ///
    /// ### 中文
    /// 调整已绑定表面的大小；由于 drawable 已失效，保留的重试请求会被放弃。
    ///
    /// 返回尺寸是否变化。无论如何，未归还的 drawable 都会失效。
    pub fn resize(&mut self, size: PhysicalSize<u32>) -> FrameSyncResult<bool> {
        let resized = self.binding.lock_surface().resize(size);
        if matches!(
            self.scheduler.state(),
            SchedulerState::FrameRequested | SchedulerState::FramePendingDraw
        ) {
            self.scheduler.abandon_frame()?;
        }
        Ok(resized)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::*;
    use crate::engine::fence::SyncBackendKind;
    use crate::engine::scheduler::FrameRequest;
    use crate::engine::surface::{PresentationSurface, SurfaceConfig};
    use crate::engine::test_support::{
        FakePlatform, FakeSyncDriver, PlatformLog, arb_backend, unsupported_backend,
    };
    use crate::engine::vsync::VSyncSource;
    use crate::engine::{SurfaceRegistry, WaitOutcome};

    const INTERVAL: Duration = Duration::from_micros(16_667);

    /// Fails the first `failures` draws, then succeeds.
    struct ScriptedProducer {
        failures: u32,
        drawn: Vec<u64>,
    }

    impl FrameProducer for ScriptedProducer {
        fn draw_frame(&mut self, _target: &DrawableHandle, request: &FrameRequest) -> bool {
            if self.failures > 0 {
                self.failures -= 1;
                return false;
            }
            self.drawn.push(request.frame_id);
            true
        }
    }

    fn binding() -> (Arc<OutputSurfaceBinding>, Arc<Mutex<PlatformLog>>) {
        let (platform, log) = FakePlatform::new();
        let surface = PresentationSurface::new(
            Box::new(platform),
            PhysicalSize::new(32, 32),
            SurfaceConfig::default(),
        );
        let binding = OutputSurfaceBinding::with_registry(
            surface,
            Arc::new(VSyncSource::new()),
            SurfaceRegistry::new(),
        );
        (binding, log)
    }

    fn params_at(t: Instant) -> VSyncParameters {
        VSyncParameters::new(t, INTERVAL).unwrap()
    }

    #[test]
    fn each_tick_presents_one_fenced_frame() {
        let (_ctx, driver, fences) = arb_backend(FakeSyncDriver::new(SyncBackendKind::ArbSync));
        let (binding, log) = binding();
        let producer = ScriptedProducer {
            failures: 0,
            drawn: Vec::new(),
        };
        let mut pipeline =
            FramePipeline::new(SchedulerSettings::default(), producer, fences, binding);

        let base = Instant::now();
        for n in 0..5u32 {
            let now = base + INTERVAL * n;
            let cycle = pipeline.run_cycle_at(params_at(now), now).unwrap();
            let FrameCycle::Presented { frame_id, outcome, .. } = cycle else {
                panic!("tick {n}: {cycle:?}");
            };
            assert_eq!(frame_id, u64::from(n) + 1);
            assert_eq!(outcome.wait, Some(WaitOutcome::Signaled));
        }
        assert_eq!(log.lock().unwrap().presented.len(), 5);
        assert_eq!(driver.deleted().len(), 5);
        assert_eq!(pipeline.producer_mut().drawn, vec![1, 2, 3, 4, 5]);
        assert_eq!(pipeline.scheduler().stats().frames_presented, 5);
    }

    #[test]
    fn repeated_failures_recover_with_a_forced_draw() {
        let (_ctx, _driver, fences) = arb_backend(FakeSyncDriver::new(SyncBackendKind::ArbSync));
        let (binding, log) = binding();
        let producer = ScriptedProducer {
            failures: 3,
            drawn: Vec::new(),
        };
        let mut pipeline =
            FramePipeline::new(SchedulerSettings::default(), producer, fences, binding);

        let base = Instant::now();
        for n in 0..3u32 {
            let now = base + INTERVAL * n;
            assert_eq!(
                pipeline.run_cycle_at(params_at(now), now).unwrap(),
                FrameCycle::DrawFailed {
                    frame_id: 1,
                    consecutive: n + 1
                }
            );
        }
        let now = base + INTERVAL * 3;
        let cycle = pipeline.run_cycle_at(params_at(now), now).unwrap();
        assert!(matches!(
            cycle,
            FrameCycle::Presented {
                frame_id: 2,
                forced: true,
                ..
            }
        ));
        assert_eq!(log.lock().unwrap().presented.len(), 1);
    }

    #[test]
    fn fallback_path_never_creates_fences() {
        let (ctx, fences) = unsupported_backend();
        let (binding, _log) = binding();
        let producer = ScriptedProducer {
            failures: 0,
            drawn: Vec::new(),
        };
        let mut pipeline =
            FramePipeline::new(SchedulerSettings::default(), producer, fences, binding);
        let now = Instant::now();
        let cycle = pipeline.run_cycle_at(params_at(now), now).unwrap();
        let FrameCycle::Presented { outcome, .. } = cycle else {
            panic!("{cycle:?}");
        };
        assert_eq!(outcome.wait, None);
        assert_eq!(ctx.finish_count(), 1);
        assert!(ctx.drivers_untouched());
    }

    #[test]
    fn deferred_acks_throttle_the_next_tick() {
        let (_ctx, _driver, fences) = arb_backend(FakeSyncDriver::new(SyncBackendKind::ArbSync));
        let (binding, _log) = binding();
        let producer = ScriptedProducer {
            failures: 0,
            drawn: Vec::new(),
        };
        let mut pipeline =
            FramePipeline::new(SchedulerSettings::default(), producer, fences, binding)
                .with_deferred_swap_ack(true);

        let base = Instant::now();
        assert!(matches!(
            pipeline.run_cycle_at(params_at(base), base).unwrap(),
            FrameCycle::Presented { .. }
        ));
        let t1 = base + INTERVAL;
        assert_eq!(
            pipeline.run_cycle_at(params_at(t1), t1).unwrap(),
            FrameCycle::Skipped(IgnoreReason::Throttled)
        );
        pipeline.notify_swap_finished().unwrap();
        let t2 = base + INTERVAL * 2;
        assert!(matches!(
            pipeline.run_cycle_at(params_at(t2), t2).unwrap(),
            FrameCycle::Presented { frame_id: 2, .. }
        ));
    }

    /// Resizes the surface from inside the draw, like a window resize racing the producer.
    struct ResizingProducer {
        binding: Arc<OutputSurfaceBinding>,
    }

    impl FrameProducer for ResizingProducer {
        fn draw_frame(&mut self, _target: &DrawableHandle, _request: &FrameRequest) -> bool {
            self.binding.lock_surface().resize(PhysicalSize::new(64, 64));
            true
        }
    }

    #[test]
    fn draws_outliving_a_resize_are_abandoned() {
        let (_ctx, driver, fences) = arb_backend(FakeSyncDriver::new(SyncBackendKind::ArbSync));
        let (binding, log) = binding();
        let producer = ResizingProducer {
            binding: binding.clone(),
        };
        let mut pipeline =
            FramePipeline::new(SchedulerSettings::default(), producer, fences, binding);
        let now = Instant::now();
        assert_eq!(
            pipeline.run_cycle_at(params_at(now), now).unwrap(),
            FrameCycle::Abandoned { frame_id: 1 }
        );
        assert_eq!(pipeline.scheduler().state(), SchedulerState::Idle);
        assert_eq!(pipeline.scheduler().stats().abandoned_frames, 1);
        assert!(log.lock().unwrap().presented.is_empty());
        assert_eq!(driver.deleted().len(), 1);
    }

    #[test]
    fn failed_fence_inserts_fall_back_instead_of_stalling() {
        let (ctx, driver, fences) =
            arb_backend(FakeSyncDriver::new(SyncBackendKind::ArbSync).failing_inserts());
        let (binding, log) = binding();
        let producer = ScriptedProducer {
            failures: 0,
            drawn: Vec::new(),
        };
        let mut pipeline =
            FramePipeline::new(SchedulerSettings::default(), producer, fences, binding.clone());

        let base = Instant::now();
        for n in 0..3u32 {
            let now = base + INTERVAL * n;
            let cycle = pipeline.run_cycle_at(params_at(now), now).unwrap();
            let FrameCycle::Presented { frame_id, outcome, .. } = cycle else {
                panic!("tick {n}: {cycle:?}");
            };
            assert_eq!(frame_id, u64::from(n) + 1);
            assert_eq!(outcome.wait, None);
            assert_eq!(pipeline.scheduler().state(), SchedulerState::Idle);
            assert!(!binding.lock_surface().is_drawing());
        }
        assert_eq!(ctx.finish_count(), 3);
        assert_eq!(driver.inserted_count(), 3);
        assert_eq!(log.lock().unwrap().presented.len(), 3);
    }

    /// Takes a fixed wall-clock time per draw.
    struct SlowProducer(Duration);

    impl FrameProducer for SlowProducer {
        fn draw_frame(&mut self, _target: &DrawableHandle, _request: &FrameRequest) -> bool {
            std::thread::sleep(self.0);
            true
        }
    }

    #[test]
    fn draw_cost_is_measured_against_the_tick_clock() {
        let (_ctx, _driver, fences) = arb_backend(FakeSyncDriver::new(SyncBackendKind::ArbSync));
        let (binding, _log) = binding();
        let mut pipeline = FramePipeline::new(
            SchedulerSettings::default(),
            SlowProducer(Duration::from_millis(2)),
            fences,
            binding,
        );

        // A tick stamped well in the past must not inflate the draw cost.
        // 时间戳远在过去的 tick 不应抬高绘制耗时。
        let now = Instant::now() - Duration::from_secs(2);
        pipeline.run_cycle_at(params_at(now), now).unwrap();
        let cost = pipeline.scheduler().estimated_draw_cost(INTERVAL);
        assert!(cost >= Duration::from_millis(2), "{cost:?}");
        assert!(cost < Duration::from_millis(500), "{cost:?}");
    }

    #[test]
    fn resize_abandons_a_kept_retry_request() {
        let (_ctx, _driver, fences) = arb_backend(FakeSyncDriver::new(SyncBackendKind::ArbSync));
        let (binding, _log) = binding();
        let producer = ScriptedProducer {
            failures: 1,
            drawn: Vec::new(),
        };
        let mut pipeline =
            FramePipeline::new(SchedulerSettings::default(), producer, fences, binding);
        let now = Instant::now();
        pipeline.run_cycle_at(params_at(now), now).unwrap();
        assert_eq!(pipeline.scheduler().state(), SchedulerState::FramePendingDraw);

        assert!(pipeline.resize(PhysicalSize::new(16, 16)).unwrap());
        assert_eq!(pipeline.scheduler().state(), SchedulerState::Idle);
        assert!(!pipeline.resize(PhysicalSize::new(16, 16)).unwrap());
    }

    #[test]
    fn same_size_resize_still_abandons_a_kept_retry_request() {
        let (_ctx, _driver, fences) = arb_backend(FakeSyncDriver::new(SyncBackendKind::ArbSync));
        let (binding, _log) = binding();
        let producer = ScriptedProducer {
            failures: 1,
            drawn: Vec::new(),
        };
        let mut pipeline =
            FramePipeline::new(SchedulerSettings::default(), producer, fences, binding);
        let now = Instant::now();
        pipeline.run_cycle_at(params_at(now), now).unwrap();
        assert_eq!(pipeline.scheduler().state(), SchedulerState::FramePendingDraw);

        assert!(!pipeline.resize(PhysicalSize::new(32, 32)).unwrap());
        assert_eq!(pipeline.scheduler().state(), SchedulerState::Idle);
        assert_eq!(pipeline.scheduler().stats().abandoned_frames, 1);
    }
}
