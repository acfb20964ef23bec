//! ### English
//! Two-buffer arena indexed by a role bit.
//!
//! ### 中文
//! 以角色位索引的双缓冲区数组。

use dpi::PhysicalSize;
use tracing::{debug, trace, warn};

use super::{
    Buffer, BufferRole, DamageRect, DrawableHandle, PresentOutcome, PresentWait, SurfaceConfig,
    SurfaceError, SurfacePlatform,
};
use crate::engine::fence::{Fence, WaitOutcome};

/// ### English
/// Double-buffered surface mutated only by the producer thread.
///
/// ### 中文
/// 仅由生产者线程修改的双缓冲表面。
pub struct PresentationSurface {
    platform: Box<dyn SurfacePlatform>,
    config: SurfaceConfig,
    buffers: [Buffer; 2],
    /// ### English
    /// Index of the back buffer in `buffers`; flipped with `^= 1` on present.
    ///
    /// ### 中文
    /// 后缓冲区在 `buffers` 中的下标；呈现时以 `^= 1` 翻转。
    back: usize,
    size: PhysicalSize<u32>,
    generation: u64,
    drawing: bool,
    last_damage: Option<DamageRect>,
}

impl PresentationSurface {
    /// ### English
    /// Creates a surface; buffer storage is allocated lazily by [`Self::get_draw_target`].
    ///
    /// ### 中文
    /// 创建表面；缓冲区存储由 [`Self::get_draw_target`] 延迟分配。
    pub fn new(
        platform: Box<dyn SurfacePlatform>,
        size: PhysicalSize<u32>,
        config: SurfaceConfig,
    ) -> Self {
        Self {
            platform,
            config,
            buffers: [Buffer::new(0, BufferRole::Front), Buffer::new(1, BufferRole::Back)],
            back: 1,
            size,
            generation: 0,
            drawing: false,
            last_damage: None,
        }
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_drawing(&self) -> bool {
        self.drawing
    }

    pub fn last_damage(&self) -> Option<DamageRect> {
        self.last_damage
    }

    pub fn buffer(&self, role: BufferRole) -> &Buffer {
        match role {
            BufferRole::Back => &self.buffers[self.back],
            BufferRole::Front => &self.buffers[self.back ^ 1],
        }
    }

    /// ### English
    /// Opens a drawing session on the back buffer.
    ///
    /// Only one handle may be outstanding. Redrawing a finished but unpresented back buffer
    /// discards that frame.
    ///
    /// ### 中文
    /// 在后缓冲区上开启一次绘制会话。
    ///
    /// 同一时间只能存在一个句柄。重绘一个已完成但尚未呈现的后缓冲区会丢弃那一帧。
    pub fn get_draw_target(&mut self) -> Result<DrawableHandle, SurfaceError> {
        if self.drawing {
            warn!(generation = self.generation, "drawable requested while one is outstanding");
            return Err(SurfaceError::DrawInProgress);
        }
        if self.size.width == 0 || self.size.height == 0 {
            return Err(SurfaceError::EmptySurface);
        }

        let size = self.size;
        let back = &mut self.buffers[self.back];
        let native = match back.storage {
            Some(native) => native,
            None => {
                let native = self.platform.allocate(size)?;
                debug!(buffer = back.id, ?size, "allocated buffer storage");
                back.storage = Some(native);
                native
            }
        };
        if back.ready {
            debug!(buffer = back.id, "discarding unpresented frame");
        }
        back.reset_contents();
        self.drawing = true;

        Ok(DrawableHandle {
            buffer_id: back.id,
            generation: self.generation,
            native,
            size,
        })
    }

    /// ### English
    /// Closes the drawing session and attaches the end-of-draw fence to the back buffer.
    ///
    /// A handle from an older generation is rejected with [`SurfaceError::StaleDrawable`] and its
    /// fence is dropped.
    ///
    /// ### 中文
    /// 结束绘制会话，并把绘制结束 fence 挂到后缓冲区上。
    ///
    /// 旧代数的句柄会以 [`SurfaceError::StaleDrawable`] 被拒绝，其 fence 被丢弃。
    pub fn end_draw(
        &mut self,
        handle: DrawableHandle,
        fence: Option<Fence>,
    ) -> Result<(), SurfaceError> {
        self.check_handle(&handle)?;
        let size = self.size;
        let back = &mut self.buffers[self.back];
        back.fence = fence;
        back.dirty_region = Some(DamageRect::full(size));
        back.ready = true;
        self.drawing = false;
        trace!(buffer = back.id, generation = self.generation, "draw ended");
        Ok(())
    }

    /// ### English
    /// Closes a drawing session whose draw failed; the back buffer keeps no frame.
    ///
    /// Stale handles are ignored: the resize already closed their session.
    ///
    /// ### 中文
    /// 结束一次绘制失败的会话；后缓冲区不保留任何帧。
    ///
    /// 过期句柄会被忽略：resize 已经结束了它们的会话。
    pub fn discard_draw(&mut self, handle: DrawableHandle) {
        if self.check_handle(&handle).is_ok() {
            self.buffers[self.back].reset_contents();
            self.drawing = false;
        }
    }

    fn check_handle(&self, handle: &DrawableHandle) -> Result<(), SurfaceError> {
        if handle.generation != self.generation || handle.buffer_id != self.buffers[self.back].id
        {
            warn!(
                handle = handle.generation,
                current = self.generation,
                "stale drawable rejected"
            );
            return Err(SurfaceError::StaleDrawable {
                handle: handle.generation,
                current: self.generation,
            });
        }
        if !self.drawing {
            return Err(SurfaceError::NotDrawing);
        }
        Ok(())
    }

    /// ### English
    /// Presents the finished back buffer.
    ///
    /// Commits and waits for the end-of-draw fence, flips the roles, pushes the new front buffer
    /// to the platform with `damage` (clipped; defaults to the dirty region) and records it as
    /// `last_damage`. A fence timeout is returned as [`SurfaceError::Fence`] and nothing is
    /// presented.
    ///
    /// ### 中文
    /// 呈现已完成的后缓冲区。
    ///
    /// 提交并等待绘制结束 fence、翻转角色，并将新的前缓冲区连同 `damage`（会被裁剪；默认为脏区域）
    /// 推送给平台，同时记录为 `last_damage`。fence 超时会以 [`SurfaceError::Fence`] 返回，
    /// 此时不会呈现任何内容。
    pub fn present(&mut self, damage: Option<DamageRect>) -> Result<PresentOutcome, SurfaceError> {
        if self.drawing {
            return Err(SurfaceError::DrawInProgress);
        }
        let size = self.size;
        let back = &mut self.buffers[self.back];
        let Some(native) = back.storage.filter(|_| back.ready) else {
            return Err(SurfaceError::NothingToPresent);
        };

        let wait = match back.fence.as_mut() {
            Some(fence) => {
                fence.commit();
                let outcome = match self.config.present_wait {
                    PresentWait::Client => fence.client_wait()?,
                    PresentWait::Server => fence.server_wait()?,
                };
                if outcome == WaitOutcome::Skipped {
                    warn!(buffer = back.id, "fence still unflushed; present withheld");
                    return Err(SurfaceError::UnflushedFence);
                }
                Some(outcome)
            }
            None => None,
        };

        let damage = damage
            .or(back.dirty_region)
            .unwrap_or(DamageRect::full(size))
            .clamp_to(size);
        let buffer_id = back.id;
        back.reset_contents();
        back.role = BufferRole::Front;

        self.back ^= 1;
        let new_back = &mut self.buffers[self.back];
        new_back.role = BufferRole::Back;
        new_back.reset_contents();

        self.platform.present_buffer(native, damage);
        self.last_damage = Some(damage);
        trace!(buffer = buffer_id, ?damage, "presented");

        Ok(PresentOutcome {
            buffer_id,
            damage,
            wait,
        })
    }

    /// ### English
    /// Resizes the surface, invalidating both buffers and any outstanding drawable.
    ///
    /// Invalidation is unconditional, even for the current size. Returns whether the size changed.
    ///
    /// ### 中文
    /// 调整表面大小，使两个缓冲区以及任何未归还的 drawable 失效。
    ///
    /// 即使尺寸未变也总会失效。返回尺寸是否变化。
    pub fn resize(&mut self, size: PhysicalSize<u32>) -> bool {
        let changed = size != self.size;
        self.release_storage();
        self.size = size;
        self.drawing = false;
        self.last_damage = None;
        self.generation += 1;
        debug!(?size, changed, generation = self.generation, "surface resized");
        changed
    }

    fn release_storage(&mut self) {
        for buffer in &mut self.buffers {
            buffer.reset_contents();
            if let Some(native) = buffer.storage.take() {
                self.platform.release(native);
            }
        }
    }
}

impl Drop for PresentationSurface {
    fn drop(&mut self) {
        self.release_storage();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::engine::fence::{FenceError, SyncBackendKind};
    use crate::engine::test_support::{FakePlatform, FakeSyncDriver, PlatformLog, arb_backend};

    fn surface(config: SurfaceConfig) -> (PresentationSurface, Arc<Mutex<PlatformLog>>) {
        let (platform, log) = FakePlatform::new();
        let surface = PresentationSurface::new(Box::new(platform), PhysicalSize::new(64, 32), config);
        (surface, log)
    }

    #[test]
    fn allocates_lazily_and_allows_a_single_outstanding_handle() {
        let (mut surface, log) = surface(SurfaceConfig::default());
        assert!(log.lock().unwrap().allocated.is_empty());

        let handle = surface.get_draw_target().unwrap();
        assert_eq!(handle.size, PhysicalSize::new(64, 32));
        assert_eq!(log.lock().unwrap().allocated.len(), 1);
        assert!(matches!(
            surface.get_draw_target(),
            Err(SurfaceError::DrawInProgress)
        ));
        assert!(matches!(
            surface.present(None),
            Err(SurfaceError::DrawInProgress)
        ));

        surface.discard_draw(handle);
        assert!(matches!(
            surface.present(None),
            Err(SurfaceError::NothingToPresent)
        ));
        let again = surface.get_draw_target().unwrap();
        assert_eq!(log.lock().unwrap().allocated.len(), 1);
        assert_eq!(again.buffer_id, 1);
    }

    #[test]
    fn present_waits_on_the_fence_and_flips_roles() {
        let (_ctx, driver, backend) = arb_backend(FakeSyncDriver::new(SyncBackendKind::ArbSync));
        let (mut surface, log) = surface(SurfaceConfig::default());

        let handle = surface.get_draw_target().unwrap();
        let native = handle.native;
        surface
            .end_draw(handle, Some(backend.create(true).unwrap()))
            .unwrap();
        assert!(surface.buffer(BufferRole::Back).has_fence());

        let damage = DamageRect::new(4, 4, 100, 8);
        let outcome = surface.present(Some(damage)).unwrap();
        assert_eq!(outcome.buffer_id, 1);
        assert_eq!(outcome.wait, Some(WaitOutcome::Signaled));
        assert_eq!(outcome.damage, DamageRect::new(4, 4, 60, 8));
        assert_eq!(surface.last_damage(), Some(outcome.damage));
        assert_eq!(driver.client_wait_count(), 1);
        assert_eq!(driver.deleted().len(), 1);

        assert_eq!(surface.buffer(BufferRole::Front).id(), 1);
        assert_eq!(surface.buffer(BufferRole::Back).id(), 0);
        assert_eq!(
            log.lock().unwrap().presented,
            vec![(native, DamageRect::new(4, 4, 60, 8))]
        );

        let next = surface.get_draw_target().unwrap();
        assert_eq!(next.buffer_id, 0);
        assert_ne!(next.native, native);
    }

    #[test]
    fn server_wait_mode_queues_the_wait_on_the_gpu() {
        let (_ctx, driver, backend) = arb_backend(FakeSyncDriver::new(SyncBackendKind::ArbSync));
        let (mut surface, _log) = surface(SurfaceConfig {
            present_wait: PresentWait::Server,
        });
        let handle = surface.get_draw_target().unwrap();
        surface
            .end_draw(handle, Some(backend.create(true).unwrap()))
            .unwrap();
        let outcome = surface.present(None).unwrap();
        assert_eq!(outcome.wait, Some(WaitOutcome::QueuedOnGpu));
        assert_eq!(outcome.damage, DamageRect::full(PhysicalSize::new(64, 32)));
        assert_eq!(driver.server_wait_count(), 1);
        assert_eq!(driver.client_wait_count(), 0);
    }

    #[test]
    fn resize_invalidates_outstanding_handles() {
        let (mut surface, log) = surface(SurfaceConfig::default());
        let handle = surface.get_draw_target().unwrap();
        let old_native = handle.native;

        assert!(surface.resize(PhysicalSize::new(128, 64)));
        assert_eq!(surface.generation(), 1);
        assert!(!surface.is_drawing());
        assert_eq!(log.lock().unwrap().released, vec![old_native]);

        let err = surface.end_draw(handle, None).unwrap_err();
        assert!(matches!(
            err,
            SurfaceError::StaleDrawable {
                handle: 0,
                current: 1
            }
        ));

        let fresh = surface.get_draw_target().unwrap();
        assert_eq!(fresh.generation, 1);
        assert_eq!(fresh.size, PhysicalSize::new(128, 64));
        surface.end_draw(fresh, None).unwrap();
        assert_eq!(surface.present(None).unwrap().wait, None);
    }

    #[test]
    fn resize_to_the_same_size_still_invalidates_handles() {
        let (mut surface, log) = surface(SurfaceConfig::default());
        let handle = surface.get_draw_target().unwrap();
        let native = handle.native;
        assert!(!surface.resize(PhysicalSize::new(64, 32)));
        assert_eq!(surface.generation(), 1);
        assert!(!surface.is_drawing());
        assert_eq!(log.lock().unwrap().released, vec![native]);
        assert!(matches!(
            surface.end_draw(handle, None),
            Err(SurfaceError::StaleDrawable {
                handle: 0,
                current: 1
            })
        ));

        let fresh = surface.get_draw_target().unwrap();
        assert_eq!(fresh.generation, 1);
        assert_ne!(fresh.native, native);
        assert_eq!(log.lock().unwrap().allocated.len(), 2);
    }

    #[test]
    fn present_flushes_an_unflushed_fence_before_handing_the_buffer_over() {
        let (ctx, driver, backend) = arb_backend(FakeSyncDriver::new(SyncBackendKind::ArbSync));
        let (mut surface, log) = surface(SurfaceConfig::default());
        let handle = surface.get_draw_target().unwrap();
        surface
            .end_draw(handle, Some(backend.create(false).unwrap()))
            .unwrap();
        assert_eq!(ctx.flush_count(), 0);

        let outcome = surface.present(None).unwrap();
        assert_eq!(outcome.wait, Some(WaitOutcome::Signaled));
        assert_eq!(ctx.flush_count(), 1);
        assert_eq!(driver.client_wait_count(), 1);
        assert_eq!(log.lock().unwrap().presented.len(), 1);
    }

    #[test]
    fn resize_drops_pending_fences() {
        let (_ctx, driver, backend) = arb_backend(FakeSyncDriver::new(SyncBackendKind::ArbSync));
        let (mut surface, _log) = surface(SurfaceConfig::default());
        let handle = surface.get_draw_target().unwrap();
        surface
            .end_draw(handle, Some(backend.create(true).unwrap()))
            .unwrap();
        surface.resize(PhysicalSize::new(10, 10));
        assert_eq!(driver.deleted().len(), 1);
        assert!(matches!(
            surface.present(None),
            Err(SurfaceError::NothingToPresent)
        ));
    }

    #[test]
    fn fence_timeout_prevents_the_present() {
        use crate::engine::fence::{FenceBackend, FenceConfig, GlVersion, GpuCapabilities};
        use crate::engine::test_support::FakeGpuContext;
        use std::time::Duration;

        let driver = Arc::new(FakeSyncDriver::new(SyncBackendKind::ArbSync).hanging());
        let ctx = Arc::new(
            FakeGpuContext::new(GpuCapabilities::new(GlVersion::new(4, 1, false)))
                .with_driver(driver),
        );
        let backend = FenceBackend::detect(
            ctx,
            FenceConfig {
                client_wait_timeout: Some(Duration::from_millis(1)),
                ..FenceConfig::default()
            },
        );
        let (mut surface, log) = surface(SurfaceConfig::default());
        let handle = surface.get_draw_target().unwrap();
        surface
            .end_draw(handle, Some(backend.create(true).unwrap()))
            .unwrap();
        let err = surface.present(None).unwrap_err();
        assert!(matches!(
            err,
            SurfaceError::Fence(FenceError::WaitTimeout { .. })
        ));
        assert!(log.lock().unwrap().presented.is_empty());
        assert_eq!(surface.buffer(BufferRole::Back).id(), 1);
    }

    #[test]
    fn empty_surface_and_allocation_failures_are_reported() {
        let (platform, _log) = FakePlatform::new();
        let mut surface = PresentationSurface::new(
            Box::new(platform),
            PhysicalSize::new(0, 10),
            SurfaceConfig::default(),
        );
        assert!(matches!(
            surface.get_draw_target(),
            Err(SurfaceError::EmptySurface)
        ));

        let (platform, _log) = FakePlatform::new();
        let mut surface = PresentationSurface::new(
            Box::new(platform.failing_allocations()),
            PhysicalSize::new(10, 10),
            SurfaceConfig::default(),
        );
        assert!(matches!(
            surface.get_draw_target(),
            Err(SurfaceError::AllocationFailed(_))
        ));
        assert!(!surface.is_drawing());
    }

    #[test]
    fn drop_releases_storage() {
        let (mut surface, log) = surface(SurfaceConfig::default());
        let handle = surface.get_draw_target().unwrap();
        surface.end_draw(handle, None).unwrap();
        surface.present(None).unwrap();
        let _ = surface.get_draw_target().unwrap();
        drop(surface);
        assert_eq!(log.lock().unwrap().released.len(), 2);
    }
}
