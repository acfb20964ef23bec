//! ### English
//! Fence backend: selects the synchronization mechanism once and creates fences with it.
//!
//! ### 中文
//! fence backend：只选择一次同步机制，并用它创建 fence。

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::gpu_fence::CommitMark;
use super::{Fence, FenceError, GpuContext, SyncBackendKind, SyncDriver};

/// ### English
/// Fence wait policy.
///
/// ### 中文
/// fence 等待策略。
#[derive(Clone, Copy, Debug)]
pub struct FenceConfig {
    /// ### English
    /// Client wait timeout. `None` waits forever; an expired timeout is a fatal GPU hang.
    ///
    /// ### 中文
    /// CPU 等待超时时间。`None` 表示永久等待；超时视为致命的 GPU 挂起。
    pub client_wait_timeout: Option<Duration>,
    /// ### English
    /// Fixed wait appended to the full-finish fallback when no backend exists.
    ///
    /// ### 中文
    /// 没有 backend 时，在完整 finish 兜底路径之后追加的固定等待。
    pub fallback_wait: Duration,
    /// ### English
    /// Force-disable EGL sync (platforms where it is known unreliable).
    ///
    /// ### 中文
    /// 强制禁用 EGL sync（已知不可靠的平台）。
    pub egl_sync_unreliable: bool,
}

impl Default for FenceConfig {
    fn default() -> Self {
        Self {
            client_wait_timeout: None,
            fallback_wait: Duration::from_millis(1),
            egl_sync_unreliable: false,
        }
    }
}

pub(super) struct SelectedBackend {
    pub(super) kind: SyncBackendKind,
    pub(super) driver: Arc<dyn SyncDriver>,
}

pub(super) struct BackendInner {
    pub(super) context: Arc<dyn GpuContext>,
    pub(super) selected: Option<SelectedBackend>,
    pub(super) config: FenceConfig,
    /// ### English
    /// Number of flush signals observed from the context; unflushed fences commit once it moves.
    ///
    /// ### 中文
    /// 已观察到的上下文 flush 信号次数；未 flush 的 fence 在其递增后才算提交。
    pub(super) flush_generation: AtomicU64,
}

impl BackendInner {
    #[inline]
    pub(super) fn flush_generation(&self) -> u64 {
        self.flush_generation.load(Ordering::Acquire)
    }

    pub(super) fn flush(&self) {
        self.context.flush();
        self.flush_generation.fetch_add(1, Ordering::AcqRel);
    }
}

/// ### English
/// Creates fences using the best mechanism available on one GPU context.
///
/// Cheap to clone; clones share the selected driver and flush bookkeeping.
///
/// ### 中文
/// 在单个 GPU 上下文上使用最佳可用机制创建 fence。
///
/// clone 开销很低；各 clone 共享已选择的驱动与 flush 记录。
#[derive(Clone)]
pub struct FenceBackend {
    inner: Arc<BackendInner>,
}

impl FenceBackend {
    /// ### English
    /// Detects capabilities and selects a backend (first capability match with a driver wins).
    ///
    /// ### 中文
    /// 探测能力并选择 backend（首个能力匹配且有驱动的机制胜出）。
    pub fn detect(context: Arc<dyn GpuContext>, config: FenceConfig) -> Self {
        let mut caps = context.capabilities();
        caps.egl_sync_unreliable |= config.egl_sync_unreliable;

        let selected = caps.candidate_backends().find_map(|kind| {
            let Some(driver) = context.sync_driver(kind) else {
                debug!(%kind, "capability present but no sync driver provided");
                return None;
            };
            Some(SelectedBackend { kind, driver })
        });

        match &selected {
            Some(backend) => debug!(kind = %backend.kind, "selected fence backend"),
            None => warn!("no fence backend available; falling back to finish + fixed wait"),
        }

        Self {
            inner: Arc::new(BackendInner {
                context,
                selected,
                config,
                flush_generation: AtomicU64::new(0),
            }),
        }
    }

    /// ### English
    /// Returns whether fences can be created. When `false`, use [`Self::flush_and_wait_fallback`].
    ///
    /// ### 中文
    /// 返回是否可以创建 fence。为 `false` 时请使用 [`Self::flush_and_wait_fallback`]。
    pub fn is_supported(&self) -> bool {
        self.inner.selected.is_some()
    }

    pub fn kind(&self) -> Option<SyncBackendKind> {
        self.inner.selected.as_ref().map(|s| s.kind)
    }

    pub fn config(&self) -> FenceConfig {
        self.inner.config
    }

    /// ### English
    /// Inserts a fence after the commands submitted so far.
    ///
    /// With `flush = true` the context is flushed before returning and the fence is committed
    /// immediately. Otherwise the fence commits when the next context flush is observed
    /// ([`Self::notify_context_flushed`] or another flushing `create`).
    ///
    /// ### 中文
    /// 在目前已提交的命令之后插入 fence。
    ///
    /// `flush = true` 时返回前会 flush 上下文，fence 立即提交；否则 fence 会在观察到下一次上下文
    /// flush（[`Self::notify_context_flushed`] 或另一次带 flush 的 `create`）后才算提交。
    pub fn create(&self, flush: bool) -> Result<Fence, FenceError> {
        let Some(selected) = self.inner.selected.as_ref() else {
            return Err(FenceError::Unsupported);
        };

        let sync = selected.driver.insert_fence()?;
        let commit = if flush {
            self.inner.flush();
            CommitMark::Committed
        } else {
            CommitMark::AfterFlush(self.inner.flush_generation())
        };

        Ok(Fence::new(
            self.inner.clone(),
            selected.driver.clone(),
            selected.kind,
            sync,
            commit,
            Instant::now(),
        ))
    }

    /// ### English
    /// Flushes the context and records the flush signal.
    ///
    /// ### 中文
    /// flush 上下文并记录该 flush 信号。
    pub fn flush(&self) {
        self.inner.flush();
    }

    /// ### English
    /// Records a flush the embedder performed on the context by other means.
    ///
    /// ### 中文
    /// 记录宿主通过其它方式对上下文执行的 flush。
    pub fn notify_context_flushed(&self) {
        self.inner.flush_generation.fetch_add(1, Ordering::AcqRel);
    }

    /// ### English
    /// Correctness-safe fallback without fences: full pipeline finish plus a fixed wait.
    ///
    /// ### 中文
    /// 无 fence 时的正确性兜底：完整管线 finish 加固定等待。
    pub fn flush_and_wait_fallback(&self) {
        self.inner.context.finish();
        self.inner.flush_generation.fetch_add(1, Ordering::AcqRel);
        let wait = self.inner.config.fallback_wait;
        if !wait.is_zero() {
            thread::sleep(wait);
        }
    }

    pub(super) fn inner(&self) -> &Arc<BackendInner> {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::engine::fence::{GlVersion, GpuCapabilities};
    use crate::engine::test_support::{FakeGpuContext, FakeSyncDriver};

    #[test]
    fn prefers_arb_sync_over_other_backends() {
        let caps = GpuCapabilities::new(GlVersion::new(4, 5, false))
            .with_egl_extension("EGL_KHR_fence_sync")
            .with_gl_extension("GL_NV_fence");
        let ctx = FakeGpuContext::with_all_drivers(caps);
        let backend = FenceBackend::detect(ctx, FenceConfig::default());
        assert_eq!(backend.kind(), Some(SyncBackendKind::ArbSync));
    }

    #[test]
    fn skips_capabilities_without_a_driver() {
        let caps = GpuCapabilities::new(GlVersion::new(4, 5, false))
            .with_egl_extension("EGL_KHR_fence_sync");
        let ctx = FakeGpuContext::new(caps)
            .with_driver(Arc::new(FakeSyncDriver::new(SyncBackendKind::EglSync)));
        let backend = FenceBackend::detect(Arc::new(ctx), FenceConfig::default());
        assert_eq!(backend.kind(), Some(SyncBackendKind::EglSync));
    }

    #[test]
    fn config_can_mark_egl_unreliable() {
        let caps = GpuCapabilities::new(GlVersion::new(2, 0, true))
            .with_egl_extension("EGL_KHR_fence_sync")
            .with_gl_extension("GL_APPLE_fence");
        let ctx = FakeGpuContext::with_all_drivers(caps);
        let config = FenceConfig {
            egl_sync_unreliable: true,
            ..FenceConfig::default()
        };
        let backend = FenceBackend::detect(ctx, config);
        assert_eq!(backend.kind(), Some(SyncBackendKind::VendorSync));
    }

    #[test]
    fn no_sync_extensions_means_unsupported() {
        let caps = GpuCapabilities::new(GlVersion::new(2, 1, false));
        let ctx = FakeGpuContext::with_all_drivers(caps);
        let backend = FenceBackend::detect(ctx.clone(), FenceConfig::default());
        assert!(!backend.is_supported());
        assert!(matches!(backend.create(true), Err(FenceError::Unsupported)));

        backend.flush_and_wait_fallback();
        assert_eq!(ctx.finish_count(), 1);
        assert!(ctx.drivers_untouched());
    }

    #[test]
    fn flushing_create_flushes_the_context() {
        let caps = GpuCapabilities::new(GlVersion::new(3, 3, false));
        let ctx = FakeGpuContext::with_all_drivers(caps);
        let backend = FenceBackend::detect(ctx.clone(), FenceConfig::default());
        let _fence = backend.create(true).unwrap();
        assert_eq!(ctx.flush_count(), 1);
        let _lazy = backend.create(false).unwrap();
        assert_eq!(ctx.flush_count(), 1);
    }
}
