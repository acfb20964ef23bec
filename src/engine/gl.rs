//! ### English
//! `glow`-backed GPU context and cross-vendor sync object driver.
//!
//! Only the `GL_ARB_sync` mechanism is served here; EGL and vendor fences are provided by
//! embedders through their own [`SyncDriver`] implementations.
//!
//! ### 中文
//! 基于 `glow` 的 GPU 上下文与跨厂商 sync 对象驱动。
//!
//! 这里只提供 `GL_ARB_sync` 机制；EGL 与厂商 fence 由宿主通过自己的 [`SyncDriver`] 实现提供。

use std::sync::Arc;
use std::time::{Duration, Instant};

use glow::HasContext as _;
use tracing::debug;

use crate::engine::fence::{
    FenceError, GpuCapabilities, GpuContext, NativeSync, SyncBackendKind, SyncDriver, SyncStatus,
    parse_gl_version,
};

/// ### English
/// Longest single `glClientWaitSync` timeout (the API takes a signed 32-bit nanosecond value).
///
/// ### 中文
/// 单次 `glClientWaitSync` 的最长超时（该 API 接受有符号 32 位纳秒值）。
const MAX_WAIT_CHUNK_NS: u64 = i32::MAX as u64;

#[inline]
fn to_native(sync: NativeSync) -> glow::NativeFence {
    glow::NativeFence(sync.0 as usize as _)
}

#[inline]
fn from_native(fence: glow::NativeFence) -> NativeSync {
    NativeSync(fence.0 as usize as u64)
}

/// ### English
/// `GLsync` driver over a shared `glow` context.
///
/// ### 中文
/// 基于共享 `glow` 上下文的 `GLsync` 驱动。
pub struct GlowArbSyncDriver {
    glow: Arc<glow::Context>,
}

/*
### English
The GL context is only touched from the thread where it is current; the producer thread owns both
the context and every fence created from it.

### 中文
GL 上下文只在其为 current 的线程上访问；生产者线程同时拥有上下文及由其创建的所有 fence。
*/
unsafe impl Send for GlowArbSyncDriver {}
unsafe impl Sync for GlowArbSyncDriver {}

impl GlowArbSyncDriver {
    pub fn new(glow: Arc<glow::Context>) -> Self {
        Self { glow }
    }
}

impl SyncDriver for GlowArbSyncDriver {
    fn kind(&self) -> SyncBackendKind {
        SyncBackendKind::ArbSync
    }

    fn insert_fence(&self) -> Result<NativeSync, FenceError> {
        let fence = unsafe { self.glow.fence_sync(glow::SYNC_GPU_COMMANDS_COMPLETE, 0) }.map_err(
            |reason| FenceError::InsertFailed {
                kind: SyncBackendKind::ArbSync,
                reason,
            },
        )?;
        let sync = from_native(fence);
        if sync.0 == 0 {
            return Err(FenceError::InsertFailed {
                kind: SyncBackendKind::ArbSync,
                reason: "glFenceSync returned null".to_string(),
            });
        }
        Ok(sync)
    }

    fn poll(&self, sync: NativeSync) -> SyncStatus {
        match unsafe { self.glow.get_sync_status(to_native(sync)) } {
            glow::SIGNALED => SyncStatus::Signaled,
            glow::UNSIGNALED => SyncStatus::Unsignaled,
            _ => SyncStatus::Failed,
        }
    }

    fn client_wait(&self, sync: NativeSync, timeout: Option<Duration>) -> SyncStatus {
        let fence = to_native(sync);
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let chunk_ns = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    (remaining.as_nanos() as u64).min(MAX_WAIT_CHUNK_NS)
                }
                None => MAX_WAIT_CHUNK_NS,
            };
            let status = unsafe {
                self.glow
                    .client_wait_sync(fence, glow::SYNC_FLUSH_COMMANDS_BIT, chunk_ns as i32)
            };
            match status {
                glow::ALREADY_SIGNALED | glow::CONDITION_SATISFIED => return SyncStatus::Signaled,
                glow::TIMEOUT_EXPIRED => {
                    if deadline.is_some_and(|d| Instant::now() >= d) {
                        return SyncStatus::TimeoutExpired;
                    }
                }
                _ => return SyncStatus::Failed,
            }
        }
    }

    fn server_wait(&self, sync: NativeSync) {
        unsafe {
            self.glow
                .wait_sync(to_native(sync), 0, glow::TIMEOUT_IGNORED);
        }
    }

    fn delete(&self, sync: NativeSync) {
        unsafe {
            self.glow.delete_sync(to_native(sync));
        }
    }
}

/// ### English
/// [`GpuContext`] over a `glow::Context`.
///
/// Must be created on the thread where the context is current.
///
/// ### 中文
/// 基于 `glow::Context` 的 [`GpuContext`]。
///
/// 必须在该上下文为 current 的线程上创建。
pub struct GlowGpuContext {
    glow: Arc<glow::Context>,
    capabilities: GpuCapabilities,
    arb_sync: Arc<GlowArbSyncDriver>,
}

unsafe impl Send for GlowGpuContext {}
unsafe impl Sync for GlowGpuContext {}

impl GlowGpuContext {
    /// ### English
    /// Reads `GL_VERSION` and the GL extension list from the current context.
    ///
    /// ### 中文
    /// 从当前上下文读取 `GL_VERSION` 与 GL 扩展列表。
    pub fn from_glow(glow: Arc<glow::Context>) -> Self {
        let version_string = unsafe { glow.get_parameter_string(glow::VERSION) };
        let mut capabilities = GpuCapabilities::new(parse_gl_version(&version_string));
        capabilities
            .gl_extensions
            .extend(glow.supported_extensions().iter().cloned());
        debug!(
            version = %version_string,
            extensions = capabilities.gl_extensions.len(),
            "glow context capabilities"
        );

        let arb_sync = Arc::new(GlowArbSyncDriver::new(glow.clone()));
        Self {
            glow,
            capabilities,
            arb_sync,
        }
    }

    /// ### English
    /// Adds EGL display extensions, which `glow` cannot query.
    ///
    /// ### 中文
    /// 补充 `glow` 无法查询的 EGL display 扩展。
    pub fn with_egl_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities
            .egl_extensions
            .extend(extensions.into_iter().map(Into::into));
        self
    }
}

impl GpuContext for GlowGpuContext {
    fn capabilities(&self) -> GpuCapabilities {
        self.capabilities.clone()
    }

    fn sync_driver(&self, kind: SyncBackendKind) -> Option<Arc<dyn SyncDriver>> {
        match kind {
            SyncBackendKind::ArbSync => Some(self.arb_sync.clone() as Arc<dyn SyncDriver>),
            SyncBackendKind::EglSync | SyncBackendKind::VendorSync => None,
        }
    }

    fn flush(&self) {
        unsafe {
            self.glow.flush();
        }
    }

    fn finish(&self) {
        unsafe {
            self.glow.finish();
        }
    }
}
