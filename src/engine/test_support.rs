//! Test doubles shared by the engine unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use dpi::PhysicalSize;

use crate::engine::fence::{
    FenceBackend, FenceConfig, FenceError, GlVersion, GpuCapabilities, GpuContext, NativeSync,
    SyncBackendKind, SyncDriver, SyncStatus,
};
use crate::engine::surface::{DamageRect, NativeBufferHandle, SurfaceError, SurfacePlatform};

#[derive(Default)]
struct FakeDriverLog {
    polls: HashMap<u64, u32>,
    deleted: Vec<u64>,
    server_waits: u32,
    client_waits: u32,
    inserted: u32,
}

/// Sync driver whose fences signal after a configurable number of polls.
pub(crate) struct FakeSyncDriver {
    kind: SyncBackendKind,
    next_handle: AtomicU64,
    signal_after: u32,
    fail_queries: bool,
    hang: bool,
    server_wait: bool,
    fail_inserts: bool,
    log: Mutex<FakeDriverLog>,
}

impl FakeSyncDriver {
    pub(crate) fn new(kind: SyncBackendKind) -> Self {
        Self {
            kind,
            next_handle: AtomicU64::new(0x100),
            signal_after: 0,
            fail_queries: false,
            hang: false,
            server_wait: true,
            fail_inserts: false,
            log: Mutex::new(FakeDriverLog::default()),
        }
    }

    /// The first `polls` polls of each fence report unsignaled.
    pub(crate) fn signal_after(mut self, polls: u32) -> Self {
        self.signal_after = polls;
        self
    }

    pub(crate) fn failing_queries(mut self) -> Self {
        self.fail_queries = true;
        self
    }

    /// Fences never signal; client waits time out.
    pub(crate) fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    pub(crate) fn without_server_wait(mut self) -> Self {
        self.server_wait = false;
        self
    }

    /// Every fence insert fails as if the driver ran out of memory.
    pub(crate) fn failing_inserts(mut self) -> Self {
        self.fail_inserts = true;
        self
    }

    fn log(&self) -> std::sync::MutexGuard<'_, FakeDriverLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn deleted(&self) -> Vec<u64> {
        self.log().deleted.clone()
    }

    pub(crate) fn server_wait_count(&self) -> u32 {
        self.log().server_waits
    }

    pub(crate) fn client_wait_count(&self) -> u32 {
        self.log().client_waits
    }

    pub(crate) fn inserted_count(&self) -> u32 {
        self.log().inserted
    }
}

impl SyncDriver for FakeSyncDriver {
    fn kind(&self) -> SyncBackendKind {
        self.kind
    }

    fn insert_fence(&self) -> Result<NativeSync, FenceError> {
        self.log().inserted += 1;
        if self.fail_inserts {
            return Err(FenceError::InsertFailed {
                kind: self.kind,
                reason: "out of memory".to_string(),
            });
        }
        Ok(NativeSync(self.next_handle.fetch_add(1, Ordering::Relaxed)))
    }

    fn poll(&self, sync: NativeSync) -> SyncStatus {
        if self.fail_queries {
            return SyncStatus::Failed;
        }
        if self.hang {
            return SyncStatus::Unsignaled;
        }
        let mut log = self.log();
        let polls = log.polls.entry(sync.0).or_default();
        *polls += 1;
        if *polls > self.signal_after {
            SyncStatus::Signaled
        } else {
            SyncStatus::Unsignaled
        }
    }

    fn client_wait(&self, _sync: NativeSync, timeout: Option<Duration>) -> SyncStatus {
        self.log().client_waits += 1;
        if self.fail_queries {
            return SyncStatus::Failed;
        }
        if self.hang {
            if let Some(timeout) = timeout {
                std::thread::sleep(timeout);
            }
            return SyncStatus::TimeoutExpired;
        }
        SyncStatus::Signaled
    }

    fn supports_server_wait(&self) -> bool {
        self.server_wait
    }

    fn server_wait(&self, _sync: NativeSync) {
        self.log().server_waits += 1;
    }

    fn delete(&self, sync: NativeSync) {
        self.log().deleted.push(sync.0);
    }
}

/// GPU context with fixed capabilities and counted flush/finish calls.
pub(crate) struct FakeGpuContext {
    capabilities: GpuCapabilities,
    drivers: Vec<Arc<FakeSyncDriver>>,
    flushes: AtomicU32,
    finishes: AtomicU32,
}

impl FakeGpuContext {
    pub(crate) fn new(capabilities: GpuCapabilities) -> Self {
        Self {
            capabilities,
            drivers: Vec::new(),
            flushes: AtomicU32::new(0),
            finishes: AtomicU32::new(0),
        }
    }

    pub(crate) fn with_driver(mut self, driver: Arc<FakeSyncDriver>) -> Self {
        self.drivers.push(driver);
        self
    }

    /// A context able to serve every backend kind.
    pub(crate) fn with_all_drivers(capabilities: GpuCapabilities) -> Arc<Self> {
        let ctx = SyncBackendKind::PREFERENCE
            .into_iter()
            .fold(Self::new(capabilities), |ctx, kind| {
                ctx.with_driver(Arc::new(FakeSyncDriver::new(kind)))
            });
        Arc::new(ctx)
    }

    pub(crate) fn flush_count(&self) -> u32 {
        self.flushes.load(Ordering::Relaxed)
    }

    pub(crate) fn finish_count(&self) -> u32 {
        self.finishes.load(Ordering::Relaxed)
    }

    /// No fence was ever inserted through any driver.
    pub(crate) fn drivers_untouched(&self) -> bool {
        self.drivers.iter().all(|d| d.inserted_count() == 0)
    }
}

impl GpuContext for FakeGpuContext {
    fn capabilities(&self) -> GpuCapabilities {
        self.capabilities.clone()
    }

    fn sync_driver(&self, kind: SyncBackendKind) -> Option<Arc<dyn SyncDriver>> {
        self.drivers
            .iter()
            .find(|d| d.kind == kind)
            .map(|d| d.clone() as Arc<dyn SyncDriver>)
    }

    fn flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    fn finish(&self) {
        self.finishes.fetch_add(1, Ordering::Relaxed);
    }
}

/// Desktop GL 4.5 context backed by `driver` as its only sync driver.
pub(crate) fn arb_backend(
    driver: FakeSyncDriver,
) -> (Arc<FakeGpuContext>, Arc<FakeSyncDriver>, FenceBackend) {
    let driver = Arc::new(driver);
    let ctx = Arc::new(
        FakeGpuContext::new(GpuCapabilities::new(GlVersion::new(4, 5, false)))
            .with_driver(driver.clone()),
    );
    let backend = FenceBackend::detect(ctx.clone(), FenceConfig::default());
    (ctx, driver, backend)
}

/// Backend on a GL 2.1 context without any sync extension.
pub(crate) fn unsupported_backend() -> (Arc<FakeGpuContext>, FenceBackend) {
    let ctx = FakeGpuContext::with_all_drivers(GpuCapabilities::new(GlVersion::new(2, 1, false)));
    let config = FenceConfig {
        fallback_wait: Duration::ZERO,
        ..FenceConfig::default()
    };
    let backend = FenceBackend::detect(ctx.clone(), config);
    (ctx, backend)
}

#[derive(Default, Debug)]
pub(crate) struct PlatformLog {
    pub(crate) allocated: Vec<(NativeBufferHandle, PhysicalSize<u32>)>,
    pub(crate) released: Vec<NativeBufferHandle>,
    pub(crate) presented: Vec<(NativeBufferHandle, DamageRect)>,
}

/// Surface platform recording every call into a shared log.
pub(crate) struct FakePlatform {
    next_handle: u64,
    fail_allocations: bool,
    log: Arc<Mutex<PlatformLog>>,
}

impl FakePlatform {
    pub(crate) fn new() -> (Self, Arc<Mutex<PlatformLog>>) {
        let log = Arc::new(Mutex::new(PlatformLog::default()));
        let platform = Self {
            next_handle: 1,
            fail_allocations: false,
            log: log.clone(),
        };
        (platform, log)
    }

    pub(crate) fn failing_allocations(mut self) -> Self {
        self.fail_allocations = true;
        self
    }

    fn log(&self) -> std::sync::MutexGuard<'_, PlatformLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SurfacePlatform for FakePlatform {
    fn allocate(&mut self, size: PhysicalSize<u32>) -> Result<NativeBufferHandle, SurfaceError> {
        if self.fail_allocations {
            return Err(SurfaceError::AllocationFailed("out of memory".to_string()));
        }
        let handle = NativeBufferHandle(self.next_handle);
        self.next_handle += 1;
        self.log().allocated.push((handle, size));
        Ok(handle)
    }

    fn release(&mut self, handle: NativeBufferHandle) {
        self.log().released.push(handle);
    }

    fn present_buffer(&mut self, handle: NativeBufferHandle, damage: DamageRect) {
        self.log().presented.push((handle, damage));
    }
}

/// Installs a `tracing` subscriber writing to the test harness output. Safe to call repeatedly.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}
