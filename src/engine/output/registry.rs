//! ### English
//! Process-wide lookup from [`SurfaceId`] to live bindings.
//!
//! ### 中文
//! 进程内从 [`SurfaceId`] 到存活绑定的查找表。

use std::collections::HashMap;
use std::hash::{BuildHasherDefault, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};

use super::OutputSurfaceBinding;

/// ### English
/// Opaque surface key.
///
/// ### 中文
/// 不透明的表面键。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(pub u64);

impl SurfaceId {
    /// ### English
    /// Allocates a fresh process-unique id (never `0`).
    ///
    /// ### 中文
    /// 分配一个新的进程内唯一 id（永不为 `0`）。
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// ### English
/// Identity hasher for `SurfaceId` keys (ids are already unique integers).
///
/// ### 中文
/// `SurfaceId` key 的恒等哈希（id 本身已是唯一整数）。
#[derive(Default)]
struct SurfaceIdHasher(u64);

impl Hasher for SurfaceIdHasher {
    fn write(&mut self, bytes: &[u8]) {
        let mut hash = 0u64;
        for chunk in bytes.chunks(8) {
            let mut buf = [0u8; 8];
            buf[..chunk.len()].copy_from_slice(chunk);
            hash ^= u64::from_le_bytes(buf);
        }
        self.0 = hash;
    }

    fn write_u64(&mut self, i: u64) {
        self.0 = i;
    }

    fn finish(&self) -> u64 {
        self.0
    }
}

type SurfaceMap = HashMap<SurfaceId, Weak<OutputSurfaceBinding>, BuildHasherDefault<SurfaceIdHasher>>;

/// ### English
/// Registry of bound output surfaces, held weakly.
///
/// ### 中文
/// 已绑定输出表面的注册表（弱引用持有）。
#[derive(Default)]
pub struct SurfaceRegistry {
    surfaces: Mutex<SurfaceMap>,
}

impl SurfaceRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// ### English
    /// The process-wide registry.
    ///
    /// ### 中文
    /// 进程级全局注册表。
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<SurfaceRegistry>> = OnceLock::new();
        GLOBAL.get_or_init(SurfaceRegistry::new).clone()
    }

    fn lock(&self) -> MutexGuard<'_, SurfaceMap> {
        self.surfaces.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn register(&self, id: SurfaceId, binding: Weak<OutputSurfaceBinding>) {
        self.lock().insert(id, binding);
    }

    pub(super) fn unregister(&self, id: SurfaceId) -> bool {
        self.lock().remove(&id).is_some()
    }

    pub fn lookup(&self, id: SurfaceId) -> Option<Arc<OutputSurfaceBinding>> {
        self.lock().get(&id).and_then(Weak::upgrade)
    }

    pub fn contains(&self, id: SurfaceId) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
