//! ### English
//! [`OutputSurfaceBinding`]: owns the presentation surface and routes vsync to one client.
//!
//! ### 中文
//! [`OutputSurfaceBinding`]：持有呈现表面，并把 vsync 路由给唯一的客户端。

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;

use tracing::{debug, warn};

use super::{BindingError, OutputSurfaceClient, Reflector, SurfaceId, SurfaceRegistry};
use crate::engine::surface::PresentationSurface;
use crate::engine::vsync::{ObserverId, VSyncObserver, VSyncParameters, VSyncSource};

#[derive(Default)]
struct BindingState {
    client: Option<Arc<dyn OutputSurfaceClient>>,
    observer_id: Option<ObserverId>,
    reflector: Option<Weak<dyn Reflector>>,
    /// ### English
    /// The attached reflector already received `on_source_surface_ready` for the current bind.
    ///
    /// ### 中文
    /// 当前绑定下，已挂接的 reflector 已收到过 `on_source_surface_ready`。
    reflector_notified: bool,
}

/// ### English
/// Binds a [`PresentationSurface`] and a [`VSyncSource`] to one [`OutputSurfaceClient`].
///
/// Callbacks into clients and reflectors always run outside the internal locks.
///
/// ### 中文
/// 把一个 [`PresentationSurface`] 与一个 [`VSyncSource`] 绑定到唯一的 [`OutputSurfaceClient`]。
///
/// 对客户端与 reflector 的回调总是在内部锁之外执行。
pub struct OutputSurfaceBinding {
    id: SurfaceId,
    registry: Arc<SurfaceRegistry>,
    vsync: Arc<VSyncSource>,
    surface: Mutex<PresentationSurface>,
    state: Mutex<BindingState>,
    weak_self: Weak<OutputSurfaceBinding>,
}

impl OutputSurfaceBinding {
    /// ### English
    /// Creates an unbound binding registered (on bind) in the global registry.
    ///
    /// ### 中文
    /// 创建一个未绑定的 binding（绑定时注册到全局注册表）。
    pub fn new(surface: PresentationSurface, vsync: Arc<VSyncSource>) -> Arc<Self> {
        Self::with_registry(surface, vsync, SurfaceRegistry::global())
    }

    pub fn with_registry(
        surface: PresentationSurface,
        vsync: Arc<VSyncSource>,
        registry: Arc<SurfaceRegistry>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            id: SurfaceId::next(),
            registry,
            vsync,
            surface: Mutex::new(surface),
            state: Mutex::new(BindingState::default()),
            weak_self: weak_self.clone(),
        })
    }

    pub fn id(&self) -> SurfaceId {
        self.id
    }

    pub fn vsync_source(&self) -> &Arc<VSyncSource> {
        &self.vsync
    }

    /// ### English
    /// Locks the presentation surface (producer thread only).
    ///
    /// ### 中文
    /// 锁定呈现表面（仅限生产者线程）。
    pub fn lock_surface(&self) -> MutexGuard<'_, PresentationSurface> {
        self.surface.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_state(&self) -> MutexGuard<'_, BindingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_bound(&self) -> bool {
        self.lock_state().client.is_some()
    }

    /// ### English
    /// Binds the client exclusively, registers the surface and starts observing vsync.
    ///
    /// A pending reflector is notified `on_source_surface_ready` once.
    ///
    /// ### 中文
    /// 独占地绑定客户端，注册表面并开始观察 vsync。
    ///
    /// 已挂接的 reflector 会收到一次 `on_source_surface_ready`。
    pub fn bind_to_client(&self, client: Arc<dyn OutputSurfaceClient>) -> Result<(), BindingError> {
        {
            let mut state = self.lock_state();
            if state.client.is_some() {
                warn!(surface = self.id.0, "bind rejected: already bound");
                return Err(BindingError::AlreadyBound(self.id));
            }
            state.client = Some(client);
            state.reflector_notified = false;
        }

        self.registry.register(self.id, self.weak_self.clone());
        let observer: Weak<dyn VSyncObserver> = self.weak_self.clone();
        let observer_id = self.vsync.add_observer(observer);
        self.lock_state().observer_id = Some(observer_id);
        debug!(surface = self.id.0, "bound to client");

        self.notify_reflector_ready();
        Ok(())
    }

    /// ### English
    /// Releases the client and stops observing vsync. The reflector stays attached.
    ///
    /// ### 中文
    /// 释放客户端并停止观察 vsync。reflector 保持挂接。
    pub fn unbind_client(&self) -> Result<(), BindingError> {
        let observer_id = {
            let mut state = self.lock_state();
            if state.client.take().is_none() {
                return Err(BindingError::NotBound(self.id));
            }
            state.observer_id.take()
        };
        self.registry.unregister(self.id);
        if let Some(observer_id) = observer_id {
            self.vsync.remove_observer(observer_id);
        }
        debug!(surface = self.id.0, "client unbound");
        Ok(())
    }

    /// ### English
    /// New display timing reported for this surface: forwarded to the client and to the source's
    /// other observers.
    ///
    /// ### 中文
    /// 本表面上报了新的显示时序：转发给客户端以及 source 的其它观察者。
    pub fn on_update_vsync_parameters(&self, params: VSyncParameters) -> Result<(), BindingError> {
        let (client, observer_id) = {
            let state = self.lock_state();
            match (state.client.clone(), state.observer_id) {
                (Some(client), Some(observer_id)) => (client, observer_id),
                _ => {
                    warn!(surface = self.id.0, "vsync update on an unbound surface");
                    return Err(BindingError::NotBound(self.id));
                }
            }
        };
        client.on_update_vsync_parameters(params);
        self.vsync.update_parameters_from(observer_id, params);
        Ok(())
    }

    /// ### English
    /// Attaches the mirroring reflector, replacing (and detaching) any previous one.
    ///
    /// If a client is already bound the reflector is notified immediately.
    ///
    /// ### 中文
    /// 挂接镜像 reflector，替换（并解除）之前的 reflector。
    ///
    /// 若已有客户端绑定，会立即通知该 reflector。
    pub fn attach_reflector(&self, reflector: Weak<dyn Reflector>) {
        let previous = {
            let mut state = self.lock_state();
            if state
                .reflector
                .as_ref()
                .is_some_and(|old| Weak::ptr_eq(old, &reflector))
            {
                return;
            }
            state.reflector_notified = false;
            state.reflector.replace(reflector)
        };
        if let Some(previous) = previous.and_then(|w| w.upgrade()) {
            previous.on_source_surface_detached(self.id);
        }
        self.notify_reflector_ready();
    }

    /// ### English
    /// Detaches the reflector. Calling it with none attached is a no-op.
    ///
    /// ### 中文
    /// 解除 reflector。未挂接时调用为无操作。
    pub fn detach_reflector(&self) {
        let reflector = self.lock_state().reflector.take();
        if let Some(reflector) = reflector.and_then(|w| w.upgrade()) {
            reflector.on_source_surface_detached(self.id);
        }
    }

    fn notify_reflector_ready(&self) {
        let reflector = {
            let mut state = self.lock_state();
            if state.client.is_none() || state.reflector_notified {
                return;
            }
            let Some(reflector) = state.reflector.as_ref().and_then(Weak::upgrade) else {
                return;
            };
            state.reflector_notified = true;
            reflector
        };
        reflector.on_source_surface_ready(self.id);
    }

    fn client(&self) -> Option<Arc<dyn OutputSurfaceClient>> {
        self.lock_state().client.clone()
    }
}

impl VSyncObserver for OutputSurfaceBinding {
    fn on_update_vsync_parameters(&self, params: VSyncParameters) {
        if let Some(client) = self.client() {
            client.on_update_vsync_parameters(params);
        }
    }

    fn on_vsync_tick(&self, frame_time: Instant, params: VSyncParameters) {
        if let Some(client) = self.client() {
            client.on_begin_frame(frame_time, params);
        }
    }
}

impl Drop for OutputSurfaceBinding {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
        let observer_id = self.lock_state().observer_id.take();
        if let Some(observer_id) = observer_id {
            self.vsync.remove_observer(observer_id);
        }
        self.detach_reflector();
    }
}
