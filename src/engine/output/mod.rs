//! ### English
//! Output surface binding: glue between a scheduler-driven client, a presentation surface and a
//! vsync source, with at most one mirroring reflector.
//!
//! ### 中文
//! 输出表面绑定：连接由调度器驱动的客户端、呈现表面与 vsync source，并最多支持一个镜像 reflector。
mod binding;
mod registry;

use std::time::Instant;

use crate::engine::vsync::VSyncParameters;

pub use binding::OutputSurfaceBinding;
pub use registry::{SurfaceId, SurfaceRegistry};

/// ### English
/// The frame producer side of a binding.
///
/// ### 中文
/// 绑定中的帧生产方。
pub trait OutputSurfaceClient: Send + Sync {
    fn on_update_vsync_parameters(&self, params: VSyncParameters);

    /// ### English
    /// One vsync edge; the client decides (through its scheduler) whether to draw.
    ///
    /// ### 中文
    /// 一次 vsync 边沿；客户端（通过其调度器）决定是否绘制。
    fn on_begin_frame(&self, frame_time: Instant, params: VSyncParameters);
}

/// ### English
/// Observer mirroring a bound surface elsewhere (e.g. a second display), held weakly.
///
/// ### 中文
/// 在别处（例如第二块显示器）镜像已绑定表面的观察者，以弱引用持有。
pub trait Reflector: Send + Sync {
    /// ### English
    /// The source surface is bound and can be mirrored. Delivered once per bind.
    ///
    /// ### 中文
    /// 源表面已绑定、可以开始镜像。每次绑定只投递一次。
    fn on_source_surface_ready(&self, id: SurfaceId);

    fn on_source_surface_detached(&self, _id: SurfaceId) {}
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingError {
    #[error("surface {0:?} is already bound to a client")]
    AlreadyBound(SurfaceId),

    #[error("surface {0:?} has no bound client")]
    NotBound(SurfaceId),
}
