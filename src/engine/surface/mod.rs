//! ### English
//! Double-buffered presentation surface.
//!
//! The producer thread draws into the back buffer through a generation-stamped
//! [`DrawableHandle`], closes the session with an end-of-draw fence, then presents: the surface
//! waits for the fence, flips the roles and pushes the new front buffer to the platform.
//!
//! ### 中文
//! 双缓冲呈现表面。
//!
//! 生产者线程通过带代数戳的 [`DrawableHandle`] 绘制后缓冲区，以绘制结束 fence 结束会话，然后呈现：
//! 表面等待 fence、翻转角色，并把新的前缓冲区推送给平台。
mod buffer;
mod double_buffer;

use dpi::PhysicalSize;

use crate::engine::fence::{FenceError, WaitOutcome};

pub use buffer::{Buffer, BufferRole, DamageRect, NativeBufferHandle};
pub use double_buffer::PresentationSurface;

/// ### English
/// Platform presentation seam: buffer storage and the final present call.
///
/// ### 中文
/// 平台呈现接缝：缓冲区存储与最终的呈现调用。
pub trait SurfacePlatform: Send {
    /// ### English
    /// Allocates storage for one buffer of `size`.
    ///
    /// ### 中文
    /// 为一个 `size` 大小的缓冲区分配存储。
    fn allocate(&mut self, size: PhysicalSize<u32>) -> Result<NativeBufferHandle, SurfaceError>;

    fn release(&mut self, handle: NativeBufferHandle);

    /// ### English
    /// Hands the new front buffer and its damage to the display. The buffer's GPU work is
    /// complete (or queued behind a GPU-side wait) when this is called.
    ///
    /// ### 中文
    /// 将新的前缓冲区及其损伤区域交给显示端。调用时该缓冲区的 GPU 工作已完成
    /// （或已排在 GPU 侧等待之后）。
    fn present_buffer(&mut self, handle: NativeBufferHandle, damage: DamageRect);
}

/// ### English
/// How `present` waits for the back buffer's end-of-draw fence.
///
/// ### 中文
/// `present` 等待后缓冲区绘制结束 fence 的方式。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PresentWait {
    /// ### English
    /// Block the producer thread until the GPU work completes.
    ///
    /// ### 中文
    /// 阻塞生产者线程直到 GPU 工作完成。
    #[default]
    Client,
    /// ### English
    /// Queue a GPU-side wait (presentation happens on the same GPU timeline).
    ///
    /// ### 中文
    /// 插入 GPU 侧等待（呈现发生在同一 GPU 时间线上）。
    Server,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SurfaceConfig {
    pub present_wait: PresentWait,
}

/// ### English
/// Capability to draw into the current back buffer.
///
/// Valid only for the surface generation it was issued in; a resize makes it stale.
///
/// ### 中文
/// 绘制当前后缓冲区的能力凭证。
///
/// 仅在签发时的表面代数内有效；resize 之后即失效。
#[derive(Debug, PartialEq, Eq)]
pub struct DrawableHandle {
    pub buffer_id: u8,
    pub generation: u64,
    pub native: NativeBufferHandle,
    pub size: PhysicalSize<u32>,
}

/// ### English
/// Result of one successful present.
///
/// ### 中文
/// 一次成功呈现的结果。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PresentOutcome {
    pub buffer_id: u8,
    pub damage: DamageRect,
    /// ### English
    /// Outcome of the fence wait, `None` when the frame carried no fence (fallback path).
    ///
    /// ### 中文
    /// fence 等待的结果；帧未携带 fence（兜底路径）时为 `None`。
    pub wait: Option<WaitOutcome>,
}

#[derive(thiserror::Error, Debug)]
pub enum SurfaceError {
    /// ### English
    /// A drawable handle is outstanding; no second handle and no partial-frame present.
    ///
    /// ### 中文
    /// 已有未归还的 drawable 句柄；不允许第二个句柄，也不允许呈现半成品帧。
    #[error("a draw is already in progress on this surface")]
    DrawInProgress,

    #[error("no draw is in progress on this surface")]
    NotDrawing,

    #[error("drawable from generation {handle} is stale (surface generation {current})")]
    StaleDrawable { handle: u64, current: u64 },

    #[error("back buffer holds no finished frame")]
    NothingToPresent,

    #[error("surface has zero size")]
    EmptySurface,

    /// ### English
    /// The end-of-draw fence could not be committed; the buffer stays unpresented.
    ///
    /// ### 中文
    /// 绘制结束 fence 无法提交；缓冲区保持未呈现状态。
    #[error("end-of-draw fence was never flushed")]
    UnflushedFence,

    #[error("buffer allocation failed: {0}")]
    AllocationFailed(String),

    #[error(transparent)]
    Fence(#[from] FenceError),
}
