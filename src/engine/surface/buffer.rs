//! ### English
//! Buffer records and damage rectangles of a presentation surface.
//!
//! ### 中文
//! 呈现表面的缓冲区记录与损伤矩形。

use dpi::{PhysicalPosition, PhysicalSize};

use crate::engine::fence::Fence;

/// ### English
/// Opaque platform buffer handle (texture, renderbuffer or native image, cast to `u64`).
///
/// ### 中文
/// 不透明的平台缓冲区句柄（纹理、renderbuffer 或原生 image，转为 `u64`）。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NativeBufferHandle(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferRole {
    Front,
    Back,
}

/// ### English
/// Damaged rectangle in physical pixels.
///
/// ### 中文
/// 以物理像素表示的损伤矩形。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DamageRect {
    pub origin: PhysicalPosition<u32>,
    pub size: PhysicalSize<u32>,
}

impl DamageRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            origin: PhysicalPosition::new(x, y),
            size: PhysicalSize::new(width, height),
        }
    }

    /// ### English
    /// The whole surface of `size`.
    ///
    /// ### 中文
    /// 覆盖整个 `size` 表面的矩形。
    pub fn full(size: PhysicalSize<u32>) -> Self {
        Self {
            origin: PhysicalPosition::new(0, 0),
            size,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size.width == 0 || self.size.height == 0
    }

    /// ### English
    /// Clips the rectangle to a surface of `bounds`.
    ///
    /// ### 中文
    /// 将矩形裁剪到 `bounds` 大小的表面内。
    pub fn clamp_to(&self, bounds: PhysicalSize<u32>) -> Self {
        let x = self.origin.x.min(bounds.width);
        let y = self.origin.y.min(bounds.height);
        let right = self.origin.x.saturating_add(self.size.width).min(bounds.width);
        let bottom = self.origin.y.saturating_add(self.size.height).min(bounds.height);
        Self::new(x, y, right - x, bottom - y)
    }

    /// ### English
    /// Smallest rectangle containing both; empty rectangles are ignored.
    ///
    /// ### 中文
    /// 同时包含两者的最小矩形；空矩形会被忽略。
    pub fn union(&self, other: &DamageRect) -> Self {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x = self.origin.x.min(other.origin.x);
        let y = self.origin.y.min(other.origin.y);
        let right = (self.origin.x + self.size.width).max(other.origin.x + other.size.width);
        let bottom = (self.origin.y + self.size.height).max(other.origin.y + other.size.height);
        Self::new(x, y, right - x, bottom - y)
    }
}

/// ### English
/// One of the two buffers owned by a [`PresentationSurface`](super::PresentationSurface).
///
/// ### 中文
/// [`PresentationSurface`](super::PresentationSurface) 持有的两个缓冲区之一。
#[derive(Debug)]
pub struct Buffer {
    pub(super) id: u8,
    pub(super) role: BufferRole,
    pub(super) storage: Option<NativeBufferHandle>,
    pub(super) dirty_region: Option<DamageRect>,
    /// ### English
    /// End-of-draw fence guarding the GPU work written into this buffer.
    ///
    /// ### 中文
    /// 保护写入本缓冲区的 GPU 工作的绘制结束 fence。
    pub(super) fence: Option<Fence>,
    /// ### English
    /// A finished draw is waiting to be presented.
    ///
    /// ### 中文
    /// 已完成的绘制正在等待呈现。
    pub(super) ready: bool,
}

impl Buffer {
    pub(super) fn new(id: u8, role: BufferRole) -> Self {
        Self {
            id,
            role,
            storage: None,
            dirty_region: None,
            fence: None,
            ready: false,
        }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn role(&self) -> BufferRole {
        self.role
    }

    pub fn storage(&self) -> Option<NativeBufferHandle> {
        self.storage
    }

    pub fn dirty_region(&self) -> Option<DamageRect> {
        self.dirty_region
    }

    pub fn has_fence(&self) -> bool {
        self.fence.is_some()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// ### English
    /// Forgets drawn content and the pending fence (storage is kept).
    ///
    /// ### 中文
    /// 丢弃已绘制内容与待处理 fence（保留存储）。
    pub(super) fn reset_contents(&mut self) {
        self.dirty_region = None;
        self.fence = None;
        self.ready = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_clips_to_bounds() {
        let rect = DamageRect::new(90, 10, 50, 200);
        assert_eq!(
            rect.clamp_to(PhysicalSize::new(100, 100)),
            DamageRect::new(90, 10, 10, 90)
        );
        let outside = DamageRect::new(200, 200, 5, 5).clamp_to(PhysicalSize::new(100, 100));
        assert!(outside.is_empty());
    }

    #[test]
    fn union_ignores_empty_rects() {
        let a = DamageRect::new(0, 0, 10, 10);
        let b = DamageRect::new(20, 5, 10, 10);
        assert_eq!(a.union(&b), DamageRect::new(0, 0, 30, 15));
        assert_eq!(a.union(&DamageRect::new(50, 50, 0, 0)), a);
    }
}
