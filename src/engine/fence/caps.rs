//! ### English
//! GPU capability snapshot consumed by fence backend selection.
//!
//! ### 中文
//! fence backend 选择所使用的 GPU 能力快照。

use std::collections::HashSet;

use super::SyncBackendKind;

/// ### English
/// Parsed GL / GLES context version.
///
/// ### 中文
/// 解析后的 GL / GLES 上下文版本。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GlVersion {
    pub major: u32,
    pub minor: u32,
    pub is_gles: bool,
}

impl GlVersion {
    pub const fn new(major: u32, minor: u32, is_gles: bool) -> Self {
        Self {
            major,
            minor,
            is_gles,
        }
    }

    #[inline]
    pub fn at_least(&self, major: u32, minor: u32) -> bool {
        self.major > major || (self.major == major && self.minor >= minor)
    }
}

/// ### English
/// Parses a `GL_VERSION` string.
///
/// Expected forms: `"4.6.0 ..."` or `"OpenGL ES 3.2 ..."`. Unparseable parts read as `0`.
///
/// ### 中文
/// 解析 `GL_VERSION` 字符串。
///
/// 期望的版本字符串形式：`"4.6.0 ..."` 或 `"OpenGL ES 3.2 ..."`。无法解析的部分按 `0` 处理。
pub fn parse_gl_version(version: &str) -> GlVersion {
    let is_gles = version.starts_with("OpenGL ES");
    let mut major = 0u32;
    let mut minor = 0u32;
    let number_token = version
        .split_whitespace()
        .find(|t| t.chars().next().is_some_and(|c| c.is_ascii_digit()));
    if let Some(token) = number_token {
        let mut parts = token.split('.');
        if let Some(m) = parts.next().and_then(|s| s.parse::<u32>().ok()) {
            major = m;
        }
        if let Some(n) = parts.next().and_then(|s| s.parse::<u32>().ok()) {
            minor = n;
        }
    }
    GlVersion {
        major,
        minor,
        is_gles,
    }
}

/// ### English
/// Extension/version flags exposed by the GPU context.
///
/// ### 中文
/// GPU 上下文暴露的扩展/版本标志。
#[derive(Clone, Debug, Default)]
pub struct GpuCapabilities {
    /// ### English
    /// Context version.
    ///
    /// ### 中文
    /// 上下文版本。
    pub version: GlVersion,
    /// ### English
    /// GL extension strings (e.g. `GL_ARB_sync`).
    ///
    /// ### 中文
    /// GL 扩展字符串（例如 `GL_ARB_sync`）。
    pub gl_extensions: HashSet<String>,
    /// ### English
    /// EGL display extension strings (e.g. `EGL_KHR_fence_sync`).
    ///
    /// ### 中文
    /// EGL display 扩展字符串（例如 `EGL_KHR_fence_sync`）。
    pub egl_extensions: HashSet<String>,
    /// ### English
    /// The platform is known to have unreliable EGL sync objects.
    ///
    /// ### 中文
    /// 已知该平台的 EGL sync 对象不可靠。
    pub egl_sync_unreliable: bool,
}

impl GpuCapabilities {
    pub fn new(version: GlVersion) -> Self {
        Self {
            version,
            ..Self::default()
        }
    }

    pub fn with_gl_extension(mut self, name: impl Into<String>) -> Self {
        self.gl_extensions.insert(name.into());
        self
    }

    pub fn with_egl_extension(mut self, name: impl Into<String>) -> Self {
        self.egl_extensions.insert(name.into());
        self
    }

    pub fn with_egl_sync_unreliable(mut self, unreliable: bool) -> Self {
        self.egl_sync_unreliable = unreliable;
        self
    }

    /// ### English
    /// Cross-vendor sync objects: extension present, or guaranteed by desktop GL 3.2+ / GLES 3.0+.
    ///
    /// ### 中文
    /// 跨厂商 sync 对象：扩展存在，或由桌面 GL 3.2+ / GLES 3.0+ 保证。
    pub fn supports_arb_sync(&self) -> bool {
        if self.gl_extensions.contains("GL_ARB_sync") {
            return true;
        }
        if self.version.is_gles {
            self.version.at_least(3, 0)
        } else {
            self.version.at_least(3, 2)
        }
    }

    pub fn supports_egl_sync(&self) -> bool {
        self.egl_extensions.contains("EGL_KHR_fence_sync") && !self.egl_sync_unreliable
    }

    pub fn supports_vendor_fence(&self) -> bool {
        self.gl_extensions.contains("GL_NV_fence") || self.gl_extensions.contains("GL_APPLE_fence")
    }

    /// ### English
    /// Returns whether `kind` is usable with these capabilities.
    ///
    /// ### 中文
    /// 返回在当前能力下 `kind` 是否可用。
    pub fn supports(&self, kind: SyncBackendKind) -> bool {
        match kind {
            SyncBackendKind::ArbSync => self.supports_arb_sync(),
            SyncBackendKind::EglSync => self.supports_egl_sync(),
            SyncBackendKind::VendorSync => self.supports_vendor_fence(),
        }
    }

    /// ### English
    /// Capability-matching backends in preference order.
    ///
    /// ### 中文
    /// 按优先级排列的、能力匹配的 backend 列表。
    pub fn candidate_backends(&self) -> impl Iterator<Item = SyncBackendKind> + '_ {
        SyncBackendKind::PREFERENCE
            .into_iter()
            .filter(|kind| self.supports(*kind))
    }
}
