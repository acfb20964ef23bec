/// ### English
/// `xian_frame_sync` crate root.
/// Exposes the C ABI via `ffi`; the frame pacing and GPU synchronization core lives under `engine`.
///
/// ### 中文
/// `xian_frame_sync` 的 crate 根。
/// 通过 `ffi` 导出 C ABI；帧节奏控制与 GPU 同步核心位于 `engine` 模块。
pub mod engine;
mod ffi;

pub use engine::*;
