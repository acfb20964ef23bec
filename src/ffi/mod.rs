//! ### English
//! C ABI surface for `xian_frame_sync`.
//!
//! All exported symbols are `extern "C"` functions; structs are `#[repr(C)]`.
//! Timestamps cross the boundary as nanoseconds on the embedder's monotonic clock.
//!
//! ### 中文
//! `xian_frame_sync` 的 C ABI 接口层。
//!
//! 所有导出符号均为 `extern "C"` 函数；结构体使用 `#[repr(C)]`。
//! 时间戳以宿主单调时钟上的纳秒数跨越边界。
mod scheduler;

use crate::engine::flags;

/// ### English
/// C ABI version for `xian_frame_sync`.
///
/// ### 中文
/// `xian_frame_sync` 的 C ABI 版本号。
const XIAN_FRAME_SYNC_ABI_VERSION: u32 = 1;

#[unsafe(no_mangle)]
/// ### English
/// Returns the C ABI version.
///
/// ### 中文
/// 返回 C ABI 版本号。
pub extern "C" fn xian_frame_sync_abi_version() -> u32 {
    XIAN_FRAME_SYNC_ABI_VERSION
}

#[unsafe(no_mangle)]
/// ### English
/// Returns `XIAN_FRAME_SYNC_DEFAULT_FLAGS`.
/// (Panama-friendly constant getter; avoids relying on C headers.)
///
/// ### 中文
/// 返回 `XIAN_FRAME_SYNC_DEFAULT_FLAGS`。
/// （Panama 友好的常量获取函数；避免依赖 C 头文件。）
pub extern "C" fn xian_frame_sync_default_flags() -> u32 {
    flags::XIAN_FRAME_SYNC_DEFAULT_FLAGS
}

#[unsafe(no_mangle)]
/// ### English
/// Returns `XIAN_FRAME_SYNC_FLAG_BEGIN_FRAME_SCHEDULING`.
///
/// ### 中文
/// 返回 `XIAN_FRAME_SYNC_FLAG_BEGIN_FRAME_SCHEDULING`。
pub extern "C" fn xian_frame_sync_flag_begin_frame_scheduling() -> u32 {
    flags::XIAN_FRAME_SYNC_FLAG_BEGIN_FRAME_SCHEDULING
}

#[unsafe(no_mangle)]
/// ### English
/// Returns `XIAN_FRAME_SYNC_FLAG_THROTTLE_FRAME_PRODUCTION`.
///
/// ### 中文
/// 返回 `XIAN_FRAME_SYNC_FLAG_THROTTLE_FRAME_PRODUCTION`。
pub extern "C" fn xian_frame_sync_flag_throttle_frame_production() -> u32 {
    flags::XIAN_FRAME_SYNC_FLAG_THROTTLE_FRAME_PRODUCTION
}

#[unsafe(no_mangle)]
/// ### English
/// Returns `XIAN_FRAME_SYNC_FLAG_BATTERY_SAVING_DISABLES_HI_RES_TIMERS`.
///
/// ### 中文
/// 返回 `XIAN_FRAME_SYNC_FLAG_BATTERY_SAVING_DISABLES_HI_RES_TIMERS`。
pub extern "C" fn xian_frame_sync_flag_battery_saving_disables_hi_res_timers() -> u32 {
    flags::XIAN_FRAME_SYNC_FLAG_BATTERY_SAVING_DISABLES_HI_RES_TIMERS
}

#[unsafe(no_mangle)]
/// ### English
/// Returns `XIAN_FRAME_SYNC_FLAG_RESET_FAILED_DRAWS_ON_PRESENT`.
///
/// ### 中文
/// 返回 `XIAN_FRAME_SYNC_FLAG_RESET_FAILED_DRAWS_ON_PRESENT`。
pub extern "C" fn xian_frame_sync_flag_reset_failed_draws_on_present() -> u32 {
    flags::XIAN_FRAME_SYNC_FLAG_RESET_FAILED_DRAWS_ON_PRESENT
}
