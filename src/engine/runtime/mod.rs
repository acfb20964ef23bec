//! ### English
//! Frame production runtime: the per-tick pipeline and the thread that drives it.
//!
//! ### 中文
//! 帧生产运行时：逐 tick 的流水线以及驱动它的线程。

mod frame_loop;
mod pipeline;

pub use frame_loop::{FrameLoop, FrameLoopClient};
pub use pipeline::{FrameCycle, FramePipeline, FrameProducer};
