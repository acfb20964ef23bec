//! ### English
//! Dedicated producer thread driving a [`FramePipeline`] from vsync-driven messages.
//!
//! ### 中文
//! 独立生产者线程：由 vsync 消息驱动 [`FramePipeline`]。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Instant;

use crossbeam_channel as channel;
use dpi::PhysicalSize;
use tracing::{debug, error, trace, warn};

use crate::engine::error::FrameSyncResult;
use crate::engine::output::OutputSurfaceClient;
use crate::engine::vsync::VSyncParameters;

use super::pipeline::{FrameCycle, FrameProducer, FramePipeline};

/// ### English
/// Messages into the frame loop thread.
///
/// ### 中文
/// 发往帧循环线程的消息。
enum LoopMessage {
    /// ### English
    /// Wake-up: a tick is waiting in [`CoalescedBeginFrame`].
    ///
    /// ### 中文
    /// 唤醒：[`CoalescedBeginFrame`] 中有待处理的 tick。
    BeginFrame,
    Resize(PhysicalSize<u32>),
    SwapFinished,
    Shutdown,
}

#[derive(Clone, Copy, Debug)]
struct PendingTick {
    frame_time: Instant,
    params: VSyncParameters,
}

/// ### English
/// Latest-wins begin-frame slot shared by the vsync thread and the frame loop.
///
/// A tick arriving while one is still pending replaces it, so a slow producer only ever sees the
/// newest edge and at most one wake-up is queued.
///
/// ### 中文
/// vsync 线程与帧循环共享的 latest-wins begin-frame 槽。
///
/// 若到达时已有待处理 tick，则直接替换，因此慢速生产者只会看到最新的边沿，且最多排队一次唤醒。
#[derive(Default)]
struct CoalescedBeginFrame {
    latest: Mutex<Option<PendingTick>>,
    coalesced: AtomicU64,
}

impl CoalescedBeginFrame {
    fn lock(&self) -> MutexGuard<'_, Option<PendingTick>> {
        self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// ### English
    /// Stores the newest tick. Returns `true` if the slot was empty (a wake-up is needed).
    ///
    /// ### 中文
    /// 写入最新 tick。若槽原本为空（需要唤醒）则返回 `true`。
    fn set(&self, tick: PendingTick) -> bool {
        let replaced = self.lock().replace(tick);
        if replaced.is_some() {
            self.coalesced.fetch_add(1, Ordering::Relaxed);
            trace!("stale begin frame replaced");
        }
        replaced.is_none()
    }

    fn take(&self) -> Option<PendingTick> {
        self.lock().take()
    }
}

/// ### English
/// Sending half shared by [`FrameLoop`] and its clients.
///
/// ### 中文
/// [`FrameLoop`] 与其客户端共享的发送端。
#[derive(Clone)]
struct LoopSender {
    tx: channel::Sender<LoopMessage>,
    begin_frame: Arc<CoalescedBeginFrame>,
}

impl LoopSender {
    fn send(&self, message: LoopMessage) -> bool {
        if self.tx.send(message).is_err() {
            warn!("frame loop is gone; message dropped");
            return false;
        }
        true
    }
}

/// ### English
/// Client half handed to [`crate::engine::OutputSurfaceBinding::bind_to_client`].
///
/// Callbacks arrive on the vsync thread and are forwarded to the frame loop without blocking.
///
/// ### 中文
/// 交给 [`crate::engine::OutputSurfaceBinding::bind_to_client`] 的客户端部分。
///
/// 回调在 vsync 线程上到达，并以非阻塞方式转发给帧循环。
pub struct FrameLoopClient {
    sender: LoopSender,
}

impl OutputSurfaceClient for FrameLoopClient {
    fn on_update_vsync_parameters(&self, params: VSyncParameters) {
        debug!(interval = ?params.interval(), "vsync parameters updated");
    }

    fn on_begin_frame(&self, frame_time: Instant, params: VSyncParameters) {
        let tick = PendingTick { frame_time, params };
        if self.sender.begin_frame.set(tick) {
            self.sender.send(LoopMessage::BeginFrame);
        }
    }
}

/// ### English
/// Owns the frame loop thread. Dropping it shuts the thread down and joins it.
///
/// ### 中文
/// 持有帧循环线程。drop 时关闭线程并 join。
pub struct FrameLoop {
    sender: LoopSender,
    thread: thread::Thread,
    join: Option<thread::JoinHandle<()>>,
}

impl FrameLoop {
    /// ### English
    /// Moves `pipeline` onto a new thread.
    ///
    /// Every processed tick is reported on the returned receiver. The loop stops after reporting
    /// a fatal error (GPU hang); the hosting application must recreate the context.
    ///
    /// ### 中文
    /// 将 `pipeline` 移到新线程上。
    ///
    /// 每次处理的 tick 都会通过返回的 receiver 报告。报告致命错误（GPU 挂起）后循环停止；
    /// 宿主应用必须重建上下文。
    pub fn spawn<P>(
        pipeline: FramePipeline<P>,
    ) -> FrameSyncResult<(Self, channel::Receiver<FrameSyncResult<FrameCycle>>)>
    where
        P: FrameProducer + 'static,
    {
        let (tx, rx) = channel::unbounded();
        let (events_tx, events_rx) = channel::unbounded();
        let begin_frame = Arc::new(CoalescedBeginFrame::default());
        let loop_begin_frame = begin_frame.clone();
        let join = thread::Builder::new()
            .name("XianFrameLoop".to_string())
            .spawn(move || run_frame_loop(pipeline, rx, loop_begin_frame, events_tx))?;
        let thread = join.thread().clone();
        Ok((
            Self {
                sender: LoopSender { tx, begin_frame },
                thread,
                join: Some(join),
            },
            events_rx,
        ))
    }

    pub fn client(&self) -> Arc<FrameLoopClient> {
        Arc::new(FrameLoopClient {
            sender: self.sender.clone(),
        })
    }

    /// ### English
    /// Number of ticks replaced by a newer one before the loop picked them up.
    ///
    /// ### 中文
    /// 在循环取走之前被更新 tick 替换掉的 tick 数量。
    pub fn coalesced_ticks(&self) -> u64 {
        self.sender.begin_frame.coalesced.load(Ordering::Relaxed)
    }

    pub fn resize(&self, size: PhysicalSize<u32>) -> bool {
        self.sender.send(LoopMessage::Resize(size))
    }

    /// ### English
    /// Forwards an asynchronous swap acknowledgement from the platform.
    ///
    /// ### 中文
    /// 转发来自平台的异步 swap 确认。
    pub fn notify_swap_finished(&self) -> bool {
        self.sender.send(LoopMessage::SwapFinished)
    }
}

impl Drop for FrameLoop {
    fn drop(&mut self) {
        if self.sender.tx.send(LoopMessage::Shutdown).is_err() {
            debug!("frame loop already stopped");
        }
        if let Some(join) = self.join.take()
            && thread::current().id() != self.thread.id()
            && join.join().is_err()
        {
            error!("frame loop thread panicked");
        }
    }
}

fn run_frame_loop<P: FrameProducer>(
    mut pipeline: FramePipeline<P>,
    rx: channel::Receiver<LoopMessage>,
    begin_frame: Arc<CoalescedBeginFrame>,
    events: channel::Sender<FrameSyncResult<FrameCycle>>,
) {
    debug!("frame loop started");
    for message in rx.iter() {
        match message {
            LoopMessage::BeginFrame => {
                let Some(PendingTick { frame_time, params }) = begin_frame.take() else {
                    continue;
                };
                let now = Instant::now();
                if now.saturating_duration_since(frame_time) > params.interval() {
                    debug!(late = ?now.duration_since(frame_time), "begin frame delivered late");
                }
                let result = pipeline.run_cycle_at(params, now);
                let fatal = matches!(&result, Err(err) if err.is_fatal());
                if events.send(result).is_err() {
                    trace!("frame cycle result dropped; no listener");
                }
                if fatal {
                    error!("frame loop stopped after a fatal GPU error");
                    break;
                }
            }
            LoopMessage::Resize(size) => {
                if let Err(err) = pipeline.resize(size) {
                    warn!(%err, "resize rejected");
                }
            }
            LoopMessage::SwapFinished => {
                if let Err(err) = pipeline.notify_swap_finished() {
                    warn!(%err, "swap acknowledgement rejected");
                }
            }
            LoopMessage::Shutdown => break,
        }
    }
    debug!("frame loop stopped");
}
