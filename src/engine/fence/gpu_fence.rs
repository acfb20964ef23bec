//! ### English
//! One GPU completion fence and its wait operations.
//!
//! ### 中文
//! 单个 GPU 完成 fence 及其等待操作。

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, trace, warn};

use super::backend::BackendInner;
use super::{
    FenceBackend, FenceError, FenceState, NativeSync, RejectedTransfer, SyncBackendKind,
    SyncDriver, SyncStatus, TransferableFence, WaitOutcome,
};

/// ### English
/// Whether the fence command reached the GPU command stream.
///
/// ### 中文
/// fence 命令是否已进入 GPU 命令流。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum CommitMark {
    Committed,
    /// ### English
    /// Created without a flush; commits once the backend flush generation moves past this value.
    ///
    /// ### 中文
    /// 创建时未 flush；当 backend 的 flush 代数超过该值后才算提交。
    AfterFlush(u64),
}

/// ### English
/// A GPU completion fence owned by exactly one holder.
///
/// The state is monotonic (`Pending -> Signaled | Error`). Dropping the fence deletes the native
/// sync object; [`Fence::transfer`] hands ownership of the native object to the receiver instead.
///
/// ### 中文
/// 由唯一持有者拥有的 GPU 完成 fence。
///
/// 状态单调变化（`Pending -> Signaled | Error`）。drop 时会删除原生 sync 对象；
/// [`Fence::transfer`] 则把原生对象的所有权交给接收方。
pub struct Fence {
    backend: Arc<BackendInner>,
    driver: Arc<dyn SyncDriver>,
    kind: SyncBackendKind,
    sync: Option<NativeSync>,
    state: FenceState,
    commit: CommitMark,
    created_at: Instant,
}

impl Fence {
    pub(super) fn new(
        backend: Arc<BackendInner>,
        driver: Arc<dyn SyncDriver>,
        kind: SyncBackendKind,
        sync: NativeSync,
        commit: CommitMark,
        created_at: Instant,
    ) -> Self {
        Self {
            backend,
            driver,
            kind,
            sync: Some(sync),
            state: FenceState::Pending,
            commit,
            created_at,
        }
    }

    /// ### English
    /// Reconstructs a fence on the receiving side of a transfer.
    ///
    /// Fails with [`FenceError::BackendMismatch`] when the receiver selected another mechanism.
    /// A rejected transfer hands the native handle back inside [`RejectedTransfer`] so it can be
    /// released on the producer side.
    ///
    /// ### 中文
    /// 在传递的接收侧重建 fence。
    ///
    /// 若接收方选择了不同的同步机制，则返回 [`FenceError::BackendMismatch`]。被拒绝的传递会通过
    /// [`RejectedTransfer`] 交还原生句柄，以便在生产者一侧释放。
    pub fn from_transferable(
        backend: &FenceBackend,
        transferable: TransferableFence,
    ) -> Result<Self, RejectedTransfer> {
        let inner = backend.inner();
        let Some(selected) = inner.selected.as_ref() else {
            return Err(RejectedTransfer::new(FenceError::Unsupported, transferable));
        };
        if selected.kind != transferable.kind {
            let error = FenceError::BackendMismatch {
                expected: selected.kind,
                found: transferable.kind,
            };
            return Err(RejectedTransfer::new(error, transferable));
        }
        let sync = match selected.driver.import(transferable.raw) {
            Ok(sync) => sync,
            Err(error) => return Err(RejectedTransfer::new(error, transferable)),
        };
        Ok(Self::new(
            inner.clone(),
            selected.driver.clone(),
            selected.kind,
            sync,
            CommitMark::Committed,
            transferable.created_at,
        ))
    }

    pub fn kind(&self) -> SyncBackendKind {
        self.kind
    }

    pub fn state(&self) -> FenceState {
        self.state
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// ### English
    /// Returns whether the fence command is known to be in the GPU command stream.
    ///
    /// ### 中文
    /// 返回 fence 命令是否已确认进入 GPU 命令流。
    pub fn is_committed(&mut self) -> bool {
        if let CommitMark::AfterFlush(generation) = self.commit
            && self.backend.flush_generation() > generation
        {
            self.commit = CommitMark::Committed;
        }
        self.commit == CommitMark::Committed
    }

    /// ### English
    /// Flushes the owning backend if the fence command has not reached the GPU yet.
    ///
    /// Afterwards waits are never [`WaitOutcome::Skipped`].
    ///
    /// ### 中文
    /// 若 fence 命令尚未进入 GPU，则 flush 其所属 backend。
    ///
    /// 之后的等待不会再返回 [`WaitOutcome::Skipped`]。
    pub fn commit(&mut self) {
        if !self.is_committed() {
            trace!(kind = %self.kind, "flushing to commit fence");
            self.backend.flush();
            self.commit = CommitMark::Committed;
        }
    }

    /// ### English
    /// Non-blocking completion query.
    ///
    /// A failed backend query moves the fence to [`FenceState::Error`] and reports it complete.
    ///
    /// ### 中文
    /// 非阻塞完成查询。
    ///
    /// backend 查询失败时 fence 进入 [`FenceState::Error`]，并按已完成返回。
    pub fn has_completed(&mut self) -> bool {
        if self.state != FenceState::Pending {
            return true;
        }
        let Some(sync) = self.sync else {
            self.state = FenceState::Error;
            return true;
        };
        match self.driver.poll(sync) {
            SyncStatus::Signaled => {
                self.state = FenceState::Signaled;
                true
            }
            SyncStatus::Unsignaled | SyncStatus::TimeoutExpired => false,
            SyncStatus::Failed => {
                warn!(kind = %self.kind, "fence status query failed; treating as complete");
                self.state = FenceState::Error;
                true
            }
        }
    }

    /// ### English
    /// Blocks the calling thread until the fence signals.
    ///
    /// Uses [`FenceConfig::client_wait_timeout`](super::FenceConfig::client_wait_timeout); an
    /// expired timeout returns the fatal [`FenceError::WaitTimeout`]. Waiting on a fence that was
    /// never flushed is skipped, since it could block forever.
    ///
    /// ### 中文
    /// 阻塞调用线程直到 fence signal。
    ///
    /// 使用 [`FenceConfig::client_wait_timeout`](super::FenceConfig::client_wait_timeout)；
    /// 超时会返回致命错误 [`FenceError::WaitTimeout`]。对从未 flush 的 fence 的等待会被跳过，
    /// 否则可能永久阻塞。
    pub fn client_wait(&mut self) -> Result<WaitOutcome, FenceError> {
        if let Some(outcome) = self.settled_outcome() {
            return Ok(outcome);
        }
        if !self.is_committed() {
            warn!(kind = %self.kind, "client wait on an unflushed fence skipped");
            return Ok(WaitOutcome::Skipped);
        }
        let Some(sync) = self.sync else {
            self.state = FenceState::Error;
            return Ok(WaitOutcome::QueryFailed);
        };

        let timeout = self.backend.config.client_wait_timeout;
        let started = Instant::now();
        match self.driver.client_wait(sync, timeout) {
            SyncStatus::Signaled => {
                self.state = FenceState::Signaled;
                trace!(kind = %self.kind, waited = ?started.elapsed(), "fence signaled");
                Ok(WaitOutcome::Signaled)
            }
            SyncStatus::Failed => {
                warn!(kind = %self.kind, "fence client wait failed; treating as complete");
                self.state = FenceState::Error;
                Ok(WaitOutcome::QueryFailed)
            }
            SyncStatus::TimeoutExpired | SyncStatus::Unsignaled => {
                let waited = started.elapsed();
                error!(kind = %self.kind, ?waited, "fence client wait timed out");
                Err(FenceError::WaitTimeout {
                    kind: self.kind,
                    waited,
                })
            }
        }
    }

    /// ### English
    /// Queues a GPU-side wait so later commands on the current context wait for this fence.
    ///
    /// Falls back to [`Self::client_wait`] when the driver has no server-side wait.
    ///
    /// ### 中文
    /// 插入 GPU 侧等待，使当前上下文的后续命令等待此 fence。
    ///
    /// 驱动不支持 GPU 侧等待时回退到 [`Self::client_wait`]。
    pub fn server_wait(&mut self) -> Result<WaitOutcome, FenceError> {
        if let Some(outcome) = self.settled_outcome() {
            return Ok(outcome);
        }
        if !self.is_committed() {
            warn!(kind = %self.kind, "server wait on an unflushed fence skipped");
            return Ok(WaitOutcome::Skipped);
        }
        if !self.driver.supports_server_wait() {
            return self.client_wait();
        }
        let Some(sync) = self.sync else {
            self.state = FenceState::Error;
            return Ok(WaitOutcome::QueryFailed);
        };
        self.driver.server_wait(sync);
        Ok(WaitOutcome::QueuedOnGpu)
    }

    /// ### English
    /// Converts the fence into plain data for another thread or process, consuming it.
    ///
    /// An uncommitted fence is flushed first so the receiver can always wait on it.
    ///
    /// ### 中文
    /// 将 fence 转换为可交给其它线程或进程的纯数据，并消耗该 fence。
    ///
    /// 未提交的 fence 会先被 flush，以保证接收方总能等待它。
    pub fn transfer(mut self) -> Result<TransferableFence, FenceError> {
        self.commit();
        let Some(sync) = self.sync else {
            return Err(FenceError::InvalidHandle(0));
        };
        let raw = self.driver.export(sync)?;
        self.sync = None;
        Ok(TransferableFence {
            kind: self.kind,
            raw,
            created_at: self.created_at,
        })
    }

    fn settled_outcome(&self) -> Option<WaitOutcome> {
        match self.state {
            FenceState::Pending => None,
            FenceState::Signaled => Some(WaitOutcome::Signaled),
            FenceState::Error => Some(WaitOutcome::QueryFailed),
        }
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        if let Some(sync) = self.sync.take() {
            self.driver.delete(sync);
        }
    }
}

impl fmt::Debug for Fence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fence")
            .field("kind", &self.kind)
            .field("sync", &self.sync)
            .field("state", &self.state)
            .field("commit", &self.commit)
            .field("created_at", &self.created_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::engine::fence::{FenceConfig, GlVersion, GpuCapabilities};
    use crate::engine::test_support::{FakeGpuContext, FakeSyncDriver, arb_backend};

    #[test]
    fn unflushed_fence_waits_are_skipped_until_the_context_flushes() {
        let (ctx, _driver, backend) = arb_backend(FakeSyncDriver::new(SyncBackendKind::ArbSync));
        let mut fence = backend.create(false).unwrap();
        assert!(!fence.is_committed());
        assert_eq!(fence.client_wait().unwrap(), WaitOutcome::Skipped);
        assert_eq!(fence.server_wait().unwrap(), WaitOutcome::Skipped);
        assert_eq!(fence.state(), FenceState::Pending);

        backend.notify_context_flushed();
        assert!(fence.is_committed());
        assert_eq!(fence.client_wait().unwrap(), WaitOutcome::Signaled);
        assert_eq!(ctx.flush_count(), 0);
    }

    #[test]
    fn has_completed_polls_until_signaled_and_stays_signaled() {
        let (_ctx, _driver, backend) =
            arb_backend(FakeSyncDriver::new(SyncBackendKind::ArbSync).signal_after(2));
        let mut fence = backend.create(true).unwrap();
        assert!(!fence.has_completed());
        assert!(!fence.has_completed());
        assert!(fence.has_completed());
        assert_eq!(fence.state(), FenceState::Signaled);
        assert!(fence.has_completed());
        assert_eq!(fence.state(), FenceState::Signaled);
    }

    #[test]
    fn query_failure_is_reported_as_complete() {
        let (_ctx, _driver, backend) =
            arb_backend(FakeSyncDriver::new(SyncBackendKind::ArbSync).failing_queries());
        let mut fence = backend.create(true).unwrap();
        assert!(fence.has_completed());
        assert_eq!(fence.state(), FenceState::Error);
        assert_eq!(fence.client_wait().unwrap(), WaitOutcome::QueryFailed);
    }

    #[test]
    fn client_wait_timeout_is_fatal() {
        let caps = GpuCapabilities::new(GlVersion::new(4, 5, false));
        let driver = Arc::new(FakeSyncDriver::new(SyncBackendKind::ArbSync).hanging());
        let ctx = Arc::new(FakeGpuContext::new(caps).with_driver(driver));
        let config = FenceConfig {
            client_wait_timeout: Some(Duration::from_millis(5)),
            ..FenceConfig::default()
        };
        let backend = FenceBackend::detect(ctx, config);
        let mut fence = backend.create(true).unwrap();
        let err = fence.client_wait().unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(
            err,
            FenceError::WaitTimeout {
                kind: SyncBackendKind::ArbSync,
                ..
            }
        ));
    }

    #[test]
    fn server_wait_queues_on_gpu_or_falls_back_to_client_wait() {
        let (_ctx, driver, backend) = arb_backend(FakeSyncDriver::new(SyncBackendKind::ArbSync));
        let mut fence = backend.create(true).unwrap();
        assert_eq!(fence.server_wait().unwrap(), WaitOutcome::QueuedOnGpu);
        assert_eq!(driver.server_wait_count(), 1);

        let (_ctx, driver, backend) =
            arb_backend(FakeSyncDriver::new(SyncBackendKind::ArbSync).without_server_wait());
        let mut fence = backend.create(true).unwrap();
        assert_eq!(fence.server_wait().unwrap(), WaitOutcome::Signaled);
        assert_eq!(driver.server_wait_count(), 0);
        assert_eq!(driver.client_wait_count(), 1);
    }

    #[test]
    fn drop_deletes_the_native_sync() {
        let (_ctx, driver, backend) = arb_backend(FakeSyncDriver::new(SyncBackendKind::ArbSync));
        let fence = backend.create(true).unwrap();
        let sync = fence.sync;
        drop(fence);
        assert_eq!(driver.deleted(), vec![sync.map(|s| s.0).unwrap_or_default()]);
    }

    #[test]
    fn transfer_flushes_and_hands_over_ownership() {
        let (ctx, driver, backend) = arb_backend(FakeSyncDriver::new(SyncBackendKind::ArbSync));
        let fence = backend.create(false).unwrap();
        let transferable = fence.transfer().unwrap();
        assert_eq!(ctx.flush_count(), 1);
        assert_eq!(transferable.kind, SyncBackendKind::ArbSync);
        assert_ne!(transferable.raw, 0);
        assert!(driver.deleted().is_empty());

        let raw = transferable.raw;
        let mut received = Fence::from_transferable(&backend, transferable).unwrap();
        assert!(received.is_committed());
        assert_eq!(received.client_wait().unwrap(), WaitOutcome::Signaled);
        drop(received);
        assert_eq!(driver.deleted(), vec![raw]);
    }

    #[test]
    fn rejected_transfers_hand_the_handle_back_for_release() {
        let (_ctx, driver, producer) = arb_backend(FakeSyncDriver::new(SyncBackendKind::ArbSync));
        let caps = GpuCapabilities::new(GlVersion::new(2, 0, true))
            .with_egl_extension("EGL_KHR_fence_sync");
        let consumer = FenceBackend::detect(
            FakeGpuContext::with_all_drivers(caps),
            FenceConfig::default(),
        );

        let transferable = producer.create(true).unwrap().transfer().unwrap();
        let raw = transferable.raw;
        let rejected = Fence::from_transferable(&consumer, transferable).unwrap_err();
        assert!(matches!(
            rejected.error,
            FenceError::BackendMismatch {
                expected: SyncBackendKind::EglSync,
                found: SyncBackendKind::ArbSync,
            }
        ));
        assert!(driver.deleted().is_empty());

        rejected.into_fence().release(&producer).unwrap();
        assert_eq!(driver.deleted(), vec![raw]);
    }

    #[test]
    fn transfers_are_reconstructed_on_a_distinct_consumer_backend() {
        let (_pctx, producer_driver, producer) =
            arb_backend(FakeSyncDriver::new(SyncBackendKind::ArbSync));
        let (_cctx, consumer_driver, consumer) =
            arb_backend(FakeSyncDriver::new(SyncBackendKind::ArbSync));

        let transferable = producer.create(false).unwrap().transfer().unwrap();
        let raw = transferable.raw;
        let mut received = Fence::from_transferable(&consumer, transferable).unwrap();
        assert!(received.is_committed());
        assert_eq!(received.client_wait().unwrap(), WaitOutcome::Signaled);
        assert_eq!(consumer_driver.client_wait_count(), 1);
        drop(received);

        assert_eq!(consumer_driver.deleted(), vec![raw]);
        assert!(producer_driver.deleted().is_empty());
    }

    #[test]
    fn commit_flushes_an_unflushed_fence_once() {
        let (ctx, _driver, backend) = arb_backend(FakeSyncDriver::new(SyncBackendKind::ArbSync));
        let mut fence = backend.create(false).unwrap();
        fence.commit();
        fence.commit();
        assert!(fence.is_committed());
        assert_eq!(ctx.flush_count(), 1);
        assert_eq!(fence.client_wait().unwrap(), WaitOutcome::Signaled);
    }
}
