//! Fault-injection checkpoints
//!
//! The write, blob and GC paths call [`CheckpointHook::hit`] at the points
//! where a power cut leaves the partition in a distinct intermediate state.
//! Production partitions carry no hook and every call is a no-op. Tests
//! install a hook that returns [`KvError::PowerLoss`], which unwinds the
//! operation without touching the device again, then reload the engine from
//! the same device to exercise recovery.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{KvError, Result};

/// Named recovery-critical points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Checkpoint {
    /// Item header written, out-of-line payload not yet written.
    BeforeWriteData,
    /// New value committed, superseded value not yet tombstoned.
    BeforeEraseOld,
    /// One blob segment written.
    AfterWriteSegment,
    /// Every blob segment written, descriptor not yet written.
    AfterWriteAllSegments,
    /// Blob descriptor written, old blob not yet tombstoned.
    AfterWriteNewBlob,
    /// Old blob descriptor tombstoned, its segments still live.
    AfterEraseOldDescriptor,
    /// GC: replacement sector activated and initialized.
    GcNewSector,
    /// GC: victim sector marked deleting.
    GcMarkDeleting,
    /// GC: live records copied into the replacement.
    GcCopied,
    /// GC: victim erased, not yet returned to the idle pool.
    GcErasedOld,
}

impl Checkpoint {
    /// Every checkpoint, in the order an update can reach them.
    pub const ALL: [Checkpoint; 10] = [
        Checkpoint::BeforeWriteData,
        Checkpoint::BeforeEraseOld,
        Checkpoint::AfterWriteSegment,
        Checkpoint::AfterWriteAllSegments,
        Checkpoint::AfterWriteNewBlob,
        Checkpoint::AfterEraseOldDescriptor,
        Checkpoint::GcNewSector,
        Checkpoint::GcMarkDeleting,
        Checkpoint::GcCopied,
        Checkpoint::GcErasedOld,
    ];

    /// Hook that simulates a power cut the first time `target` is reached.
    ///
    /// Later hits pass through, so a hook left installed does not interfere
    /// with the reload that follows.
    pub fn power_loss_at(target: Checkpoint) -> CheckpointHook {
        let fired = AtomicBool::new(false);
        CheckpointHook::new(move |cp| {
            if cp == target && !fired.swap(true, Ordering::SeqCst) {
                Err(KvError::PowerLoss(cp))
            } else {
                Ok(())
            }
        })
    }
}

type HookFn = dyn Fn(Checkpoint) -> Result<()> + Send + Sync;

/// Injectable callback invoked at each [`Checkpoint`].
#[derive(Clone, Default)]
pub struct CheckpointHook {
    inner: Option<Arc<HookFn>>,
}

impl CheckpointHook {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Checkpoint) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            inner: Some(Arc::new(f)),
        }
    }

    /// The production hook.
    pub fn none() -> Self {
        Self { inner: None }
    }

    #[inline]
    pub fn hit(&self, cp: Checkpoint) -> Result<()> {
        match &self.inner {
            Some(f) => f(cp),
            None => Ok(()),
        }
    }

    pub fn is_installed(&self) -> bool {
        self.inner.is_some()
    }
}

impl fmt::Debug for CheckpointHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckpointHook")
            .field("installed", &self.is_installed())
            .finish()
    }
}
