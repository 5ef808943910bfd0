//! Lazy per-block mapping.

use crate::error::{Error, Result};
use crate::memory::{LinearAllocation, MemoryUsage};
use std::ptr::NonNull;
use std::sync::Arc;

/// Where a block's mapping is in its life.
///
/// `Unmapped` and `Failed` move on the next `map()`; `Mapped` stays until the
/// owning block is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MappingState {
    Unmapped,
    Mapped { base: NonNull<u8>, len: usize },
    Failed(Error),
}

// SAFETY: the pointer is an address inside a mapping owned by the block.
// It is only dereferenced through views, whose lifetimes borrow the block.
unsafe impl Send for MappingState {}
unsafe impl Sync for MappingState {}

impl MappingState {
    /// Advance the state machine. `map` is only called when there is no
    /// live mapping yet.
    pub(crate) fn advance(
        &mut self,
        len: usize,
        map: impl FnOnce() -> Result<NonNull<u8>>,
    ) -> Result<NonNull<u8>> {
        if let MappingState::Mapped { base, .. } = *self {
            return Ok(base);
        }

        let next = match map() {
            Ok(base) => MappingState::Mapped { base, len },
            Err(e) => MappingState::Failed(e),
        };
        tracing::trace!(from = ?self, to = ?next, "mapping state");
        *self = next;

        match next {
            MappingState::Mapped { base, .. } => Ok(base),
            MappingState::Failed(e) => Err(e),
            MappingState::Unmapped => Err(Error::Corrupted),
        }
    }

    /// Take the live mapping out, leaving `Unmapped`.
    pub(crate) fn take(&mut self) -> Option<(NonNull<u8>, usize)> {
        match std::mem::replace(self, MappingState::Unmapped) {
            MappingState::Mapped { base, len } => Some((base, len)),
            _ => None,
        }
    }
}

/// One block's window onto an allocation, mapped on first use and unmapped
/// on drop.
pub(crate) struct BlockMapping {
    allocation: Arc<dyn LinearAllocation>,
    offset: usize,
    len: usize,
    usage: MemoryUsage,
    state: MappingState,
}

impl BlockMapping {
    pub(crate) fn new(
        allocation: Arc<dyn LinearAllocation>,
        offset: usize,
        len: usize,
        usage: MemoryUsage,
    ) -> Self {
        Self {
            allocation,
            offset,
            len,
            usage,
            state: MappingState::Unmapped,
        }
    }

    /// Base address of the window, mapping it if needed.
    pub(crate) fn map(&mut self) -> Result<NonNull<u8>> {
        let Self {
            allocation,
            offset,
            len,
            usage,
            state,
        } = self;
        state.advance(*len, || {
            let base = allocation.map(*offset, *len, *usage)?;
            tracing::debug!(
                id = allocation.id(),
                offset = *offset,
                size = *len,
                write = usage.cpu_write,
                "block mapped"
            );
            Ok(base)
        })
    }

    pub(crate) fn state(&self) -> MappingState {
        self.state
    }
}

impl Drop for BlockMapping {
    fn drop(&mut self) {
        let Some((base, len)) = self.state.take() else {
            return;
        };
        match self.allocation.unmap(base, len) {
            Ok(()) => tracing::debug!(id = self.allocation.id(), size = len, "block unmapped"),
            Err(e) => tracing::warn!(
                id = self.allocation.id(),
                size = len,
                error = %e,
                "failed to unmap block"
            ),
        }
    }
}
