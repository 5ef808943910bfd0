//! Block allocators.

use super::fence::Fence;
use super::linear::LinearBlock;
use super::range::LinearRange;
use super::shared::ConstBlock;
use crate::error::Result;
use crate::memory::{
    Allocator, Handle, LinearAllocation, MemfdAllocator, MemfdConfig, MemoryUsage,
};
use std::sync::Arc;

/// Source of mutable linear blocks.
pub trait BlockAllocator: Send + Sync {
    /// Allocate a block of `capacity` bytes.
    ///
    /// Backend errors are returned as they are; there is no retry.
    fn allocate_linear_block(&self, capacity: u32, usage: MemoryUsage) -> Result<LinearBlock>;
}

/// Block allocator that delegates to one [`Allocator`] backend.
#[derive(Clone)]
pub struct DefaultBlockAllocator {
    allocator: Arc<dyn Allocator>,
}

impl DefaultBlockAllocator {
    /// Wrap a backend.
    pub fn new(allocator: Arc<dyn Allocator>) -> Self {
        Self { allocator }
    }

    /// Block allocator over a memfd backend.
    pub fn memfd(config: MemfdConfig) -> Self {
        Self::new(Arc::new(MemfdAllocator::new(config)))
    }

    /// The backend.
    pub fn allocator(&self) -> &Arc<dyn Allocator> {
        &self.allocator
    }

    /// Rebuild an immutable block from a received handle.
    ///
    /// `offset` and `size` are absolute within the allocation and clamped
    /// like [`LinearBlock::share`]. An invalid handle is
    /// [`Error::BadValue`](crate::Error::BadValue).
    pub fn recreate_const_block(
        &self,
        handle: &Handle,
        offset: usize,
        size: usize,
        fence: Fence,
    ) -> Result<ConstBlock> {
        let allocation = self.allocator.recreate_linear(handle)?;
        let range = LinearRange::new(allocation.capacity(), offset, size);
        tracing::debug!(
            id = allocation.id(),
            allocator = self.allocator.name(),
            offset = range.offset(),
            size = range.size(),
            "recreated const block"
        );
        Ok(ConstBlock::new(allocation, range, fence))
    }
}

impl BlockAllocator for DefaultBlockAllocator {
    fn allocate_linear_block(&self, capacity: u32, usage: MemoryUsage) -> Result<LinearBlock> {
        let allocation = self
            .allocator
            .allocate_linear(capacity, usage)
            .inspect_err(|e| {
                tracing::debug!(
                    allocator = self.allocator.name(),
                    capacity,
                    error = %e,
                    "linear allocation failed"
                )
            })?;
        Ok(LinearBlock::new(allocation))
    }
}

impl std::fmt::Debug for DefaultBlockAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultBlockAllocator")
            .field("allocator", &self.allocator.name())
            .finish()
    }
}
