//! Mutable linear blocks.

use super::fence::Fence;
use super::mapping::{BlockMapping, MappingState};
use super::range::{EditableRange, LinearRange};
use super::shared::ConstBlock;
use super::view::{Acquirable, WriteView};
use crate::memory::{Handle, LinearAllocation, MemoryUsage};
use std::sync::Arc;

/// Exclusively owned, writable block over a whole allocation.
///
/// The producer fills the block through [`map`](Self::map) and publishes
/// windows of it with [`share`](Self::share). Writing to a window after it
/// was shared is a data race the block does not prevent; stop writing (or
/// synchronize through the fence) before sharing.
pub struct LinearBlock {
    allocation: Arc<dyn LinearAllocation>,
    range: EditableRange,
    fence: Fence,
    mapping: BlockMapping,
}

impl LinearBlock {
    /// Wrap a fresh allocation in a full-capacity block.
    pub(crate) fn new(allocation: Arc<dyn LinearAllocation>) -> Self {
        let capacity = allocation.capacity();
        let mapping = BlockMapping::new(
            allocation.clone(),
            0,
            capacity as usize,
            MemoryUsage::READ_WRITE,
        );
        Self {
            allocation,
            range: EditableRange::with_capacity(capacity),
            fence: Fence::empty(),
            mapping,
        }
    }

    /// Map the whole allocation read-write.
    ///
    /// The view's window is the block's current range. The mapping is created
    /// once and reused by later calls. On failure the wrapper carries the
    /// error and an empty view; the next call tries again.
    pub fn map(&mut self) -> Acquirable<WriteView<'_>> {
        match self.mapping.map() {
            Ok(base) => Acquirable::new(WriteView::new(base, self.range), self.fence.clone(), None),
            Err(e) => {
                tracing::debug!(
                    id = self.allocation.id(),
                    capacity = self.range.capacity(),
                    error = %e,
                    "linear block map failed"
                );
                Acquirable::new(WriteView::from_error(e), self.fence.clone(), Some(e))
            }
        }
    }

    /// Publish a window of this block as an immutable block.
    ///
    /// `offset` and `size` are absolute within the allocation and clamped
    /// into its capacity. This block stays mapped and usable.
    pub fn share(&self, offset: usize, size: usize, fence: Fence) -> ConstBlock {
        let range = LinearRange::new(self.range.capacity(), offset, size);
        tracing::debug!(
            id = self.allocation.id(),
            offset = range.offset(),
            size = range.size(),
            fenced = !fence.is_empty(),
            "sharing linear block"
        );
        ConstBlock::new(self.allocation.clone(), range, fence)
    }

    /// Narrow (or widen) the block's window. Returns false if clamped.
    pub fn set_range(&mut self, offset: usize, size: usize) -> bool {
        self.range.set_range(offset, size)
    }

    /// Backing allocation.
    pub fn allocation(&self) -> &Arc<dyn LinearAllocation> {
        &self.allocation
    }

    /// Handle of the backing allocation.
    pub fn handle(&self) -> &Handle {
        self.allocation.handle()
    }

    /// Capacity of the allocation.
    pub fn capacity(&self) -> u32 {
        self.range.capacity()
    }

    /// Window start.
    pub fn offset(&self) -> usize {
        self.range.offset()
    }

    /// Window size.
    pub fn size(&self) -> usize {
        self.range.size()
    }

    /// The window.
    pub fn range(&self) -> LinearRange {
        self.range.range()
    }

    /// Fence of the block. Always empty for freshly allocated blocks.
    pub fn fence(&self) -> &Fence {
        &self.fence
    }

    /// Returns true once the block holds a mapping.
    pub fn is_mapped(&self) -> bool {
        matches!(self.mapping.state(), MappingState::Mapped { .. })
    }
}

impl std::fmt::Debug for LinearBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinearBlock")
            .field("allocation", &self.allocation.id())
            .field("range", &self.range)
            .field("mapped", &self.is_mapped())
            .finish()
    }
}
