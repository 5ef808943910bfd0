//! Immutable shareable blocks.

use super::fence::Fence;
use super::mapping::{BlockMapping, MappingState};
use super::range::LinearRange;
use super::view::{Acquirable, ReadView};
use crate::memory::{Handle, LinearAllocation, MemoryUsage};
use std::sync::{Arc, Mutex, PoisonError};

/// Read-only window over an allocation, tagged with a fence.
///
/// Clones share one lazily created mapping, which is unmapped when the last
/// clone is dropped. [`sub_block`](Self::sub_block) creates an independent
/// block with its own mapping.
#[derive(Clone)]
pub struct ConstBlock {
    allocation: Arc<dyn LinearAllocation>,
    range: LinearRange,
    fence: Fence,
    mapping: Arc<Mutex<BlockMapping>>,
}

impl ConstBlock {
    pub(crate) fn new(
        allocation: Arc<dyn LinearAllocation>,
        range: LinearRange,
        fence: Fence,
    ) -> Self {
        let mapping = BlockMapping::new(
            allocation.clone(),
            range.offset(),
            range.size(),
            MemoryUsage::READ,
        );
        Self {
            allocation,
            range,
            fence,
            mapping: Arc::new(Mutex::new(mapping)),
        }
    }

    /// Map the window read-only.
    ///
    /// The first call maps, later calls on this block or any clone reuse the
    /// mapping. On failure the wrapper carries the error and an empty view;
    /// the next call tries again.
    pub fn map(&self) -> Acquirable<ReadView<'_>> {
        let result = self
            .mapping
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .map();
        match result {
            Ok(base) => Acquirable::new(
                ReadView::new(base, self.range.size()),
                self.fence.clone(),
                None,
            ),
            Err(e) => {
                tracing::debug!(
                    id = self.allocation.id(),
                    offset = self.range.offset(),
                    size = self.range.size(),
                    error = %e,
                    "const block map failed"
                );
                Acquirable::new(ReadView::from_error(e), self.fence.clone(), Some(e))
            }
        }
    }

    /// A narrower block over the same allocation with the same fence.
    ///
    /// `offset` is relative to this block; both values are clamped into it.
    /// Nothing is mapped.
    pub fn sub_block(&self, offset: usize, size: usize) -> ConstBlock {
        ConstBlock::new(
            self.allocation.clone(),
            self.range.sub_range(offset, size),
            self.fence.clone(),
        )
    }

    /// Backing allocation.
    pub fn allocation(&self) -> &Arc<dyn LinearAllocation> {
        &self.allocation
    }

    /// Handle of the backing allocation.
    pub fn handle(&self) -> &Handle {
        self.allocation.handle()
    }

    /// Capacity of the backing allocation.
    pub fn capacity(&self) -> u32 {
        self.range.capacity()
    }

    /// Window start inside the allocation.
    pub fn offset(&self) -> usize {
        self.range.offset()
    }

    /// Window size.
    pub fn size(&self) -> usize {
        self.range.size()
    }

    /// The window.
    pub fn range(&self) -> LinearRange {
        self.range
    }

    /// Fence guarding the contents.
    pub fn fence(&self) -> &Fence {
        &self.fence
    }

    /// Returns true once this block (or a clone) holds a mapping.
    pub fn is_mapped(&self) -> bool {
        matches!(
            self.mapping
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .state(),
            MappingState::Mapped { .. }
        )
    }
}

impl std::fmt::Debug for ConstBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstBlock")
            .field("allocation", &self.allocation.id())
            .field("range", &self.range)
            .field("fence", &self.fence)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::LinearBlock;
    use crate::memory::{Allocator, MemfdAllocation, MemfdAllocator};

    fn filled_block(capacity: u32) -> LinearBlock {
        let allocation = MemfdAllocator::default()
            .allocate_linear(capacity, MemoryUsage::READ_WRITE)
            .unwrap();
        let mut block = LinearBlock::new(allocation);
        {
            let mut view = block.map().acquire().unwrap();
            for (i, byte) in view.as_mut_slice().iter_mut().enumerate() {
                *byte = i as u8;
            }
        }
        block
    }

    #[test]
    fn test_clones_share_mapping() {
        let block = filled_block(4096);
        let shared = block.share(0, 256, Fence::empty());
        let clone = shared.clone();

        let a = shared.map().acquire().unwrap().data();
        assert!(clone.is_mapped());
        let b = clone.map().acquire().unwrap().data();
        assert_eq!(a, b);
    }

    #[test]
    fn test_sub_block_is_relative_and_unmapped() {
        let block = filled_block(4096);
        let shared = block.share(100, 200, Fence::empty());
        let _ = shared.map().acquire().unwrap();

        let sub = shared.sub_block(10, 20);
        assert_eq!(sub.offset(), 110);
        assert_eq!(sub.size(), 20);
        assert!(!sub.is_mapped());

        let view = sub.map().acquire().unwrap();
        let expected: Vec<u8> = (110..130).map(|i| i as u8).collect();
        assert_eq!(view.as_slice(), expected.as_slice());
    }

    #[test]
    fn test_sub_block_composes() {
        let block = filled_block(4096);
        let shared = block.share(0, 4096, Fence::empty());
        let nested = shared.sub_block(100, 1000).sub_block(50, 200);
        let direct = shared.sub_block(150, 200);
        assert_eq!(nested.range(), direct.range());
    }

    #[test]
    fn test_sub_block_keeps_fence() {
        let block = filled_block(4096);
        let (fence, _signal) = Fence::pending().unwrap();
        let sub = block.share(0, 128, fence).sub_block(0, 64);
        assert!(!sub.fence().is_empty());
        assert!(!sub.map().is_ready());
    }

    #[test]
    fn test_empty_window_reports_error() {
        let block = filled_block(4096);
        let shared = block.share(4096, 10, Fence::empty());
        let acquirable = shared.map();
        assert_eq!(acquirable.error(), Some(crate::Error::BadValue));

        let view = acquirable.acquire().unwrap();
        assert!(view.data().is_null());
        assert_eq!(view.capacity(), 0);
    }

    #[test]
    fn test_last_clone_unmaps() {
        let allocation = Arc::new(MemfdAllocator::default().allocate(4096).unwrap());
        let dyn_allocation: Arc<dyn LinearAllocation> = allocation.clone();
        let block = LinearBlock::new(dyn_allocation);

        let shared = block.share(0, 512, Fence::empty());
        let clone = shared.clone();
        let _ = shared.map().acquire().unwrap();
        assert_eq!(allocation.mapping_count(), 1);

        drop(shared);
        assert_eq!(allocation.mapping_count(), 1);
        drop(clone);
        assert_eq!(allocation.mapping_count(), 0);
    }

    #[test]
    fn test_const_block_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ConstBlock>();
        assert_send_sync::<LinearBlock>();
        assert_send_sync::<Arc<MemfdAllocation>>();
    }
}
