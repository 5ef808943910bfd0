//! Allocation and allocator traits.

use super::Handle;
use crate::error::Result;
use std::ptr::NonNull;
use std::sync::Arc;

/// How a region is going to be accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MemoryUsage {
    /// CPU reads.
    pub cpu_read: bool,
    /// CPU writes.
    pub cpu_write: bool,
    /// Backend-specific usage bits (device access, protected content, ...).
    pub other: u64,
}

impl MemoryUsage {
    /// CPU read access only.
    pub const READ: Self = Self {
        cpu_read: true,
        cpu_write: false,
        other: 0,
    };

    /// CPU write access only.
    pub const WRITE: Self = Self {
        cpu_read: false,
        cpu_write: true,
        other: 0,
    };

    /// CPU read and write access.
    pub const READ_WRITE: Self = Self {
        cpu_read: true,
        cpu_write: true,
        other: 0,
    };

    /// Attach backend-specific bits.
    pub const fn with_other(mut self, other: u64) -> Self {
        self.other = other;
        self
    }

    /// Returns true if the CPU touches the memory at all.
    #[inline]
    pub fn is_cpu_accessible(&self) -> bool {
        self.cpu_read || self.cpu_write
    }
}

/// One physical linear memory region.
///
/// An allocation lives for as long as any block references it; dropping the
/// last `Arc` releases the backend resources.
///
/// Mappings are owned by the caller: every successful [`map`](Self::map)
/// must be paired with exactly one [`unmap`](Self::unmap) of the same
/// pointer and size. Implementations reject pointers they did not hand out,
/// so a second unmap is an error instead of undefined behavior.
pub trait LinearAllocation: Send + Sync {
    /// Size of the region in bytes.
    fn capacity(&self) -> u32;

    /// Cross-process identity of the region.
    fn handle(&self) -> &Handle;

    /// Process-unique id, used for logging.
    fn id(&self) -> u64;

    /// Map `[offset, offset + size)` into this process.
    ///
    /// The returned pointer addresses `offset` exactly, even if the backend
    /// had to map from an earlier page boundary.
    fn map(&self, offset: usize, size: usize, usage: MemoryUsage) -> Result<NonNull<u8>>;

    /// Undo a previous [`map`](Self::map).
    fn unmap(&self, addr: NonNull<u8>, size: usize) -> Result<()>;

    /// Returns true if both allocations refer to the same physical region.
    fn same_region(&self, other: &dyn LinearAllocation) -> bool {
        self.handle() == other.handle()
    }
}

/// Backend that produces linear allocations.
pub trait Allocator: Send + Sync {
    /// Backend name, for logging.
    fn name(&self) -> &str;

    /// Allocate a new region of at least `capacity` bytes.
    ///
    /// `usage` is a layout hint; the allocation may later be mapped with a
    /// different usage.
    ///
    /// # Errors
    ///
    /// - [`Error::BadValue`](crate::Error::BadValue): capacity or usage invalid
    /// - [`Error::NoMemory`](crate::Error::NoMemory): not enough memory
    /// - [`Error::NoPermission`](crate::Error::NoPermission): refused by the backend
    /// - [`Error::Unsupported`](crate::Error::Unsupported): no linear allocations
    /// - [`Error::Corrupted`](crate::Error::Corrupted): anything unexpected
    fn allocate_linear(
        &self,
        capacity: u32,
        usage: MemoryUsage,
    ) -> Result<Arc<dyn LinearAllocation>>;

    /// Re-attach to an existing region identified by `handle`.
    ///
    /// The handle is validated before the backend is touched; a foreign or
    /// damaged handle yields [`Error::BadValue`](crate::Error::BadValue).
    fn recreate_linear(&self, handle: &Handle) -> Result<Arc<dyn LinearAllocation>>;
}
