//! Anonymous shared memory backend using Linux memfd.
//!
//! Every allocation is a `memfd_create` file sized with `ftruncate`. Mappings
//! are created on demand with `mmap(MAP_SHARED)`, so every mapping of the
//! same allocation (in this process or another one holding a duplicate of
//! the descriptor) sees the same physical pages.
//!
//! # Handle layout
//!
//! | Field   | Value                                   |
//! |---------|-----------------------------------------|
//! | fds[0]  | the memfd                               |
//! | ints[0] | capacity in bytes                       |
//! | ints[1] | magic `"mfd1"`                          |
//!
//! # Example
//!
//! ```rust,ignore
//! use linear_block::memory::{Allocator, MemfdAllocator, MemfdConfig, MemoryUsage};
//!
//! let allocator = MemfdAllocator::new(MemfdConfig::default().with_name("decoder-out"));
//! let allocation = allocator.allocate_linear(64 * 1024, MemoryUsage::READ_WRITE)?;
//!
//! // Another process re-attaches with the handle (after receiving the fd).
//! let again = allocator.recreate_linear(allocation.handle())?;
//! ```

use super::{Allocator, Handle, HandleLayout, LinearAllocation, MemoryUsage, magic_tag};
use crate::error::{Error, Result};
use rustix::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};
use rustix::mm::{MapFlags, ProtFlags};
use std::collections::HashMap;
use std::ffi::CString;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Magic tag of memfd handles.
pub const MEMFD_MAGIC: i32 = magic_tag(*b"mfd1");

/// Shape of memfd handles: one descriptor, capacity and magic.
pub const MEMFD_HANDLE_LAYOUT: HandleLayout = HandleLayout::new(1, 2, MEMFD_MAGIC);

/// Global counter for allocation ids.
static ALLOCATION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_allocation_id() -> u64 {
    ALLOCATION_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Configuration for a [`MemfdAllocator`].
#[derive(Debug, Clone)]
pub struct MemfdConfig {
    /// Debug name of created memfds (visible in `/proc/<pid>/fd/`).
    pub name: String,
    /// Largest capacity the allocator hands out.
    pub max_capacity: u32,
    /// Touch every page right after allocation.
    pub prefault: bool,
}

impl Default for MemfdConfig {
    fn default() -> Self {
        Self {
            name: String::from("linear-block"),
            max_capacity: u32::MAX,
            prefault: false,
        }
    }
}

impl MemfdConfig {
    /// Set the debug name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Cap the capacity of single allocations.
    pub fn with_max_capacity(mut self, max_capacity: u32) -> Self {
        self.max_capacity = max_capacity;
        self
    }

    /// Enable or disable prefaulting.
    pub fn with_prefault(mut self, prefault: bool) -> Self {
        self.prefault = prefault;
        self
    }
}

/// Allocator backed by `memfd_create`.
#[derive(Debug, Clone, Default)]
pub struct MemfdAllocator {
    config: MemfdConfig,
}

impl MemfdAllocator {
    /// Create an allocator with the given configuration.
    pub fn new(config: MemfdConfig) -> Self {
        Self { config }
    }

    /// The allocator's configuration.
    pub fn config(&self) -> &MemfdConfig {
        &self.config
    }

    /// Allocate a concrete [`MemfdAllocation`].
    ///
    /// Same as [`Allocator::allocate_linear`] without type erasure.
    pub fn allocate(&self, capacity: u32) -> Result<MemfdAllocation> {
        if capacity == 0 || capacity > self.config.max_capacity {
            return Err(Error::BadValue);
        }

        let allocation = MemfdAllocation::create(&self.config.name, capacity)?;
        if self.config.prefault {
            allocation.prefault()?;
        }

        tracing::debug!(
            id = allocation.id,
            capacity,
            allocator = %self.config.name,
            "allocated linear memfd"
        );
        Ok(allocation)
    }
}

impl Allocator for MemfdAllocator {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn allocate_linear(
        &self,
        capacity: u32,
        _usage: MemoryUsage,
    ) -> Result<Arc<dyn LinearAllocation>> {
        Ok(Arc::new(self.allocate(capacity)?))
    }

    fn recreate_linear(&self, handle: &Handle) -> Result<Arc<dyn LinearAllocation>> {
        MEMFD_HANDLE_LAYOUT.validate(handle)?;

        let raw_fd = handle.fds()[0];
        let capacity = handle.ints()[0] as u32;
        if raw_fd < 0 || capacity == 0 {
            return Err(Error::BadValue);
        }

        // SAFETY: the descriptor is only used for the duplicating fcntl below;
        // a number that is not open in this process fails with EBADF.
        let borrowed = unsafe { BorrowedFd::borrow_raw(raw_fd) };
        let owned = rustix::io::fcntl_dupfd_cloexec(borrowed, 0)?;
        let allocation = MemfdAllocation::from_fd(owned, capacity)?;

        tracing::debug!(id = allocation.id, capacity, "recreated linear memfd");
        Ok(Arc::new(allocation))
    }
}

/// Bookkeeping for one live mapping.
#[derive(Debug, Clone, Copy)]
struct MappedRegion {
    /// Page-aligned address returned by mmap.
    base: usize,
    /// Length passed to mmap.
    len: usize,
    /// Size the caller asked for.
    size: usize,
}

/// One memfd-backed linear region.
pub struct MemfdAllocation {
    fd: OwnedFd,
    capacity: u32,
    handle: Handle,
    id: u64,
    page_size: usize,
    /// Live mappings keyed by the address handed to the caller.
    mappings: Mutex<HashMap<usize, MappedRegion>>,
}

impl MemfdAllocation {
    fn create(name: &str, capacity: u32) -> Result<Self> {
        let cname = CString::new(name).map_err(|_| Error::BadValue)?;
        let fd = rustix::fs::memfd_create(&cname, rustix::fs::MemfdFlags::CLOEXEC)?;
        rustix::fs::ftruncate(&fd, u64::from(capacity))?;
        Self::from_parts(fd, capacity)
    }

    /// Wrap a received memfd.
    ///
    /// The descriptor must be a memfd at least `capacity` bytes long;
    /// anything else is [`Error::BadValue`].
    pub fn from_fd(fd: OwnedFd, capacity: u32) -> Result<Self> {
        // only shmem files answer F_GET_SEALS
        rustix::fs::fcntl_get_seals(&fd).map_err(|_| Error::BadValue)?;
        let stat = rustix::fs::fstat(&fd)?;
        if stat.st_size < i64::from(capacity) {
            return Err(Error::BadValue);
        }
        Self::from_parts(fd, capacity)
    }

    fn from_parts(fd: OwnedFd, capacity: u32) -> Result<Self> {
        let handle = MEMFD_HANDLE_LAYOUT.build(vec![fd.as_raw_fd()], vec![capacity as i32])?;
        Ok(Self {
            fd,
            capacity,
            handle,
            id: next_allocation_id(),
            page_size: rustix::param::page_size(),
            mappings: Mutex::new(HashMap::new()),
        })
    }

    /// Duplicate the descriptor, e.g. to hand it to a transport.
    pub fn dup_fd(&self) -> Result<OwnedFd> {
        Ok(rustix::io::fcntl_dupfd_cloexec(&self.fd, 0)?)
    }

    /// Number of mappings that have not been unmapped yet.
    pub fn mapping_count(&self) -> usize {
        self.lock_mappings().len()
    }

    /// Touch every page once so later accesses do not fault.
    pub fn prefault(&self) -> Result<()> {
        let size = self.capacity as usize;
        let addr = self.map(0, size, MemoryUsage::READ)?;
        for offset in (0..size).step_by(self.page_size) {
            // SAFETY: `addr` maps `size` readable bytes.
            unsafe {
                let _ = std::ptr::read_volatile(addr.as_ptr().add(offset));
            }
        }
        self.unmap(addr, size)
    }

    fn lock_mappings(&self) -> MutexGuard<'_, HashMap<usize, MappedRegion>> {
        self.mappings.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LinearAllocation for MemfdAllocation {
    #[inline]
    fn capacity(&self) -> u32 {
        self.capacity
    }

    #[inline]
    fn handle(&self) -> &Handle {
        &self.handle
    }

    #[inline]
    fn id(&self) -> u64 {
        self.id
    }

    fn map(&self, offset: usize, size: usize, usage: MemoryUsage) -> Result<NonNull<u8>> {
        if size == 0 || !usage.is_cpu_accessible() {
            return Err(Error::BadValue);
        }
        let end = offset.checked_add(size).ok_or(Error::BadValue)?;
        if end > self.capacity as usize {
            return Err(Error::BadValue);
        }

        // mmap offsets must be page aligned
        let alignment = offset % self.page_size;
        let map_offset = offset - alignment;
        let map_len = size + alignment;

        let mut prot = ProtFlags::READ;
        if usage.cpu_write {
            prot |= ProtFlags::WRITE;
        }

        // SAFETY: fresh mapping chosen by the kernel, within the file size.
        let base = unsafe {
            rustix::mm::mmap(
                std::ptr::null_mut(),
                map_len,
                prot,
                MapFlags::SHARED,
                &self.fd,
                map_offset as u64,
            )?
        };
        let base = NonNull::new(base.cast::<u8>()).ok_or(Error::Corrupted)?;
        // SAFETY: `alignment < map_len`, so the result stays inside the mapping.
        let addr = unsafe { base.add(alignment) };

        self.lock_mappings().insert(
            addr.as_ptr() as usize,
            MappedRegion {
                base: base.as_ptr() as usize,
                len: map_len,
                size,
            },
        );

        tracing::trace!(id = self.id, offset, size, write = usage.cpu_write, "mapped");
        Ok(addr)
    }

    fn unmap(&self, addr: NonNull<u8>, size: usize) -> Result<()> {
        let key = addr.as_ptr() as usize;
        let region = {
            let mut mappings = self.lock_mappings();
            let matches = mappings.get(&key).is_some_and(|region| region.size == size);
            if !matches {
                return Err(Error::BadValue);
            }
            // removed before munmap so a failed munmap is never retried
            mappings.remove(&key).ok_or(Error::BadValue)?
        };

        // SAFETY: `region` was produced by our own mmap and removed from the
        // registry, so it is unmapped exactly once.
        unsafe { rustix::mm::munmap(region.base as *mut _, region.len)? };

        tracing::trace!(id = self.id, size, "unmapped");
        Ok(())
    }
}

impl Drop for MemfdAllocation {
    fn drop(&mut self) {
        let leftover: Vec<MappedRegion> = self.lock_mappings().drain().map(|(_, r)| r).collect();
        if !leftover.is_empty() {
            tracing::warn!(
                id = self.id,
                count = leftover.len(),
                "allocation dropped with live mappings"
            );
        }
        for region in leftover {
            // SAFETY: mapping created by this allocation and never unmapped.
            if let Err(e) = unsafe { rustix::mm::munmap(region.base as *mut _, region.len) } {
                tracing::warn!(id = self.id, error = %e, "munmap failed during drop");
            }
        }
        // fd is closed when OwnedFd is dropped
    }
}

impl AsFd for MemfdAllocation {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl std::fmt::Debug for MemfdAllocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemfdAllocation")
            .field("id", &self.id)
            .field("fd", &self.fd.as_raw_fd())
            .field("capacity", &self.capacity)
            .field("mappings", &self.mapping_count())
            .finish()
    }
}
