//! Memory backends for linear blocks.
//!
//! This module is the seam between blocks and whatever provides the memory.
//!
//! # Architecture
//!
//! - [`Handle`]: serializable cross-process identity of an allocation
//! - [`LinearAllocation`]: one physical region that can be mapped into this process
//! - [`Allocator`]: backend that creates regions or re-attaches to them by handle
//! - [`MemfdAllocator`]: the Linux `memfd_create` backend
//!
//! # Example
//!
//! ```rust,ignore
//! use linear_block::memory::{Allocator, MemfdAllocator, MemoryUsage};
//!
//! let allocator = MemfdAllocator::default();
//! let allocation = allocator.allocate_linear(4096, MemoryUsage::READ_WRITE)?;
//!
//! let addr = allocation.map(0, 4096, MemoryUsage::READ_WRITE)?;
//! // ... use the memory ...
//! allocation.unmap(addr, 4096)?;
//! ```

mod allocation;
mod handle;
mod memfd;

pub use allocation::{Allocator, LinearAllocation, MemoryUsage};
pub use handle::{
    HANDLE_HEADER_LEN, Handle, HandleHeader, HandleLayout, layout_version, magic_tag,
};
pub use memfd::{
    MEMFD_HANDLE_LAYOUT, MEMFD_MAGIC, MemfdAllocation, MemfdAllocator, MemfdConfig,
};
