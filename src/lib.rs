//! # linear-block
//!
//! Zero-copy linear buffers for media pipelines.
//!
//! A producer (a decoder, a capture device) and a consumer (a renderer,
//! another process) exchange large memory regions without copying them.
//! Memory comes from a pluggable [`memory::Allocator`], is wrapped into
//! [`block::LinearBlock`]s, mapped lazily into views and published as
//! immutable [`block::ConstBlock`]s gated by a [`block::Fence`].
//!
//! ## Features
//!
//! - **Lazy mapping**: nothing is mapped until a view is requested
//! - **Shared blocks**: clones share one mapping, torn down once
//! - **Cross-process identity**: serializable [`memory::Handle`]s
//! - **Fences**: eventfd-backed, blocking or async waits
//! - **memfd backend**: `memfd_create` + `mmap(MAP_SHARED)`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use linear_block::prelude::*;
//!
//! let allocator = DefaultBlockAllocator::memfd(MemfdConfig::default());
//! let mut block = allocator.allocate_linear_block(4096, MemoryUsage::READ_WRITE)?;
//!
//! let mut view = block.map().acquire()?;
//! view.as_mut_slice()[..256].fill(0xab);
//! drop(view);
//!
//! let (fence, signal) = Fence::pending()?;
//! let shared = block.share(0, 256, fence);
//! signal.signal()?;
//!
//! let view = shared.map().acquire()?;
//! assert!(view.as_slice().iter().all(|&b| b == 0xab));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod block;
pub mod error;
pub mod memory;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::block::{
        Acquirable, BlockAllocator, ConstBlock, DefaultBlockAllocator, Fence, FenceSignal,
        LinearBlock, LinearRange, ReadView, WriteView,
    };
    pub use crate::error::{Error, Result};
    pub use crate::memory::{Allocator, Handle, LinearAllocation, MemfdConfig, MemoryUsage};
}

pub use error::{Error, Result};
