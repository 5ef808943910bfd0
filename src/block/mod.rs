//! Blocks, views and fences.
//!
//! # Architecture
//!
//! - [`LinearBlock`]: mutable block owned by the producer
//! - [`ConstBlock`]: immutable window published with [`LinearBlock::share`]
//! - [`ReadView`] / [`WriteView`]: mapped accessors borrowed from a block
//! - [`Acquirable`]: a view gated by a [`Fence`]
//! - [`BlockAllocator`]: creates blocks from an allocator backend
//!
//! # Example
//!
//! ```rust,ignore
//! use linear_block::block::{BlockAllocator, DefaultBlockAllocator, Fence};
//! use linear_block::memory::{MemfdConfig, MemoryUsage};
//!
//! let allocator = DefaultBlockAllocator::memfd(MemfdConfig::default());
//! let mut block = allocator.allocate_linear_block(4096, MemoryUsage::READ_WRITE)?;
//!
//! block.map().acquire()?.as_mut_slice()[..5].copy_from_slice(b"hello");
//!
//! let shared = block.share(0, 5, Fence::empty());
//! assert_eq!(shared.map().acquire()?.as_slice(), b"hello");
//! ```

mod allocator;
mod fence;
mod linear;
mod mapping;
mod range;
mod shared;
mod view;

pub use allocator::{BlockAllocator, DefaultBlockAllocator};
pub use fence::{Fence, FenceSignal};
pub use linear::LinearBlock;
pub use range::{EditableRange, LinearRange};
pub use shared::ConstBlock;
pub use view::{Acquirable, ReadView, WriteView};
