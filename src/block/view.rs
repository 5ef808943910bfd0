//! Mapped views and the fence-gated acquirable wrapper.
//!
//! Views are only built by the block types in this crate. A view borrows its
//! block, so it can never outlive the mapping it points into. A view created
//! from a mapping failure has a null pointer, an empty range and an error;
//! its slice accessors return empty slices.

use super::fence::Fence;
use super::range::{EditableRange, LinearRange};
use crate::error::{Error, Result};
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::time::Duration;

/// Read-only view over a mapped window.
///
/// `data()` addresses the first byte of the window; the view's range has
/// the window size as its capacity and starts at offset zero.
#[derive(Debug, Clone, Copy)]
pub struct ReadView<'a> {
    data: Option<NonNull<u8>>,
    range: LinearRange,
    error: Option<Error>,
    _block: PhantomData<&'a [u8]>,
}

// SAFETY: a ReadView behaves like `&'a [u8]`.
unsafe impl Send for ReadView<'_> {}
unsafe impl Sync for ReadView<'_> {}

impl<'a> ReadView<'a> {
    pub(crate) fn new(data: NonNull<u8>, size: usize) -> Self {
        Self {
            data: Some(data),
            range: LinearRange::with_capacity(size as u32),
            error: None,
            _block: PhantomData,
        }
    }

    pub(crate) fn from_error(error: Error) -> Self {
        Self {
            data: None,
            range: LinearRange::default(),
            error: Some(error),
            _block: PhantomData,
        }
    }

    /// Pointer to the first byte, null for an error view.
    pub fn data(&self) -> *const u8 {
        self.data
            .map_or(std::ptr::null(), |p| p.as_ptr().cast_const())
    }

    /// Mapping error, if the view could not be created.
    pub fn error(&self) -> Option<Error> {
        self.error
    }

    /// Range of the view.
    pub fn range(&self) -> LinearRange {
        self.range
    }

    /// Number of readable bytes.
    pub fn capacity(&self) -> usize {
        self.range.size()
    }

    /// The mapped bytes.
    pub fn as_slice(&self) -> &'a [u8] {
        match self.data {
            // SAFETY: the block keeps `capacity()` bytes mapped for 'a.
            Some(data) => unsafe { std::slice::from_raw_parts(data.as_ptr(), self.range.size()) },
            None => &[],
        }
    }

    /// A narrower view over the same mapping. Nothing is remapped.
    ///
    /// `offset` and `size` are clamped into this view.
    pub fn sub_view(&self, offset: usize, size: usize) -> ReadView<'a> {
        let Some(data) = self.data else {
            return *self;
        };
        let sub = self.range.sub_range(offset, size);
        // SAFETY: `sub.offset() <= capacity()`, still inside the mapping.
        let data = unsafe { data.add(sub.offset()) };
        Self::new(data, sub.size())
    }
}

impl AsRef<[u8]> for ReadView<'_> {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

/// Writable view over a block's full mapping.
///
/// `base()` is the start of the mapping; `data()` is `base() + offset()`.
/// The writable window can be narrowed to record how much was produced.
#[derive(Debug)]
pub struct WriteView<'a> {
    base: Option<NonNull<u8>>,
    range: EditableRange,
    error: Option<Error>,
    _block: PhantomData<&'a mut [u8]>,
}

// SAFETY: a WriteView behaves like `&'a mut [u8]`.
unsafe impl Send for WriteView<'_> {}
unsafe impl Sync for WriteView<'_> {}

impl<'a> WriteView<'a> {
    pub(crate) fn new(base: NonNull<u8>, range: EditableRange) -> Self {
        Self {
            base: Some(base),
            range,
            error: None,
            _block: PhantomData,
        }
    }

    pub(crate) fn from_error(error: Error) -> Self {
        Self {
            base: None,
            range: EditableRange::default(),
            error: Some(error),
            _block: PhantomData,
        }
    }

    /// Start of the mapping, null for an error view.
    pub fn base(&self) -> *mut u8 {
        self.base.map_or(std::ptr::null_mut(), NonNull::as_ptr)
    }

    /// Start of the current window, null for an error view.
    pub fn data(&self) -> *mut u8 {
        match self.base {
            // SAFETY: offset never exceeds the mapped capacity.
            Some(base) => unsafe { base.as_ptr().add(self.range.offset()) },
            None => std::ptr::null_mut(),
        }
    }

    /// Mapping error, if the view could not be created.
    pub fn error(&self) -> Option<Error> {
        self.error
    }

    /// Current window.
    pub fn range(&self) -> LinearRange {
        self.range.range()
    }

    /// Mapped capacity.
    pub fn capacity(&self) -> u32 {
        self.range.capacity()
    }

    /// Offset of the window.
    pub fn offset(&self) -> usize {
        self.range.offset()
    }

    /// Size of the window.
    pub fn size(&self) -> usize {
        self.range.size()
    }

    /// Move the window start, clamped to the capacity.
    pub fn set_offset(&mut self, offset: usize) {
        self.range.set_offset(offset);
    }

    /// Resize the window, clamped to the capacity.
    pub fn set_size(&mut self, size: usize) {
        self.range.set_size(size);
    }

    /// Set the window. Returns false if it had to be clamped.
    pub fn set_range(&mut self, offset: usize, size: usize) -> bool {
        self.range.set_range(offset, size)
    }

    /// The bytes of the current window.
    pub fn as_slice(&self) -> &[u8] {
        match self.base {
            // SAFETY: the window lies inside the mapping, which the block
            // keeps alive for 'a.
            Some(_) => unsafe { std::slice::from_raw_parts(self.data(), self.range.size()) },
            None => &[],
        }
    }

    /// The bytes of the current window, writable.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match self.base {
            // SAFETY: as above; `&mut self` makes this the only slice.
            Some(_) => unsafe { std::slice::from_raw_parts_mut(self.data(), self.range.size()) },
            None => &mut [],
        }
    }
}

impl AsRef<[u8]> for WriteView<'_> {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl AsMut<[u8]> for WriteView<'_> {
    fn as_mut(&mut self) -> &mut [u8] {
        self.as_mut_slice()
    }
}

/// A view that must not be trusted before its fence completes.
#[derive(Debug)]
#[must_use = "the view is only usable after acquiring it"]
pub struct Acquirable<V> {
    view: V,
    fence: Fence,
    error: Option<Error>,
}

impl<V> Acquirable<V> {
    pub(crate) fn new(view: V, fence: Fence, error: Option<Error>) -> Self {
        Self { view, fence, error }
    }

    /// Mapping error carried by the wrapper.
    pub fn error(&self) -> Option<Error> {
        self.error
    }

    /// The fence gating the view.
    pub fn fence(&self) -> &Fence {
        &self.fence
    }

    /// Returns true if acquiring would not block.
    pub fn is_ready(&self) -> bool {
        self.error.is_some() || self.fence.is_signaled().unwrap_or(false)
    }

    /// Wait for the fence, then hand out the view.
    ///
    /// A wrapper carrying a mapping error skips the wait and yields the
    /// error view; check `view.error()`. The returned `Err` is only for
    /// fence failures.
    pub fn acquire(self) -> Result<V> {
        if self.error.is_none() {
            self.fence.wait()?;
        }
        Ok(self.view)
    }

    /// Like [`acquire`](Self::acquire), giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// [`Error::TimedOut`] if the fence did not complete. The block and its
    /// mapping are untouched.
    pub fn acquire_timeout(self, timeout: Duration) -> Result<V> {
        if self.error.is_none() {
            self.fence.wait_timeout(timeout)?;
        }
        Ok(self.view)
    }

    /// Like [`acquire`](Self::acquire), suspending the task instead of the
    /// thread.
    pub async fn acquire_async(self) -> Result<V> {
        if self.error.is_none() {
            self.fence.wait_async().await?;
        }
        Ok(self.view)
    }
}
