//! Linear range aspects.
//!
//! A range describes a window `[offset, offset + size)` inside a region of
//! `capacity` bytes. Ranges never fail to construct: an out-of-bounds offset
//! is clamped to `capacity` and an out-of-bounds size is clamped to whatever
//! is left after the offset. Callers that need an exact window check the
//! resulting `size()`.

/// Fixed `(capacity, offset, size)` window.
///
/// Invariant: `offset <= capacity` and `offset + size <= capacity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LinearRange {
    capacity: u32,
    offset: usize,
    size: usize,
}

impl LinearRange {
    /// Create a range, clamping `offset` and `size` into `capacity`.
    pub fn new(capacity: u32, offset: usize, size: usize) -> Self {
        let cap = capacity as usize;
        let offset = offset.min(cap);
        let size = size.min(cap - offset);
        Self {
            capacity,
            offset,
            size,
        }
    }

    /// Create a range covering the whole capacity.
    pub fn with_capacity(capacity: u32) -> Self {
        Self {
            capacity,
            offset: 0,
            size: capacity as usize,
        }
    }

    /// Total capacity of the underlying region.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Start of the window.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Length of the window.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// One past the last byte of the window.
    #[inline]
    pub fn end(&self) -> usize {
        self.offset + self.size
    }

    /// Returns true if the window is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Narrow this window.
    ///
    /// `offset` is relative to the start of this window. Both values are
    /// clamped so the result always lies inside `self`, which makes nested
    /// narrowing compose: `r.sub_range(a, b).sub_range(c, d)` equals
    /// `r.sub_range(a + c, d)` whenever `c + d <= b`.
    pub fn sub_range(&self, offset: usize, size: usize) -> Self {
        let offset = offset.min(self.size);
        let size = size.min(self.size - offset);
        Self {
            capacity: self.capacity,
            offset: self.offset + offset,
            size,
        }
    }

    /// Returns true if `other` lies completely inside this window.
    pub fn contains(&self, other: &LinearRange) -> bool {
        other.offset >= self.offset && other.end() <= self.end()
    }
}

/// A range the owner may move and resize within its capacity.
///
/// Used by producers to record how much of a block they actually wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EditableRange {
    range: LinearRange,
}

impl EditableRange {
    /// Create an editable range, clamped like [`LinearRange::new`].
    pub fn new(capacity: u32, offset: usize, size: usize) -> Self {
        Self {
            range: LinearRange::new(capacity, offset, size),
        }
    }

    /// Create an editable range covering the whole capacity.
    pub fn with_capacity(capacity: u32) -> Self {
        Self {
            range: LinearRange::with_capacity(capacity),
        }
    }

    /// Total capacity.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.range.capacity
    }

    /// Current offset.
    #[inline]
    pub fn offset(&self) -> usize {
        self.range.offset
    }

    /// Current size.
    #[inline]
    pub fn size(&self) -> usize {
        self.range.size
    }

    /// Snapshot of the current window.
    #[inline]
    pub fn range(&self) -> LinearRange {
        self.range
    }

    /// Move the start of the window.
    ///
    /// The size shrinks if the window would otherwise run past the capacity.
    pub fn set_offset(&mut self, offset: usize) {
        self.range = LinearRange::new(self.range.capacity, offset, self.range.size);
    }

    /// Resize the window, keeping its offset.
    pub fn set_size(&mut self, size: usize) {
        self.range = LinearRange::new(self.range.capacity, self.range.offset, size);
    }

    /// Set offset and size together.
    ///
    /// Returns true if the requested window fit without clamping.
    pub fn set_range(&mut self, offset: usize, size: usize) -> bool {
        self.range = LinearRange::new(self.range.capacity, offset, size);
        self.range.offset == offset && self.range.size == size
    }

    /// Reset to the whole capacity.
    pub fn reset(&mut self) {
        self.range = LinearRange::with_capacity(self.range.capacity);
    }
}

impl From<LinearRange> for EditableRange {
    fn from(range: LinearRange) -> Self {
        Self { range }
    }
}

impl From<EditableRange> for LinearRange {
    fn from(editable: EditableRange) -> Self {
        editable.range
    }
}
