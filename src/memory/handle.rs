//! Serializable cross-process identity of an allocation.
//!
//! A [`Handle`] is a small fixed-layout record:
//!
//! ```text
//! ┌──────────────┬──────────────┬──────────────┬─────────────────┬─────────────────┐
//! │ version: u32 │ num_fds: u32 │ num_ints: u32│ fds[num_fds]    │ ints[num_ints]  │
//! └──────────────┴──────────────┴──────────────┴─────────────────┴─────────────────┘
//! ```
//!
//! All fields are little-endian on the wire. `version` is the byte size of
//! the whole record, so a handle from a backend with a different shape is
//! rejected by the header comparison alone. The last integer is a
//! backend-specific magic tag.
//!
//! Descriptors in `fds` are process-local numbers. A transport carries the
//! descriptors themselves out of band (e.g. `SCM_RIGHTS`) and the receiver
//! installs the numbers it got with [`Handle::with_fds`].

use crate::error::{Error, Result};
use std::os::unix::io::RawFd;

/// Size of the fixed header in bytes.
pub const HANDLE_HEADER_LEN: usize = 12;

/// Fixed header of a [`Handle`].
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize,
)]
#[rkyv(derive(Debug))]
pub struct HandleHeader {
    /// Byte size of the complete handle.
    pub version: u32,
    /// Number of transport descriptors.
    pub num_fds: u32,
    /// Number of integer fields (including the magic).
    pub num_ints: u32,
}

/// Cross-process identity of an allocation.
#[derive(
    Clone, Debug, PartialEq, Eq, Hash, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize,
)]
#[rkyv(derive(Debug))]
pub struct Handle {
    header: HandleHeader,
    fds: Vec<RawFd>,
    ints: Vec<i32>,
}

impl Handle {
    /// Build a handle from descriptors and integer fields.
    ///
    /// The header is derived from the field counts.
    pub fn new(fds: Vec<RawFd>, ints: Vec<i32>) -> Self {
        Self {
            header: HandleHeader {
                version: layout_version(fds.len() as u32, ints.len() as u32),
                num_fds: fds.len() as u32,
                num_ints: ints.len() as u32,
            },
            fds,
            ints,
        }
    }

    /// The fixed header.
    pub fn header(&self) -> HandleHeader {
        self.header
    }

    /// Transport descriptors.
    pub fn fds(&self) -> &[RawFd] {
        &self.fds
    }

    /// Integer fields, magic last.
    pub fn ints(&self) -> &[i32] {
        &self.ints
    }

    /// The magic tag, if the handle has any integer fields.
    pub fn magic(&self) -> Option<i32> {
        self.ints.last().copied()
    }

    /// Number of bytes [`encode`](Self::encode) produces.
    pub fn encoded_len(&self) -> usize {
        HANDLE_HEADER_LEN + 4 * (self.fds.len() + self.ints.len())
    }

    /// Serialize to the wire layout.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.extend_from_slice(&self.header.version.to_le_bytes());
        out.extend_from_slice(&self.header.num_fds.to_le_bytes());
        out.extend_from_slice(&self.header.num_ints.to_le_bytes());
        for fd in &self.fds {
            out.extend_from_slice(&fd.to_le_bytes());
        }
        for value in &self.ints {
            out.extend_from_slice(&value.to_le_bytes());
        }
        out
    }

    /// Parse the wire layout.
    ///
    /// Only the structure is checked here (header counts agree with the
    /// payload length). Whether the handle belongs to a given backend is
    /// decided by [`HandleLayout::is_valid`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadValue`] for truncated or over-long input.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HANDLE_HEADER_LEN {
            return Err(Error::BadValue);
        }

        let version = read_u32(bytes, 0);
        let num_fds = read_u32(bytes, 4);
        let num_ints = read_u32(bytes, 8);

        let expected = (num_fds as usize)
            .checked_add(num_ints as usize)
            .and_then(|fields| fields.checked_mul(4))
            .and_then(|payload| payload.checked_add(HANDLE_HEADER_LEN))
            .ok_or(Error::BadValue)?;
        if bytes.len() != expected {
            return Err(Error::BadValue);
        }

        let mut cursor = HANDLE_HEADER_LEN;
        let mut fds = Vec::with_capacity(num_fds as usize);
        for _ in 0..num_fds {
            fds.push(read_u32(bytes, cursor) as i32);
            cursor += 4;
        }
        let mut ints = Vec::with_capacity(num_ints as usize);
        for _ in 0..num_ints {
            ints.push(read_u32(bytes, cursor) as i32);
            cursor += 4;
        }

        Ok(Self {
            header: HandleHeader {
                version,
                num_fds,
                num_ints,
            },
            fds,
            ints,
        })
    }

    /// Replace the descriptor numbers with the ones received locally.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadValue`] if the count differs from the header.
    pub fn with_fds(mut self, fds: &[RawFd]) -> Result<Self> {
        if fds.len() != self.fds.len() {
            return Err(Error::BadValue);
        }
        self.fds.copy_from_slice(fds);
        Ok(self)
    }
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Byte size of a handle with the given field counts.
pub const fn layout_version(num_fds: u32, num_ints: u32) -> u32 {
    HANDLE_HEADER_LEN as u32 + 4 * (num_fds + num_ints)
}

/// Build a magic tag from four ASCII bytes.
pub const fn magic_tag(tag: [u8; 4]) -> i32 {
    i32::from_be_bytes(tag)
}

/// Expected shape of a backend's handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleLayout {
    /// Number of descriptors.
    pub num_fds: u32,
    /// Number of integer fields, including the magic.
    pub num_ints: u32,
    /// Value of the last integer field.
    pub magic: i32,
}

impl HandleLayout {
    /// Describe a layout. `num_ints` must count the magic.
    pub const fn new(num_fds: u32, num_ints: u32, magic: i32) -> Self {
        Self {
            num_fds,
            num_ints,
            magic,
        }
    }

    /// Header every handle of this layout carries.
    pub const fn header(&self) -> HandleHeader {
        HandleHeader {
            version: layout_version(self.num_fds, self.num_ints),
            num_fds: self.num_fds,
            num_ints: self.num_ints,
        }
    }

    /// Build a handle of this layout. `ints` excludes the magic, which is
    /// appended.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadValue`] if the field counts do not match.
    pub fn build(&self, fds: Vec<RawFd>, mut ints: Vec<i32>) -> Result<Handle> {
        ints.push(self.magic);
        let handle = Handle::new(fds, ints);
        self.validate(&handle)?;
        Ok(handle)
    }

    /// Returns true if `handle` has this layout's header and magic.
    ///
    /// The header is compared before any other field is looked at.
    pub fn is_valid(&self, handle: &Handle) -> bool {
        if handle.header != self.header() {
            return false;
        }
        handle.fds.len() == self.num_fds as usize
            && handle.ints.len() == self.num_ints as usize
            && handle.magic() == Some(self.magic)
    }

    /// Like [`is_valid`](Self::is_valid), as a result.
    pub fn validate(&self, handle: &Handle) -> Result<()> {
        if self.is_valid(handle) {
            Ok(())
        } else {
            Err(Error::BadValue)
        }
    }
}
