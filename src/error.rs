//! Error types for linear blocks.
//!
//! Every failure in this crate is one of a small, closed set of categories.
//! Backend failures arrive as OS error numbers and are classified through an
//! ordered lookup table; anything the table does not know about becomes
//! [`Error::Corrupted`] so that an unexpected failure is never mistaken for
//! success.

use rustix::io::Errno;
use thiserror::Error;

/// Result type alias using this crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for allocation, mapping and synchronization.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Error {
    /// Invalid argument or handle (caller error).
    #[error("bad value")]
    BadValue,

    /// The backend refused the operation.
    #[error("no permission")]
    NoPermission,

    /// Not enough memory to complete the operation.
    #[error("no memory")]
    NoMemory,

    /// The operation did not complete in time.
    #[error("timed out")]
    TimedOut,

    /// The backend or capability is not available.
    #[error("unsupported")]
    Unsupported,

    /// Unexpected, unrecoverable failure.
    #[error("corrupted")]
    Corrupted,
}

/// OS error numbers and the category each one maps to.
///
/// Lookups walk the table in order; the first match wins.
pub const ERRNO_TABLE: &[(Errno, Error)] = &[
    (Errno::INVAL, Error::BadValue),
    (Errno::BADF, Error::BadValue),
    (Errno::ACCESS, Error::NoPermission),
    (Errno::PERM, Error::NoPermission),
    (Errno::NOMEM, Error::NoMemory),
    (Errno::NOSPC, Error::NoMemory),
    (Errno::TIMEDOUT, Error::TimedOut),
    (Errno::NOSYS, Error::Unsupported),
    (Errno::OPNOTSUPP, Error::Unsupported),
    (Errno::NOENT, Error::Unsupported),
];

impl Error {
    /// Classify an OS error number.
    ///
    /// Unknown error numbers map to [`Error::Corrupted`].
    pub fn from_errno(errno: Errno) -> Self {
        ERRNO_TABLE
            .iter()
            .find(|(candidate, _)| *candidate == errno)
            .map(|(_, error)| *error)
            .unwrap_or(Error::Corrupted)
    }
}

/// Convert a raw status code into a result.
///
/// `0` is success. Both positive and negated error numbers are accepted,
/// since kernel-style APIs return `-errno` while libc sets `errno`.
pub fn status_from_raw(code: i32) -> Result<()> {
    if code == 0 {
        return Ok(());
    }
    Err(Error::from_errno(Errno::from_raw_os_error(code.saturating_abs())))
}

impl From<Errno> for Error {
    fn from(errno: Errno) -> Self {
        Error::from_errno(errno)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.raw_os_error() {
            Some(code) => Error::from_errno(Errno::from_raw_os_error(code)),
            None => Error::Corrupted,
        }
    }
}
