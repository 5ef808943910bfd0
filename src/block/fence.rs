//! Completion fences.
//!
//! A [`Fence`] tells a consumer when the contents of a block are defined. The
//! empty fence is already satisfied. A pending fence wraps an eventfd that the
//! producer side signals through its [`FenceSignal`].
//!
//! Completion is sticky: the eventfd counter is never drained, so once
//! signalled the fence stays readable and any number of waiters, in this or
//! another process, return immediately.
//!
//! ```rust,ignore
//! let (fence, signal) = Fence::pending()?;
//! let shared = block.share(0, 256, fence);
//!
//! // ... DMA engine finishes ...
//! signal.signal()?;
//! ```

use crate::error::{Error, Result};
use rustix::event::{EventfdFlags, PollFd, PollFlags, Timespec};
use rustix::fd::{AsFd, BorrowedFd, OwnedFd};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Completion token gating access to a block's contents.
#[derive(Clone, Default)]
pub struct Fence {
    fd: Option<Arc<OwnedFd>>,
}

impl Fence {
    /// A fence that is already satisfied.
    pub fn empty() -> Self {
        Self { fd: None }
    }

    /// Create a pending fence and the signal that completes it.
    pub fn pending() -> Result<(Fence, FenceSignal)> {
        let fd = rustix::event::eventfd(0, EventfdFlags::NONBLOCK | EventfdFlags::CLOEXEC)?;
        let fd = Arc::new(fd);
        Ok((Fence { fd: Some(fd.clone()) }, FenceSignal { fd }))
    }

    /// Import a fence received from another process.
    ///
    /// Any descriptor that becomes readable on completion works (an eventfd,
    /// a sync file).
    pub fn from_fd(fd: OwnedFd) -> Self {
        Self {
            fd: Some(Arc::new(fd)),
        }
    }

    /// Returns true for the empty fence.
    pub fn is_empty(&self) -> bool {
        self.fd.is_none()
    }

    /// Descriptor to export next to a handle, if the fence is not empty.
    pub fn as_fd(&self) -> Option<BorrowedFd<'_>> {
        self.fd.as_deref().map(AsFd::as_fd)
    }

    /// Check for completion without blocking.
    pub fn is_signaled(&self) -> Result<bool> {
        match self.poll(Some(Duration::ZERO)) {
            Ok(()) => Ok(true),
            Err(Error::TimedOut) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Block the calling thread until the fence completes.
    pub fn wait(&self) -> Result<()> {
        self.poll(None)
    }

    /// Block for at most `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TimedOut`] if the fence did not complete in time.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<()> {
        self.poll(Some(timeout))
    }

    /// Wait on the tokio runtime without blocking the worker thread.
    ///
    /// Dropping the future cancels the wait and has no other effect.
    pub async fn wait_async(&self) -> Result<()> {
        use tokio::io::Interest;
        use tokio::io::unix::AsyncFd;

        let Some(fd) = self.fd.as_deref() else {
            return Ok(());
        };
        if self.is_signaled()? {
            return Ok(());
        }

        // Each waiter registers its own duplicate; the reactor rejects a
        // second registration of the same descriptor.
        let dup = rustix::io::fcntl_dupfd_cloexec(fd, 0)?;
        let async_fd = AsyncFd::with_interest(dup, Interest::READABLE)?;

        loop {
            let mut guard = async_fd.readable().await?;
            if self.is_signaled()? {
                return Ok(());
            }
            guard.clear_ready();
        }
    }

    fn poll(&self, timeout: Option<Duration>) -> Result<()> {
        let Some(fd) = self.fd.as_deref() else {
            return Ok(());
        };

        // a deadline past the end of time is no deadline
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        loop {
            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            let timespec = remaining.map(|r| Timespec {
                tv_sec: i64::try_from(r.as_secs()).unwrap_or(i64::MAX),
                tv_nsec: r.subsec_nanos() as _,
            });

            let mut fds = [PollFd::new(fd, PollFlags::IN)];
            match rustix::event::poll(&mut fds, timespec.as_ref()) {
                Ok(0) => return Err(Error::TimedOut),
                Ok(_) => {
                    let revents = fds[0].revents();
                    if revents.contains(PollFlags::IN) {
                        return Ok(());
                    }
                    tracing::warn!(?revents, "fence descriptor reported an error");
                    return Err(Error::Corrupted);
                }
                Err(rustix::io::Errno::INTR) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl std::fmt::Debug for Fence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.fd {
            None => f.write_str("Fence(empty)"),
            Some(fd) => f.debug_tuple("Fence").field(fd).finish(),
        }
    }
}

/// Producer side of a pending [`Fence`].
///
/// Dropping the signal without calling [`signal`](Self::signal) leaves the
/// fence pending forever.
#[derive(Debug)]
pub struct FenceSignal {
    fd: Arc<OwnedFd>,
}

impl FenceSignal {
    /// Complete the fence. Signalling twice is harmless.
    pub fn signal(&self) -> Result<()> {
        match rustix::io::write(&*self.fd, &1u64.to_ne_bytes()) {
            Ok(_) => {
                tracing::trace!("fence signalled");
                Ok(())
            }
            // counter saturated: already signalled
            Err(rustix::io::Errno::AGAIN) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Another fence waiting on this signal.
    pub fn fence(&self) -> Fence {
        Fence {
            fd: Some(self.fd.clone()),
        }
    }
}
