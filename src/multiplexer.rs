//! Thread-safe readiness multiplexer: a mutex-guarded set of
//! `(fd, interest, deadline)` entries with a `pselect`-based `wait` and
//! an independent expiry sweep. Critical sections are O(n) over a
//! small n, so a single coarse mutex is intentional rather than an
//! oversight.

use std::mem::MaybeUninit;
use std::os::unix::io::RawFd;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::collections::OrderedList;
use crate::error::MultiplexerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interest(u8);

impl Interest {
    pub const READ: Interest = Interest(0b01);
    pub const WRITE: Interest = Interest(0b10);

    pub fn contains(self, other: Interest) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Interest {
    type Output = Interest;

    fn bitor(self, rhs: Interest) -> Interest {
        Interest(self.0 | rhs.0)
    }
}

struct Entry {
    fd: RawFd,
    interest: Interest,
    entered_at: Instant,
    timeout: Option<Duration>,
}

pub struct Multiplexer {
    entries: Mutex<OrderedList<Entry>>,
}

impl Multiplexer {
    pub fn new() -> Self {
        Self { entries: Mutex::new(OrderedList::new()) }
    }

    pub fn add(&self, fd: RawFd, interest: Interest, timeout: Option<Duration>) -> Result<(), MultiplexerError> {
        if fd as usize >= libc::FD_SETSIZE {
            return Err(MultiplexerError::Overflow(fd));
        }

        let mut entries = self.entries.lock().map_err(|_| MultiplexerError::Poisoned)?;
        entries.push_back(Entry { fd, interest, entered_at: Instant::now(), timeout });
        Ok(())
    }

    pub fn remove(&self, fd: RawFd) -> Result<(), MultiplexerError> {
        let mut entries = self.entries.lock().map_err(|_| MultiplexerError::Poisoned)?;
        entries.remove_where(|e| e.fd == fd);
        Ok(())
    }

    /// Removes every entry, returning their fds so the caller can close
    /// them (used on shutdown and worker-pool restart).
    pub fn clear(&self) -> Result<Vec<RawFd>, MultiplexerError> {
        let mut entries = self.entries.lock().map_err(|_| MultiplexerError::Poisoned)?;
        let removed = entries.remove_where(|_| true);
        Ok(removed.into_iter().map(|e| e.fd).collect())
    }

    /// Removes every entry whose deadline has passed, returning their
    /// fds. Entries with `timeout == None` never expire.
    pub fn sweep_expired(&self) -> Result<Vec<RawFd>, MultiplexerError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().map_err(|_| MultiplexerError::Poisoned)?;

        let removed = entries.remove_where(|e| match e.timeout {
            Some(timeout) => now.saturating_duration_since(e.entered_at) >= timeout,
            None => false,
        });

        Ok(removed.into_iter().map(|e| e.fd).collect())
    }

    /// Blocks until at least one registered fd satisfies its requested
    /// interest, `wait_timeout` elapses, or the call is interrupted by a
    /// signal (in which case an empty result is returned, matching the
    /// program this was distilled from's `EINTR` handling).
    pub fn wait(&self, wait_timeout: Duration) -> Result<Vec<RawFd>, MultiplexerError> {
        let entries = self.entries.lock().map_err(|_| MultiplexerError::Poisoned)?;

        if entries.is_empty() {
            drop(entries);
            std::thread::sleep(wait_timeout);
            return Ok(Vec::new());
        }

        let mut read_set = new_fd_set();
        let mut write_set = new_fd_set();
        let mut max_fd = 0;

        for entry in entries.iter() {
            if entry.interest.contains(Interest::READ) {
                unsafe { libc::FD_SET(entry.fd, &mut read_set) };
            }
            if entry.interest.contains(Interest::WRITE) {
                unsafe { libc::FD_SET(entry.fd, &mut write_set) };
            }
            max_fd = max_fd.max(entry.fd);
        }

        let ts = libc::timespec {
            tv_sec: wait_timeout.as_secs() as libc::time_t,
            tv_nsec: wait_timeout.subsec_nanos() as libc::c_long,
        };

        let rc = unsafe {
            libc::pselect(
                max_fd + 1,
                &mut read_set,
                &mut write_set,
                std::ptr::null_mut(),
                &ts,
                std::ptr::null(),
            )
        };

        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                return Ok(Vec::new());
            }
            return Err(MultiplexerError::Select(err));
        }

        let mut ready = Vec::new();
        for entry in entries.iter() {
            let read_ready = entry.interest.contains(Interest::READ)
                && unsafe { libc::FD_ISSET(entry.fd, &read_set) };
            let write_ready = entry.interest.contains(Interest::WRITE)
                && unsafe { libc::FD_ISSET(entry.fd, &write_set) };

            let satisfied = if entry.interest == Interest::READ | Interest::WRITE {
                read_ready && write_ready
            } else {
                read_ready || write_ready
            };

            if satisfied {
                ready.push(entry.fd);
            }
        }

        Ok(ready)
    }
}

impl Default for Multiplexer {
    fn default() -> Self {
        Self::new()
    }
}

fn new_fd_set() -> libc::fd_set {
    unsafe {
        let mut set = MaybeUninit::<libc::fd_set>::uninit();
        libc::FD_ZERO(set.as_mut_ptr());
        set.assume_init()
    }
}
