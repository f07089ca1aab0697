//! `Multiplexer` - one epoll instance over many pending attach connections.
//!
//! Registration carries a caller-chosen `u64` token, handed back when
//! the descriptor becomes readable (or hung up, which epoll always
//! reports).

use std::io;
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd};
use std::time::Duration;

pub struct Multiplexer {
    epfd: OwnedFd,
    events: Vec<libc::epoll_event>,
}

impl Multiplexer {
    /// `capacity` bounds how many events one `wait` returns.
    pub fn new(capacity: usize) -> io::Result<Self> {
        // Safety: plain syscall, result checked.
        let raw = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if raw < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            // Safety: fresh descriptor we own.
            epfd: unsafe { OwnedFd::from_raw_fd(raw) },
            events: vec![libc::epoll_event { events: 0, u64: 0 }; capacity.max(1)],
        })
    }

    pub fn register(&self, fd: BorrowedFd<'_>, token: u64) -> io::Result<()> {
        let mut ev = libc::epoll_event {
            events: (libc::EPOLLIN | libc::EPOLLRDHUP) as u32,
            u64: token,
        };
        // Safety: ev is valid for the call; fd is open.
        let ret = unsafe {
            libc::epoll_ctl(self.epfd.as_raw_fd(), libc::EPOLL_CTL_ADD, fd.as_raw_fd(), &mut ev)
        };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub fn deregister(&self, fd: BorrowedFd<'_>) -> io::Result<()> {
        // Safety: a null event is accepted for EPOLL_CTL_DEL since 2.6.9.
        let ret = unsafe {
            libc::epoll_ctl(
                self.epfd.as_raw_fd(),
                libc::EPOLL_CTL_DEL,
                fd.as_raw_fd(),
                std::ptr::null_mut(),
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Wait up to `timeout` and append ready tokens to `ready`.
    ///
    /// A signal interrupting the wait returns with nothing ready.
    pub fn wait(&mut self, timeout: Duration, ready: &mut Vec<u64>) -> io::Result<()> {
        // Round sub-millisecond remainders up so a short deadline does
        // not degrade into a busy poll.
        let mut ms = timeout.as_millis().min(i32::MAX as u128) as i32;
        if ms == 0 && !timeout.is_zero() {
            ms = 1;
        }
        // Safety: events buffer is valid for events.len() entries.
        let n = unsafe {
            libc::epoll_wait(
                self.epfd.as_raw_fd(),
                self.events.as_mut_ptr(),
                self.events.len() as i32,
                ms,
            )
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err);
        }
        ready.extend(self.events[..n as usize].iter().map(|ev| ev.u64));
        Ok(())
    }
}
