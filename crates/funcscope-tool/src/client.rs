//! Non-blocking attach connections.

use std::io;
use std::os::fd::{AsFd, AsRawFd};
use std::os::unix::net::UnixStream;
use std::path::Path;

use funcscope_core::fdpass;
use nix::errno::Errno;
use nix::sys::socket::{connect, socket, AddressFamily, SockFlag, SockType, UnixAddr};

/// Start a connection to the attach socket at `path` without waiting.
///
/// The returned stream is non-blocking. It becomes readable once the
/// target has sent its descriptor, or closed the connection.
pub fn connect_nonblocking(path: &Path) -> io::Result<UnixStream> {
    let fd = socket(
        AddressFamily::Unix,
        SockType::Stream,
        SockFlag::SOCK_NONBLOCK | SockFlag::SOCK_CLOEXEC,
        None,
    )?;
    let addr = UnixAddr::new(path)?;
    match connect(fd.as_raw_fd(), &addr) {
        Ok(()) | Err(Errno::EINPROGRESS) => Ok(UnixStream::from(fd)),
        Err(e) => Err(e.into()),
    }
}

/// What a readable attach connection yielded.
#[derive(Debug)]
pub enum Received {
    Descriptor(std::os::fd::OwnedFd),
    Closed,
    /// Spurious wakeup; keep waiting.
    NotYet,
}

/// Try to take the region descriptor off a connection.
pub fn try_recv_region(stream: &UnixStream) -> io::Result<Received> {
    match fdpass::recv_fd(stream.as_fd()) {
        Ok(Some(fd)) => Ok(Received::Descriptor(fd)),
        Ok(None) => Ok(Received::Closed),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::Interrupted => {
            Ok(Received::NotYet)
        }
        Err(e) => Err(e),
    }
}
