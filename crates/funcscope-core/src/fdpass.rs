//! Descriptor transfer over a local stream socket (`SCM_RIGHTS`).
//!
//! One message carries one placeholder payload byte plus one descriptor
//! in the ancillary data. The byte only exists because a stream socket
//! will not carry ancillary data without payload.

use std::io;
use std::mem::{size_of, size_of_val, zeroed};
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::ptr;

/// Placeholder payload byte.
const PAYLOAD: u8 = b'F';

/// Room for a handful of descriptors; 8-byte aligned as `cmsghdr` requires.
type CmsgBuf = [u64; 8];

/// Send `fd` across `sock`.
pub fn send_fd(sock: BorrowedFd<'_>, fd: BorrowedFd<'_>) -> io::Result<()> {
    let mut payload = [PAYLOAD];
    let mut iov = libc::iovec {
        iov_base: payload.as_mut_ptr() as *mut libc::c_void,
        iov_len: payload.len(),
    };
    let mut cmsg_buf: CmsgBuf = [0; 8];

    // Safety: msghdr is plain data; every pointer set below outlives the
    // sendmsg call, and CMSG_SPACE(sizeof(int)) fits in cmsg_buf.
    unsafe {
        let mut msg: libc::msghdr = zeroed();
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        msg.msg_control = cmsg_buf.as_mut_ptr() as *mut libc::c_void;
        msg.msg_controllen = libc::CMSG_SPACE(size_of::<RawFd>() as u32) as _;

        let cmsg = libc::CMSG_FIRSTHDR(&msg);
        (*cmsg).cmsg_level = libc::SOL_SOCKET;
        (*cmsg).cmsg_type = libc::SCM_RIGHTS;
        (*cmsg).cmsg_len = libc::CMSG_LEN(size_of::<RawFd>() as u32) as _;
        ptr::write_unaligned(libc::CMSG_DATA(cmsg) as *mut RawFd, fd.as_raw_fd());

        let ret = libc::sendmsg(sock.as_raw_fd(), &msg, libc::MSG_NOSIGNAL);
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Receive one descriptor from `sock`.
///
/// `Ok(None)` means the peer closed the connection, or sent a message
/// without a descriptor. Extra descriptors in the same message are closed.
/// A would-block socket surfaces as `ErrorKind::WouldBlock`.
pub fn recv_fd(sock: BorrowedFd<'_>) -> io::Result<Option<OwnedFd>> {
    let mut payload = [0u8; 1];
    let mut iov = libc::iovec {
        iov_base: payload.as_mut_ptr() as *mut libc::c_void,
        iov_len: payload.len(),
    };
    let mut cmsg_buf: CmsgBuf = [0; 8];
    let mut received = None;

    // Safety: as in send_fd; every descriptor found in SCM_RIGHTS data is
    // freshly installed in this process and owned by us.
    unsafe {
        let mut msg: libc::msghdr = zeroed();
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        msg.msg_control = cmsg_buf.as_mut_ptr() as *mut libc::c_void;
        msg.msg_controllen = size_of_val(&cmsg_buf) as _;

        let ret = libc::recvmsg(sock.as_raw_fd(), &mut msg, libc::MSG_CMSG_CLOEXEC);
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        if ret == 0 {
            return Ok(None);
        }

        let mut cmsg = libc::CMSG_FIRSTHDR(&msg);
        while !cmsg.is_null() {
            if (*cmsg).cmsg_level == libc::SOL_SOCKET && (*cmsg).cmsg_type == libc::SCM_RIGHTS {
                let data = libc::CMSG_DATA(cmsg) as *const RawFd;
                let bytes = (*cmsg).cmsg_len as usize - libc::CMSG_LEN(0) as usize;
                for i in 0..bytes / size_of::<RawFd>() {
                    let fd = OwnedFd::from_raw_fd(ptr::read_unaligned(data.add(i)));
                    if received.is_none() {
                        received = Some(fd);
                    }
                }
            }
            cmsg = libc::CMSG_NXTHDR(&msg, cmsg);
        }
    }
    Ok(received)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::os::fd::AsFd;
    use std::os::unix::fs::MetadataExt;
    use std::os::unix::net::UnixStream;

    #[test]
    fn test_descriptor_arrives_as_same_file() {
        let (a, b) = UnixStream::pair().unwrap();
        let original = File::open("/dev/null").unwrap();

        send_fd(a.as_fd(), original.as_fd()).unwrap();
        let received = File::from(recv_fd(b.as_fd()).unwrap().unwrap());

        let (m1, m2) = (original.metadata().unwrap(), received.metadata().unwrap());
        assert_eq!((m1.dev(), m1.ino()), (m2.dev(), m2.ino()));
        assert_ne!(original.as_raw_fd(), received.as_raw_fd());
    }

    #[test]
    fn test_peer_close_yields_none() {
        let (a, b) = UnixStream::pair().unwrap();
        drop(a);
        assert!(recv_fd(b.as_fd()).unwrap().is_none());
    }

    #[test]
    fn test_plain_byte_yields_none() {
        use std::io::Write;
        let (mut a, b) = UnixStream::pair().unwrap();
        a.write_all(b"x").unwrap();
        assert!(recv_fd(b.as_fd()).unwrap().is_none());
    }

    #[test]
    fn test_nonblocking_empty_would_block() {
        let (_a, b) = UnixStream::pair().unwrap();
        b.set_nonblocking(true).unwrap();
        let err = recv_fd(b.as_fd()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }
}
