use libc::{
    accept, bind, close, connect, fcntl, getsockname, getsockopt, listen, setsockopt, sockaddr,
    sockaddr_in, socket, socklen_t, AF_INET, ECONNABORTED, F_GETFL, F_SETFL, O_NONBLOCK,
    SOCK_STREAM, SOL_SOCKET, SO_ERROR, SO_REUSEADDR,
};

use std::io;
use std::mem;
use std::net::Ipv4Addr;
use std::os::fd::RawFd;

/// Reads from a file descriptor into the given buffer.
///
/// Returns the number of bytes read, or a negative value on error.
/// The file descriptor **must** be non-blocking.
pub(crate) fn sys_read(fd: RawFd, buffer: &mut [u8]) -> isize {
    unsafe { libc::read(fd, buffer.as_mut_ptr() as *mut _, buffer.len()) }
}

/// Writes the buffer to a file descriptor.
///
/// Returns the number of bytes written, or a negative value on error.
/// The file descriptor **must** be non-blocking.
pub(crate) fn sys_write(fd: RawFd, buffer: &[u8]) -> isize {
    unsafe { libc::write(fd, buffer.as_ptr() as *const _, buffer.len()) }
}

/// Closes a file descriptor.
pub(crate) fn sys_close(fd: RawFd) {
    unsafe { close(fd) };
}

/// Sets a file descriptor to non-blocking mode.
pub(crate) fn sys_set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { fcntl(fd, F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }

    let rc = unsafe { fcntl(fd, F_SETFL, flags | O_NONBLOCK) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Creates a non-blocking IPv4 stream socket.
pub(crate) fn sys_socket() -> io::Result<RawFd> {
    let fd = unsafe { socket(AF_INET, SOCK_STREAM, 0) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    if let Err(e) = sys_set_nonblocking(fd) {
        unsafe { close(fd) };
        return Err(e);
    }

    Ok(fd)
}

/// Enables `SO_REUSEADDR` on a socket.
pub(crate) fn sys_set_reuseaddr(fd: RawFd) -> io::Result<()> {
    let opt: libc::c_int = 1;
    let rc = unsafe {
        setsockopt(
            fd,
            SOL_SOCKET,
            SO_REUSEADDR,
            &opt as *const _ as *const _,
            mem::size_of::<libc::c_int>() as socklen_t,
        )
    };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

fn ipv4_sockaddr(ip: Ipv4Addr, port: u16) -> sockaddr_in {
    let mut addr: sockaddr_in = unsafe { mem::zeroed() };
    addr.sin_family = AF_INET as libc::sa_family_t;
    addr.sin_port = port.to_be();
    addr.sin_addr = libc::in_addr {
        s_addr: u32::from(ip).to_be(),
    };
    addr
}

/// Binds a socket to `INADDR_ANY:port`.
pub(crate) fn sys_bind_any(fd: RawFd, port: u16) -> io::Result<()> {
    let addr = ipv4_sockaddr(Ipv4Addr::UNSPECIFIED, port);

    let rc = unsafe {
        bind(
            fd,
            &addr as *const _ as *const sockaddr,
            mem::size_of::<sockaddr_in>() as socklen_t,
        )
    };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Marks a socket as a listening socket.
pub(crate) fn sys_listen(fd: RawFd) -> io::Result<()> {
    let rc = unsafe { listen(fd, 128) };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Accepts one incoming connection, retrying on `EINTR` and
/// `ECONNABORTED`. The accepted socket is handed to a `Descriptor`,
/// which switches it to non-blocking.
pub(crate) fn sys_accept(fd: RawFd) -> io::Result<RawFd> {
    loop {
        let client = unsafe { accept(fd, std::ptr::null_mut(), std::ptr::null_mut()) };
        if client >= 0 {
            return Ok(client);
        }

        let err = io::Error::last_os_error();
        let retry =
            matches!(err.raw_os_error(), Some(code) if code == libc::EINTR || code == ECONNABORTED);
        if !retry {
            return Err(err);
        }
    }
}

/// Starts a connect to `ip:port`. A deferred connect surfaces as
/// `EINPROGRESS` through the returned error.
pub(crate) fn sys_connect(fd: RawFd, ip: Ipv4Addr, port: u16) -> io::Result<()> {
    let addr = ipv4_sockaddr(ip, port);
    let rc = unsafe {
        connect(
            fd,
            &addr as *const _ as *const sockaddr,
            mem::size_of::<sockaddr_in>() as socklen_t,
        )
    };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Reads and clears the socket's pending error (`SO_ERROR`).
pub(crate) fn sys_so_error(fd: RawFd) -> i32 {
    let mut error: libc::c_int = 0;
    let mut len = mem::size_of::<libc::c_int>() as socklen_t;
    unsafe {
        getsockopt(
            fd,
            SOL_SOCKET,
            SO_ERROR,
            &mut error as *mut _ as *mut _,
            &mut len,
        );
    }
    error
}

/// Returns the local port a socket is bound to.
pub(crate) fn sys_sockname_port(fd: RawFd) -> io::Result<u16> {
    let mut addr: sockaddr_in = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<sockaddr_in>() as socklen_t;

    let rc = unsafe { getsockname(fd, &mut addr as *mut _ as *mut sockaddr, &mut len) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(u16::from_be(addr.sin_port))
}
