//! 系统调用薄封装。
//!
//! # 模块定位（Why）
//! - SCTP 的大部分能力只能通过 `SOL_SCTP` 层级的 get/setsockopt 与带控制消息的
//!   `sendmsg`/`recvmsg` 访问，`socket2` 不覆盖这些接口；
//! - 本模块把 `unsafe` 限定在最小范围内：入参全部是切片，出参全部是 `io::Result`。
//!
//! # 契约（Contract）
//! - 失败时通过 `Errno::last()` 取回 errno，原样转换为 `io::Error`；
//! - 描述符的有效性由调用方保证；对已关闭描述符的调用由内核返回 `EBADF`。

use std::{
    io, mem,
    os::fd::{BorrowedFd, RawFd},
    ptr,
    sync::OnceLock,
};

use nix::{errno::Errno, libc};
use socket2::SockRef;
use spark_codec_sctp::abi;

/// 将 `Errno` 转换为 `std::io::Error`。
fn errno_to_io(errno: Errno) -> io::Error {
    io::Error::from_raw_os_error(errno as i32)
}

fn cvt(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret < 0 {
        Err(errno_to_io(Errno::last()))
    } else {
        Ok(ret)
    }
}

fn cvt_len(ret: libc::ssize_t) -> io::Result<usize> {
    if ret < 0 {
        Err(errno_to_io(Errno::last()))
    } else {
        Ok(ret as usize)
    }
}

/// 借用原始描述符，供 `socket2`/`nix` 的类型化接口使用；`fd` 必须非负。
pub(crate) fn borrow_fd<'fd>(fd: RawFd) -> BorrowedFd<'fd> {
    // SAFETY: 调用方持有描述符，且借用结束前不会关闭它。
    unsafe { BorrowedFd::borrow_raw(fd) }
}

/// 以 `SockRef` 的形式借用原始描述符，复用 `socket2` 的 `SOL_SOCKET` 级选项。
pub(crate) fn with_socket<R>(fd: RawFd, f: impl FnOnce(SockRef<'_>) -> R) -> R {
    let borrowed = borrow_fd(fd);
    f(SockRef::from(&borrowed))
}

/// `setsockopt`，返回内核的原始返回值（`SCTP_SOCKOPT_CONNECTX` 借此返回关联号）。
pub(crate) fn setsockopt(
    fd: RawFd,
    level: libc::c_int,
    name: libc::c_int,
    value: &[u8],
) -> io::Result<libc::c_int> {
    // SAFETY: 指针与长度来自同一切片，内核只读取 `value.len()` 字节。
    let ret = unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            value.as_ptr().cast(),
            value.len() as libc::socklen_t,
        )
    };
    cvt(ret)
}

/// `getsockopt`，`value` 同时作为输入参数块与输出缓冲，返回内核写回的长度。
pub(crate) fn getsockopt(
    fd: RawFd,
    level: libc::c_int,
    name: libc::c_int,
    value: &mut [u8],
) -> io::Result<usize> {
    let mut len = value.len() as libc::socklen_t;
    // SAFETY: 内核最多写入 `len` 字节，且 `len` 不超过切片长度。
    let ret = unsafe { libc::getsockopt(fd, level, name, value.as_mut_ptr().cast(), &mut len) };
    cvt(ret)?;
    Ok(len as usize)
}

/// 单次 `sendmsg`：一个数据段 + 可选控制缓冲。
pub(crate) fn sendmsg(
    fd: RawFd,
    data: &[u8],
    control: &[u8],
    flags: libc::c_int,
) -> io::Result<usize> {
    let mut iov = libc::iovec {
        iov_base: data.as_ptr() as *mut libc::c_void,
        iov_len: data.len(),
    };
    // SAFETY: msghdr 为 POD，全零是合法初值。
    let mut msg: libc::msghdr = unsafe { mem::zeroed() };
    msg.msg_name = ptr::null_mut();
    msg.msg_namelen = 0;
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;
    if !control.is_empty() {
        msg.msg_control = control.as_ptr() as *mut libc::c_void;
        msg.msg_controllen = control.len() as _;
    }
    // SAFETY: iov 与 control 在调用期间保持有效，内核只读取它们。
    let sent = unsafe { libc::sendmsg(fd, &msg, flags) };
    cvt_len(sent)
}

/// `recvmsg` 的输出。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct RecvOutcome {
    pub len: usize,
    pub flags: libc::c_int,
    pub control_len: usize,
}

/// 单次 `recvmsg`：一个数据段 + 控制缓冲。
pub(crate) fn recvmsg(
    fd: RawFd,
    buf: &mut [u8],
    control: &mut [u8],
    flags: libc::c_int,
) -> io::Result<RecvOutcome> {
    let mut iov = libc::iovec {
        iov_base: buf.as_mut_ptr().cast(),
        iov_len: buf.len(),
    };
    // SAFETY: 同 `sendmsg`。
    let mut msg: libc::msghdr = unsafe { mem::zeroed() };
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;
    if !control.is_empty() {
        msg.msg_control = control.as_mut_ptr().cast();
        msg.msg_controllen = control.len() as _;
    }
    // SAFETY: 内核写入不超过 iov_len / msg_controllen 的字节。
    let received = unsafe { libc::recvmsg(fd, &mut msg, flags) };
    let len = cvt_len(received)?;
    Ok(RecvOutcome {
        len,
        flags: msg.msg_flags,
        control_len: (msg.msg_controllen as usize).min(control.len()),
    })
}

/// 关闭描述符，返回 `close(2)` 的结果。
pub(crate) fn close(fd: RawFd) -> io::Result<()> {
    // SAFETY: 描述符已由调用方原子地取走，不会被再次关闭。
    cvt(unsafe { libc::close(fd) }).map(|_| ())
}

/// 首次创建 socket 前校验编解码布局与宿主 libc 布局，只执行一次。
pub(crate) fn ensure_abi() {
    static CHECKED: OnceLock<()> = OnceLock::new();
    CHECKED.get_or_init(|| {
        abi::verify_layouts();
        verify_host_layouts();
    });
}

fn verify_host_layouts() {
    let host = [
        ("sockaddr_in", mem::size_of::<libc::sockaddr_in>(), abi::size::SOCKADDR_IN),
        ("sockaddr_in6", mem::size_of::<libc::sockaddr_in6>(), abi::size::SOCKADDR_IN6),
        (
            "sockaddr_storage",
            mem::size_of::<libc::sockaddr_storage>(),
            abi::size::SOCKADDR_STORAGE,
        ),
        ("cmsghdr", mem::size_of::<libc::cmsghdr>(), abi::size::CMSGHDR),
        ("linger", mem::size_of::<libc::linger>(), abi::size::LINGER),
    ];
    for (name, actual, contract) in host {
        assert_eq!(actual, contract, "宿主 {name} 尺寸 {actual} 与内核契约 {contract} 不一致");
    }
    assert_eq!(libc::IPPROTO_SCTP, abi::level::IPPROTO_SCTP, "IPPROTO_SCTP 编号不一致");
    assert_eq!(libc::AF_INET as u16, abi::family::INET, "AF_INET 取值不一致");
    assert_eq!(libc::AF_INET6 as u16, abi::family::INET6, "AF_INET6 取值不一致");
}
