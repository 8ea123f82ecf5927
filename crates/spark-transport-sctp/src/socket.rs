//! 连接与监听共享的 SCTP socket 原语。
//!
//! # 模块定位（Why）
//! - [`crate::Connection`] 与 [`crate::Listener`] 的大部分操作都是“在某个描述符上设置/读取一个内核结构”，
//!   本模块集中实现这些原语，让两者只负责生命周期与参数组织。
//!
//! # 暴露接口（What）
//! - [`SocketKind`] / [`BindOp`]：socket 类型与 bindx 操作；
//! - `SocketFd`：原子描述符槽位，`-1` 表示已关闭；
//! - `open` / `bindx` / `connectx` / `peel_off` / `addresses` / `send` / `recv` 等内部原语。
//!
//! # 设计要点（How）
//! - socket 创建后在 `socket2::Socket` 中完成全部配置，任一步骤失败时随 `Drop` 自动关闭；
//! - 描述符关闭通过 `swap(-1)` 保证只有一个调用者真正执行 `close(2)`。

use std::{
    io,
    os::fd::{AsRawFd, RawFd},
    sync::atomic::{AtomicI32, Ordering},
};

use nix::libc;
use socket2::{Domain, Protocol, Socket, Type};
use spark_codec_sctp::{
    GetAddrsHeader, GetAddrsOld, KernelStruct, Network, PeelOffArg, PeelOffFlagsArg, SctpAddr,
    SndRcvInfo, abi,
    wire::{self, SNDRCV_CONTROL_SPACE},
};
use tracing::{debug, trace};

use crate::{
    error::{self, OperationKind, OsResultExt, SctpError},
    sys,
};

/// 内核为地址枚举分配的输出缓冲大小。
const GETADDRS_BUFFER: usize = 4096;

/// SCTP socket 风格。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum SocketKind {
    /// 一对一（`SOCK_STREAM`）：每个描述符对应一个关联。
    #[default]
    OneToOne,
    /// 一对多（`SOCK_SEQPACKET`）：一个描述符承载多个关联，按关联号寻址。
    OneToMany,
}

impl SocketKind {
    fn socket_type(self) -> Type {
        match self {
            SocketKind::OneToOne => Type::STREAM,
            SocketKind::OneToMany => Type::from(libc::SOCK_SEQPACKET),
        }
    }
}

/// `sctp_bindx` 操作。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum BindOp {
    Add,
    Remove,
}

impl BindOp {
    fn option(self) -> libc::c_int {
        match self {
            BindOp::Add => abi::opt::SOCKOPT_BINDX_ADD,
            BindOp::Remove => abi::opt::SOCKOPT_BINDX_REM,
        }
    }
}

/// 原子描述符槽位。
#[derive(Debug)]
pub(crate) struct SocketFd(AtomicI32);

impl SocketFd {
    pub(crate) fn new(fd: RawFd) -> Self {
        Self(AtomicI32::new(fd))
    }

    /// 当前描述符；已关闭时返回 [`SctpError::InvalidState`]。
    pub(crate) fn get(&self, operation: &'static str) -> Result<RawFd, SctpError> {
        match self.0.load(Ordering::Acquire) {
            fd if fd >= 0 => Ok(fd),
            _ => Err(SctpError::closed(operation)),
        }
    }

    /// 取走描述符；只有第一个调用者拿到 `Some`。
    pub(crate) fn take(&self) -> Option<RawFd> {
        match self.0.swap(-1, Ordering::AcqRel) {
            fd if fd >= 0 => Some(fd),
            _ => None,
        }
    }

    pub(crate) fn raw(&self) -> RawFd {
        self.0.load(Ordering::Acquire)
    }
}

/// 创建 SCTP socket；地址族由网络标签决定（`sctp4` 用 `AF_INET`，其余用 `AF_INET6`）。
pub(crate) fn open(network: Network, kind: SocketKind) -> Result<Socket, SctpError> {
    sys::ensure_abi();
    let domain = if network.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket = Socket::new(
        domain,
        kind.socket_type(),
        Some(Protocol::from(abi::level::IPPROTO_SCTP)),
    )
    .op(error::SOCKET)?;
    debug!(?network, ?kind, fd = socket.as_raw_fd(), "sctp socket created");
    Ok(socket)
}

/// 写入一个内核结构。
pub(crate) fn set_struct<T: KernelStruct>(
    fd: RawFd,
    option: libc::c_int,
    value: &T,
) -> Result<(), SctpError> {
    sys::setsockopt(fd, abi::level::SOL_SCTP, option, &value.encode())
        .map(|_| ())
        .op(error::CONFIGURE)
}

/// 读取一个内核结构；`seed` 作为输入参数块（例如携带关联号）。
pub(crate) fn get_struct<T: KernelStruct>(
    fd: RawFd,
    option: libc::c_int,
    seed: &T,
) -> Result<T, SctpError> {
    let mut block = seed.encode();
    let written = sys::getsockopt(fd, abi::level::SOL_SCTP, option, &mut block).op(error::QUERY)?;
    Ok(T::decode(&block[..written])?)
}

/// `sctp_bindx`：把打包地址交给 `SCTP_SOCKOPT_BINDX_ADD/REM`。
pub(crate) fn bindx(fd: RawFd, addr: &SctpAddr, op: BindOp) -> Result<(), SctpError> {
    let packed = addr.to_wire();
    sys::setsockopt(fd, abi::level::SOL_SCTP, op.option(), &packed).op(error::BIND)?;
    debug!(fd, %addr, ?op, "sctp bindx");
    Ok(())
}

/// `sctp_connectx`，返回内核分配的关联号。
///
/// # 逻辑解析（How）
/// 1. 优先使用 `SCTP_SOCKOPT_CONNECTX3`（getsockopt），成功或 `EINPROGRESS` 时关联号由内核回填；
/// 2. 内核不认识该选项（`ENOPROTOOPT`）时退回旧版 `SCTP_SOCKOPT_CONNECTX`（setsockopt），
///    其返回值即关联号；
/// 3. 其余 errno 原样返回。
pub(crate) fn connectx(fd: RawFd, remote: &SctpAddr) -> Result<i32, SctpError> {
    let packed = remote.to_wire();
    let mut block = GetAddrsOld {
        assoc_id: 0,
        addr_num: packed.len() as i32,
        addrs: packed.as_ptr() as u64,
    }
    .encode();

    let outcome = sys::getsockopt(
        fd,
        abi::level::SOL_SCTP,
        abi::opt::SOCKOPT_CONNECTX3,
        &mut block,
    );
    let assoc_id = match outcome {
        Ok(_) => GetAddrsOld::decode(&block)?.assoc_id,
        Err(err) if err.raw_os_error() == Some(libc::EINPROGRESS) => {
            GetAddrsOld::decode(&block)?.assoc_id
        }
        Err(err) if err.raw_os_error() == Some(libc::ENOPROTOOPT) => {
            debug!(fd, "SCTP_SOCKOPT_CONNECTX3 unavailable, falling back to SCTP_SOCKOPT_CONNECTX");
            sys::setsockopt(fd, abi::level::SOL_SCTP, abi::opt::SOCKOPT_CONNECTX, &packed)
                .op(error::CONNECT)?
        }
        Err(err) => return Err(SctpError::os(error::CONNECT, err)),
    };
    debug!(fd, %remote, assoc_id, "sctp connectx");
    Ok(assoc_id)
}

/// 从一对多 socket 剥离关联，返回新描述符；`flags` 为 0 时使用无标志版本。
pub(crate) fn peel_off(fd: RawFd, assoc_id: i32, flags: u32) -> Result<RawFd, SctpError> {
    let sd = if flags == 0 {
        let arg = PeelOffArg { assoc_id, sd: 0 };
        peel_off_call::<PeelOffArg>(fd, abi::opt::SOCKOPT_PEELOFF, &arg)?.sd
    } else {
        let arg = PeelOffFlagsArg {
            arg: PeelOffArg { assoc_id, sd: 0 },
            flags,
        };
        peel_off_call::<PeelOffFlagsArg>(fd, abi::opt::SOCKOPT_PEELOFF_FLAGS, &arg)?
            .arg
            .sd
    };
    debug!(fd, assoc_id, flags, peeled = sd, "sctp peeloff");
    Ok(sd)
}

fn peel_off_call<T: KernelStruct>(
    fd: RawFd,
    option: libc::c_int,
    arg: &T,
) -> Result<T, SctpError> {
    let mut block = arg.encode();
    sys::getsockopt(fd, abi::level::SOL_SCTP, option, &mut block).op(error::PEEL_OFF)?;
    Ok(T::decode(&block)?)
}

/// 地址枚举：`option` 为 `SCTP_GET_LOCAL_ADDRS` 或 `SCTP_GET_PEER_ADDRS`。
pub(crate) fn addresses(
    fd: RawFd,
    option: libc::c_int,
    assoc_id: i32,
) -> Result<SctpAddr, SctpError> {
    let mut buffer = vec![0u8; GETADDRS_BUFFER];
    GetAddrsHeader {
        assoc_id,
        addr_num: 0,
    }
    .write_to(&mut buffer);
    let written =
        sys::getsockopt(fd, abi::level::SOL_SCTP, option, &mut buffer).op(error::QUERY)?;
    Ok(SctpAddr::from_getaddrs(&buffer[..written])?)
}

/// 发送一条消息；`info` 存在时随消息附带 `SCTP_SNDRCV` 控制消息。
///
/// 空负载 + 控制消息（例如 `SCTP_EOF`/`SCTP_ABORT`）成功时返回 0。
pub(crate) fn send(fd: RawFd, data: &[u8], info: Option<&SndRcvInfo>) -> Result<usize, SctpError> {
    let control = info.map(wire::encode_sndrcv_control).unwrap_or_default();
    let sent = sys::sendmsg(fd, data, &control, 0).op(error::SEND)?;
    if data.is_empty() && !control.is_empty() {
        return Ok(0);
    }
    trace!(fd, sent, "sctp sendmsg");
    Ok(sent)
}

/// 接收一条消息，返回 `(长度, 输出标志, SCTP_SNDRCV 元数据)`。
pub(crate) fn recv(
    fd: RawFd,
    buf: &mut [u8],
    flags: libc::c_int,
) -> Result<(usize, i32, Option<SndRcvInfo>), SctpError> {
    let mut control = [0u8; SNDRCV_CONTROL_SPACE];
    let outcome = sys::recvmsg(fd, buf, &mut control, flags).op(error::RECEIVE)?;
    let info = match wire::find_sndrcv(&control[..outcome.control_len]) {
        Ok(info) => info,
        Err(err) => {
            debug!(fd, error = %err, "ignoring malformed sctp control data");
            None
        }
    };
    trace!(fd, len = outcome.len, flags = outcome.flags, "sctp recvmsg");
    Ok((outcome.len, outcome.flags, info))
}

/// 输出标志是否表示通知消息。
pub fn is_notification(flags: i32) -> bool {
    flags & abi::msg::NOTIFICATION != 0
}

/// 关闭描述符：可选先半关闭，再 `close(2)`。
pub(crate) fn release(fd: RawFd, shutdown: bool, kind: OperationKind) -> Result<(), SctpError> {
    if shutdown {
        let _ = sys::with_socket(fd, |socket| socket.shutdown(std::net::Shutdown::Both));
    }
    sys::close(fd).op(kind)?;
    debug!(fd, "sctp socket closed");
    Ok(())
}

/// 通用 `SOL_SOCKET` 选项失败时的映射。
pub(crate) fn configure<T>(result: io::Result<T>) -> Result<T, SctpError> {
    result.op(error::CONFIGURE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_fd_take_is_exclusive() {
        let slot = SocketFd::new(7);
        assert_eq!(slot.get("read").expect("打开状态"), 7);
        assert_eq!(slot.take(), Some(7));
        assert_eq!(slot.take(), None);
        assert_eq!(slot.raw(), -1);
        let err = slot.get("read").expect_err("已关闭");
        assert!(matches!(err, SctpError::InvalidState { operation: "read" }));
    }

    #[test]
    fn notification_flag_detection() {
        assert!(is_notification(0x8000));
        assert!(is_notification(0x8000 | libc::MSG_EOR));
        assert!(!is_notification(libc::MSG_EOR));
    }

    #[test]
    fn bind_ops_map_to_socket_options() {
        assert_eq!(BindOp::Add.option(), 100);
        assert_eq!(BindOp::Remove.option(), 101);
    }
}
