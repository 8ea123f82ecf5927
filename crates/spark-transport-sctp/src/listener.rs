//! SCTP 监听 socket。
//!
//! # 模块定位（Why）
//! - 一对一风格（`SOCK_STREAM`）下负责 `accept` 出独立的 [`Connection`]；
//! - 一对多风格（`SOCK_SEQPACKET`）下一个描述符承载全部关联，按关联号发送、终止或剥离。
//!
//! # 设计要点（How）
//! - 与 [`Connection`] 共用原子描述符槽位与 socket 原语；
//! - `close` 只成功一次，之后的任何操作返回 [`SctpError::InvalidState`]。

use std::os::fd::{AsRawFd, IntoRawFd, RawFd};

use nix::libc;
use spark_codec_sctp::{EventSubscribe, InitMsg, Network, SctpAddr, SndRcvInfo, abi};
use tracing::debug;

use crate::{
    conn::Connection,
    error::{self, OsResultExt, SctpError},
    socket::{self, BindOp, SocketFd, SocketKind},
    sys,
};

/// SCTP 监听器。
#[derive(Debug)]
pub struct Listener {
    fd: SocketFd,
    kind: SocketKind,
}

impl Listener {
    /// 创建并开始监听。
    ///
    /// # 逻辑解析（How）
    /// 1. 创建 socket；IPv6 socket 关闭 `IPV6_V6ONLY` 以同时接受 IPv4；
    /// 2. 开启 `SO_BROADCAST` 与 `SO_REUSEADDR`，写入建联参数；
    /// 3. bindx(ADD) 绑定全部本地地址，`listen(SOMAXCONN)`；
    /// 4. 任一步骤失败时 socket 随 `Drop` 关闭。
    pub fn listen(
        network: Network,
        kind: SocketKind,
        local: &SctpAddr,
        init: &InitMsg,
    ) -> Result<Self, SctpError> {
        let socket = socket::open(network, kind)?;
        if !network.is_ipv4() {
            socket::configure(socket.set_only_v6(false))?;
        }
        socket::configure(socket.set_broadcast(true))?;
        socket::configure(socket.set_reuse_address(true))?;
        let fd = socket.as_raw_fd();
        socket::set_struct(fd, abi::opt::INITMSG, init)?;
        socket::bindx(fd, local, BindOp::Add)?;
        socket.listen(libc::SOMAXCONN).op(error::LISTEN)?;
        debug!(fd, %local, ?kind, "sctp listener ready");
        Ok(Self {
            fd: SocketFd::new(socket.into_raw_fd()),
            kind,
        })
    }

    pub fn kind(&self) -> SocketKind {
        self.kind
    }

    /// 接受一个一对一关联；返回连接的关联号为 0。
    pub fn accept(&self) -> Result<Connection, SctpError> {
        let fd = self.fd.get("accept")?;
        let (accepted, _) = sys::with_socket(fd, |socket| socket.accept()).op(error::ACCEPT)?;
        let accepted = accepted.into_raw_fd();
        debug!(fd, accepted, "sctp association accepted");
        Ok(Connection::from_raw(accepted, 0))
    }

    /// 在一对多 socket 上主动发起关联，返回关联号。
    pub fn connect(&self, remote: &SctpAddr) -> Result<i32, SctpError> {
        let fd = self.fd.get("connect")?;
        socket::connectx(fd, remote)
    }

    /// 追加或移除本地绑定地址。
    pub fn bindx(&self, addr: &SctpAddr, op: BindOp) -> Result<(), SctpError> {
        let fd = self.fd.get("bindx")?;
        socket::bindx(fd, addr, op)
    }

    /// 以 `SCTP_ABORT` 终止指定关联。
    pub fn abort(&self, assoc_id: i32) -> Result<(), SctpError> {
        let fd = self.fd.get("abort")?;
        socket::send(fd, &[], Some(&SndRcvInfo::for_assoc(assoc_id, abi::sinfo::ABORT)))?;
        debug!(fd, assoc_id, "sctp association aborted");
        Ok(())
    }

    /// 以 `SCTP_EOF` 优雅结束指定关联。
    pub fn disconnect(&self, assoc_id: i32) -> Result<(), SctpError> {
        let fd = self.fd.get("disconnect")?;
        socket::send(fd, &[], Some(&SndRcvInfo::for_assoc(assoc_id, abi::sinfo::EOF)))?;
        debug!(fd, assoc_id, "sctp association shut down");
        Ok(())
    }

    /// 把关联剥离为独立的一对一连接。
    pub fn peel_off(&self, assoc_id: i32) -> Result<Connection, SctpError> {
        self.peel_off_with_flags(assoc_id, 0)
    }

    /// 带描述符标志（如 `O_CLOEXEC`/`O_NONBLOCK`）的剥离；`flags` 为 0 时等价于 [`Listener::peel_off`]。
    pub fn peel_off_with_flags(&self, assoc_id: i32, flags: u32) -> Result<Connection, SctpError> {
        let fd = self.fd.get("peel_off")?;
        let peeled = socket::peel_off(fd, assoc_id, flags)?;
        Ok(Connection::from_raw(peeled, assoc_id))
    }

    /// 发送一条消息，一对多风格下由 `info.assoc_id` 选择关联。
    pub fn send_message(&self, data: &[u8], info: Option<&SndRcvInfo>) -> Result<usize, SctpError> {
        let fd = self.fd.get("send_message")?;
        socket::send(fd, data, info)
    }

    /// 接收一条消息，`flags` 为传给 `recvmsg` 的输入标志；返回 `(长度, 输出标志)`。
    pub fn receive_message(
        &self,
        buf: &mut [u8],
        info: &mut SndRcvInfo,
        flags: i32,
    ) -> Result<(usize, i32), SctpError> {
        let fd = self.fd.get("receive_message")?;
        let (len, out_flags, received) = socket::recv(fd, buf, flags)?;
        if let Some(received) = received {
            *info = received;
        }
        Ok((len, out_flags))
    }

    pub fn event_subscribe(&self) -> Result<EventSubscribe, SctpError> {
        let fd = self.fd.get("event_subscribe")?;
        socket::get_struct(fd, abi::opt::EVENTS, &EventSubscribe::default())
    }

    pub fn set_event_subscribe(&self, events: &EventSubscribe) -> Result<(), SctpError> {
        let fd = self.fd.get("set_event_subscribe")?;
        socket::set_struct(fd, abi::opt::EVENTS, events)
    }

    pub fn set_init_msg(&self, init: &InitMsg) -> Result<(), SctpError> {
        let fd = self.fd.get("set_init_msg")?;
        socket::set_struct(fd, abi::opt::INITMSG, init)
    }

    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<(), SctpError> {
        let fd = self.fd.get("set_nonblocking")?;
        socket::configure(sys::with_socket(fd, |socket| socket.set_nonblocking(nonblocking)))
    }

    /// 本端绑定的地址集合。
    pub fn local_addr(&self) -> Result<SctpAddr, SctpError> {
        let fd = self.fd.get("local_addr")?;
        socket::addresses(fd, abi::opt::GET_LOCAL_ADDRS, 0)
    }

    /// 指定关联的对端地址集合。
    pub fn peer_addr(&self, assoc_id: i32) -> Result<SctpAddr, SctpError> {
        let fd = self.fd.get("peer_addr")?;
        socket::addresses(fd, abi::opt::GET_PEER_ADDRS, assoc_id)
    }

    /// 半关闭并关闭描述符；第二次调用返回 [`SctpError::InvalidState`]。
    pub fn close(&self) -> Result<(), SctpError> {
        let fd = self.fd.take().ok_or(SctpError::closed("close"))?;
        socket::release(fd, true, error::CLOSE)
    }
}

impl AsRawFd for Listener {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.raw()
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Some(fd) = self.fd.take() {
            if let Err(err) = sys::close(fd) {
                debug!(fd, error = %err, "sctp listener close on drop failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixDatagram;

    fn detached(kind: SocketKind) -> Listener {
        let (left, _right) = UnixDatagram::pair().expect("socketpair");
        Listener {
            fd: SocketFd::new(left.into_raw_fd()),
            kind,
        }
    }

    #[test]
    fn close_succeeds_exactly_once() {
        let listener = detached(SocketKind::OneToMany);
        assert_eq!(listener.kind(), SocketKind::OneToMany);
        listener.close().expect("首次 close 成功");
        assert_eq!(listener.as_raw_fd(), -1);
        let err = listener.close().expect_err("第二次 close");
        assert!(matches!(err, SctpError::InvalidState { operation: "close" }));
    }

    #[test]
    fn closed_listener_rejects_operations() {
        let listener = detached(SocketKind::OneToOne);
        listener.close().expect("关闭");
        assert!(matches!(
            listener.accept().expect_err("已关闭"),
            SctpError::InvalidState { operation: "accept" }
        ));
        assert!(matches!(
            listener.abort(7).expect_err("已关闭"),
            SctpError::InvalidState { operation: "abort" }
        ));
        assert!(matches!(
            listener.peel_off(7).expect_err("已关闭"),
            SctpError::InvalidState { operation: "peel_off" }
        ));
        let mut info = SndRcvInfo::default();
        assert!(matches!(
            listener
                .receive_message(&mut [0; 16], &mut info, 0)
                .expect_err("已关闭"),
            SctpError::InvalidState { .. }
        ));
    }

    #[test]
    fn sctp_options_on_foreign_socket_report_errno() {
        let listener = detached(SocketKind::OneToMany);
        let err = listener.event_subscribe().expect_err("非 SCTP socket");
        assert_eq!(err.code(), "spark.transport.sctp.query_failed");
        assert!(err.raw_os_error().is_some());
        listener.set_nonblocking(true).expect("SOL_SOCKET 级选项可用");
    }
}
