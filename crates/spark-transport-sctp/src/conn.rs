//! 一对一 SCTP 连接。
//!
//! # 模块定位（Why）
//! - 以单个描述符承载一个关联：主动建联（[`Connection::dial`]）、被动接受或从一对多 socket 剥离得到；
//! - 提供消息级收发（携带 `sctp_sndrcvinfo`）、通知感知的读取、关联参数读写与优雅/强制关闭。
//!
//! # 设计要点（How）
//! - 描述符存放在原子槽位中，`close`/`abort` 以 `swap(-1)` 取走，并发关闭时只有一个调用者真正关闭；
//! - 所有操作先取描述符，已关闭时返回 [`SctpError::InvalidState`]；
//! - 系统调用是同步阻塞的，非阻塞模式由 [`Connection::set_nonblocking`] 显式切换。

use std::{
    os::fd::{AsRawFd, IntoRawFd, RawFd},
    time::{Duration, Instant},
};

use spark_codec_sctp::{
    EventSubscribe, InitMsg, Network, Notification, PrimaryAddr, SctpAddr, SndRcvInfo, abi,
};
use tracing::{debug, trace};

use crate::{
    config::ReadPolicy,
    error::{self, SctpError},
    socket::{self, BindOp, SocketFd, SocketKind},
    sys,
};

/// [`Connection::read_event`] 的结果。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Incoming {
    /// 用户数据，负载位于调用方缓冲的 `..len`。
    Data { len: usize, info: SndRcvInfo },
    /// 已解码的通知。
    Notification(Notification),
}

/// 一对一 SCTP 连接。
///
/// # 教案式说明
/// - **意图 (Why)**：把“描述符 + 关联号”封装为可跨线程共享的句柄；
/// - **契约 (What)**：
///   - `close`/`abort` 只能成功一次，之后的任何操作返回 [`SctpError::InvalidState`]；
///   - `Drop` 时若描述符仍打开则直接关闭，不发送 `SCTP_EOF`；
/// - **风险 (Trade-offs)**：读写没有截止时间，需要超时的调用方应配合非阻塞模式与
///   [`crate::Poller`] 使用。
#[derive(Debug)]
pub struct Connection {
    fd: SocketFd,
    assoc_id: i32,
    read_policy: ReadPolicy,
}

impl Connection {
    pub(crate) fn from_raw(fd: RawFd, assoc_id: i32) -> Self {
        Self {
            fd: SocketFd::new(fd),
            assoc_id,
            read_policy: ReadPolicy::default(),
        }
    }

    /// 主动建立关联。
    ///
    /// # 逻辑解析（How）
    /// 1. 按网络标签创建 `SOCK_STREAM` socket 并开启 `SO_BROADCAST`；
    /// 2. 写入建联参数；`local` 存在时先 bindx(ADD)；
    /// 3. 经 connectx 建联，记录内核分配的关联号；
    /// 4. 任一步骤失败时 socket 随 `Drop` 关闭，不泄露描述符。
    pub fn dial(
        network: Network,
        local: Option<&SctpAddr>,
        remote: &SctpAddr,
        init: &InitMsg,
    ) -> Result<Self, SctpError> {
        let socket = socket::open(network, SocketKind::OneToOne)?;
        socket::configure(socket.set_broadcast(true))?;
        let fd = socket.as_raw_fd();
        socket::set_struct(fd, abi::opt::INITMSG, init)?;
        if let Some(local) = local {
            socket::bindx(fd, local, BindOp::Add)?;
        }
        let assoc_id = socket::connectx(fd, remote)?;
        debug!(fd, %remote, assoc_id, "sctp connection dialed");
        Ok(Self::from_raw(socket.into_raw_fd(), assoc_id))
    }

    /// 替换 `read` 的通知跳过策略。
    pub fn with_read_policy(mut self, policy: ReadPolicy) -> Self {
        self.read_policy = policy;
        self
    }

    /// 建联时内核分配的关联号；被动接受的连接为 0。
    pub fn assoc_id(&self) -> i32 {
        self.assoc_id
    }

    /// 描述符是否已关闭。
    pub fn is_closed(&self) -> bool {
        self.fd.raw() < 0
    }

    /// 发送一条消息；`info` 存在时随消息附带 `SCTP_SNDRCV` 控制消息。
    ///
    /// 空负载 + `info` 成功时返回 0。
    pub fn send_message(&self, data: &[u8], info: Option<&SndRcvInfo>) -> Result<usize, SctpError> {
        let fd = self.fd.get("send_message")?;
        socket::send(fd, data, info)
    }

    /// 接收一条消息，返回 `(长度, 输出标志)`；存在 `SCTP_SNDRCV` 控制消息时写入 `info`。
    ///
    /// 输出标志包含 `MSG_NOTIFICATION` 时，缓冲中是通知而非用户数据，见 [`crate::is_notification`]。
    pub fn receive_message(
        &self,
        buf: &mut [u8],
        info: &mut SndRcvInfo,
    ) -> Result<(usize, i32), SctpError> {
        let fd = self.fd.get("receive_message")?;
        let (len, flags, received) = socket::recv(fd, buf, 0)?;
        if let Some(received) = received {
            *info = received;
        }
        Ok((len, flags))
    }

    /// 读取下一条用户数据，跳过期间到达的通知。
    ///
    /// 连续跳过的通知超过 [`ReadPolicy::max_skipped_notifications`] 时返回
    /// [`SctpError::NotificationBacklog`]。
    pub fn read(&self, buf: &mut [u8]) -> Result<usize, SctpError> {
        let mut info = SndRcvInfo::default();
        skip_notifications(self.read_policy.max_skipped_notifications, || {
            self.receive_message(buf, &mut info)
        })
    }

    /// 读取下一条消息，通知被解码后返回而不是丢弃。
    pub fn read_event(&self, buf: &mut [u8]) -> Result<Incoming, SctpError> {
        let mut info = SndRcvInfo::default();
        let (len, flags) = self.receive_message(buf, &mut info)?;
        if socket::is_notification(flags) {
            return Ok(Incoming::Notification(Notification::decode(&buf[..len])?));
        }
        Ok(Incoming::Data { len, info })
    }

    /// 不带元数据地发送。
    pub fn write(&self, data: &[u8]) -> Result<usize, SctpError> {
        self.send_message(data, None)
    }

    /// 优雅关闭：尽力发送 `SCTP_EOF`，然后半关闭并关闭描述符。
    ///
    /// 第二次调用返回 [`SctpError::InvalidState`]。
    pub fn close(&self) -> Result<(), SctpError> {
        let fd = self.fd.get("close")?;
        let eof = SndRcvInfo::with_flags(abi::sinfo::EOF);
        if let Err(err) = socket::send(fd, &[], Some(&eof)) {
            debug!(fd, error = %err, "sctp eof not delivered");
        }
        let fd = self.fd.take().ok_or(SctpError::closed("close"))?;
        socket::release(fd, true, error::CLOSE)
    }

    /// 强制关闭：零超时 linger 让内核发送 ABORT。
    pub fn abort(&self) -> Result<(), SctpError> {
        let fd = self.fd.take().ok_or(SctpError::closed("abort"))?;
        let linger = sys::with_socket(fd, |socket| socket.set_linger(Some(Duration::ZERO)));
        if let Err(err) = linger {
            debug!(fd, error = %err, "zero linger not applied before abort");
        }
        socket::release(fd, false, error::CLOSE)
    }

    /// 本端地址集合。
    pub fn local_addr(&self) -> Result<SctpAddr, SctpError> {
        let fd = self.fd.get("local_addr")?;
        socket::addresses(fd, abi::opt::GET_LOCAL_ADDRS, self.assoc_id)
    }

    /// 对端地址集合。
    pub fn peer_addr(&self) -> Result<SctpAddr, SctpError> {
        let fd = self.fd.get("peer_addr")?;
        socket::addresses(fd, abi::opt::GET_PEER_ADDRS, self.assoc_id)
    }

    /// 对端主路径地址（`SCTP_PRIMARY_ADDR`）。
    pub fn primary_peer_addr(&self) -> Result<SctpAddr, SctpError> {
        let fd = self.fd.get("primary_peer_addr")?;
        let prim = socket::get_struct(fd, abi::opt::PRIMARY_ADDR, &PrimaryAddr::query(self.assoc_id))?;
        Ok(prim.address()?)
    }

    pub fn init_msg(&self) -> Result<InitMsg, SctpError> {
        let fd = self.fd.get("init_msg")?;
        socket::get_struct(fd, abi::opt::INITMSG, &InitMsg::default())
    }

    pub fn set_init_msg(&self, init: &InitMsg) -> Result<(), SctpError> {
        let fd = self.fd.get("set_init_msg")?;
        socket::set_struct(fd, abi::opt::INITMSG, init)
    }

    /// 默认发送参数（`SCTP_DEFAULT_SEND_PARAM`）。
    pub fn default_send_params(&self) -> Result<SndRcvInfo, SctpError> {
        let fd = self.fd.get("default_send_params")?;
        let seed = SndRcvInfo::for_assoc(self.assoc_id, 0);
        socket::get_struct(fd, abi::opt::DEFAULT_SEND_PARAM, &seed)
    }

    pub fn set_default_send_params(&self, info: &SndRcvInfo) -> Result<(), SctpError> {
        let fd = self.fd.get("set_default_send_params")?;
        socket::set_struct(fd, abi::opt::DEFAULT_SEND_PARAM, info)
    }

    pub fn event_subscribe(&self) -> Result<EventSubscribe, SctpError> {
        let fd = self.fd.get("event_subscribe")?;
        socket::get_struct(fd, abi::opt::EVENTS, &EventSubscribe::default())
    }

    pub fn set_event_subscribe(&self, events: &EventSubscribe) -> Result<(), SctpError> {
        let fd = self.fd.get("set_event_subscribe")?;
        socket::set_struct(fd, abi::opt::EVENTS, events)
    }

    pub fn send_buffer_size(&self) -> Result<usize, SctpError> {
        let fd = self.fd.get("send_buffer_size")?;
        socket::configure(sys::with_socket(fd, |socket| socket.send_buffer_size()))
    }

    pub fn set_send_buffer_size(&self, size: usize) -> Result<(), SctpError> {
        let fd = self.fd.get("set_send_buffer_size")?;
        socket::configure(sys::with_socket(fd, |socket| socket.set_send_buffer_size(size)))
    }

    pub fn recv_buffer_size(&self) -> Result<usize, SctpError> {
        let fd = self.fd.get("recv_buffer_size")?;
        socket::configure(sys::with_socket(fd, |socket| socket.recv_buffer_size()))
    }

    pub fn set_recv_buffer_size(&self, size: usize) -> Result<(), SctpError> {
        let fd = self.fd.get("set_recv_buffer_size")?;
        socket::configure(sys::with_socket(fd, |socket| socket.set_recv_buffer_size(size)))
    }

    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<(), SctpError> {
        let fd = self.fd.get("set_nonblocking")?;
        socket::configure(sys::with_socket(fd, |socket| socket.set_nonblocking(nonblocking)))
    }

    /// 内核 SCTP socket 不支持读写截止时间。
    pub fn set_deadline(&self, _deadline: Instant) -> Result<(), SctpError> {
        Err(SctpError::NotSupported {
            operation: "set_deadline",
        })
    }

    pub fn set_read_deadline(&self, _deadline: Instant) -> Result<(), SctpError> {
        Err(SctpError::NotSupported {
            operation: "set_read_deadline",
        })
    }

    pub fn set_write_deadline(&self, _deadline: Instant) -> Result<(), SctpError> {
        Err(SctpError::NotSupported {
            operation: "set_write_deadline",
        })
    }
}

impl AsRawFd for Connection {
    /// 当前描述符；已关闭时为 `-1`。
    fn as_raw_fd(&self) -> RawFd {
        self.fd.raw()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(fd) = self.fd.take() {
            if let Err(err) = sys::close(fd) {
                debug!(fd, error = %err, "sctp connection close on drop failed");
            }
        }
    }
}

/// 反复调用 `receive` 直到拿到用户数据，返回其长度。
///
/// 连续的通知计数超过 `max_skipped` 即放弃；`max_skipped = 0` 时第一条通知就报错。
fn skip_notifications(
    max_skipped: usize,
    mut receive: impl FnMut() -> Result<(usize, i32), SctpError>,
) -> Result<usize, SctpError> {
    let mut skipped = 0;
    loop {
        let (len, flags) = receive()?;
        if !socket::is_notification(flags) {
            return Ok(len);
        }
        skipped += 1;
        trace!(skipped, "skipping sctp notification");
        if skipped > max_skipped {
            return Err(SctpError::NotificationBacklog { skipped });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::libc;
    use std::{cell::Cell, collections::VecDeque, os::unix::net::UnixDatagram, rc::Rc};

    /// 按顺序回放 `(长度, recvmsg 输出标志)`，并统计被调用的次数。
    fn scripted(
        script: Vec<(usize, i32)>,
    ) -> (Rc<Cell<usize>>, impl FnMut() -> Result<(usize, i32), SctpError>) {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let mut script = VecDeque::from(script);
        let receive = move || {
            counter.set(counter.get() + 1);
            Ok(script.pop_front().expect("脚本未耗尽"))
        };
        (calls, receive)
    }

    const NOTIFY: i32 = abi::msg::NOTIFICATION;

    #[test]
    fn data_on_first_message_is_returned() {
        let (calls, receive) = scripted(vec![(5, libc::MSG_EOR)]);
        assert_eq!(skip_notifications(0, receive).expect("数据"), 5);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn notifications_before_data_are_skipped() {
        let (calls, receive) = scripted(vec![(20, NOTIFY), (16, NOTIFY), (24, NOTIFY), (7, 0)]);
        assert_eq!(skip_notifications(3, receive).expect("上限内"), 7);
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn backlog_beyond_limit_is_reported() {
        let (calls, receive) = scripted(vec![(20, NOTIFY); 4]);
        let err = skip_notifications(3, receive).expect_err("超过上限");
        assert!(matches!(err, SctpError::NotificationBacklog { skipped: 4 }));
        assert_eq!(err.code(), "spark.transport.sctp.notification_backlog");
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn zero_limit_fails_on_first_notification() {
        let (calls, receive) = scripted(vec![(20, NOTIFY | libc::MSG_EOR), (3, 0)]);
        let err = skip_notifications(0, receive).expect_err("不允许跳过");
        assert!(matches!(err, SctpError::NotificationBacklog { skipped: 1 }));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn receive_errors_propagate_mid_sequence() {
        let mut step = 0;
        let err = skip_notifications(8, || {
            step += 1;
            if step < 3 {
                Ok((20, NOTIFY))
            } else {
                Err(SctpError::closed("receive_message"))
            }
        })
        .expect_err("接收失败");
        assert!(matches!(
            err,
            SctpError::InvalidState {
                operation: "receive_message"
            }
        ));
        assert_eq!(step, 3);
    }

    /// 以本地 datagram socket 充当描述符，验证与协议无关的生命周期语义。
    fn detached() -> Connection {
        let (left, _right) = UnixDatagram::pair().expect("socketpair");
        Connection::from_raw(left.into_raw_fd(), 0)
    }

    #[test]
    fn closed_connection_rejects_operations() {
        let conn = detached();
        conn.abort().expect("首次 abort 成功");
        assert!(conn.is_closed());
        assert_eq!(conn.as_raw_fd(), -1);

        let err = conn.close().expect_err("已关闭");
        assert!(matches!(err, SctpError::InvalidState { operation: "close" }));
        let err = conn.abort().expect_err("已关闭");
        assert!(matches!(err, SctpError::InvalidState { operation: "abort" }));
        let err = conn.write(b"x").expect_err("已关闭");
        assert!(matches!(err, SctpError::InvalidState { .. }));
        let err = conn.init_msg().expect_err("已关闭");
        assert!(matches!(err, SctpError::InvalidState { .. }));
    }

    #[test]
    fn close_then_close_is_invalid_state() {
        let conn = detached();
        conn.close().expect("首次 close 成功");
        let err = conn.close().expect_err("第二次 close");
        assert_eq!(err.code(), "spark.transport.sctp.invalid_state");
    }

    #[test]
    fn concurrent_close_releases_descriptor_once() {
        let conn = std::sync::Arc::new(detached());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let conn = conn.clone();
                std::thread::spawn(move || conn.abort().is_ok())
            })
            .collect();
        let successes = handles
            .into_iter()
            .map(|handle| handle.join().expect("线程未 panic"))
            .filter(|ok| *ok)
            .count();
        assert_eq!(successes, 1);
    }

    #[test]
    fn deadlines_are_not_supported() {
        let conn = detached();
        let now = Instant::now();
        for result in [
            conn.set_deadline(now),
            conn.set_read_deadline(now),
            conn.set_write_deadline(now),
        ] {
            let err = result.expect_err("截止时间不受支持");
            assert_eq!(err.code(), "spark.transport.sctp.not_supported");
        }
    }

    #[test]
    fn buffer_sizes_round_trip_through_socket_options() {
        let conn = detached();
        conn.set_send_buffer_size(64 * 1024).expect("设置发送缓冲");
        assert!(conn.send_buffer_size().expect("读取发送缓冲") >= 64 * 1024);
        conn.set_nonblocking(true).expect("切换非阻塞");
    }
}
