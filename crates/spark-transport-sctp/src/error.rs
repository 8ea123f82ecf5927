//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 传输层的失败来源有三类：系统调用返回的 errno、编解码/地址解析错误、以及生命周期误用
//!   （在已关闭的描述符上操作、重复注册等）；
//! - 统一收敛为 [`SctpError`]，并为每个变体提供稳定错误码，便于告警与日志聚合。
//!
//! ## 设计要求（What）
//! - 系统调用错误原样保留 `io::Error`，调用方可通过 [`SctpError::raw_os_error`] 取回 errno；
//! - 错误码遵循 `spark.transport.sctp.*` 命名，与其他传输 crate 的风格一致。

use std::io;

use spark_codec_sctp::{AddrError, CodecError};
use thiserror::Error;

/// 描述一次底层操作对应的稳定错误码与默认文案。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct OperationKind {
    pub code: &'static str,
    pub message: &'static str,
}

pub(crate) const SOCKET: OperationKind = OperationKind {
    code: "spark.transport.sctp.socket_failed",
    message: "sctp socket",
};
pub(crate) const CONFIGURE: OperationKind = OperationKind {
    code: "spark.transport.sctp.configure_failed",
    message: "sctp configure",
};
pub(crate) const QUERY: OperationKind = OperationKind {
    code: "spark.transport.sctp.query_failed",
    message: "sctp query",
};
pub(crate) const BIND: OperationKind = OperationKind {
    code: "spark.transport.sctp.bind_failed",
    message: "sctp bindx",
};
pub(crate) const LISTEN: OperationKind = OperationKind {
    code: "spark.transport.sctp.listen_failed",
    message: "sctp listen",
};
pub(crate) const ACCEPT: OperationKind = OperationKind {
    code: "spark.transport.sctp.accept_failed",
    message: "sctp accept",
};
pub(crate) const CONNECT: OperationKind = OperationKind {
    code: "spark.transport.sctp.connect_failed",
    message: "sctp connectx",
};
pub(crate) const PEEL_OFF: OperationKind = OperationKind {
    code: "spark.transport.sctp.peel_off_failed",
    message: "sctp peeloff",
};
pub(crate) const SEND: OperationKind = OperationKind {
    code: "spark.transport.sctp.send_failed",
    message: "sctp sendmsg",
};
pub(crate) const RECEIVE: OperationKind = OperationKind {
    code: "spark.transport.sctp.receive_failed",
    message: "sctp recvmsg",
};
pub(crate) const CLOSE: OperationKind = OperationKind {
    code: "spark.transport.sctp.close_failed",
    message: "sctp close",
};
pub(crate) const POLL: OperationKind = OperationKind {
    code: "spark.transport.sctp.poll_failed",
    message: "sctp epoll",
};

const INVALID_STATE_CODE: &str = "spark.transport.sctp.invalid_state";
const NOT_SUPPORTED_CODE: &str = "spark.transport.sctp.not_supported";
const CODEC_CODE: &str = "spark.transport.sctp.codec";
const ADDRESS_CODE: &str = "spark.transport.sctp.address";
const BACKLOG_CODE: &str = "spark.transport.sctp.notification_backlog";
const POLLER_STATE_CODE: &str = "spark.transport.sctp.poller_state";
const REGISTRY_CODE: &str = "spark.transport.sctp.poller_registry";
const CONFIG_CODE: &str = "spark.transport.sctp.config";

/// SCTP 传输错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：让调用方只面对一个错误类型，同时保留足够的结构信息做精细处理；
/// - **契约 (What)**：
///   - `Os` 携带操作种类与原始 `io::Error`，errno 不做任何改写；
///   - `InvalidState` 表示描述符已关闭或从未打开；
///   - `NotSupported` 用于内核 SCTP 不提供的能力（读写截止时间）；
/// - **执行逻辑 (How)**：[`SctpError::code`] 根据变体挑选稳定错误码。
#[derive(Debug, Error)]
pub enum SctpError {
    /// 系统调用失败。
    #[error("{}: {source}", .kind.message)]
    Os {
        kind: OperationKind,
        #[source]
        source: io::Error,
    },

    /// 在已关闭的描述符上执行操作。
    #[error("{operation} on a closed sctp socket")]
    InvalidState { operation: &'static str },

    /// 内核 SCTP 不支持的能力。
    #[error("{operation} is not supported by kernel sctp sockets")]
    NotSupported { operation: &'static str },

    /// 内核返回的字节无法解码。
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// 地址文本解析失败。
    #[error(transparent)]
    Addr(#[from] AddrError),

    /// `read` 连续跳过的通知超过上限仍未读到数据。
    #[error("skipped {skipped} notifications without receiving user data")]
    NotificationBacklog { skipped: usize },

    /// 事件分发器已初始化。
    #[error("poller is already initialized")]
    PollerAlreadyInitialized,

    /// 事件分发器尚未初始化或已终结。
    #[error("poller is not initialized")]
    PollerNotInitialized,

    /// 描述符已注册回调。
    #[error("descriptor {fd} is already registered with the poller")]
    AlreadyRegistered { fd: i32 },

    /// 描述符未注册回调。
    #[error("descriptor {fd} is not registered with the poller")]
    NotRegistered { fd: i32 },

    /// 配置文本无法解析。
    #[error("invalid sctp configuration: {0}")]
    Config(#[from] toml::de::Error),
}

impl SctpError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            SctpError::Os { kind, .. } => kind.code,
            SctpError::InvalidState { .. } => INVALID_STATE_CODE,
            SctpError::NotSupported { .. } => NOT_SUPPORTED_CODE,
            SctpError::Codec(_) => CODEC_CODE,
            SctpError::Addr(_) => ADDRESS_CODE,
            SctpError::NotificationBacklog { .. } => BACKLOG_CODE,
            SctpError::PollerAlreadyInitialized | SctpError::PollerNotInitialized => {
                POLLER_STATE_CODE
            }
            SctpError::AlreadyRegistered { .. } | SctpError::NotRegistered { .. } => {
                REGISTRY_CODE
            }
            SctpError::Config(_) => CONFIG_CODE,
        }
    }

    /// 系统调用错误对应的 errno。
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            SctpError::Os { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }

    pub(crate) fn os(kind: OperationKind, source: io::Error) -> Self {
        SctpError::Os { kind, source }
    }

    pub(crate) fn closed(operation: &'static str) -> Self {
        SctpError::InvalidState { operation }
    }
}

/// 给 `io::Result` 附加操作种类。
pub(crate) trait OsResultExt<T> {
    fn op(self, kind: OperationKind) -> Result<T, SctpError>;
}

impl<T> OsResultExt<T> for io::Result<T> {
    fn op(self, kind: OperationKind) -> Result<T, SctpError> {
        self.map_err(|source| SctpError::os(kind, source))
    }
}

impl<T> OsResultExt<T> for nix::Result<T> {
    fn op(self, kind: OperationKind) -> Result<T, SctpError> {
        self.map_err(|errno| SctpError::os(kind, io::Error::from(errno)))
    }
}
