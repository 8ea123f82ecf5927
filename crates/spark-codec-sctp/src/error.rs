//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 编解码层只处理字节，不触碰系统调用；它的失败只有两类：字节不足以构成结构体，
//!   或地址文本无法转换为可绑定的地址集合。
//! - 两类错误分开建模，传输层可以分别映射为稳定错误码。
//!
//! ## 设计要求（What）
//! - 所有错误类型派生 `thiserror::Error`，携带足以定位问题的上下文（结构名、期望/实际长度）；
//! - 结构体尺寸与契约表不一致属于编程错误，不在此建模，见 [`crate::abi::verify_layouts`]。

use thiserror::Error;

/// 内核 ABI 字节解码错误。
///
/// # 教案式说明
/// - **意图 (Why)**：调用方拿到的原始缓冲可能被截断或来自未知版本内核，解码失败需要可诊断；
/// - **契约 (What)**：每个变体只描述一种失败形态，不包含系统调用错误；
/// - **风险 (Trade-offs)**：`structure` 使用 `&'static str`，避免在热路径上分配。
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CodecError {
    /// 缓冲长度小于结构体定长部分。
    #[error("{structure} needs {expected} bytes, got {actual}")]
    Truncated {
        structure: &'static str,
        expected: usize,
        actual: usize,
    },

    /// 通知缓冲不足以承载公共头或目标变体。
    #[error("notification too small: {actual} < {expected} bytes")]
    TooSmall { expected: usize, actual: usize },

    /// 通知缓冲超过所有变体中最大者的尺寸。
    #[error("notification too large: {actual} > {max} bytes")]
    TooLarge { max: usize, actual: usize },

    /// 通知头中的判别值未映射到任何已知变体。
    #[error("unknown notification type {kind:#06x}")]
    UnknownType { kind: u16 },

    /// sockaddr 记录的地址族既不是 IPv4 也不是 IPv6。
    #[error("unknown address family {family} at byte offset {offset}")]
    UnknownFamily { family: u16, offset: usize },

    /// 打包地址列表时没有任何可编码的地址。
    #[error("address list is empty")]
    EmptyAddressList,
}

/// 地址文本解析错误。
///
/// - **意图 (Why)**：地址文本采用“网络名 + 主机[/主机]:端口”约定，失败时给出原始输入；
/// - **契约 (What)**：`input` 保留调用方传入的完整文本，便于日志排查。
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum AddrError {
    /// 网络名不是 `sctp`/`sctp4`/`sctp6`/空串。
    #[error("unknown network `{network}`")]
    UnknownNetwork { network: String },

    /// 文本中缺少 `:` 端口分隔符。
    #[error("missing port in address `{input}`")]
    MissingPort { input: String },

    /// 端口既不是数字，也不是可识别的服务名。
    #[error("unknown port `{port}` in address `{input}`")]
    PortLookup { port: String, input: String },

    /// 过滤后没有剩余的地址。
    #[error("no usable address in `{input}`")]
    InvalidAddress { input: String },
}
