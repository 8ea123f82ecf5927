//! # spark-codec-sctp
//!
//! ## 角色定位（Why）
//! - Linux 内核 SCTP 接口在系统调用边界上只交换字节：打包的 sockaddr 列表、
//!   `sctp_sndrcvinfo` 控制消息、13 种通知联合体；
//! - 本 crate 负责这些字节与强类型之间的转换，不发起任何系统调用，便于在任意平台上单元测试。
//!
//! ## 模块一览（What）
//! - [`abi`]：构建期由 `contracts/sctp_abi.toml` 生成的常量表与布局校验；
//! - [`wire`]：定长结构体与控制消息；
//! - [`notification`]：通知联合体解码与名称查询；
//! - [`addr`]：网络标签、多宿主地址解析与 sockaddr 编解码；
//! - [`error`]：编解码与地址解析错误。
//!
//! ## 使用方式（How）
//! - 传输层（`spark-transport-sctp`）在首次创建 socket 前调用 [`abi::verify_layouts`]；
//! - 其余 API 均为纯函数，可直接在测试中构造字节缓冲验证。

pub mod abi;
pub mod addr;
pub mod error;
pub mod notification;
mod raw;
mod services;
pub mod wire;

pub use addr::{Network, SctpAddr, resolve};
pub use error::{AddrError, CodecError};
pub use notification::{Notification, NotificationHeader, notification_name};
pub use wire::{
    CmsgHeader, EventSubscribe, GetAddrsHeader, GetAddrsOld, InitMsg, KernelStruct, PeelOffArg,
    PeelOffFlagsArg, PrimaryAddr, SndRcvInfo,
};
