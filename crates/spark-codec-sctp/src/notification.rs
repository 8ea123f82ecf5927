//! SCTP 通知联合体（`union sctp_notification`）的解码。
//!
//! # 模块定位（Why）
//! - 订阅事件后，内核把关联状态变化、路径变化、发送失败等以“带 `MSG_NOTIFICATION` 标志的消息”
//!   投递到普通数据流中；上层必须先分类再处理。
//!
//! # 暴露接口（What）
//! - [`Notification`]：13 个变体的封闭和类型；
//! - [`Notification::decode`]：缓冲 → 变体；
//! - [`notification_name`]：判别值 → 规范名称。
//!
//! # 设计要点（How）
//! - 先校验缓冲总长（不小于公共头、不大于联合体最大尺寸），再按判别值分派；
//! - 每个变体只在缓冲覆盖其定长部分时解码，所有字段按值拷贝，返回值不借用输入缓冲；
//! - 判别值、名称与定长尺寸全部来自 [`crate::abi::NOTIFICATIONS`]。

use crate::{
    abi::{self, notification as kind},
    addr::{SOCKADDR_STORAGE_SIZE, SctpAddr},
    error::CodecError,
    raw::{get_i32, get_u16, get_u32},
    wire::{KernelStruct, SndRcvInfo},
};

/// 所有通知共享的 8 字节公共头。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct NotificationHeader {
    pub kind: u16,
    pub flags: u16,
    pub length: u32,
}

impl NotificationHeader {
    pub const SIZE: usize = 2 + 2 + 4;

    fn read(buf: &[u8]) -> Self {
        Self {
            kind: get_u16(buf, 0),
            flags: get_u16(buf, 2),
            length: get_u32(buf, 4),
        }
    }
}

/// 关联状态（`sac_state`）。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum AssocState {
    CommUp,
    CommLost,
    Restart,
    ShutdownComplete,
    CantStartAssoc,
    Other(u16),
}

impl From<u16> for AssocState {
    fn from(raw: u16) -> Self {
        match raw {
            abi::assoc_state::COMM_UP => AssocState::CommUp,
            abi::assoc_state::COMM_LOST => AssocState::CommLost,
            abi::assoc_state::RESTART => AssocState::Restart,
            abi::assoc_state::SHUTDOWN_COMP => AssocState::ShutdownComplete,
            abi::assoc_state::CANT_STR_ASSOC => AssocState::CantStartAssoc,
            other => AssocState::Other(other),
        }
    }
}

/// 对端路径状态（`spc_state`）。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum PeerAddrState {
    Available,
    Unreachable,
    Removed,
    Added,
    MadePrimary,
    Confirmed,
    Other(i32),
}

impl From<i32> for PeerAddrState {
    fn from(raw: i32) -> Self {
        match raw {
            abi::paddr_state::ADDR_AVAILABLE => PeerAddrState::Available,
            abi::paddr_state::ADDR_UNREACHABLE => PeerAddrState::Unreachable,
            abi::paddr_state::ADDR_REMOVED => PeerAddrState::Removed,
            abi::paddr_state::ADDR_ADDED => PeerAddrState::Added,
            abi::paddr_state::ADDR_MADE_PRIM => PeerAddrState::MadePrimary,
            abi::paddr_state::ADDR_CONFIRMED => PeerAddrState::Confirmed,
            other => PeerAddrState::Other(other),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AssocChange {
    pub header: NotificationHeader,
    pub state: AssocState,
    pub error: u16,
    pub outbound_streams: u16,
    pub inbound_streams: u16,
    pub assoc_id: i32,
}

/// 对端路径变化，`address` 为原始 `sockaddr_storage`，由 [`PeerAddrChange::address`] 解析。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PeerAddrChange {
    pub header: NotificationHeader,
    pub address: [u8; SOCKADDR_STORAGE_SIZE],
    pub state: PeerAddrState,
    pub error: i32,
    pub assoc_id: i32,
}

impl PeerAddrChange {
    /// 解析发生变化的对端地址。
    pub fn address(&self) -> Result<SctpAddr, CodecError> {
        SctpAddr::from_sockaddr_storage(&self.address)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SendFailed {
    pub header: NotificationHeader,
    pub error: u32,
    pub info: SndRcvInfo,
    pub assoc_id: i32,
}

/// 对端 ERROR chunk；`error` 在内核中是网络序，这里已转为主机值。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RemoteError {
    pub header: NotificationHeader,
    pub error: u16,
    pub assoc_id: i32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ShutdownEvent {
    pub header: NotificationHeader,
    pub assoc_id: i32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PartialDelivery {
    pub header: NotificationHeader,
    pub indication: u32,
    pub assoc_id: i32,
    pub stream: u32,
    pub sequence: u32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AdaptationIndication {
    pub header: NotificationHeader,
    pub indication: u32,
    pub assoc_id: i32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AuthenticationEvent {
    pub header: NotificationHeader,
    pub key_number: u16,
    pub alt_key_number: u16,
    pub indication: u32,
    pub assoc_id: i32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SenderDry {
    pub header: NotificationHeader,
    pub assoc_id: i32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StreamReset {
    pub header: NotificationHeader,
    pub assoc_id: i32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AssocReset {
    pub header: NotificationHeader,
    pub assoc_id: i32,
    pub local_tsn: u32,
    pub remote_tsn: u32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StreamChange {
    pub header: NotificationHeader,
    pub assoc_id: i32,
    pub inbound_streams: u16,
    pub outbound_streams: u16,
}

/// 已解码的 SCTP 通知。
///
/// # 教案式说明
/// - **意图 (Why)**：用封闭枚举替代“按类型断言”的开放接口，调用方 `match` 时由编译器保证穷尽；
/// - **契约 (What)**：`DataIo` 只携带公共头，作为 `SCTP_DATA_IO_EVENT` 的兜底形态；
///   其余 12 个变体与内核结构一一对应；
/// - **风险 (Trade-offs)**：内核追加在定长部分之后的变长数据（如发送失败的原始报文）不被保留。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Notification {
    DataIo(NotificationHeader),
    AssocChange(AssocChange),
    PeerAddrChange(PeerAddrChange),
    SendFailed(SendFailed),
    RemoteError(RemoteError),
    Shutdown(ShutdownEvent),
    PartialDelivery(PartialDelivery),
    Adaptation(AdaptationIndication),
    Authentication(AuthenticationEvent),
    SenderDry(SenderDry),
    StreamReset(StreamReset),
    AssocReset(AssocReset),
    StreamChange(StreamChange),
}

impl Notification {
    /// 解码一条通知消息。
    ///
    /// # 契约（Contract）
    /// - 缓冲短于公共头返回 [`CodecError::TooSmall`]，长于联合体最大尺寸返回 [`CodecError::TooLarge`]；
    /// - 判别值未知返回 [`CodecError::UnknownType`]；
    /// - 缓冲短于目标变体的定长部分返回 [`CodecError::TooSmall`]，`expected` 为该变体尺寸。
    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() < NotificationHeader::SIZE {
            return Err(CodecError::TooSmall {
                expected: NotificationHeader::SIZE,
                actual: buf.len(),
            });
        }
        if buf.len() > abi::size::NOTIFICATION_MAX {
            return Err(CodecError::TooLarge {
                max: abi::size::NOTIFICATION_MAX,
                actual: buf.len(),
            });
        }

        let header = NotificationHeader::read(buf);
        let size = variant_size(header.kind).ok_or(CodecError::UnknownType { kind: header.kind })?;
        if buf.len() < size {
            return Err(CodecError::TooSmall {
                expected: size,
                actual: buf.len(),
            });
        }

        let notification = match header.kind {
            kind::DATA_IO_EVENT => Notification::DataIo(header),
            kind::ASSOC_CHANGE => Notification::AssocChange(AssocChange {
                header,
                state: AssocState::from(get_u16(buf, 8)),
                error: get_u16(buf, 10),
                outbound_streams: get_u16(buf, 12),
                inbound_streams: get_u16(buf, 14),
                assoc_id: get_i32(buf, 16),
            }),
            kind::PEER_ADDR_CHANGE => {
                let mut address = [0u8; SOCKADDR_STORAGE_SIZE];
                address.copy_from_slice(&buf[8..8 + SOCKADDR_STORAGE_SIZE]);
                Notification::PeerAddrChange(PeerAddrChange {
                    header,
                    address,
                    state: PeerAddrState::from(get_i32(buf, 136)),
                    error: get_i32(buf, 140),
                    assoc_id: get_i32(buf, 144),
                })
            }
            kind::SEND_FAILED => Notification::SendFailed(SendFailed {
                header,
                error: get_u32(buf, 8),
                info: SndRcvInfo::read_from(&buf[12..12 + SndRcvInfo::SIZE]),
                assoc_id: get_i32(buf, 44),
            }),
            kind::REMOTE_ERROR => Notification::RemoteError(RemoteError {
                header,
                error: u16::from_be_bytes([buf[8], buf[9]]),
                assoc_id: get_i32(buf, 12),
            }),
            kind::SHUTDOWN_EVENT => Notification::Shutdown(ShutdownEvent {
                header,
                assoc_id: get_i32(buf, 8),
            }),
            kind::PARTIAL_DELIVERY_EVENT => Notification::PartialDelivery(PartialDelivery {
                header,
                indication: get_u32(buf, 8),
                assoc_id: get_i32(buf, 12),
                stream: get_u32(buf, 16),
                sequence: get_u32(buf, 20),
            }),
            kind::ADAPTATION_INDICATION => Notification::Adaptation(AdaptationIndication {
                header,
                indication: get_u32(buf, 8),
                assoc_id: get_i32(buf, 12),
            }),
            kind::AUTHENTICATION_EVENT => Notification::Authentication(AuthenticationEvent {
                header,
                key_number: get_u16(buf, 8),
                alt_key_number: get_u16(buf, 10),
                indication: get_u32(buf, 12),
                assoc_id: get_i32(buf, 16),
            }),
            kind::SENDER_DRY_EVENT => Notification::SenderDry(SenderDry {
                header,
                assoc_id: get_i32(buf, 8),
            }),
            kind::STREAM_RESET_EVENT => Notification::StreamReset(StreamReset {
                header,
                assoc_id: get_i32(buf, 8),
            }),
            kind::ASSOC_RESET_EVENT => Notification::AssocReset(AssocReset {
                header,
                assoc_id: get_i32(buf, 8),
                local_tsn: get_u32(buf, 12),
                remote_tsn: get_u32(buf, 16),
            }),
            kind::STREAM_CHANGE_EVENT => Notification::StreamChange(StreamChange {
                header,
                assoc_id: get_i32(buf, 8),
                inbound_streams: get_u16(buf, 12),
                outbound_streams: get_u16(buf, 14),
            }),
            other => return Err(CodecError::UnknownType { kind: other }),
        };
        Ok(notification)
    }

    /// 公共头。
    pub fn header(&self) -> NotificationHeader {
        match self {
            Notification::DataIo(header) => *header,
            Notification::AssocChange(n) => n.header,
            Notification::PeerAddrChange(n) => n.header,
            Notification::SendFailed(n) => n.header,
            Notification::RemoteError(n) => n.header,
            Notification::Shutdown(n) => n.header,
            Notification::PartialDelivery(n) => n.header,
            Notification::Adaptation(n) => n.header,
            Notification::Authentication(n) => n.header,
            Notification::SenderDry(n) => n.header,
            Notification::StreamReset(n) => n.header,
            Notification::AssocReset(n) => n.header,
            Notification::StreamChange(n) => n.header,
        }
    }

    /// 判别值。
    pub fn kind(&self) -> u16 {
        self.header().kind
    }

    /// 规范名称，例如 `"SCTP_ASSOC_CHANGE"`。
    pub fn name(&self) -> &'static str {
        notification_name(self.kind())
    }

    /// 通知所属的关联号；`DataIo` 不携带关联号。
    pub fn assoc_id(&self) -> Option<i32> {
        match self {
            Notification::DataIo(_) => None,
            Notification::AssocChange(n) => Some(n.assoc_id),
            Notification::PeerAddrChange(n) => Some(n.assoc_id),
            Notification::SendFailed(n) => Some(n.assoc_id),
            Notification::RemoteError(n) => Some(n.assoc_id),
            Notification::Shutdown(n) => Some(n.assoc_id),
            Notification::PartialDelivery(n) => Some(n.assoc_id),
            Notification::Adaptation(n) => Some(n.assoc_id),
            Notification::Authentication(n) => Some(n.assoc_id),
            Notification::SenderDry(n) => Some(n.assoc_id),
            Notification::StreamReset(n) => Some(n.assoc_id),
            Notification::AssocReset(n) => Some(n.assoc_id),
            Notification::StreamChange(n) => Some(n.assoc_id),
        }
    }
}

fn variant_size(kind: u16) -> Option<usize> {
    abi::NOTIFICATIONS
        .iter()
        .find(|(value, _, _)| *value == kind)
        .map(|(_, _, size)| *size)
}

/// 判别值对应的规范名称；未映射的值返回空串。
pub fn notification_name(kind: u16) -> &'static str {
    abi::NOTIFICATIONS
        .iter()
        .find(|(value, _, _)| *value == kind)
        .map(|(_, name, _)| *name)
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::{put_i32, put_u16, put_u32};

    fn frame(kind: u16, size: usize) -> Vec<u8> {
        let mut buf = vec![0u8; size];
        put_u16(&mut buf, 0, kind);
        put_u16(&mut buf, 2, 0x0102);
        put_u32(&mut buf, 4, size as u32);
        buf
    }

    #[test]
    fn assoc_change_fields() {
        let mut buf = frame(kind::ASSOC_CHANGE, 20);
        put_u16(&mut buf, 8, abi::assoc_state::COMM_UP);
        put_u16(&mut buf, 12, 10);
        put_u16(&mut buf, 14, 5);
        put_i32(&mut buf, 16, 77);
        let Notification::AssocChange(change) = Notification::decode(&buf).expect("合法通知") else {
            panic!("应解码为 AssocChange");
        };
        assert_eq!(change.state, AssocState::CommUp);
        assert_eq!(change.outbound_streams, 10);
        assert_eq!(change.inbound_streams, 5);
        assert_eq!(change.assoc_id, 77);
        assert_eq!(change.header.flags, 0x0102);
        assert_eq!(change.header.length, 20);
    }

    #[test]
    fn remote_error_cause_is_network_order() {
        let mut buf = frame(kind::REMOTE_ERROR, 16);
        buf[8..10].copy_from_slice(&[0x00, 0x0c]);
        put_i32(&mut buf, 12, 3);
        let Notification::RemoteError(remote) = Notification::decode(&buf).expect("合法通知") else {
            panic!("应解码为 RemoteError");
        };
        assert_eq!(remote.error, 12);
        assert_eq!(remote.assoc_id, 3);
    }

    #[test]
    fn send_failed_embeds_sndrcvinfo() {
        let mut buf = frame(kind::SEND_FAILED, 48);
        put_u32(&mut buf, 8, 0x11);
        let info = SndRcvInfo {
            stream: 4,
            ppid: 46,
            assoc_id: 9,
            ..SndRcvInfo::default()
        };
        info.write_to(&mut buf[12..44]);
        put_i32(&mut buf, 44, 9);
        let Notification::SendFailed(failed) = Notification::decode(&buf).expect("合法通知") else {
            panic!("应解码为 SendFailed");
        };
        assert_eq!(failed.error, 0x11);
        assert_eq!(failed.info, info);
        assert_eq!(failed.assoc_id, 9);
    }

    #[test]
    fn peer_addr_change_exposes_address() {
        let mut buf = frame(kind::PEER_ADDR_CHANGE, 148);
        let record = SctpAddr::new(vec!["192.0.2.9".parse().expect("ip")], 2905)
            .expect("非空")
            .to_wire();
        buf[8..8 + record.len()].copy_from_slice(&record);
        put_i32(&mut buf, 136, abi::paddr_state::ADDR_UNREACHABLE);
        put_i32(&mut buf, 144, 12);
        let Notification::PeerAddrChange(change) = Notification::decode(&buf).expect("合法通知")
        else {
            panic!("应解码为 PeerAddrChange");
        };
        assert_eq!(change.state, PeerAddrState::Unreachable);
        assert_eq!(change.assoc_id, 12);
        assert_eq!(change.address().expect("IPv4 记录").to_string(), "192.0.2.9:2905");
    }

    #[test]
    fn variant_shorter_than_struct_is_too_small() {
        let buf = frame(kind::ASSOC_RESET_EVENT, 16);
        assert_eq!(
            Notification::decode(&buf),
            Err(CodecError::TooSmall {
                expected: 20,
                actual: 16
            })
        );
    }

    #[test]
    fn name_lookup() {
        assert_eq!(notification_name(0x8001), "SCTP_ASSOC_CHANGE");
        assert_eq!(notification_name(0x800c), "SCTP_STREAM_CHANGE_EVENT");
        assert_eq!(notification_name(0), "");
        assert_eq!(notification_name(0xFFFF), "");
    }
}
