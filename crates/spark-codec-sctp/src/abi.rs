//! Linux 内核 SCTP ABI 常量表。
//!
//! # 模块定位（Why）
//! - 结构体尺寸、socket option 编号、控制消息类型与通知判别值由构建脚本从
//!   `contracts/sctp_abi.toml` 生成，源码中不再出现裸数字；
//! - [`verify_layouts`] 把编解码器按字段推导的尺寸与契约表逐项比对，任何漂移都在首次使用时暴露。
//!
//! # 契约（Contract）
//! - 仅面向 LP64 Linux（x86_64 / aarch64）；
//! - 尺寸不一致属于编程错误，直接 panic，而不是返回运行期错误。

include!(concat!(env!("OUT_DIR"), "/kernel_abi.rs"));

use crate::{
    addr::{SOCKADDR_IN_SIZE, SOCKADDR_IN6_SIZE, SOCKADDR_STORAGE_SIZE},
    notification::NotificationHeader,
    wire::{
        CmsgHeader, EventSubscribe, GetAddrsHeader, GetAddrsOld, InitMsg, KernelStruct,
        PeelOffArg, PeelOffFlagsArg, PrimaryAddr, SndRcvInfo,
    },
};

/// 编解码器推导出的 `(名称, 推导尺寸, 契约尺寸)` 列表。
pub fn layout_table() -> [(&'static str, usize, usize); 12] {
    [
        (SndRcvInfo::NAME, SndRcvInfo::SIZE, size::SNDRCVINFO),
        (InitMsg::NAME, InitMsg::SIZE, size::INITMSG),
        (EventSubscribe::NAME, EventSubscribe::SIZE, size::EVENT_SUBSCRIBE),
        (PeelOffArg::NAME, PeelOffArg::SIZE, size::PEELOFF_ARG),
        (PeelOffFlagsArg::NAME, PeelOffFlagsArg::SIZE, size::PEELOFF_FLAGS_ARG),
        (GetAddrsOld::NAME, GetAddrsOld::SIZE, size::GETADDRS_OLD),
        (GetAddrsHeader::NAME, GetAddrsHeader::SIZE, size::GETADDRS),
        (PrimaryAddr::NAME, PrimaryAddr::SIZE, size::PRIM),
        (CmsgHeader::NAME, CmsgHeader::SIZE, size::CMSGHDR),
        ("sockaddr_in", SOCKADDR_IN_SIZE, size::SOCKADDR_IN),
        ("sockaddr_in6", SOCKADDR_IN6_SIZE, size::SOCKADDR_IN6),
        ("sockaddr_storage", SOCKADDR_STORAGE_SIZE, size::SOCKADDR_STORAGE),
    ]
}

/// 校验全部布局，发现不一致立即 panic。
///
/// 额外约束：通知公共头尺寸与契约一致，且联合体最大尺寸等于各变体定长部分的最大值。
pub fn verify_layouts() {
    for (name, derived, contract) in layout_table() {
        assert_eq!(
            derived, contract,
            "{name} 布局尺寸 {derived} 与内核契约 {contract} 不一致"
        );
    }
    assert_eq!(
        NotificationHeader::SIZE,
        size::NOTIFICATION_HEADER,
        "通知公共头尺寸与内核契约不一致"
    );
    let widest = NOTIFICATIONS
        .iter()
        .map(|(_, _, size)| *size)
        .max()
        .unwrap_or_default();
    assert_eq!(
        widest,
        size::NOTIFICATION_MAX,
        "通知联合体最大尺寸与各变体定长部分不一致"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layouts_match_contract() {
        verify_layouts();
    }

    #[test]
    fn notification_table_is_contiguous() {
        let values: Vec<u16> = NOTIFICATIONS.iter().map(|(value, _, _)| *value).collect();
        let expected: Vec<u16> = (0x8000..=0x800c).collect();
        assert_eq!(values, expected);
        assert_eq!(notification::ASSOC_CHANGE, 0x8001);
        assert_eq!(opt::SOCKOPT_CONNECTX3, 111);
        assert_eq!(sinfo::EOF, 0x200);
    }
}
