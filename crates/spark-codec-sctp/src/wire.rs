//! 内核 SCTP ABI 结构体的字节级编解码。
//!
//! # 模块定位（Why）
//! - socket option 与控制消息在系统调用边界上只是一段字节；本模块把这些字节与强类型结构体
//!   互相转换，让上层永远不需要 `transmute` 或裸指针强转。
//!
//! # 暴露接口（What）
//! - [`KernelStruct`]：所有定长结构的统一编解码契约；
//! - [`SndRcvInfo`] / [`InitMsg`] / [`EventSubscribe`]：每条消息的元数据、建联参数与通知订阅；
//! - [`PeelOffArg`] / [`PeelOffFlagsArg`] / [`GetAddrsOld`] / [`GetAddrsHeader`] / [`PrimaryAddr`]：
//!   getsockopt 双向参数块；
//! - [`CmsgHeader`] 与 [`encode_sndrcv_control`] / [`find_sndrcv`]：携带 `SCTP_SNDRCV` 的控制缓冲。
//!
//! # 设计要点（How）
//! - 字段按内核布局逐个写入固定偏移，采用主机字节序；填充字节保持为零；
//! - `SIZE` 由字段布局推导，与 `contracts/sctp_abi.toml` 的一致性由 [`crate::abi::verify_layouts`] 校验；
//! - 解码只校验“不短于定长部分”，尾部多余字节（例如内核追加的变长数据）被忽略。

use crate::{
    abi,
    addr::{self, SctpAddr},
    error::CodecError,
    raw::{get_i32, get_u16, get_u32, get_u64, put_i32, put_u16, put_u32, put_u64},
};

/// 定长内核结构的编解码契约。
///
/// # 契约（Contract）
/// - `write_to` 的 `out` 至少有 `SIZE` 字节，调用方保证；未写字段必须保持为零；
/// - `read_from` 的 `buf` 至少有 `SIZE` 字节，由 [`KernelStruct::decode`] 负责检查。
pub trait KernelStruct: Sized {
    /// 结构名称，出现在错误信息中。
    const NAME: &'static str;
    /// 内核布局下的字节尺寸。
    const SIZE: usize;

    /// 将字段写入 `out[..SIZE]`。
    fn write_to(&self, out: &mut [u8]);

    /// 从 `buf[..SIZE]` 读取字段。
    fn read_from(buf: &[u8]) -> Self;

    /// 编码为恰好 `SIZE` 字节的缓冲。
    fn encode(&self) -> Vec<u8> {
        let mut out = vec![0u8; Self::SIZE];
        self.write_to(&mut out);
        out
    }

    /// 从缓冲解码，长度不足时返回 [`CodecError::Truncated`]。
    fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() < Self::SIZE {
            return Err(CodecError::Truncated {
                structure: Self::NAME,
                expected: Self::SIZE,
                actual: buf.len(),
            });
        }
        Ok(Self::read_from(&buf[..Self::SIZE]))
    }
}

/// 每条消息的发送/接收元数据（`struct sctp_sndrcvinfo`）。
///
/// # 教案式说明
/// - **意图 (Why)**：SCTP 的多流、有序/无序、PPID、生存期等语义都通过它随消息传递；
/// - **契约 (What)**：`flags` 之后有 2 字节填充，`assoc_id` 位于末尾偏移 28；
/// - **用法 (How)**：发送时经 [`encode_sndrcv_control`] 放入控制缓冲，接收时由 [`find_sndrcv`] 取回。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct SndRcvInfo {
    pub stream: u16,
    pub ssn: u16,
    pub flags: u16,
    pub ppid: u32,
    pub context: u32,
    pub time_to_live: u32,
    pub tsn: u32,
    pub cum_tsn: u32,
    pub assoc_id: i32,
}

impl SndRcvInfo {
    /// 只携带标志位的元数据，常用于发送 `SCTP_EOF`/`SCTP_ABORT`。
    pub fn with_flags(flags: u16) -> Self {
        Self {
            flags,
            ..Self::default()
        }
    }

    /// 指定关联与标志位，用于一对多 socket 上的定向控制。
    pub fn for_assoc(assoc_id: i32, flags: u16) -> Self {
        Self {
            flags,
            assoc_id,
            ..Self::default()
        }
    }

    /// 是否请求无序投递。
    pub fn is_unordered(&self) -> bool {
        self.flags & abi::sinfo::UNORDERED != 0
    }
}

impl KernelStruct for SndRcvInfo {
    const NAME: &'static str = "sctp_sndrcvinfo";
    const SIZE: usize = 2 + 2 + 2 + 2 + 4 * 5 + 4;

    fn write_to(&self, out: &mut [u8]) {
        put_u16(out, 0, self.stream);
        put_u16(out, 2, self.ssn);
        put_u16(out, 4, self.flags);
        put_u32(out, 8, self.ppid);
        put_u32(out, 12, self.context);
        put_u32(out, 16, self.time_to_live);
        put_u32(out, 20, self.tsn);
        put_u32(out, 24, self.cum_tsn);
        put_i32(out, 28, self.assoc_id);
    }

    fn read_from(buf: &[u8]) -> Self {
        Self {
            stream: get_u16(buf, 0),
            ssn: get_u16(buf, 2),
            flags: get_u16(buf, 4),
            ppid: get_u32(buf, 8),
            context: get_u32(buf, 12),
            time_to_live: get_u32(buf, 16),
            tsn: get_u32(buf, 20),
            cum_tsn: get_u32(buf, 24),
            assoc_id: get_i32(buf, 28),
        }
    }
}

/// 建联参数（`struct sctp_initmsg`），全零表示沿用内核默认值。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct InitMsg {
    pub num_ostreams: u16,
    pub max_instreams: u16,
    pub max_attempts: u16,
    pub max_init_timeout: u16,
}

impl KernelStruct for InitMsg {
    const NAME: &'static str = "sctp_initmsg";
    const SIZE: usize = 2 * 4;

    fn write_to(&self, out: &mut [u8]) {
        put_u16(out, 0, self.num_ostreams);
        put_u16(out, 2, self.max_instreams);
        put_u16(out, 4, self.max_attempts);
        put_u16(out, 6, self.max_init_timeout);
    }

    fn read_from(buf: &[u8]) -> Self {
        Self {
            num_ostreams: get_u16(buf, 0),
            max_instreams: get_u16(buf, 2),
            max_attempts: get_u16(buf, 4),
            max_init_timeout: get_u16(buf, 6),
        }
    }
}

/// 通知订阅开关（`struct sctp_event_subscribe`），每个字段在内核中占 1 字节。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct EventSubscribe {
    pub data_io: bool,
    pub association: bool,
    pub address: bool,
    pub send_failure: bool,
    pub peer_error: bool,
    pub shutdown: bool,
    pub partial_delivery: bool,
    pub adaptation_layer: bool,
    pub authentication: bool,
    pub sender_dry: bool,
    pub stream_reset: bool,
    pub assoc_reset: bool,
    pub stream_change: bool,
}

impl EventSubscribe {
    /// 订阅全部 13 类事件。
    pub fn all() -> Self {
        Self::from_flags([true; 13])
    }

    /// 按内核字段顺序从布尔数组构造，与 [`EventSubscribe::to_flags`] 互逆。
    pub fn from_flags(flags: [bool; 13]) -> Self {
        let [
            data_io,
            association,
            address,
            send_failure,
            peer_error,
            shutdown,
            partial_delivery,
            adaptation_layer,
            authentication,
            sender_dry,
            stream_reset,
            assoc_reset,
            stream_change,
        ] = flags;
        Self {
            data_io,
            association,
            address,
            send_failure,
            peer_error,
            shutdown,
            partial_delivery,
            adaptation_layer,
            authentication,
            sender_dry,
            stream_reset,
            assoc_reset,
            stream_change,
        }
    }

    /// 按内核字段顺序展开为布尔数组。
    pub fn to_flags(&self) -> [bool; 13] {
        [
            self.data_io,
            self.association,
            self.address,
            self.send_failure,
            self.peer_error,
            self.shutdown,
            self.partial_delivery,
            self.adaptation_layer,
            self.authentication,
            self.sender_dry,
            self.stream_reset,
            self.assoc_reset,
            self.stream_change,
        ]
    }
}

impl KernelStruct for EventSubscribe {
    const NAME: &'static str = "sctp_event_subscribe";
    const SIZE: usize = 13;

    fn write_to(&self, out: &mut [u8]) {
        for (slot, flag) in out.iter_mut().zip(self.to_flags()) {
            *slot = u8::from(flag);
        }
    }

    fn read_from(buf: &[u8]) -> Self {
        let mut flags = [false; 13];
        for (flag, byte) in flags.iter_mut().zip(buf) {
            *flag = *byte != 0;
        }
        Self::from_flags(flags)
    }
}

/// `SCTP_SOCKOPT_PEELOFF` 的双向参数：写入关联号，内核回填新描述符。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PeelOffArg {
    pub assoc_id: i32,
    pub sd: i32,
}

impl KernelStruct for PeelOffArg {
    const NAME: &'static str = "sctp_peeloff_arg_t";
    const SIZE: usize = 4 + 4;

    fn write_to(&self, out: &mut [u8]) {
        put_i32(out, 0, self.assoc_id);
        put_i32(out, 4, self.sd);
    }

    fn read_from(buf: &[u8]) -> Self {
        Self {
            assoc_id: get_i32(buf, 0),
            sd: get_i32(buf, 4),
        }
    }
}

/// `SCTP_SOCKOPT_PEELOFF_FLAGS` 的参数：在 [`PeelOffArg`] 之后追加描述符标志（如 `O_CLOEXEC`）。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PeelOffFlagsArg {
    pub arg: PeelOffArg,
    pub flags: u32,
}

impl KernelStruct for PeelOffFlagsArg {
    const NAME: &'static str = "sctp_peeloff_flags_arg_t";
    const SIZE: usize = PeelOffArg::SIZE + 4;

    fn write_to(&self, out: &mut [u8]) {
        self.arg.write_to(out);
        put_u32(out, PeelOffArg::SIZE, self.flags);
    }

    fn read_from(buf: &[u8]) -> Self {
        Self {
            arg: PeelOffArg::read_from(buf),
            flags: get_u32(buf, PeelOffArg::SIZE),
        }
    }
}

/// `SCTP_SOCKOPT_CONNECTX3` 的参数块（`struct sctp_getaddrs_old`）。
///
/// - `addr_num` 在该选项下表示打包地址的**字节长度**；
/// - `addrs` 是指向打包地址缓冲的用户态指针，调用方保证其在系统调用期间有效；
/// - 内核成功（或 `EINPROGRESS`）时把新关联号写回 `assoc_id`。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct GetAddrsOld {
    pub assoc_id: i32,
    pub addr_num: i32,
    pub addrs: u64,
}

impl KernelStruct for GetAddrsOld {
    const NAME: &'static str = "sctp_getaddrs_old";
    const SIZE: usize = 4 + 4 + 8;

    fn write_to(&self, out: &mut [u8]) {
        put_i32(out, 0, self.assoc_id);
        put_i32(out, 4, self.addr_num);
        put_u64(out, 8, self.addrs);
    }

    fn read_from(buf: &[u8]) -> Self {
        Self {
            assoc_id: get_i32(buf, 0),
            addr_num: get_i32(buf, 4),
            addrs: get_u64(buf, 8),
        }
    }
}

/// `SCTP_GET_LOCAL_ADDRS` / `SCTP_GET_PEER_ADDRS` 返回缓冲的头部（`struct sctp_getaddrs`），
/// 其后紧跟 `addr_num` 条打包 sockaddr 记录。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct GetAddrsHeader {
    pub assoc_id: i32,
    pub addr_num: u32,
}

impl KernelStruct for GetAddrsHeader {
    const NAME: &'static str = "sctp_getaddrs";
    const SIZE: usize = 4 + 4;

    fn write_to(&self, out: &mut [u8]) {
        put_i32(out, 0, self.assoc_id);
        put_u32(out, 4, self.addr_num);
    }

    fn read_from(buf: &[u8]) -> Self {
        Self {
            assoc_id: get_i32(buf, 0),
            addr_num: get_u32(buf, 4),
        }
    }
}

/// `SCTP_PRIMARY_ADDR` 的参数（`struct sctp_prim`）：关联号 + 128 字节 `sockaddr_storage`。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PrimaryAddr {
    pub assoc_id: i32,
    pub storage: [u8; addr::SOCKADDR_STORAGE_SIZE],
}

impl PrimaryAddr {
    /// 构造一个只填写关联号的查询参数。
    pub fn query(assoc_id: i32) -> Self {
        Self {
            assoc_id,
            storage: [0u8; addr::SOCKADDR_STORAGE_SIZE],
        }
    }

    /// 解析内核回填的主路径地址。
    pub fn address(&self) -> Result<SctpAddr, CodecError> {
        SctpAddr::from_sockaddr_storage(&self.storage)
    }
}

impl KernelStruct for PrimaryAddr {
    const NAME: &'static str = "sctp_prim";
    const SIZE: usize = 4 + addr::SOCKADDR_STORAGE_SIZE;

    fn write_to(&self, out: &mut [u8]) {
        put_i32(out, 0, self.assoc_id);
        out[4..Self::SIZE].copy_from_slice(&self.storage);
    }

    fn read_from(buf: &[u8]) -> Self {
        let mut storage = [0u8; addr::SOCKADDR_STORAGE_SIZE];
        storage.copy_from_slice(&buf[4..Self::SIZE]);
        Self {
            assoc_id: get_i32(buf, 0),
            storage,
        }
    }
}

/// 控制消息头（`struct cmsghdr`，LP64 下 `cmsg_len` 为 8 字节）。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CmsgHeader {
    pub len: usize,
    pub level: i32,
    pub kind: i32,
}

impl KernelStruct for CmsgHeader {
    const NAME: &'static str = "cmsghdr";
    const SIZE: usize = 8 + 4 + 4;

    fn write_to(&self, out: &mut [u8]) {
        put_u64(out, 0, self.len as u64);
        put_i32(out, 8, self.level);
        put_i32(out, 12, self.kind);
    }

    fn read_from(buf: &[u8]) -> Self {
        Self {
            len: get_u64(buf, 0) as usize,
            level: get_i32(buf, 8),
            kind: get_i32(buf, 12),
        }
    }
}

const CMSG_ALIGN_TO: usize = core::mem::size_of::<usize>();

/// `CMSG_ALIGN`：按 `size_t` 对齐。
pub const fn cmsg_align(len: usize) -> usize {
    (len + CMSG_ALIGN_TO - 1) & !(CMSG_ALIGN_TO - 1)
}

/// `CMSG_LEN`：头部 + 未对齐的负载长度。
pub const fn cmsg_len(payload: usize) -> usize {
    cmsg_align(CmsgHeader::SIZE) + payload
}

/// `CMSG_SPACE`：头部 + 对齐后的负载长度。
pub const fn cmsg_space(payload: usize) -> usize {
    cmsg_align(CmsgHeader::SIZE) + cmsg_align(payload)
}

/// 承载一条 `SCTP_SNDRCV` 控制消息所需的缓冲大小。
pub const SNDRCV_CONTROL_SPACE: usize = cmsg_space(SndRcvInfo::SIZE);

/// 构造只含一条 `SCTP_SNDRCV` 控制消息的缓冲，长度为 [`SNDRCV_CONTROL_SPACE`]。
pub fn encode_sndrcv_control(info: &SndRcvInfo) -> Vec<u8> {
    let mut control = vec![0u8; SNDRCV_CONTROL_SPACE];
    CmsgHeader {
        len: cmsg_len(SndRcvInfo::SIZE),
        level: abi::level::IPPROTO_SCTP,
        kind: abi::cmsg::SNDRCV,
    }
    .write_to(&mut control);
    info.write_to(&mut control[cmsg_align(CmsgHeader::SIZE)..]);
    control
}

/// 在接收到的控制缓冲中查找 `SCTP_SNDRCV` 控制消息。
///
/// # 契约（Contract）
/// - 返回 `Ok(None)` 表示缓冲中没有该类型的控制消息（包括空缓冲）；
/// - 控制消息头声明的长度小于头部或越过缓冲末尾时，返回 [`CodecError::Truncated`]。
pub fn find_sndrcv(control: &[u8]) -> Result<Option<SndRcvInfo>, CodecError> {
    let header_space = cmsg_align(CmsgHeader::SIZE);
    let mut offset = 0;
    while offset + CmsgHeader::SIZE <= control.len() {
        let header = CmsgHeader::read_from(&control[offset..]);
        if header.len < header_space || header.len > control.len() - offset {
            return Err(CodecError::Truncated {
                structure: CmsgHeader::NAME,
                expected: header.len.max(header_space),
                actual: control.len() - offset,
            });
        }
        if header.level == abi::level::IPPROTO_SCTP && header.kind == abi::cmsg::SNDRCV {
            let payload = &control[offset + header_space..offset + header.len];
            return SndRcvInfo::decode(payload).map(Some);
        }
        offset += cmsg_align(header.len);
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sndrcvinfo_assoc_id_sits_at_tail() {
        let info = SndRcvInfo {
            assoc_id: 100,
            ..SndRcvInfo::default()
        };
        let bytes = info.encode();
        assert_eq!(bytes.len(), 32);
        assert_eq!(&bytes[28..32], &100i32.to_ne_bytes());
        assert!(bytes[..28].iter().all(|b| *b == 0));
        assert_eq!(SndRcvInfo::decode(&bytes).expect("完整缓冲应可解码"), info);
    }

    #[test]
    fn sndrcvinfo_padding_stays_zero() {
        let info = SndRcvInfo {
            stream: 1,
            ssn: 2,
            flags: abi::sinfo::UNORDERED,
            ppid: 0xAABB_CCDD,
            context: 5,
            time_to_live: 6,
            tsn: 7,
            cum_tsn: 8,
            assoc_id: -1,
        };
        let bytes = info.encode();
        assert_eq!(&bytes[6..8], &[0, 0]);
        assert_eq!(&bytes[8..12], &0xAABB_CCDDu32.to_ne_bytes());
        assert!(SndRcvInfo::decode(&bytes).expect("可解码").is_unordered());
    }

    #[test]
    fn short_buffer_is_truncated() {
        let err = InitMsg::decode(&[0u8; 7]).expect_err("7 字节不足以构成 sctp_initmsg");
        assert_eq!(
            err,
            CodecError::Truncated {
                structure: "sctp_initmsg",
                expected: 8,
                actual: 7,
            }
        );
    }

    #[test]
    fn init_msg_field_order() {
        let init = InitMsg {
            num_ostreams: 10,
            max_instreams: 11,
            max_attempts: 3,
            max_init_timeout: 500,
        };
        let bytes = init.encode();
        assert_eq!(&bytes[0..2], &10u16.to_ne_bytes());
        assert_eq!(&bytes[6..8], &500u16.to_ne_bytes());
        assert_eq!(InitMsg::decode(&bytes).expect("可解码"), init);
    }

    #[test]
    fn event_subscribe_is_one_byte_per_flag() {
        let events = EventSubscribe {
            association: true,
            stream_change: true,
            ..EventSubscribe::default()
        };
        let bytes = events.encode();
        assert_eq!(bytes, vec![0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);

        let decoded = EventSubscribe::decode(&[2u8; 13]).expect("非零字节视为开启");
        assert_eq!(decoded, EventSubscribe::all());
    }

    #[test]
    fn peeloff_flags_arg_appends_flags() {
        let arg = PeelOffFlagsArg {
            arg: PeelOffArg { assoc_id: 9, sd: 0 },
            flags: 0o2_000_000,
        };
        let bytes = arg.encode();
        assert_eq!(bytes.len(), 12);
        assert_eq!(&bytes[8..12], &0o2_000_000u32.to_ne_bytes());

        let mut returned = bytes.clone();
        returned[4..8].copy_from_slice(&42i32.to_ne_bytes());
        assert_eq!(PeelOffFlagsArg::decode(&returned).expect("可解码").arg.sd, 42);
    }

    #[test]
    fn getaddrs_old_carries_pointer_at_offset_eight() {
        let block = GetAddrsOld {
            assoc_id: 0,
            addr_num: 16,
            addrs: 0xDEAD_BEEF,
        };
        let bytes = block.encode();
        assert_eq!(&bytes[4..8], &16i32.to_ne_bytes());
        assert_eq!(&bytes[8..16], &0xDEAD_BEEFu64.to_ne_bytes());
        assert_eq!(GetAddrsOld::decode(&bytes).expect("可解码"), block);
    }

    #[test]
    fn argument_blocks_survive_encode_decode() {
        let peel = PeelOffArg { assoc_id: -3, sd: 17 };
        assert_eq!(PeelOffArg::decode(&peel.encode()).expect("可解码"), peel);

        let header = GetAddrsHeader {
            assoc_id: 100,
            addr_num: 2,
        };
        assert_eq!(GetAddrsHeader::decode(&header.encode()).expect("可解码"), header);

        let info = SndRcvInfo {
            assoc_id: 100,
            ..SndRcvInfo::default()
        };
        assert_eq!(SndRcvInfo::decode(&info.encode()).expect("可解码"), info);
    }

    #[test]
    fn control_buffer_round_trip() {
        let info = SndRcvInfo::for_assoc(7, abi::sinfo::EOF);
        let control = encode_sndrcv_control(&info);
        assert_eq!(control.len(), 48);

        let header = CmsgHeader::decode(&control).expect("控制头可解码");
        assert_eq!(header.len, 48);
        assert_eq!(header.level, 132);
        assert_eq!(header.kind, 1);

        assert_eq!(find_sndrcv(&control).expect("合法控制缓冲"), Some(info));
    }

    #[test]
    fn find_sndrcv_skips_foreign_messages() {
        let mut control = vec![0u8; cmsg_space(4)];
        CmsgHeader {
            len: cmsg_len(4),
            level: 0,
            kind: 29,
        }
        .write_to(&mut control);
        let info = SndRcvInfo::with_flags(abi::sinfo::ABORT);
        control.extend(encode_sndrcv_control(&info));

        assert_eq!(find_sndrcv(&control).expect("合法控制缓冲"), Some(info));
        assert_eq!(find_sndrcv(&[]).expect("空缓冲"), None);
    }

    #[test]
    fn find_sndrcv_rejects_overlong_header() {
        let mut control = encode_sndrcv_control(&SndRcvInfo::default());
        control.truncate(40);
        let err = find_sndrcv(&control).expect_err("声明长度越界");
        assert!(matches!(err, CodecError::Truncated { structure: "cmsghdr", .. }));
    }

    #[test]
    fn primary_addr_decodes_embedded_storage() {
        let mut prim = PrimaryAddr::query(3);
        let record = SctpAddr::new(vec!["10.0.0.1".parse().expect("ip")], 3868)
            .expect("非空地址")
            .to_wire();
        prim.storage[..record.len()].copy_from_slice(&record);

        let decoded = PrimaryAddr::decode(&prim.encode()).expect("可解码");
        assert_eq!(decoded.assoc_id, 3);
        assert_eq!(decoded.address().expect("IPv4 记录").to_string(), "10.0.0.1:3868");
    }
}
