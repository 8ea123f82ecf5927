//! 多宿主 SCTP 地址：文本解析、打包 sockaddr 编解码。
//!
//! # 模块定位（Why）
//! - SCTP 关联可以同时绑定多个 IP，但共享一个端口；内核接口（bindx/connectx/getaddrs）
//!   使用“紧密拼接的 sockaddr 记录”表达这一集合；
//! - 本模块负责 `"10.0.0.1/10.0.0.2:3868"` 这类文本与该字节格式之间的双向转换。
//!
//! # 暴露接口（What）
//! - [`Network`]：`sctp` / `sctp4` / `sctp6` 网络标签；
//! - [`SctpAddr`]：不可变的“地址列表 + 端口”；
//! - [`resolve`]：文本 → [`SctpAddr`]。
//!
//! # 设计要点（How）
//! - IPv4 记录 16 字节、IPv6 记录 28 字节；地址族字段为主机序，端口为网络序；
//! - 解码时按每条记录的地址族前进，遇到未知地址族或截断记录则整体失败；
//! - 以第一条记录的端口作为整个集合的端口。

use std::{
    fmt,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    str::FromStr,
};

use crate::{
    abi,
    error::{AddrError, CodecError},
    raw::{get_u16, get_u32},
    services,
    wire::{GetAddrsHeader, KernelStruct},
};

/// `struct sockaddr_in` 尺寸。
pub const SOCKADDR_IN_SIZE: usize = 2 + 2 + 4 + 8;
/// `struct sockaddr_in6` 尺寸。
pub const SOCKADDR_IN6_SIZE: usize = 2 + 2 + 4 + 16 + 4;
/// `struct sockaddr_storage` 尺寸。
pub const SOCKADDR_STORAGE_SIZE: usize = 128;

/// 网络标签，决定地址过滤规则与 socket 地址族。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum Network {
    /// `"sctp"` 或空串：接受任意地址族。
    #[default]
    Any,
    /// `"sctp4"`：仅 IPv4。
    V4Only,
    /// `"sctp6"`：仅 IPv6。
    V6Only,
}

impl Network {
    /// 标签的规范文本。
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Any => "sctp",
            Network::V4Only => "sctp4",
            Network::V6Only => "sctp6",
        }
    }

    /// 创建 socket 时是否使用 `AF_INET`；其余情况一律使用 `AF_INET6`。
    pub fn is_ipv4(&self) -> bool {
        matches!(self, Network::V4Only)
    }

    fn wildcard(&self) -> IpAddr {
        match self {
            Network::V4Only => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            Network::Any | Network::V6Only => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        }
    }

    /// 按标签过滤并规范化地址；不兼容时返回 `None`。
    fn admit(&self, ip: IpAddr) -> Option<IpAddr> {
        match (self, ip) {
            (Network::Any, ip) => Some(ip),
            (Network::V4Only, IpAddr::V4(v4)) => Some(IpAddr::V4(v4)),
            (Network::V4Only, IpAddr::V6(v6)) => v6.to_ipv4_mapped().map(IpAddr::V4),
            (Network::V6Only, IpAddr::V6(v6)) => Some(IpAddr::V6(v6)),
            (Network::V6Only, IpAddr::V4(_)) => None,
        }
    }
}

impl FromStr for Network {
    type Err = AddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "sctp" => Ok(Network::Any),
            "sctp4" => Ok(Network::V4Only),
            "sctp6" => Ok(Network::V6Only),
            other => Err(AddrError::UnknownNetwork {
                network: other.to_owned(),
            }),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 多宿主 SCTP 地址：非空 IP 列表 + 共享端口。
///
/// # 教案式说明
/// - **意图 (Why)**：一次 bindx/connectx 调用即可声明关联的全部本地或远端路径；
/// - **契约 (What)**：地址列表非空且顺序即为打包顺序；构造后不可变；
/// - **风险 (Trade-offs)**：不去重，重复地址原样交给内核判定。
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct SctpAddr {
    addresses: Vec<IpAddr>,
    port: u16,
}

impl SctpAddr {
    /// 由地址列表与端口构造；列表为空时返回 [`CodecError::EmptyAddressList`]。
    pub fn new(addresses: Vec<IpAddr>, port: u16) -> Result<Self, CodecError> {
        if addresses.is_empty() {
            return Err(CodecError::EmptyAddressList);
        }
        Ok(Self { addresses, port })
    }

    pub fn addresses(&self) -> &[IpAddr] {
        &self.addresses
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// 全部地址均为 IPv4（含 IPv4 映射的 IPv6）。
    pub fn is_v4_only(&self) -> bool {
        self.addresses.iter().all(|ip| match ip {
            IpAddr::V4(_) => true,
            IpAddr::V6(v6) => v6.to_ipv4_mapped().is_some(),
        })
    }

    /// 全部地址均为原生 IPv6。
    pub fn is_v6_only(&self) -> bool {
        self.addresses.iter().all(|ip| match ip {
            IpAddr::V4(_) => false,
            IpAddr::V6(v6) => v6.to_ipv4_mapped().is_none(),
        })
    }

    /// 逐个展开为 `SocketAddr`。
    pub fn socket_addrs(&self) -> impl Iterator<Item = SocketAddr> + '_ {
        self.addresses
            .iter()
            .map(|ip| SocketAddr::new(*ip, self.port))
    }

    /// 编码为紧密拼接的 sockaddr 记录。
    pub fn to_wire(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(self.addresses.len() * SOCKADDR_IN6_SIZE);
        for ip in &self.addresses {
            match ip {
                IpAddr::V4(v4) => {
                    let mut record = [0u8; SOCKADDR_IN_SIZE];
                    record[0..2].copy_from_slice(&abi::family::INET.to_ne_bytes());
                    record[2..4].copy_from_slice(&self.port.to_be_bytes());
                    record[4..8].copy_from_slice(&v4.octets());
                    buffer.extend_from_slice(&record);
                }
                IpAddr::V6(v6) => {
                    let mut record = [0u8; SOCKADDR_IN6_SIZE];
                    record[0..2].copy_from_slice(&abi::family::INET6.to_ne_bytes());
                    record[2..4].copy_from_slice(&self.port.to_be_bytes());
                    record[8..24].copy_from_slice(&v6.octets());
                    buffer.extend_from_slice(&record);
                }
            }
        }
        buffer
    }

    /// 解码紧密拼接的 sockaddr 记录，必须恰好消费整个缓冲。
    pub fn from_wire(bytes: &[u8]) -> Result<Self, CodecError> {
        decode_records(bytes, None)
    }

    /// 解码 `sockaddr_storage` 中的单条记录，尾部填充被忽略。
    pub fn from_sockaddr_storage(bytes: &[u8]) -> Result<Self, CodecError> {
        decode_records(bytes, Some(1))
    }

    /// 解码 `SCTP_GET_LOCAL_ADDRS` / `SCTP_GET_PEER_ADDRS` 的输出：
    /// [`GetAddrsHeader`] 之后跟随 `addr_num` 条记录。
    pub fn from_getaddrs(bytes: &[u8]) -> Result<Self, CodecError> {
        let header = GetAddrsHeader::decode(bytes)?;
        if header.addr_num == 0 {
            return Err(CodecError::EmptyAddressList);
        }
        decode_records(&bytes[GetAddrsHeader::SIZE..], Some(header.addr_num as usize))
    }
}

/// 逐条解码 sockaddr 记录。
///
/// `limit` 为 `None` 时要求恰好消费整个缓冲；为 `Some(n)` 时解码 `n` 条后停止。
fn decode_records(bytes: &[u8], limit: Option<usize>) -> Result<SctpAddr, CodecError> {
    let mut addresses = Vec::new();
    let mut port = None;
    let mut offset = 0;

    while offset < bytes.len() && limit.is_none_or(|n| addresses.len() < n) {
        let rest = &bytes[offset..];
        if rest.len() < 2 {
            return Err(CodecError::Truncated {
                structure: "sockaddr",
                expected: 2,
                actual: rest.len(),
            });
        }
        let family = get_u16(rest, 0);
        let (ip, record_port, size) = match family {
            abi::family::INET => {
                ensure_len(rest, SOCKADDR_IN_SIZE, "sockaddr_in")?;
                let octets = get_u32(rest, 4).to_ne_bytes();
                (IpAddr::V4(Ipv4Addr::from(octets)), read_port(rest), SOCKADDR_IN_SIZE)
            }
            abi::family::INET6 => {
                ensure_len(rest, SOCKADDR_IN6_SIZE, "sockaddr_in6")?;
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&rest[8..24]);
                (IpAddr::V6(Ipv6Addr::from(octets)), read_port(rest), SOCKADDR_IN6_SIZE)
            }
            other => {
                return Err(CodecError::UnknownFamily {
                    family: other,
                    offset,
                });
            }
        };
        port.get_or_insert(record_port);
        addresses.push(ip);
        offset += size;
    }

    if let Some(expected) = limit {
        if addresses.len() < expected {
            return Err(CodecError::Truncated {
                structure: "sockaddr list",
                expected,
                actual: addresses.len(),
            });
        }
    }
    SctpAddr::new(addresses, port.unwrap_or_default())
}

fn ensure_len(rest: &[u8], size: usize, structure: &'static str) -> Result<(), CodecError> {
    if rest.len() < size {
        return Err(CodecError::Truncated {
            structure,
            expected: size,
            actual: rest.len(),
        });
    }
    Ok(())
}

fn read_port(record: &[u8]) -> u16 {
    u16::from_be_bytes([record[2], record[3]])
}

impl fmt::Display for SctpAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, ip) in self.addresses.iter().enumerate() {
            if index > 0 {
                f.write_str("/")?;
            }
            match ip {
                IpAddr::V4(v4) => write!(f, "{v4}")?,
                IpAddr::V6(v6) => write!(f, "[{v6}]")?,
            }
        }
        write!(f, ":{}", self.port)
    }
}

/// 解析 `addr1[/addr2/...]:port` 形式的文本。
///
/// # 契约（Contract）
/// - 端口取最后一个 `:` 之后的部分：数字或服务名，空串表示 0；缺少 `:` 返回
///   [`AddrError::MissingPort`]，无法解析返回 [`AddrError::PortLookup`]；
/// - 地址部分按 `/` 切分：空段映射为对应地址族的通配地址；非空段按 IP 字面量解析
///   （允许 `[...]` 包裹），不可解析或与 `network` 不兼容的段被静默丢弃；
/// - 过滤后为空返回 [`AddrError::InvalidAddress`]。
pub fn resolve(network: Network, text: &str) -> Result<SctpAddr, AddrError> {
    let Some(index) = text.rfind(':') else {
        return Err(AddrError::MissingPort {
            input: text.to_owned(),
        });
    };
    let (host, port_text) = (&text[..index], &text[index + 1..]);
    let port = services::lookup_port(port_text).ok_or_else(|| AddrError::PortLookup {
        port: port_text.to_owned(),
        input: text.to_owned(),
    })?;

    let addresses: Vec<IpAddr> = host
        .split('/')
        .filter_map(|segment| {
            if segment.is_empty() {
                return Some(network.wildcard());
            }
            let literal = segment
                .strip_prefix('[')
                .and_then(|inner| inner.strip_suffix(']'))
                .unwrap_or(segment);
            literal
                .parse::<IpAddr>()
                .ok()
                .and_then(|ip| network.admit(ip))
        })
        .collect();

    SctpAddr::new(addresses, port).map_err(|_| AddrError::InvalidAddress {
        input: text.to_owned(),
    })
}
