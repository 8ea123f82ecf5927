use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use proptest::prelude::*;
use spark_codec_sctp::{Network, SctpAddr, resolve};

fn any_ip() -> impl Strategy<Value = IpAddr> {
    prop_oneof![
        any::<[u8; 4]>().prop_map(|octets| IpAddr::V4(Ipv4Addr::from(octets))),
        any::<[u8; 16]>().prop_map(|octets| IpAddr::V6(Ipv6Addr::from(octets))),
    ]
}

proptest! {
    /// 任意非空地址列表经打包再解码，地址顺序、地址族与端口保持不变。
    #[test]
    fn wire_encoding_preserves_address_list(
        addresses in prop::collection::vec(any_ip(), 1..8),
        port in any::<u16>(),
    ) {
        let addr = SctpAddr::new(addresses, port).expect("非空列表");
        let decoded = SctpAddr::from_wire(&addr.to_wire()).expect("自身编码必可解码");
        prop_assert_eq!(decoded, addr);
    }

    /// 文本形式（`a/[b]:port`）可被 `Any` 网络重新解析为同一地址。
    #[test]
    fn display_text_resolves_back(
        addresses in prop::collection::vec(any_ip(), 1..4),
        port in any::<u16>(),
    ) {
        let addr = SctpAddr::new(addresses, port).expect("非空列表");
        let reparsed = resolve(Network::Any, &addr.to_string()).expect("Display 输出可解析");
        prop_assert_eq!(reparsed, addr);
    }

    /// `sctp4` 网络解析结果只包含 IPv4 地址。
    #[test]
    fn v4_network_never_yields_ipv6(
        addresses in prop::collection::vec(any_ip(), 1..6),
        port in 1u16..,
    ) {
        let text = SctpAddr::new(addresses, port).expect("非空列表").to_string();
        if let Ok(resolved) = resolve(Network::V4Only, &text) {
            prop_assert!(resolved.addresses().iter().all(IpAddr::is_ipv4));
            prop_assert_eq!(resolved.port(), port);
        }
    }
}
