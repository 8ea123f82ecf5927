use spark_codec_sctp::{
    CodecError, Notification,
    abi::{NOTIFICATIONS, size},
    notification_name,
};

/// 构造判别值为 `kind`、长度为 `len` 的通知缓冲，公共头字段写入可辨识的值。
fn frame(kind: u16, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    buf[0..2].copy_from_slice(&kind.to_ne_bytes());
    buf[2..4].copy_from_slice(&0x00A5u16.to_ne_bytes());
    buf[4..8].copy_from_slice(&(len as u32).to_ne_bytes());
    buf
}

#[test]
fn every_known_discriminant_decodes_at_its_declared_size() {
    for (kind, name, declared) in NOTIFICATIONS {
        let notification = Notification::decode(&frame(*kind, *declared))
            .unwrap_or_else(|err| panic!("{name} 应可解码: {err}"));
        let header = notification.header();
        assert_eq!(header.kind, *kind, "{name} 判别值");
        assert_eq!(header.flags, 0x00A5, "{name} 标志位");
        assert_eq!(header.length as usize, *declared, "{name} 长度字段");
        assert_eq!(notification.name(), *name);
    }
}

#[test]
fn variants_map_to_expected_shapes() {
    let decode = |kind: u16, len: usize| Notification::decode(&frame(kind, len)).expect("合法通知");
    assert!(matches!(decode(0x8000, 8), Notification::DataIo(_)));
    assert!(matches!(decode(0x8001, 20), Notification::AssocChange(_)));
    assert!(matches!(decode(0x8002, 148), Notification::PeerAddrChange(_)));
    assert!(matches!(decode(0x8003, 48), Notification::SendFailed(_)));
    assert!(matches!(decode(0x8004, 16), Notification::RemoteError(_)));
    assert!(matches!(decode(0x8005, 12), Notification::Shutdown(_)));
    assert!(matches!(decode(0x8006, 24), Notification::PartialDelivery(_)));
    assert!(matches!(decode(0x8007, 16), Notification::Adaptation(_)));
    assert!(matches!(decode(0x8008, 20), Notification::Authentication(_)));
    assert!(matches!(decode(0x8009, 12), Notification::SenderDry(_)));
    assert!(matches!(decode(0x800a, 12), Notification::StreamReset(_)));
    assert!(matches!(decode(0x800b, 20), Notification::AssocReset(_)));
    assert!(matches!(decode(0x800c, 16), Notification::StreamChange(_)));
    assert_eq!(decode(0x8000, 8).assoc_id(), None);
}

#[test]
fn shorter_than_header_is_too_small() {
    let err = Notification::decode(&[0u8; 7]).expect_err("7 字节不足以构成公共头");
    assert_eq!(
        err,
        CodecError::TooSmall {
            expected: 8,
            actual: 7
        }
    );
}

#[test]
fn larger_than_union_is_too_large() {
    let err = Notification::decode(&frame(0x8001, size::NOTIFICATION_MAX + 1))
        .expect_err("超过联合体最大尺寸");
    assert_eq!(
        err,
        CodecError::TooLarge {
            max: 148,
            actual: 149
        }
    );
}

#[test]
fn unmapped_discriminant_is_unknown_type() {
    for kind in [0u16, 0x7fff, 0x800d, 0xffff] {
        let err = Notification::decode(&frame(kind, 16)).expect_err("未知判别值");
        assert_eq!(err, CodecError::UnknownType { kind });
    }
}

#[test]
fn names_are_empty_for_unmapped_values() {
    assert_eq!(notification_name(0x8005), "SCTP_SHUTDOWN_EVENT");
    assert_eq!(notification_name(0x8007), "SCTP_ADAPTATION_INDICATION");
    assert_eq!(notification_name(0), "");
    assert_eq!(notification_name(0xFFFF), "");
}
