//! 端口文本解析：数字端口直接解析，服务名查询系统服务数据库。
//!
//! # 设计要点（How）
//! - 数字优先，避免无谓的文件读取；
//! - 服务名按 `sctp` → `tcp` → `udp` 的协议顺序在 `/etc/services` 中查找（名称与别名均可命中）；
//! - 数据库不可读或未命中时回落到内置的信令常用端口表。

use std::fs;

use tracing::debug;

const SERVICES_PATH: &str = "/etc/services";

const PROTOCOL_ORDER: [&str; 3] = ["sctp", "tcp", "udp"];

/// 系统数据库缺失时使用的内置表。
const BUILTIN: &[(&str, u16)] = &[
    ("http", 80),
    ("https", 443),
    ("m3ua", 2905),
    ("diameter", 3868),
    ("diameters", 5868),
    ("sua", 14001),
    ("iuh", 29169),
    ("s1ap", 36412),
    ("x2ap", 36422),
    ("ngap", 38412),
];

/// 将端口文本解析为端口号；空串表示端口 0。
pub(crate) fn lookup_port(service: &str) -> Option<u16> {
    if service.is_empty() {
        return Some(0);
    }
    if service.bytes().all(|b| b.is_ascii_digit()) {
        return service.parse().ok();
    }
    match fs::read_to_string(SERVICES_PATH) {
        Ok(db) => {
            if let Some(port) = find_in_services(&db, service) {
                return Some(port);
            }
        }
        Err(err) => debug!(path = SERVICES_PATH, error = %err, "服务数据库不可读，使用内置端口表"),
    }
    builtin_port(service)
}

fn builtin_port(service: &str) -> Option<u16> {
    BUILTIN
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(service))
        .map(|(_, port)| *port)
}

/// 在 services(5) 格式文本中按协议优先级查找服务名。
pub(crate) fn find_in_services(db: &str, service: &str) -> Option<u16> {
    PROTOCOL_ORDER
        .iter()
        .find_map(|protocol| find_for_protocol(db, service, protocol))
}

fn find_for_protocol(db: &str, service: &str, protocol: &str) -> Option<u16> {
    for line in db.lines() {
        let line = line.split('#').next().unwrap_or_default();
        let mut fields = line.split_whitespace();
        let (Some(name), Some(port_proto)) = (fields.next(), fields.next()) else {
            continue;
        };
        let Some((port, proto)) = port_proto.split_once('/') else {
            continue;
        };
        if proto != protocol {
            continue;
        }
        let hit = name.eq_ignore_ascii_case(service)
            || fields.any(|alias| alias.eq_ignore_ascii_case(service));
        if hit {
            if let Ok(port) = port.parse() {
                return Some(port);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const DB: &str = "\
# comment line
http            80/tcp          www             # WorldWideWeb HTTP
diameter        3868/tcp
diameter        3869/sctp       dia
bogus           notaport/tcp
";

    #[test]
    fn sctp_entry_wins_over_tcp() {
        assert_eq!(find_in_services(DB, "diameter"), Some(3869));
        assert_eq!(find_in_services(DB, "dia"), Some(3869));
    }

    #[test]
    fn aliases_and_case_are_accepted() {
        assert_eq!(find_in_services(DB, "WWW"), Some(80));
        assert_eq!(find_in_services(DB, "bogus"), None);
        assert_eq!(find_in_services(DB, "gopher"), None);
    }

    #[test]
    fn numeric_and_empty_ports_skip_lookup() {
        assert_eq!(lookup_port("12345"), Some(12345));
        assert_eq!(lookup_port(""), Some(0));
        assert_eq!(lookup_port("70000"), None);
    }

    #[test]
    fn builtin_table_covers_signalling_ports() {
        assert_eq!(builtin_port("s1ap"), Some(36412));
        assert_eq!(builtin_port("nope"), None);
    }
}
