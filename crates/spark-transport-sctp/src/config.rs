//! SCTP 传输配置。
//!
//! # 模块定位（Why）
//! - 建联参数、事件订阅、事件循环的等待窗口、`read` 跳过通知的上限都属于部署期调优项，
//!   集中到一份 TOML 中，避免散落在调用点的魔法数字。
//!
//! # 契约（What）
//! - 所有段落均可省略，缺省值与内核默认行为一致（全零 `InitMsg`、不订阅事件）；
//! - 未知字段直接拒绝，防止拼写错误被静默忽略。
//!
//! ```toml
//! [init]
//! num_ostreams = 10
//! max_instreams = 10
//!
//! [events]
//! association = true
//! shutdown = true
//!
//! [poller]
//! wait_timeout_ms = 100
//! max_events = 64
//!
//! [read]
//! max_skipped_notifications = 1024
//! ```

use nix::sys::epoll::EpollTimeout;
use serde::Deserialize;
use spark_codec_sctp::{EventSubscribe, InitMsg};

use crate::error::SctpError;

const DEFAULT_WAIT_TIMEOUT_MS: u32 = 100;
const DEFAULT_MAX_EVENTS: usize = 64;
const DEFAULT_MAX_SKIPPED_NOTIFICATIONS: usize = 1024;

/// 顶层配置。
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SctpConfig {
    pub init: InitSettings,
    pub events: EventSettings,
    pub poller: PollerSettings,
    pub read: ReadPolicy,
}

impl SctpConfig {
    /// 从 TOML 文本解析。
    pub fn from_toml_str(text: &str) -> Result<Self, SctpError> {
        Ok(toml::from_str(text)?)
    }

    pub fn init_msg(&self) -> InitMsg {
        InitMsg::from(&self.init)
    }

    pub fn event_subscribe(&self) -> EventSubscribe {
        EventSubscribe::from(&self.events)
    }
}

/// `[init]` 段，映射到 `sctp_initmsg`。
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct InitSettings {
    pub num_ostreams: u16,
    pub max_instreams: u16,
    pub max_attempts: u16,
    pub max_init_timeout: u16,
}

impl From<&InitSettings> for InitMsg {
    fn from(settings: &InitSettings) -> Self {
        InitMsg {
            num_ostreams: settings.num_ostreams,
            max_instreams: settings.max_instreams,
            max_attempts: settings.max_attempts,
            max_init_timeout: settings.max_init_timeout,
        }
    }
}

/// `[events]` 段，映射到 `sctp_event_subscribe`。
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EventSettings {
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

impl From<&EventSettings> for EventSubscribe {
    fn from(settings: &EventSettings) -> Self {
        EventSubscribe {
            data_io: settings.data_io,
            association: settings.association,
            address: settings.address,
            send_failure: settings.send_failure,
            peer_error: settings.peer_error,
            shutdown: settings.shutdown,
            partial_delivery: settings.partial_delivery,
            adaptation_layer: settings.adaptation_layer,
            authentication: settings.authentication,
            sender_dry: settings.sender_dry,
            stream_reset: settings.stream_reset,
            assoc_reset: settings.assoc_reset,
            stream_change: settings.stream_change,
        }
    }
}

/// `[poller]` 段。
///
/// - `wait_timeout_ms`：单次 `epoll_wait` 的最长阻塞时间，决定停止请求的响应延迟；
/// - `max_events`：单次等待最多取回的事件数，为 0 时内核返回 `EINVAL`。
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PollerSettings {
    pub wait_timeout_ms: u32,
    pub max_events: usize,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            wait_timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            max_events: DEFAULT_MAX_EVENTS,
        }
    }
}

impl PollerSettings {
    /// 传给 `epoll_wait` 的超时，超出 `c_int` 时截断为 [`EpollTimeout::MAX`]。
    pub(crate) fn wait_timeout(&self) -> EpollTimeout {
        EpollTimeout::try_from(self.wait_timeout_ms).unwrap_or(EpollTimeout::MAX)
    }
}

/// `[read]` 段：`Connection::read` 连续跳过通知的上限。
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ReadPolicy {
    pub max_skipped_notifications: usize,
}

impl Default for ReadPolicy {
    fn default() -> Self {
        Self {
            max_skipped_notifications: DEFAULT_MAX_SKIPPED_NOTIFICATIONS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = SctpConfig::from_toml_str("").expect("空配置合法");
        assert_eq!(config, SctpConfig::default());
        assert_eq!(config.poller.max_events, 64);
        assert_eq!(config.poller.wait_timeout(), EpollTimeout::from(100u16));
        assert_eq!(config.read.max_skipped_notifications, 1024);
        assert_eq!(config.init_msg(), InitMsg::default());
    }

    #[test]
    fn sections_map_to_kernel_structs() {
        let config = SctpConfig::from_toml_str(
            r#"
            [init]
            num_ostreams = 16
            max_instreams = 8
            max_attempts = 4
            max_init_timeout = 3000

            [events]
            association = true
            shutdown = true

            [poller]
            wait_timeout_ms = 250
            "#,
        )
        .expect("合法配置");

        assert_eq!(
            config.init_msg(),
            InitMsg {
                num_ostreams: 16,
                max_instreams: 8,
                max_attempts: 4,
                max_init_timeout: 3000,
            }
        );
        let events = config.event_subscribe();
        assert!(events.association && events.shutdown);
        assert!(!events.data_io);
        assert_eq!(config.poller.wait_timeout(), EpollTimeout::from(250u16));
        assert_eq!(config.poller.max_events, 64);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = SctpConfig::from_toml_str("[poller]\nmax_event = 3\n").expect_err("拼写错误");
        assert_eq!(err.code(), "spark.transport.sctp.config");
    }

    #[test]
    fn oversized_timeout_saturates() {
        let settings = PollerSettings {
            wait_timeout_ms: u32::MAX,
            max_events: 1,
        };
        assert_eq!(settings.wait_timeout(), EpollTimeout::MAX);
    }
}
