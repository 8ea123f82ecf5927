//! 日志初始化。
//!
//! # 教案式说明
//! - **意图（Why）**：传输层的生命周期事件（建联回退、剥离、关闭、分发循环退出）以 `tracing` 记录，
//!   可执行程序只需调用一次 [`init_tracing`] 即可输出；
//! - **契约（What）**：过滤规则取自 `RUST_LOG`，缺省为 `info`；外部已设置全局 Subscriber 时返回
//!   [`LoggingError::SubscriberAlreadySet`]，不覆盖宿主的配置。

use thiserror::Error;
use tracing::dispatcher::{self, SetGlobalDefaultError};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt};

/// 日志初始化错误。
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("a global tracing subscriber is already installed")]
    SubscriberAlreadySet,
    #[error("failed to install global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] SetGlobalDefaultError),
}

/// 安装 `fmt + EnvFilter` 全局 Subscriber。
pub fn init_tracing() -> Result<(), LoggingError> {
    if dispatcher::has_been_set() {
        return Err(LoggingError::SubscriberAlreadySet);
    }
    let subscriber = tracing_subscriber::registry()
        .with(build_env_filter())
        .with(tracing_subscriber::fmt::layer());
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn build_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}
