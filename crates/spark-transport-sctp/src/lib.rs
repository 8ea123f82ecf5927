#![doc = r#"
# spark-transport-sctp

## 设计动机（Why）
- **定位**：在 Linux 内核 SCTP 协议栈之上提供同步的连接、监听与事件分发，
  重传与拥塞控制完全交给内核；
- **架构角色**：字节布局由 [`spark_codec_sctp`] 负责，本 crate 只编排系统调用顺序
  并管理描述符的生命周期；
- **设计理念**：描述符以原子槽位持有，关闭只发生一次；所有系统调用错误保留原始 errno。

## 核心契约（What）
- [`Connection`]：一对一关联，`dial`/`accept`/`peel_off` 三种来源；
- [`Listener`]：一对一或一对多监听 socket；
- [`Poller`]：进程级 epoll 分发器，`init`/`finalize` 显式管理；
- [`SctpConfig`]：TOML 调优项；[`init_tracing`]：日志初始化。

## 实现策略（How）
- 首次创建 socket 前校验内核 ABI 布局，不一致时直接 panic；
- `SOL_SOCKET` 级选项复用 `socket2`，`SOL_SCTP` 级选项与控制消息通过 `nix::libc` 调用。

## 风险与考量（Trade-offs）
- 只支持 Linux；其他平台在编译期拒绝；
- 所有调用同步阻塞，没有读写截止时间，解除阻塞的唯一方式是关闭描述符。
"#]

#[cfg(not(target_os = "linux"))]
compile_error!("spark-transport-sctp 依赖 Linux 内核 SCTP 接口，仅支持 target_os = \"linux\"");

mod config;
mod conn;
mod error;
mod listener;
mod logging;
mod poller;
mod socket;
mod sys;

pub use config::{EventSettings, InitSettings, PollerSettings, ReadPolicy, SctpConfig};
pub use conn::{Connection, Incoming};
pub use error::{OperationKind, SctpError};
pub use listener::Listener;
pub use logging::{LoggingError, init_tracing};
pub use poller::{Callback, Poller, PollerHandle};
pub use socket::{BindOp, SocketKind, is_notification};
pub use spark_codec_sctp;
