//! # Poller：epoll 就绪事件分发器
//!
//! ## 核心意图（Why）
//! - 用一个 epoll 实例复用大量 SCTP 描述符，就绪时在分发线程上同步调用注册的回调；
//! - 进程级单例由 [`Poller::global`] 惰性构造，生命周期由显式的 `init`/`finalize` 管理。
//!
//! ## 行为契约（What）
//! - `init`：创建 epoll 实例，已初始化时返回 [`SctpError::PollerAlreadyInitialized`]；
//! - `add`：以可读兴趣注册描述符，重复注册返回 [`SctpError::AlreadyRegistered`] 且保留原回调；
//! - `del`：注销描述符，未注册时返回 [`SctpError::NotRegistered`]；
//! - `run_loop`：按配置的超时等待，`EINTR` 重试，其他错误退出循环并返回；
//! - `finalize`：摘下 epoll 实例并清空注册表，未初始化时为空操作。
//!
//! ## 风险提示（Trade-offs）
//! - 回调串行执行，慢回调会推迟其他描述符的分发；
//! - 水平触发：回调未读空数据时，下一轮等待会再次就绪；
//! - epoll 实例以 `Arc` 共享，`finalize` 之后仍在等待的 `run_loop` 持有旧实例直到本轮超时。

use std::{
    fmt,
    os::fd::{AsRawFd, RawFd},
    sync::{
        Arc, OnceLock,
        atomic::{AtomicBool, Ordering},
    },
};

use arc_swap::ArcSwapOption;
use dashmap::{DashMap, mapref::entry::Entry};
use nix::{
    errno::Errno,
    sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags},
};
use tracing::{debug, trace, warn};

use crate::{
    config::PollerSettings,
    error::{self, OsResultExt, SctpError},
    sys,
};

/// 就绪回调。
pub type Callback = Arc<dyn Fn() + Send + Sync>;

/// 停止句柄，可移交给其他线程请求 `run_loop` 在两次等待之间退出。
#[derive(Clone, Debug)]
pub struct PollerHandle {
    stop: Arc<AtomicBool>,
}

impl PollerHandle {
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }
}

/// epoll 分发器。
///
/// # 教案式注释
/// - **意图 (Why)**：隔离 epoll 实例与回调注册表，`run_loop` 运行期间仍可并发增删注册；
/// - **契约 (What)**：`epoll` 为 `None` 表示未初始化；每次 `init` 换上新的实例，
///   `add` 以指针相等判断注册期间实例是否被替换；
/// - **执行逻辑 (How)**：分发前把回调 `Arc` 克隆出 `DashMap` guard，回调内部可安全调用 `add`/`del`。
pub struct Poller {
    epoll: ArcSwapOption<Epoll>,
    callbacks: DashMap<RawFd, Callback>,
    settings: PollerSettings,
    stop: Arc<AtomicBool>,
}

impl Poller {
    /// 进程级单例，使用默认的等待参数。
    pub fn global() -> &'static Poller {
        static GLOBAL: OnceLock<Poller> = OnceLock::new();
        GLOBAL.get_or_init(|| Poller::new(PollerSettings::default()))
    }

    /// 构造独立实例，尚未初始化。
    pub fn new(settings: PollerSettings) -> Self {
        Self {
            epoll: ArcSwapOption::empty(),
            callbacks: DashMap::new(),
            settings,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn settings(&self) -> PollerSettings {
        self.settings
    }

    pub fn is_initialized(&self) -> bool {
        self.epoll.load().is_some()
    }

    /// 创建 epoll 实例。
    pub fn init(&self) -> Result<(), SctpError> {
        if self.is_initialized() {
            return Err(SctpError::PollerAlreadyInitialized);
        }
        let epoll = Arc::new(Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC).op(error::POLL)?);
        let epfd = epoll.0.as_raw_fd();
        let vacant: Option<Arc<Epoll>> = None;
        let previous = self.epoll.compare_and_swap(&vacant, Some(epoll));
        if previous.is_some() {
            // 落败方的实例随 `Arc` 释放关闭。
            return Err(SctpError::PollerAlreadyInitialized);
        }
        debug!(epfd, "sctp poller initialized");
        Ok(())
    }

    /// 摘下 epoll 实例并清空注册表，返回调用前是否已初始化。
    ///
    /// 实例在最后一个持有者（通常是正在等待的 `run_loop`）释放后关闭。
    pub fn finalize(&self) -> bool {
        let Some(epoll) = self.epoll.swap(None) else {
            return false;
        };
        let registered = self.callbacks.len();
        self.callbacks.clear();
        debug!(epfd = epoll.0.as_raw_fd(), registered, "sctp poller finalized");
        true
    }

    /// 注册描述符的可读兴趣。
    ///
    /// - **前置条件**：已 `init`，`fd` 非负；
    /// - **后置条件**：失败时不在注册表中留下条目；
    /// - **并发**：注册期间实例被 `finalize` 摘下或被新的 `init` 替换时，撤回本次插入并返回
    ///   [`SctpError::PollerNotInitialized`]，旧实例上的兴趣随其关闭而失效。
    pub fn add<F>(&self, fd: RawFd, callback: F) -> Result<(), SctpError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        if fd < 0 {
            return Err(SctpError::os(error::POLL, Errno::EBADF.into()));
        }
        let callback: Callback = Arc::new(callback);
        let epoll = match self.callbacks.entry(fd) {
            Entry::Occupied(_) => return Err(SctpError::AlreadyRegistered { fd }),
            Entry::Vacant(vacant) => {
                let epoll = self.epoll.load_full().ok_or(SctpError::PollerNotInitialized)?;
                epoll
                    .add(sys::borrow_fd(fd), EpollEvent::new(EpollFlags::EPOLLIN, fd as u64))
                    .op(error::POLL)?;
                vacant.insert(Arc::clone(&callback));
                epoll
            }
        };
        let live = self.epoll.load_full();
        if !live.is_some_and(|live| Arc::ptr_eq(&live, &epoll)) {
            self.callbacks
                .remove_if(&fd, |_, registered| Arc::ptr_eq(registered, &callback));
            debug!(fd, "poller finalized during registration, entry withdrawn");
            return Err(SctpError::PollerNotInitialized);
        }
        trace!(epfd = epoll.0.as_raw_fd(), fd, "descriptor registered");
        Ok(())
    }

    /// 注销描述符。注册项总会被移除，epoll 兴趣集的删除失败以错误返回。
    pub fn del(&self, fd: RawFd) -> Result<(), SctpError> {
        if self.callbacks.remove(&fd).is_none() {
            return Err(SctpError::NotRegistered { fd });
        }
        let Some(epoll) = self.epoll.load_full() else {
            return Ok(());
        };
        trace!(epfd = epoll.0.as_raw_fd(), fd, "descriptor deregistered");
        epoll.delete(sys::borrow_fd(fd)).op(error::POLL)
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    pub fn handle(&self) -> PollerHandle {
        PollerHandle {
            stop: Arc::clone(&self.stop),
        }
    }

    /// 请求 `run_loop` 在下一次等待返回后退出。
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// 分发循环。
    ///
    /// # 逻辑解析（How）
    /// 1. 每轮先检查停止标志，命中时清除标志并返回 `Ok(())`；
    /// 2. 未初始化时返回 [`SctpError::PollerNotInitialized`]；运行中被 `finalize` 时正常返回；
    /// 3. `epoll_wait` 最多等待 `wait_timeout_ms`，取回至多 `max_events` 个事件；
    /// 4. `EINTR` 直接进入下一轮，其余错误记录 `warn!` 后返回；
    /// 5. 对每个就绪描述符同步调用其回调，已注销的描述符跳过。
    pub fn run_loop(&self) -> Result<(), SctpError> {
        if !self.is_initialized() {
            return Err(SctpError::PollerNotInitialized);
        }
        let mut events = vec![EpollEvent::empty(); self.settings.max_events];
        let timeout = self.settings.wait_timeout();
        loop {
            if self.stop.swap(false, Ordering::AcqRel) {
                debug!("sctp poller loop stopped");
                return Ok(());
            }
            let Some(epoll) = self.epoll.load_full() else {
                debug!("sctp poller finalized, leaving dispatch loop");
                return Ok(());
            };
            let epfd = epoll.0.as_raw_fd();
            let ready = match epoll.wait(&mut events, timeout) {
                Ok(ready) => ready,
                Err(Errno::EINTR) => continue,
                Err(errno) => {
                    warn!(epfd, error = %errno, "sctp poller wait failed, leaving dispatch loop");
                    return Err(SctpError::os(error::POLL, errno.into()));
                }
            };
            drop(epoll);
            for event in &events[..ready] {
                let fd = event.data() as RawFd;
                let callback = self.callbacks.get(&fd).map(|entry| Arc::clone(entry.value()));
                match callback {
                    Some(callback) => callback(),
                    None => trace!(fd, "ready descriptor has no callback"),
                }
            }
        }
    }
}

impl fmt::Debug for Poller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let epfd = self.epoll.load_full().map_or(-1, |epoll| epoll.0.as_raw_fd());
        f.debug_struct("Poller")
            .field("epfd", &epfd)
            .field("registered", &self.callbacks.len())
            .field("settings", &self.settings)
            .finish()
    }
}
