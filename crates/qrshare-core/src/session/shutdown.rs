//! 停止信号
//!
//! 所有停止来源（系统信号、键盘、计数器归零、处理器错误）都汇聚到同一个
//! [`StopSignal`]。只有第一次请求生效并记录原因，之后的请求被忽略。

use log::{debug, info, warn};
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;

/// 会话停止原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// 系统中断信号（Ctrl-C、SIGTERM 等）
    Interrupt,
    /// 用户按下退出键
    UserAbort,
    /// 传输完成
    TransferComplete,
    /// 处理请求时出现无法恢复的错误
    Error,
}

/// 幂等的停止信号，可跨任务克隆
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    token: CancellationToken,
    reason: Arc<OnceLock<StopReason>>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// 请求停止，仅第一次调用返回 true
    pub fn request(&self, reason: StopReason) -> bool {
        if self.reason.set(reason).is_err() {
            debug!("Stop already requested, ignoring {:?}", reason);
            return false;
        }
        info!("Stopping session: {:?}", reason);
        self.token.cancel();
        true
    }

    /// 第一次停止请求的原因
    pub fn reason(&self) -> Option<StopReason> {
        self.reason.get().copied()
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 等待停止信号
    pub async fn stopped(&self) {
        self.token.cancelled().await;
    }
}

/// 将系统信号转发为停止请求
///
/// 监听 Ctrl-C，在 Unix 上额外监听 SIGTERM、SIGQUIT 和 SIGHUP。
/// 会话停止后任务自行退出。
pub fn listen_for_os_signals(stop: StopSignal) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = wait_for_os_signal() => {
                stop.request(StopReason::Interrupt);
            }
            _ = stop.stopped() => {}
        }
    })
}

#[cfg(unix)]
async fn wait_for_os_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let kinds = [
        SignalKind::terminate(),
        SignalKind::quit(),
        SignalKind::hangup(),
    ];
    let mut streams = Vec::new();
    for kind in kinds {
        match signal(kind) {
            Ok(stream) => streams.push(stream),
            Err(e) => warn!("Failed to install signal handler: {}", e),
        }
    }

    let others = async {
        if streams.is_empty() {
            return std::future::pending::<()>().await;
        }
        let waits = streams.iter_mut().map(|s| Box::pin(s.recv()));
        futures_util::future::select_all(waits).await;
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        }
        _ = others => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_os_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_reason_wins() {
        let stop = StopSignal::new();
        assert!(!stop.is_stopped());
        assert_eq!(stop.reason(), None);

        assert!(stop.request(StopReason::TransferComplete));
        assert!(!stop.request(StopReason::Interrupt));
        assert!(!stop.clone().request(StopReason::Error));

        assert!(stop.is_stopped());
        assert_eq!(stop.reason(), Some(StopReason::TransferComplete));
    }

    #[tokio::test]
    async fn test_stopped_resolves_for_clones() {
        let stop = StopSignal::new();
        let waiter = stop.clone();
        let task = tokio::spawn(async move { waiter.stopped().await });

        stop.request(StopReason::UserAbort);
        tokio::time::timeout(std::time::Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_signal_listener_exits_after_stop() {
        let stop = StopSignal::new();
        let listener = listen_for_os_signals(stop.clone());

        stop.request(StopReason::TransferComplete);
        tokio::time::timeout(std::time::Duration::from_secs(1), listener)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stop.reason(), Some(StopReason::TransferComplete));
    }
}
