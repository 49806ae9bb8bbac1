//! 进行中的请求计数
//!
//! 计数从 1 开始，这个初始名额由第一个获得 Cookie 的请求（或接收模式的
//! 上传请求）占用。计数归零且未开启保持运行时请求停止会话。

use super::shutdown::{StopReason, StopSignal};
use log::debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug)]
pub struct InFlight {
    count: AtomicUsize,
    keep_alive: bool,
    stop: StopSignal,
}

impl InFlight {
    pub fn new(keep_alive: bool, stop: StopSignal) -> Arc<Self> {
        Arc::new(Self {
            count: AtomicUsize::new(1),
            keep_alive,
            stop,
        })
    }

    /// 新增一个进行中的请求
    pub fn enter(self: &Arc<Self>) -> InFlightGuard {
        let now = self.count.fetch_add(1, Ordering::AcqRel) + 1;
        debug!("Request started, {} in flight", now);
        InFlightGuard {
            counter: Arc::clone(self),
        }
    }

    /// 占用已有名额，不增加计数
    pub fn adopt(self: &Arc<Self>) -> InFlightGuard {
        InFlightGuard {
            counter: Arc::clone(self),
        }
    }

    pub fn current(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    fn leave(&self) {
        let previous = self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .unwrap_or(0);
        if previous == 0 {
            return;
        }

        let now = previous - 1;
        debug!("Request finished, {} in flight", now);
        if now == 0 && !self.keep_alive {
            self.stop.request(StopReason::TransferComplete);
        }
    }
}

/// 请求结束（或响应体被丢弃）时归还名额
#[derive(Debug)]
pub struct InFlightGuard {
    counter: Arc<InFlight>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.counter.leave();
    }
}
