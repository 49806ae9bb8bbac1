//! 传输进度回调

/// 传输事件回调
///
/// 请求处理器在各自的任务中调用这些方法，实现必须是线程安全的。
pub trait ProgressCallback: Send + Sync {
    /// 开始传输一个文件，`total` 为已知的总字节数
    fn on_start(&self, name: &str, total: Option<u64>);

    /// 又传输了 `bytes` 字节
    fn on_progress(&self, bytes: u64);

    /// 本次请求的所有文件传输完成
    fn on_complete(&self, names: &[String]);

    /// 传输失败
    fn on_error(&self, error: &str);
}

/// 不做任何事的回调（安静模式和测试使用）
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_start(&self, _name: &str, _total: Option<u64>) {}

    fn on_progress(&self, _bytes: u64) {}

    fn on_complete(&self, _names: &[String]) {}

    fn on_error(&self, _error: &str) {}
}
