//! 终端进度条

use indicatif::{ProgressBar, ProgressStyle};
use qrshare_core::ProgressCallback;
use std::sync::Mutex;
use std::time::Duration;

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{msg:20!} [{bar:30.cyan/blue}] {bytes}/{total_bytes} {bytes_per_sec} {eta}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("=> ")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {msg} {bytes} {bytes_per_sec}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// 用 indicatif 显示传输进度
#[derive(Default)]
pub struct TerminalProgress {
    bar: Mutex<Option<ProgressBar>>,
}

impl TerminalProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(guard) = self.bar.lock()
            && let Some(bar) = guard.as_ref()
        {
            f(bar);
        }
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_start(&self, name: &str, total: Option<u64>) {
        let bar = match total {
            Some(total) => ProgressBar::new(total).with_style(bar_style()),
            None => {
                let bar = ProgressBar::new_spinner().with_style(spinner_style());
                bar.enable_steady_tick(Duration::from_millis(100));
                bar
            }
        };
        bar.set_message(name.to_string());

        if let Ok(mut guard) = self.bar.lock()
            && let Some(previous) = guard.replace(bar)
            && !previous.is_finished()
        {
            previous.finish_and_clear();
        }
    }

    fn on_progress(&self, bytes: u64) {
        self.with_bar(|bar| bar.inc(bytes));
    }

    fn on_complete(&self, names: &[String]) {
        self.with_bar(|bar| bar.finish_with_message(format!("✅ {}", names.join(", "))));
    }

    fn on_error(&self, error: &str) {
        self.with_bar(|bar| bar.abandon_with_message(format!("❌ {}", error)));
    }
}
