//! 键盘退出监听
//!
//! 终端保持普通（非 raw）模式，日志和进度条照常输出。
//! 单独一行输入 `q` 并回车即退出，行内其他输入会使该行作废。

use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use qrshare_core::{StopReason, StopSignal};
use std::io::IsTerminal;
use std::thread::JoinHandle;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// 当前输入行，回车时判断是否为退出命令
#[derive(Default)]
struct QuitLine {
    line: String,
}

impl QuitLine {
    /// 输入一个按键，返回是否应退出
    fn feed(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Enter => {
                let quit = self.line.trim().eq_ignore_ascii_case("q");
                self.line.clear();
                quit
            }
            KeyCode::Backspace => {
                self.line.pop();
                false
            }
            KeyCode::Char(c) => {
                self.line.push(c);
                false
            }
            _ => false,
        }
    }
}

/// 在后台线程监听退出键，会话停止后线程自行结束
///
/// 标准输入不是终端时不启动。
pub fn spawn_quit_listener(stop: StopSignal) -> Option<JoinHandle<()>> {
    if !std::io::stdin().is_terminal() {
        return None;
    }

    Some(std::thread::spawn(move || {
        let mut line = QuitLine::default();
        while !stop.is_stopped() {
            match event::poll(POLL_INTERVAL) {
                Ok(true) => match event::read() {
                    Ok(Event::Key(key))
                        if key.kind == KeyEventKind::Press && line.feed(key.code) =>
                    {
                        stop.request(StopReason::UserAbort);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!("Keyboard listener stopped: {}", e);
                        break;
                    }
                },
                Ok(false) => {}
                Err(e) => {
                    tracing::debug!("Keyboard listener stopped: {}", e);
                    break;
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_line(line: &mut QuitLine, text: &str) -> bool {
        for c in text.chars() {
            assert!(!line.feed(KeyCode::Char(c)));
        }
        line.feed(KeyCode::Enter)
    }

    #[test]
    fn test_quit_line() {
        let mut line = QuitLine::default();
        assert!(feed_line(&mut line, "q"));
        assert!(feed_line(&mut line, "Q"));
        assert!(!feed_line(&mut line, ""));
    }

    #[test]
    fn test_q_inside_other_input_is_ignored() {
        let mut line = QuitLine::default();
        assert!(!feed_line(&mut line, "xq"));
        assert!(!feed_line(&mut line, "quit now"));
        // 上一行不影响下一行
        assert!(feed_line(&mut line, "q"));
    }

    #[test]
    fn test_backspace_edits_line() {
        let mut line = QuitLine::default();
        assert!(!line.feed(KeyCode::Char('x')));
        assert!(!line.feed(KeyCode::Backspace));
        assert!(!line.feed(KeyCode::Char('q')));
        assert!(line.feed(KeyCode::Enter));
    }
}
