//! qrshare Core Library
//!
//! 扫码即传：在局域网内通过一次性 HTTP 会话与手机互传文件，手机端无需安装应用。
//!
//! # 模块
//!
//! - **config**: 配置文件加载、命令行覆盖与持久化
//! - **net**: 网络接口枚举与绑定地址解析
//! - **archive**: 多文件 / 目录打包为 ZIP 载荷
//! - **qr**: 将 URL 渲染为终端二维码或 SVG
//! - **session**: 一次性传输会话（监听、Cookie 闸门、计数、关闭）
//!
//! # 使用示例
//!
//! ## 发送文件
//!
//! ```ignore
//! use qrshare_core::{Payload, SessionOptions, TransferSession};
//!
//! let payload = Payload::from_paths(&paths, false)?;
//! let session = TransferSession::send(options, payload).await?;
//! println!("{}", session.send_url());
//! let reason = session.wait().await;
//! ```
//!
//! ## 接收文件
//!
//! ```ignore
//! let session = TransferSession::receive(options, output_dir).await?;
//! println!("{}", session.receive_url());
//! session.wait().await;
//! ```

pub mod archive;
pub mod config;
pub mod error;
pub mod net;
pub mod progress;
pub mod qr;
pub mod session;

pub use archive::Payload;
pub use config::{AppSettings, SettingsOverrides};
pub use error::SetupError;
pub use progress::{NoProgress, ProgressCallback};
pub use session::{SessionOptions, StopReason, StopSignal, TlsFiles, TransferSession};

/// 应用名称，同时用作 Cookie 名称和配置目录名
pub const APP_NAME: &str = "qrshare";
