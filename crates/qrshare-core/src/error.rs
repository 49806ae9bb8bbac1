//! 启动阶段错误
//!
//! 这些错误都发生在服务器开始监听之前，对调用者而言是致命的。

use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("unable to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to find interface {0}")]
    NoSuchInterface(String),

    #[error("unable to find an IP for interface {0}")]
    NoUsableAddress(String),

    #[error("unable to determine public IP address: {0}")]
    PublicIp(String),

    #[error("TLS material missing or invalid ({}): {reason}", path.display())]
    Tls { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
