//! 一次性传输会话
//!
//! 会话绑定监听套接字、生成访问 URL、注册当前模式的路由并在后台提供服务，
//! 直到停止信号触发后优雅关闭。
//!
//! # 模块
//!
//! - `gate`: 单次授权的 Cookie 闸门
//! - `counter`: 进行中的请求计数
//! - `shutdown`: 幂等的停止信号
//! - `listener`: 带 keep-alive 的 TCP 监听
//! - `send` / `receive`: 请求处理器
//! - `pages`: 上传页面和二维码页面
//!
//! # 示例
//!
//! ```ignore
//! let session = TransferSession::send(options, payload).await?;
//! println!("{}", session.send_url());
//! let reason = session.wait().await;
//! ```

mod counter;
mod gate;
mod listener;
mod pages;
mod receive;
mod send;
mod shutdown;

pub use gate::{cookie_value, is_browser, mint_identity};
pub use pages::html_escape;
pub use receive::{sanitize_file_name, unique_file_name};
pub use shutdown::{StopReason, StopSignal, listen_for_os_signals};

use crate::archive::Payload;
use crate::config::AppSettings;
use crate::error::SetupError;
use crate::net;
use crate::progress::{NoProgress, ProgressCallback};
use axum::{Router, extract::DefaultBodyLimit, routing::get};
use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use counter::InFlight;
use log::{debug, error, info, warn};
use receive::ReceiveState;
use send::SendState;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;

/// 停止后等待进行中请求完成的最长时间
pub const GRACE_PERIOD: Duration = Duration::from_secs(5);

/// HTTPS 证书和私钥（PEM）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsFiles {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// 会话参数
#[derive(Clone)]
pub struct SessionOptions {
    pub bind: IpAddr,
    /// 0 表示随机端口
    pub port: u16,
    /// URL 路径段，`None` 时随机生成
    pub path: Option<String>,
    pub keep_alive: bool,
    pub tls: Option<TlsFiles>,
    pub fqdn: Option<String>,
    /// 额外提供 `/qr/{path}` 二维码页面，供本机浏览器显示
    pub qr_page: bool,
    pub progress: Arc<dyn ProgressCallback>,
}

impl SessionOptions {
    pub fn new(bind: IpAddr) -> Self {
        Self {
            bind,
            port: 0,
            path: None,
            keep_alive: false,
            tls: None,
            fqdn: None,
            qr_page: false,
            progress: Arc::new(NoProgress),
        }
    }

    /// 从应用设置构建，`bind` 为已解析的绑定地址
    pub fn from_settings(settings: &AppSettings, bind: IpAddr) -> Self {
        let tls = match (settings.secure, &settings.tls_cert, &settings.tls_key) {
            (true, Some(cert), Some(key)) => Some(TlsFiles {
                cert: cert.clone(),
                key: key.clone(),
            }),
            _ => None,
        };
        Self {
            bind,
            port: settings.port,
            path: settings.path.clone(),
            keep_alive: settings.keep_alive,
            tls,
            fqdn: settings.fqdn.clone(),
            qr_page: false,
            progress: Arc::new(NoProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_qr_page(mut self, enabled: bool) -> Self {
        self.qr_page = enabled;
        self
    }
}

/// 正在运行的传输会话
pub struct TransferSession {
    base_url: String,
    mode: &'static str,
    path: String,
    local_addr: SocketAddr,
    stop: StopSignal,
    handle: Handle,
    server: JoinHandle<()>,
    payload: Option<Payload>,
}

impl TransferSession {
    /// 启动发送会话
    pub async fn send(options: SessionOptions, payload: Payload) -> Result<Self, SetupError> {
        let stop = StopSignal::new();
        let path = options.path.clone().unwrap_or_else(random_path);

        let state = Arc::new(SendState {
            payload: payload.clone(),
            gate: gate::CookieGate::new(),
            in_flight: InFlight::new(options.keep_alive, stop.clone()),
            stop: stop.clone(),
            progress: options.progress.clone(),
        });
        let router = Router::new()
            .route(&format!("/send/{}", path), get(send::send_file))
            .with_state(state);

        let mut session = Self::start(&options, "send", path, stop, router).await?;
        info!("Serving {} from {}", payload.filename, payload.path.display());
        session.payload = Some(payload);
        Ok(session)
    }

    /// 启动接收会话，上传的文件保存到 `output_dir`
    pub async fn receive(options: SessionOptions, output_dir: PathBuf) -> Result<Self, SetupError> {
        let stop = StopSignal::new();
        let path = options.path.clone().unwrap_or_else(random_path);

        let state = Arc::new(ReceiveState {
            output_dir: output_dir.clone(),
            keep_alive: options.keep_alive,
            stop: stop.clone(),
            progress: options.progress.clone(),
        });
        let router = Router::new()
            .route(
                &format!("/receive/{}", path),
                get(receive::upload_form).post(receive::receive_files),
            )
            .layer(DefaultBodyLimit::disable())
            .with_state(state);

        let session = Self::start(&options, "receive", path, stop, router).await?;
        info!("Receiving files into {}", output_dir.display());
        Ok(session)
    }

    async fn start(
        options: &SessionOptions,
        mode: &'static str,
        path: String,
        stop: StopSignal,
        mut router: Router,
    ) -> Result<Self, SetupError> {
        let listener = listener::bind(SocketAddr::new(options.bind, options.port))?;
        let local_addr = listener.local_addr()?;

        let host = match &options.fqdn {
            Some(fqdn) => fqdn.clone(),
            None if net::is_wildcard(&options.bind) => net::format_host(&net::public_ip().await?),
            None => net::format_host(&options.bind),
        };

        let scheme = if options.tls.is_some() { "https" } else { "http" };
        let base_url = format!("{}://{}:{}", scheme, host, local_addr.port());

        if options.qr_page {
            let url = format!("{}/{}/{}", base_url, mode, path);
            router = router.route(
                &format!("/qr/{}", path),
                get(move || {
                    let url = url.clone();
                    async move { pages::qr_page(&url) }
                }),
            );
        }

        let handle = Handle::new();
        let server_handle = handle.clone();
        let server_stop = stop.clone();
        let app = router.into_make_service();

        let server = match &options.tls {
            Some(tls) => {
                let config = RustlsConfig::from_pem_file(&tls.cert, &tls.key)
                    .await
                    .map_err(|e| SetupError::Tls {
                        path: tls.cert.clone(),
                        reason: e.to_string(),
                    })?;
                tokio::spawn(async move {
                    if let Err(e) = axum_server::from_tcp_rustls(listener, config)
                        .handle(server_handle)
                        .serve(app)
                        .await
                    {
                        error!("Server error: {}", e);
                        server_stop.request(StopReason::Error);
                    }
                })
            }
            None => {
                tokio::spawn(async move {
                    if let Err(e) = axum_server::from_tcp(listener)
                        .handle(server_handle)
                        .serve(app)
                        .await
                    {
                        error!("Server error: {}", e);
                        server_stop.request(StopReason::Error);
                    }
                })
            }
        };

        info!("Session listening on {} ({})", local_addr, base_url);

        Ok(Self {
            base_url,
            mode,
            path,
            local_addr,
            stop,
            handle,
            server,
            payload: None,
        })
    }

    /// `scheme://host:port`
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn send_url(&self) -> String {
        format!("{}/send/{}", self.base_url, self.path)
    }

    pub fn receive_url(&self) -> String {
        format!("{}/receive/{}", self.base_url, self.path)
    }

    /// 当前模式对应的 URL，即二维码内容
    pub fn url(&self) -> String {
        format!("{}/{}/{}", self.base_url, self.mode, self.path)
    }

    /// 二维码页面地址，仅在 `qr_page` 开启时可访问
    pub fn qr_page_url(&self) -> String {
        format!("{}/qr/{}", self.base_url, self.path)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 停止信号，可交给键盘和系统信号监听器
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// 等待会话结束
    ///
    /// 停止后优雅关闭服务器，然后按需删除载荷。返回第一次停止请求的原因。
    pub async fn wait(self) -> StopReason {
        self.stop.stopped().await;

        self.handle.graceful_shutdown(Some(GRACE_PERIOD));
        match tokio::time::timeout(GRACE_PERIOD + Duration::from_secs(1), self.server).await {
            Ok(Ok(())) => debug!("Server stopped"),
            Ok(Err(e)) => warn!("Server task failed: {}", e),
            Err(_) => warn!("Server did not stop within {:?}", GRACE_PERIOD),
        }

        if let Some(payload) = &self.payload
            && payload.delete_after_transfer
        {
            match payload.delete() {
                Ok(()) => debug!("Deleted {}", payload.path.display()),
                Err(e) => warn!("Failed to delete {}: {}", payload.path.display(), e),
            }
        }

        self.stop.reason().unwrap_or(StopReason::Interrupt)
    }
}

/// 由当前纳秒时间生成 4 位 base-36 路径段
pub fn random_path() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let encoded = to_base36(nanos);
    let start = encoded.len().saturating_sub(4);
    encoded[start..].to_string()
}

fn to_base36(mut n: u128) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(1_295), "zz");
    }

    #[test]
    fn test_random_path_shape() {
        let path = random_path();
        assert_eq!(path.len(), 4);
        assert!(path.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn test_options_from_settings() {
        let settings = AppSettings {
            port: 9000,
            path: Some("abc".to_string()),
            keep_alive: true,
            fqdn: Some("files.lan".to_string()),
            tls_cert: Some(PathBuf::from("cert.pem")),
            tls_key: Some(PathBuf::from("key.pem")),
            ..Default::default()
        };
        let bind = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 2));

        let options = SessionOptions::from_settings(&settings, bind);
        assert_eq!(options.bind, bind);
        assert_eq!(options.port, 9000);
        assert_eq!(options.path.as_deref(), Some("abc"));
        assert!(options.keep_alive);
        // 未开启 secure 时忽略证书
        assert!(options.tls.is_none());

        let secure = AppSettings {
            secure: true,
            ..settings
        };
        let options = SessionOptions::from_settings(&secure, bind);
        assert_eq!(
            options.tls,
            Some(TlsFiles {
                cert: PathBuf::from("cert.pem"),
                key: PathBuf::from("key.pem"),
            })
        );
    }
}
