//! 应用配置和持久化
//!
//! 优先级：默认值 < 配置文件 < 命令行参数。
//! 会话启动后配置不再被修改。

use anyhow::{Context, ensure};
use log::{debug, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static DNS_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?)(\.[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*\.?$")
        .unwrap()
});

static URL_PATH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());

/// 应用设置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// 网络接口名称，`any` 表示所有接口
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    /// 直接指定绑定地址（优先于 interface）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<IpAddr>,
    /// 监听端口，0 表示随机端口
    pub port: u16,
    /// URL 路径段，不设置则随机生成
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// 传输完成后保持服务器运行
    pub keep_alive: bool,
    /// 使用 HTTPS
    pub secure: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_cert: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_key: Option<PathBuf>,
    /// 生成 URL 时使用的完整域名
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fqdn: Option<String>,
    /// 接收文件的保存目录，默认当前目录
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    /// 反色二维码（白底黑码）
    pub reversed: bool,
}

/// 命令行参数带来的覆盖项
///
/// 布尔开关只能打开，不能关闭配置文件中已开启的选项。
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub interface: Option<String>,
    pub bind: Option<IpAddr>,
    pub port: Option<u16>,
    pub path: Option<String>,
    pub keep_alive: bool,
    pub secure: bool,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
    pub fqdn: Option<String>,
    pub output: Option<PathBuf>,
    pub reversed: bool,
}

impl AppSettings {
    /// 默认配置文件路径
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::APP_NAME);
        config_dir.join("config.toml")
    }

    /// 加载设置（如果文件不存在或无法解析则使用默认值）
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(settings) => {
                        debug!("Loaded settings from {:?}", path);
                        return settings;
                    }
                    Err(e) => {
                        warn!("Failed to parse settings: {}, using defaults", e);
                    }
                },
                Err(e) => {
                    warn!("Failed to read settings file: {}, using defaults", e);
                }
            }
        }
        Self::default()
    }

    /// 保存设置
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
        debug!("Saved settings to {:?}", path);
        Ok(())
    }

    /// 应用命令行覆盖项
    pub fn apply(&mut self, overrides: &SettingsOverrides) {
        if let Some(interface) = &overrides.interface {
            self.interface = Some(interface.clone());
        }
        if let Some(bind) = overrides.bind {
            self.bind = Some(bind);
        }
        // 显式的 `-p 0` 也会覆盖，用于改回随机端口
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(path) = &overrides.path {
            self.path = Some(path.clone());
        }
        if let Some(cert) = &overrides.tls_cert {
            self.tls_cert = Some(cert.clone());
        }
        if let Some(key) = &overrides.tls_key {
            self.tls_key = Some(key.clone());
        }
        if let Some(fqdn) = &overrides.fqdn {
            self.fqdn = Some(fqdn.clone());
        }
        if let Some(output) = &overrides.output {
            self.output = Some(output.clone());
        }
        self.keep_alive |= overrides.keep_alive;
        self.secure |= overrides.secure;
        self.reversed |= overrides.reversed;
    }

    /// 校验设置
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(fqdn) = &self.fqdn {
            ensure!(
                is_dns_name(fqdn),
                "invalid value for fully-qualified domain name: {fqdn}"
            );
        }
        if let Some(path) = &self.path {
            ensure!(
                URL_PATH.is_match(path),
                "invalid URL path {path:?}: only letters, digits, '-' and '_' are allowed"
            );
        }
        if self.secure {
            let cert = self
                .tls_cert
                .as_deref()
                .context("secure mode requires --tls-cert")?;
            let key = self
                .tls_key
                .as_deref()
                .context("secure mode requires --tls-key")?;
            ensure!(cert.is_file(), "TLS certificate not found: {}", cert.display());
            ensure!(key.is_file(), "TLS private key not found: {}", key.display());
        }
        Ok(())
    }

    /// 接收文件的目标目录
    pub fn output_dir(&self) -> PathBuf {
        self.output.clone().unwrap_or_else(|| PathBuf::from("."))
    }
}

/// 判断是否为合法的 DNS 名称
pub fn is_dns_name(name: &str) -> bool {
    name.len() <= 253 && DNS_NAME.is_match(name)
}
