//! qrshare CLI
//!
//! 扫码即传：启动一次性 HTTP 会话，手机扫描终端中的二维码即可下载或上传文件。

mod keyboard;
mod progress;
mod transfer;
mod wizard;

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use qrshare_core::SettingsOverrides;
use std::net::IpAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use transfer::TransferArgs;

#[derive(Parser)]
#[command(name = "qrshare", version, about = "扫码即传 - 局域网文件传输工具")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Option<Commands>,

    /// 要发送的文件或目录（等同于 `qrshare send`）
    paths: Vec<PathBuf>,
}

#[derive(Args, Debug, Clone, Default)]
struct GlobalArgs {
    /// 只输出错误日志，不显示进度条
    #[arg(short, long, global = true)]
    quiet: bool,
    /// 传输完成后保持服务器运行
    #[arg(short, long, global = true)]
    keep_alive: bool,
    /// 选择接口时列出所有接口（包括回环和虚拟接口）
    #[arg(short, long = "list-all-interfaces", global = true)]
    list_all_interfaces: bool,
    /// 监听端口（默认随机）
    #[arg(short, long, global = true)]
    port: Option<u16>,
    /// URL 路径段（默认随机）
    #[arg(long, global = true)]
    path: Option<String>,
    /// 网络接口名称，`any` 表示所有接口
    #[arg(short, long, global = true)]
    interface: Option<String>,
    /// 直接指定绑定地址
    #[arg(long, global = true)]
    bind: Option<IpAddr>,
    /// 生成 URL 时使用的完整域名
    #[arg(short = 'd', long, global = true)]
    fqdn: Option<String>,
    /// 发送前总是打包为 ZIP
    #[arg(short, long, global = true)]
    zip: bool,
    /// 配置文件路径
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// 使用 HTTPS
    #[arg(short, long, global = true)]
    secure: bool,
    /// HTTPS 证书（PEM）
    #[arg(long, global = true)]
    tls_cert: Option<PathBuf>,
    /// HTTPS 私钥（PEM）
    #[arg(long, global = true)]
    tls_key: Option<PathBuf>,
    /// 反色二维码，适合浅色背景终端
    #[arg(short, long, global = true)]
    reversed: bool,
    /// 同时将二维码保存为 SVG 图片
    #[arg(long, global = true)]
    svg: Option<PathBuf>,
    /// 在浏览器窗口中显示二维码
    #[arg(short, long, global = true)]
    browser: bool,
}

impl GlobalArgs {
    fn transfer_args(&self, output: Option<PathBuf>) -> TransferArgs {
        TransferArgs {
            config: self.config.clone(),
            overrides: SettingsOverrides {
                interface: self.interface.clone(),
                bind: self.bind,
                port: self.port,
                path: self.path.clone(),
                keep_alive: self.keep_alive,
                secure: self.secure,
                tls_cert: self.tls_cert.clone(),
                tls_key: self.tls_key.clone(),
                fqdn: self.fqdn.clone(),
                output,
                reversed: self.reversed,
            },
            list_all_interfaces: self.list_all_interfaces,
            quiet: self.quiet,
            svg: self.svg.clone(),
            browser: self.browser,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// 发送文件或目录
    #[command(alias = "s")]
    Send {
        /// 要发送的文件或目录
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// 接收文件
    #[command(alias = "r")]
    Receive {
        /// 保存目录（默认: 配置中的目录或当前目录）
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// 交互式配置
    #[command(alias = "c")]
    Config,
    /// 生成 shell 补全脚本，例如 `source <(qrshare completion bash)`
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
    /// 显示版本
    Version,
}

fn print_completion(shell: Shell, out: &mut dyn std::io::Write) {
    clap_complete::generate(shell, &mut Cli::command(), "qrshare", out);
}

fn init_logging(quiet: bool) {
    // 桥接 log crate（qrshare-core 使用）到 tracing
    let _ = tracing_log::LogTracer::init();

    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,qrshare_core=info"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.global.quiet);

    match cli.command {
        Some(Commands::Send { paths }) => {
            transfer::run_send(&cli.global.transfer_args(None), &paths, cli.global.zip).await?;
        }
        Some(Commands::Receive { output }) => {
            transfer::run_receive(&cli.global.transfer_args(output)).await?;
        }
        Some(Commands::Config) => {
            transfer::run_config(&cli.global.transfer_args(None))?;
        }
        Some(Commands::Completion { shell }) => {
            print_completion(shell, &mut std::io::stdout());
        }
        Some(Commands::Version) => {
            println!("qrshare {}", env!("CARGO_PKG_VERSION"));
        }
        None if !cli.paths.is_empty() => {
            transfer::run_send(&cli.global.transfer_args(None), &cli.paths, cli.global.zip)
                .await?;
        }
        None => {
            Cli::command().print_help()?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_command_aliases() {
        let cli = Cli::try_parse_from(["qrshare", "s", "a.txt"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Send { paths }) if paths == [PathBuf::from("a.txt")]));

        let cli = Cli::try_parse_from(["qrshare", "-b", "r"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Receive { output: None })));
        assert!(cli.global.transfer_args(None).browser);

        let cli = Cli::try_parse_from(["qrshare", "c"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Config)));
    }

    #[test]
    fn test_completion() {
        let cli = Cli::try_parse_from(["qrshare", "completion", "bash"]).unwrap();
        let Some(Commands::Completion { shell }) = cli.command else {
            panic!("expected completion");
        };
        assert_eq!(shell, Shell::Bash);

        let mut script = Vec::new();
        print_completion(shell, &mut script);
        let script = String::from_utf8(script).unwrap();
        assert!(script.contains("qrshare"));
        assert!(script.contains("receive"));

        assert!(Cli::try_parse_from(["qrshare", "completion", "tcsh"]).is_err());
    }

    #[test]
    fn test_paths_shortcut() {
        let cli = Cli::try_parse_from(["qrshare", "-k", "a.txt", "photos"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.global.keep_alive);
        assert_eq!(cli.paths, vec![PathBuf::from("a.txt"), PathBuf::from("photos")]);
    }

    #[test]
    fn test_receive_with_flags() {
        let cli = Cli::try_parse_from([
            "qrshare", "receive", "-o", "/tmp/in", "-i", "wlan0", "-p", "8080", "--path", "abc",
        ])
        .unwrap();
        let Some(Commands::Receive { output }) = cli.command else {
            panic!("expected receive");
        };
        let args = cli.global.transfer_args(output);
        assert_eq!(args.overrides.output, Some(PathBuf::from("/tmp/in")));
        assert_eq!(args.overrides.interface.as_deref(), Some("wlan0"));
        assert_eq!(args.overrides.port, Some(8080));
        assert_eq!(args.overrides.path.as_deref(), Some("abc"));
    }

    #[test]
    fn test_invalid_bind_address() {
        assert!(Cli::try_parse_from(["qrshare", "--bind", "not-an-ip", "a.txt"]).is_err());
    }

    #[test]
    fn test_send_requires_paths() {
        assert!(Cli::try_parse_from(["qrshare", "send"]).is_err());
    }
}
