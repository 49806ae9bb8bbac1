//! 发送 / 接收命令

use crate::keyboard;
use crate::progress::TerminalProgress;
use crate::wizard;
use anyhow::{Context, Result, bail};
use qrshare_core::net::{self, InterfaceInfo};
use qrshare_core::session::listen_for_os_signals;
use qrshare_core::{
    AppSettings, NoProgress, Payload, ProgressCallback, SessionOptions, SettingsOverrides,
    StopReason, TransferSession, qr,
};
use std::io::IsTerminal;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

/// 与传输相关的命令行选项
#[derive(Debug, Clone, Default)]
pub struct TransferArgs {
    pub config: Option<PathBuf>,
    pub overrides: SettingsOverrides,
    pub list_all_interfaces: bool,
    pub quiet: bool,
    pub svg: Option<PathBuf>,
    pub browser: bool,
}

impl TransferArgs {
    fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(AppSettings::config_path)
    }
}

/// 加载配置并应用命令行覆盖项
///
/// 配置中还没有网络接口时先选择一个并写回配置文件。
pub fn prepare_settings(args: &TransferArgs) -> Result<AppSettings> {
    let path = args.config_path();
    let mut stored = AppSettings::load_from(&path);

    let mut settings = stored.clone();
    settings.apply(&args.overrides);

    if settings.interface.is_none() && settings.bind.is_none() {
        let interfaces = net::list_interfaces(args.list_all_interfaces)?;
        let chosen = pick_interface(&interfaces)?;

        stored.interface = Some(chosen.clone());
        match stored.save_to(&path) {
            Ok(()) => tracing::info!("Saved interface {} to {}", chosen, path.display()),
            Err(e) => tracing::warn!("Failed to save settings: {:#}", e),
        }
        settings.interface = Some(chosen);
    }

    settings.validate()?;
    Ok(settings)
}

fn pick_interface(interfaces: &[InterfaceInfo]) -> Result<String> {
    match interfaces {
        [] => bail!("no usable network interface found, pass --interface or --bind"),
        [only] => {
            tracing::info!("Using the only available interface {}", only.name);
            Ok(only.name.clone())
        }
        _ if std::io::stdin().is_terminal() => {
            let stdin = std::io::stdin();
            let stdout = std::io::stdout();
            wizard::choose_interface(interfaces, None, &mut stdin.lock(), &mut stdout.lock())
        }
        _ => bail!("several network interfaces available, pass --interface to choose one"),
    }
}

/// 解析绑定地址：`bind` 优先，其次是接口名
pub fn resolve_bind(settings: &AppSettings) -> Result<IpAddr> {
    if let Some(bind) = settings.bind {
        return Ok(bind);
    }
    let interface = settings.interface.as_deref().unwrap_or(net::ANY_INTERFACE);
    Ok(net::resolve_bind_address(interface)?)
}

fn progress(quiet: bool) -> Arc<dyn ProgressCallback> {
    if quiet {
        Arc::new(NoProgress)
    } else {
        Arc::new(TerminalProgress::new())
    }
}

fn show_code(session: &TransferSession, reversed: bool, args: &TransferArgs) -> Result<()> {
    let url = session.url();
    println!("{}", qr::render_terminal(&url, reversed)?);
    println!("🔗 {}", url);
    if let Some(path) = &args.svg {
        std::fs::write(path, qr::render_svg(&url)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("🖼️  二维码已保存到 {}", path.display());
    }
    if args.browser {
        let page = session.qr_page_url();
        // 打不开浏览器不影响传输
        match open::that(&page) {
            Ok(()) => tracing::info!("Opened {} in the browser", page),
            Err(e) => tracing::warn!("Failed to open {} in the browser: {}", page, e),
        }
    }
    Ok(())
}

/// 显示二维码并等待会话结束
///
/// 显示失败时先停止会话并等待清理完成（包括删除临时压缩包），再返回错误。
async fn present_and_serve(
    session: TransferSession,
    reversed: bool,
    args: &TransferArgs,
) -> Result<()> {
    if let Err(e) = show_code(&session, reversed, args) {
        session.stop_signal().request(StopReason::Error);
        session.wait().await;
        return Err(e);
    }
    serve(session).await
}

async fn serve(session: TransferSession) -> Result<()> {
    let stop = session.stop_signal();
    listen_for_os_signals(stop.clone());
    let keyboard = keyboard::spawn_quit_listener(stop);

    let reason = session.wait().await;
    if let Some(handle) = keyboard {
        let _ = handle.join();
    }

    match reason {
        StopReason::TransferComplete => println!("✅ 传输完成"),
        StopReason::UserAbort | StopReason::Interrupt => println!("⏹️  已停止"),
        StopReason::Error => bail!("transfer stopped because of an error, see the log above"),
    }
    Ok(())
}

/// 发送文件或目录
pub async fn run_send(args: &TransferArgs, paths: &[PathBuf], zip: bool) -> Result<()> {
    let settings = prepare_settings(args)?;
    let bind = resolve_bind(&settings)?;

    let payload = Payload::from_paths(paths, zip)?;
    let options = SessionOptions::from_settings(&settings, bind)
        .with_progress(progress(args.quiet))
        .with_qr_page(args.browser);

    let session = match TransferSession::send(options, payload.clone()).await {
        Ok(session) => session,
        Err(e) => {
            if payload.delete_after_transfer
                && let Err(err) = payload.delete()
            {
                tracing::warn!("Failed to delete {}: {}", payload.path.display(), err);
            }
            return Err(e.into());
        }
    };

    println!("📤 发送 {}", payload.filename);
    println!("用手机扫描二维码下载（输入 q 并回车退出）：");
    present_and_serve(session, settings.reversed, args).await
}

/// 接收文件
pub async fn run_receive(args: &TransferArgs) -> Result<()> {
    let settings = prepare_settings(args)?;
    let bind = resolve_bind(&settings)?;
    let output_dir = settings.output_dir();

    let options = SessionOptions::from_settings(&settings, bind)
        .with_progress(progress(args.quiet))
        .with_qr_page(args.browser);
    let session = TransferSession::receive(options, output_dir.clone()).await?;

    println!("📥 接收模式（保存到: {}）", output_dir.display());
    println!("用手机扫描二维码上传（输入 q 并回车退出）：");
    present_and_serve(session, settings.reversed, args).await
}

/// `qrshare config`
pub fn run_config(args: &TransferArgs) -> Result<()> {
    let path = args.config_path();
    let current = AppSettings::load_from(&path);
    let interfaces = net::list_interfaces(args.list_all_interfaces)?;

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let settings = wizard::run_wizard(&current, &interfaces, &mut stdin.lock(), &mut stdout.lock())?;
    settings.validate()?;
    settings.save_to(&path)?;

    println!("✅ 配置已保存到 {}", path.display());
    Ok(())
}
