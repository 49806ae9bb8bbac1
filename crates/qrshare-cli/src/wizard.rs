//! 交互式配置
//!
//! 输入输出通过参数注入，便于测试。

use anyhow::{Context, Result, bail};
use qrshare_core::AppSettings;
use qrshare_core::config::is_dns_name;
use qrshare_core::net::{ANY_INTERFACE, InterfaceInfo};
use std::io::{BufRead, Write};
use std::path::PathBuf;

/// 读取一行输入，输入结束时返回 `None`
fn prompt(input: &mut dyn BufRead, output: &mut dyn Write, message: &str) -> Result<Option<String>> {
    write!(output, "{}", message)?;
    output.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line).context("Failed to read input")? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn parse_yes_no(answer: &str) -> Option<bool> {
    match answer.to_ascii_lowercase().as_str() {
        "y" | "yes" | "是" => Some(true),
        "n" | "no" | "否" => Some(false),
        _ => None,
    }
}

/// 从列表中选择网络接口，返回接口名
///
/// 列表最后一项为 `any`（所有接口）。直接回车选择 `default`。
pub fn choose_interface(
    interfaces: &[InterfaceInfo],
    default: Option<&str>,
    input: &mut dyn BufRead,
    output: &mut dyn Write,
) -> Result<String> {
    writeln!(output, "选择用于传输的网络接口：")?;
    for (i, iface) in interfaces.iter().enumerate() {
        writeln!(output, "  [{}] {} ({})", i + 1, iface.name, iface.address)?;
    }
    writeln!(output, "  [{}] {} (所有接口)", interfaces.len() + 1, ANY_INTERFACE)?;

    let hint = default.map(|d| format!(" [{}]", d)).unwrap_or_default();
    loop {
        let Some(answer) = prompt(input, output, &format!("编号{}: ", hint))? else {
            bail!("no network interface selected");
        };

        if answer.is_empty()
            && let Some(default) = default
        {
            return Ok(default.to_string());
        }

        match answer.parse::<usize>() {
            Ok(n) if (1..=interfaces.len()).contains(&n) => return Ok(interfaces[n - 1].name.clone()),
            Ok(n) if n == interfaces.len() + 1 => return Ok(ANY_INTERFACE.to_string()),
            _ => {
                if let Some(iface) = interfaces.iter().find(|i| i.name == answer) {
                    return Ok(iface.name.clone());
                }
                writeln!(output, "无效的选择：{}", answer)?;
            }
        }
    }
}

/// 依次询问接口、域名、端口、保持运行和保存目录，返回新的设置
pub fn run_wizard(
    current: &AppSettings,
    interfaces: &[InterfaceInfo],
    input: &mut dyn BufRead,
    output: &mut dyn Write,
) -> Result<AppSettings> {
    let mut settings = current.clone();

    settings.interface = Some(choose_interface(
        interfaces,
        current.interface.as_deref(),
        input,
        output,
    )?);

    loop {
        let shown = current.fqdn.as_deref().unwrap_or("无");
        let Some(answer) = prompt(input, output, &format!("完整域名（- 清除）[{}]: ", shown))? else {
            return Ok(settings);
        };
        match answer.as_str() {
            "" => break,
            "-" => {
                settings.fqdn = None;
                break;
            }
            name if is_dns_name(name) => {
                settings.fqdn = Some(name.to_string());
                break;
            }
            name => writeln!(output, "无效的域名：{}", name)?,
        }
    }

    loop {
        let Some(answer) = prompt(input, output, &format!("端口（0 为随机）[{}]: ", current.port))?
        else {
            return Ok(settings);
        };
        if answer.is_empty() {
            break;
        }
        match answer.parse::<u16>() {
            Ok(port) => {
                settings.port = port;
                break;
            }
            Err(_) => writeln!(output, "无效的端口：{}", answer)?,
        }
    }

    loop {
        let default = if current.keep_alive { "y" } else { "n" };
        let Some(answer) =
            prompt(input, output, &format!("传输完成后保持运行？(y/n) [{}]: ", default))?
        else {
            return Ok(settings);
        };
        if answer.is_empty() {
            break;
        }
        match parse_yes_no(&answer) {
            Some(value) => {
                settings.keep_alive = value;
                break;
            }
            None => writeln!(output, "请输入 y 或 n")?,
        }
    }

    let shown = current.output_dir();
    if let Some(answer) =
        prompt(input, output, &format!("接收文件保存目录 [{}]: ", shown.display()))?
        && !answer.is_empty()
    {
        settings.output = Some(PathBuf::from(answer));
    }

    Ok(settings)
}
