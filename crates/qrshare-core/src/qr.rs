//! 二维码渲染
//!
//! 终端输出使用 Unicode 半块字符（每个字符表示上下两个模块），
//! 另外支持导出 SVG 图片。

use anyhow::anyhow;
use qrcode::QrCode;
use qrcode::render::{svg, unicode};

fn encode(url: &str) -> anyhow::Result<QrCode> {
    QrCode::new(url.as_bytes()).map_err(|e| anyhow!("cannot encode URL as QR code: {}", e))
}

/// 将 URL 渲染为终端可打印的二维码
///
/// 默认适合深色背景终端；`inverted` 为 true 时反色，适合浅色背景。
pub fn render_terminal(url: &str, inverted: bool) -> anyhow::Result<String> {
    let code = encode(url)?;

    let (dark, light) = if inverted {
        (unicode::Dense1x2::Dark, unicode::Dense1x2::Light)
    } else {
        (unicode::Dense1x2::Light, unicode::Dense1x2::Dark)
    };

    Ok(code
        .render::<unicode::Dense1x2>()
        .dark_color(dark)
        .light_color(light)
        .quiet_zone(true)
        .build())
}

/// 将 URL 渲染为 SVG 图片
pub fn render_svg(url: &str) -> anyhow::Result<String> {
    let code = encode(url)?;
    Ok(code
        .render::<svg::Color>()
        .min_dimensions(256, 256)
        .quiet_zone(true)
        .build())
}
