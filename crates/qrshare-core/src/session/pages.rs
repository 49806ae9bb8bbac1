//! 会话提供的 HTML 页面

use crate::qr;
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use log::error;

const UPLOAD_PAGE: &str = r#"<!DOCTYPE html>
<html lang="zh-CN">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>qrshare 上传文件</title>
<style>
body { font-family: sans-serif; margin: 2em auto; max-width: 32em; padding: 0 1em; }
input, button { font-size: 1.1em; margin: 0.5em 0; width: 100%; }
</style>
</head>
<body>
<h1>上传文件</h1>
<form method="post" enctype="multipart/form-data">
<input type="file" name="files" multiple required>
<button type="submit">上传</button>
</form>
</body>
</html>
"#;

fn hardening_headers() -> [(header::HeaderName, &'static str); 3] {
    [
        (header::X_FRAME_OPTIONS, "DENY"),
        (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        (header::REFERRER_POLICY, "no-referrer"),
    ]
}

pub fn upload_page() -> impl IntoResponse {
    (hardening_headers(), Html(UPLOAD_PAGE))
}

/// 上传完成页面，列出保存的文件名
pub fn done_page(names: &[String]) -> impl IntoResponse {
    let listed = names
        .iter()
        .map(|n| html_escape(n))
        .collect::<Vec<_>>()
        .join(", ");

    let body = format!(
        r#"<!DOCTYPE html>
<html lang="zh-CN">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>qrshare 上传完成</title>
</head>
<body>
<h1>上传完成</h1>
<p>已保存：{listed}</p>
</body>
</html>
"#
    );
    (hardening_headers(), Html(body))
}

/// 在浏览器中显示会话二维码
pub fn qr_page(url: &str) -> Response {
    let svg = match qr::render_svg(url) {
        Ok(svg) => svg,
        Err(e) => {
            error!("Failed to render QR page: {:#}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "cannot render QR code").into_response();
        }
    };
    // 去掉 XML 声明后内嵌到 HTML
    let svg = svg.find("<svg").map_or(svg.as_str(), |start| &svg[start..]);
    let escaped = html_escape(url);

    let body = format!(
        r#"<!DOCTYPE html>
<html lang="zh-CN">
<head>
<meta charset="utf-8">
<title>qrshare 二维码</title>
<style>
body {{ font-family: sans-serif; text-align: center; margin: 2em; }}
svg {{ width: 24em; height: 24em; }}
</style>
</head>
<body>
{svg}
<p><a href="{escaped}">{escaped}</a></p>
</body>
</html>
"#
    );
    (hardening_headers(), Html(body)).into_response()
}

pub fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
