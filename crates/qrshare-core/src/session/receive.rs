//! 接收模式的上传处理器
//!
//! 上传以 multipart 流的形式逐块写入磁盘，不会在内存中缓冲整个请求体。
//! 文件名冲突时依次尝试 `name(1).ext`、`name(2).ext`……

use super::pages;
use super::shutdown::{StopReason, StopSignal};
use crate::progress::ProgressCallback;
use anyhow::{Context, anyhow};
use axum::{
    extract::{Multipart, State, multipart::MultipartRejection},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use log::{error, info};
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

pub(crate) struct ReceiveState {
    pub output_dir: PathBuf,
    pub keep_alive: bool,
    pub stop: StopSignal,
    pub progress: Arc<dyn ProgressCallback>,
}

/// `GET /receive/{path}`
pub(crate) async fn upload_form() -> impl IntoResponse {
    pages::upload_page()
}

/// `POST /receive/{path}`
pub(crate) async fn receive_files(
    State(state): State<Arc<ReceiveState>>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    match store_upload(&state, &headers, multipart).await {
        Ok(names) => {
            info!(
                "Received {} file(s) into {}",
                names.len(),
                state.output_dir.display()
            );
            state.progress.on_complete(&names);
            if !state.keep_alive {
                state.stop.request(StopReason::TransferComplete);
            }
            pages::done_page(&names).into_response()
        }
        Err(e) => {
            error!("Upload failed: {:#}", e);
            state.progress.on_error(&format!("{:#}", e));
            state.stop.request(StopReason::Error);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("upload failed: {:#}", e),
            )
                .into_response()
        }
    }
}

async fn store_upload(
    state: &ReceiveState,
    headers: &HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> anyhow::Result<Vec<String>> {
    let mut multipart = multipart.map_err(|e| anyhow!("malformed upload: {}", e))?;

    let dir = &state.output_dir;
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("cannot create output directory {}", dir.display()))?;
    let mut existing = existing_names(dir).await?;

    let total = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    let mut stored = Vec::new();
    while let Some(mut field) = multipart
        .next_field()
        .await
        .context("failed to read upload")?
    {
        let Some(raw_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        if raw_name.is_empty() {
            continue;
        }

        let (name, mut file) = create_unique(dir, &sanitize_file_name(&raw_name), &mut existing)
            .await?;
        let path = dir.join(&name);
        state.progress.on_start(&name, total);

        while let Some(chunk) = field
            .chunk()
            .await
            .with_context(|| format!("failed to read upload of {}", name))?
        {
            file.write_all(&chunk)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            state.progress.on_progress(chunk.len() as u64);
        }
        file.flush()
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;

        info!("Stored {}", path.display());
        stored.push(name);
    }

    Ok(stored)
}

async fn existing_names(dir: &Path) -> anyhow::Result<HashSet<String>> {
    let mut names = HashSet::new();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("cannot list {}", dir.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        names.insert(entry.file_name().to_string_lossy().to_string());
    }
    Ok(names)
}

/// 独占创建文件，与并发上传撞名时换下一个编号
async fn create_unique(
    dir: &Path,
    wanted: &str,
    existing: &mut HashSet<String>,
) -> anyhow::Result<(String, File)> {
    loop {
        let name = unique_file_name(wanted, existing);
        existing.insert(name.clone());
        let path = dir.join(&name);
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => return Ok((name, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(e).with_context(|| format!("cannot create {}", path.display()));
            }
        }
    }
}

/// 去掉文件名中的路径成分
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

/// 计算不与已有文件冲突的文件名（区分大小写）
pub fn unique_file_name(name: &str, existing: &HashSet<String>) -> String {
    if !existing.contains(name) {
        return name.to_string();
    }

    let (stem, ext) = match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    };

    (1..)
        .map(|i| format!("{}({}){}", stem, i, ext))
        .find(|candidate| !existing.contains(candidate))
        .unwrap_or_else(|| name.to_string())
}
