//! 发送模式的下载处理器

use super::counter::{InFlight, InFlightGuard};
use super::gate::{CookieGate, GateDecision, cookie_value};
use super::shutdown::{StopReason, StopSignal};
use crate::APP_NAME;
use crate::archive::Payload;
use crate::progress::ProgressCallback;
use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures_util::StreamExt;
use log::{debug, error, info};
use std::sync::Arc;
use tokio::fs::File;

pub(crate) struct SendState {
    pub payload: Payload,
    pub gate: CookieGate,
    pub in_flight: Arc<InFlight>,
    pub stop: StopSignal,
    pub progress: Arc<dyn ProgressCallback>,
}

/// `GET /send/{path}`
pub(crate) async fn send_file(
    State(state): State<Arc<SendState>>,
    headers: HeaderMap,
) -> Response {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok());
    let presented = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|v| cookie_value(v, APP_NAME));

    let decision = match state.gate.decide(user_agent, presented) {
        Ok(decision) => decision,
        Err(e) => {
            error!("Failed to generate session identity: {}", e);
            state.stop.request(StopReason::Error);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to generate session identity",
            )
                .into_response();
        }
    };

    let (guard, set_cookie) = match decision {
        GateDecision::Minted(value) => {
            info!("Session claimed by {}", user_agent.unwrap_or("unknown client"));
            (state.in_flight.adopt(), Some(value))
        }
        GateDecision::Authorized => (state.in_flight.enter(), None),
        GateDecision::NotBrowser => {
            debug!("Ignoring non-browser request before session claim");
            return StatusCode::OK.into_response();
        }
        GateDecision::Rejected => {
            debug!("Rejected request without a valid session cookie");
            return StatusCode::NOT_FOUND.into_response();
        }
    };

    let payload = &state.payload;
    let file = match File::open(&payload.path).await {
        Ok(file) => file,
        Err(e) => {
            error!("Failed to open {}: {}", payload.path.display(), e);
            state.progress.on_error(&e.to_string());
            state.stop.request(StopReason::Error);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("cannot read {}: {}", payload.filename, e),
            )
                .into_response();
        }
    };
    let size = file.metadata().await.ok().map(|m| m.len());

    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::CONTENT_TYPE, content_type(&payload.filename));
    response_headers.insert(
        header::CONTENT_DISPOSITION,
        content_disposition(&payload.filename),
    );
    if let Some(size) = size {
        response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    }
    if let Some(value) = set_cookie
        && let Ok(cookie) = HeaderValue::from_str(&format!("{}={}; Path=/", APP_NAME, value))
    {
        response_headers.insert(header::SET_COOKIE, cookie);
    }

    state.progress.on_start(&payload.filename, size);
    let mut tracker = DownloadTracker {
        _guard: guard,
        progress: state.progress.clone(),
        name: payload.filename.clone(),
        total: size,
        sent: 0,
    };

    let stream = tokio_util::io::ReaderStream::new(file).map(move |chunk| {
        if let Ok(bytes) = &chunk {
            tracker.record(bytes.len() as u64);
        }
        chunk
    });

    (
        StatusCode::OK,
        response_headers,
        Body::from_stream(stream),
    )
        .into_response()
}

fn content_type(filename: &str) -> HeaderValue {
    let mime = mime_guess::from_path(filename).first_or_octet_stream();
    HeaderValue::from_str(mime.as_ref())
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"))
}

fn content_disposition(filename: &str) -> HeaderValue {
    let quoted = filename.replace(['"', '\\', '\r', '\n'], "_");
    HeaderValue::from_str(&format!("attachment; filename=\"{}\"", quoted))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

/// 跟随响应体一起释放：统计字节数，结束时汇报结果并归还计数
struct DownloadTracker {
    _guard: InFlightGuard,
    progress: Arc<dyn ProgressCallback>,
    name: String,
    total: Option<u64>,
    sent: u64,
}

impl DownloadTracker {
    fn record(&mut self, bytes: u64) {
        self.sent += bytes;
        self.progress.on_progress(bytes);
    }
}

impl Drop for DownloadTracker {
    fn drop(&mut self) {
        match self.total {
            Some(total) if self.sent < total => {
                info!(
                    "Download of {} stopped after {} of {} bytes",
                    self.name, self.sent, total
                );
                self.progress
                    .on_error(&format!("download interrupted after {} bytes", self.sent));
            }
            _ => {
                info!("Sent {} ({} bytes)", self.name, self.sent);
                self.progress.on_complete(std::slice::from_ref(&self.name));
            }
        }
    }
}
