//! 集成测试 - 传输会话
//!
//! 在 127.0.0.1 的随机端口上启动真实会话，用 reqwest 模拟手机浏览器。

use qrshare_core::{Payload, SessionOptions, SetupError, StopReason, TlsFiles, TransferSession};
use reqwest::StatusCode;
use reqwest::header::{COOKIE, SET_COOKIE, USER_AGENT};
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

const BROWSER: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 Mobile Safari/537.36";
const CONTENT: &[u8] = b"the quick brown fox jumps over the lazy dog\n";

fn options(keep_alive: bool) -> SessionOptions {
    SessionOptions {
        keep_alive,
        path: Some("test".to_string()),
        ..SessionOptions::new(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }
}

fn write_payload(dir: &Path, delete_after_transfer: bool) -> Payload {
    let path = dir.join("doc.txt");
    fs::write(&path, CONTENT).unwrap();
    Payload {
        filename: "doc.txt".to_string(),
        path,
        delete_after_transfer,
    }
}

/// 第一次浏览器请求，返回 `name=value` 形式的 Cookie
async fn claim(client: &reqwest::Client, url: &str) -> String {
    let response = client
        .get(url)
        .header(USER_AGENT, BROWSER)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get(SET_COOKIE)
        .expect("first browser request must receive a cookie")
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string();
    let body = response.bytes().await.unwrap();
    assert_eq!(&body[..], CONTENT);
    cookie
}

async fn wait_stopped(session: TransferSession) -> StopReason {
    tokio::time::timeout(Duration::from_secs(10), session.wait())
        .await
        .expect("session did not stop in time")
}

/// 同一 Cookie 的两次下载返回相同内容，伪造的 Cookie 被拒绝
#[tokio::test]
async fn test_send_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let payload = write_payload(dir.path(), false);
    let session = TransferSession::send(options(true), payload).await.unwrap();
    let url = session.send_url();
    assert!(url.starts_with("http://127.0.0.1:"));
    assert!(url.ends_with("/send/test"));

    let client = reqwest::Client::new();
    let cookie = claim(&client, &url).await;

    let mut bodies = Vec::new();
    for _ in 0..2 {
        let response = client
            .get(&url)
            .header(USER_AGENT, BROWSER)
            .header(COOKIE, &cookie)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-disposition"],
            "attachment; filename=\"doc.txt\""
        );
        bodies.push(response.bytes().await.unwrap());
    }
    assert_eq!(bodies[0], bodies[1]);
    assert_eq!(&bodies[0][..], CONTENT);

    let forged = client
        .get(&url)
        .header(USER_AGENT, BROWSER)
        .header(COOKIE, "qrshare=Zm9yZ2VkLWNvb2tpZS12YWx1ZQ==")
        .send()
        .await
        .unwrap();
    assert_eq!(forged.status(), StatusCode::NOT_FOUND);
    assert!(forged.bytes().await.unwrap().is_empty());

    session.stop_signal().request(StopReason::UserAbort);
    assert_eq!(wait_stopped(session).await, StopReason::UserAbort);
}

/// 多个并发的首次请求中只有一个获得 Cookie
#[tokio::test]
async fn test_single_winner_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let payload = write_payload(dir.path(), false);
    let session = TransferSession::send(options(true), payload).await.unwrap();
    let url = session.send_url();
    let client = reqwest::Client::new();

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let client = client.clone();
            let url = url.clone();
            tokio::spawn(async move {
                let response = client
                    .get(&url)
                    .header(USER_AGENT, BROWSER)
                    .send()
                    .await
                    .unwrap();
                let status = response.status();
                let cookie = response.headers().get(SET_COOKIE).cloned();
                let _ = response.bytes().await;
                (status, cookie)
            })
        })
        .collect();

    let mut minted = Vec::new();
    let mut rejected = 0;
    for task in tasks {
        let (status, cookie) = task.await.unwrap();
        match cookie {
            Some(cookie) => {
                assert_eq!(status, StatusCode::OK);
                minted.push(cookie);
            }
            None => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                rejected += 1;
            }
        }
    }
    assert_eq!(minted.len(), 1);
    assert_eq!(rejected, 15);

    session.stop_signal().request(StopReason::UserAbort);
    wait_stopped(session).await;
}

/// 无 Cookie 的请求在文件 I/O 之前就被拒绝
#[tokio::test]
async fn test_unauthorized_never_opens_payload() {
    let dir = tempfile::tempdir().unwrap();
    let payload = write_payload(dir.path(), false);
    let payload_path = payload.path.clone();
    let session = TransferSession::send(options(true), payload).await.unwrap();
    let url = session.send_url();
    let client = reqwest::Client::new();

    claim(&client, &url).await;
    // 载荷已不存在：如果处理器尝试打开文件，会返回 500
    fs::remove_file(&payload_path).unwrap();

    let response = client
        .get(&url)
        .header(USER_AGENT, BROWSER)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.bytes().await.unwrap().is_empty());

    let curl = client.get(&url).send().await.unwrap();
    assert_eq!(curl.status(), StatusCode::NOT_FOUND);

    let stop = session.stop_signal();
    assert!(!stop.is_stopped());
    stop.request(StopReason::Interrupt);
    assert_eq!(wait_stopped(session).await, StopReason::Interrupt);
}

/// 非浏览器的首次请求得到空的 200 响应，不会占用会话
#[tokio::test]
async fn test_non_browser_does_not_claim_session() {
    let dir = tempfile::tempdir().unwrap();
    let payload = write_payload(dir.path(), false);
    let session = TransferSession::send(options(false), payload).await.unwrap();
    let url = session.send_url();
    let client = reqwest::Client::new();

    let response = client
        .get(&url)
        .header(USER_AGENT, "WhatsApp/2.23 link preview")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(SET_COOKIE).is_none());
    assert!(response.bytes().await.unwrap().is_empty());
    assert!(!session.stop_signal().is_stopped());

    claim(&client, &url).await;
    assert_eq!(wait_stopped(session).await, StopReason::TransferComplete);
}

/// 下载完成后计数归零，会话自动停止并删除临时载荷
#[tokio::test]
async fn test_completed_download_stops_session() {
    let dir = tempfile::tempdir().unwrap();
    let payload = write_payload(dir.path(), true);
    let payload_path = payload.path.clone();
    let session = TransferSession::send(options(false), payload).await.unwrap();
    let url = session.send_url();
    let stop = session.stop_signal();

    claim(&reqwest::Client::new(), &url).await;

    assert_eq!(wait_stopped(session).await, StopReason::TransferComplete);
    assert_eq!(stop.reason(), Some(StopReason::TransferComplete));
    assert!(!payload_path.exists());
}

/// 开启保持运行时下载完成不会停止会话
#[tokio::test]
async fn test_keep_alive_survives_download() {
    let dir = tempfile::tempdir().unwrap();
    let payload = write_payload(dir.path(), true);
    let payload_path = payload.path.clone();
    let session = TransferSession::send(options(true), payload).await.unwrap();
    let url = session.send_url();
    let client = reqwest::Client::new();

    let cookie = claim(&client, &url).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!session.stop_signal().is_stopped());

    let again = client
        .get(&url)
        .header(USER_AGENT, BROWSER)
        .header(COOKIE, &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(again.status(), StatusCode::OK);
    let _ = again.bytes().await.unwrap();
    assert!(!session.stop_signal().is_stopped());

    session.stop_signal().request(StopReason::UserAbort);
    wait_stopped(session).await;
    assert!(!payload_path.exists());
}

/// 上传 report.pdf 到空目录
#[tokio::test]
async fn test_receive_report_pdf() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("inbox");
    let session = TransferSession::receive(options(false), output.clone())
        .await
        .unwrap();
    let url = session.receive_url();
    assert!(url.ends_with("/receive/test"));
    let client = reqwest::Client::new();

    let form_page = client.get(&url).send().await.unwrap();
    assert_eq!(form_page.status(), StatusCode::OK);
    assert!(form_page.text().await.unwrap().contains("multipart/form-data"));

    let part = reqwest::multipart::Part::bytes(b"%PDF-1.7 fake".to_vec()).file_name("report.pdf");
    let form = reqwest::multipart::Form::new().part("files", part);
    let response = client
        .post(&url)
        .header(USER_AGENT, BROWSER)
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.text().await.unwrap().contains("report.pdf"));

    assert_eq!(
        fs::read(output.join("report.pdf")).unwrap(),
        b"%PDF-1.7 fake"
    );
    assert_eq!(wait_stopped(session).await, StopReason::TransferComplete);
}

/// 接收模式下同名文件不会被覆盖
#[tokio::test]
async fn test_receive_does_not_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), b"first").unwrap();
    fs::write(dir.path().join("a(1).txt"), b"second").unwrap();
    let session = TransferSession::receive(options(true), dir.path().to_path_buf())
        .await
        .unwrap();
    let url = session.receive_url();

    let form = reqwest::multipart::Form::new()
        .part(
            "files",
            reqwest::multipart::Part::bytes(b"third".to_vec()).file_name("a.txt"),
        )
        .part(
            "files",
            reqwest::multipart::Part::bytes(b"bee".to_vec()).file_name("b.txt"),
        );
    let response = reqwest::Client::new()
        .post(&url)
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.text().await.unwrap().contains("a(2).txt, b.txt"));

    assert_eq!(fs::read(dir.path().join("a.txt")).unwrap(), b"first");
    assert_eq!(fs::read(dir.path().join("a(2).txt")).unwrap(), b"third");
    assert_eq!(fs::read(dir.path().join("b.txt")).unwrap(), b"bee");
    assert!(!session.stop_signal().is_stopped());

    session.stop_signal().request(StopReason::UserAbort);
    wait_stopped(session).await;
}

#[tokio::test]
async fn test_fqdn_and_fixed_port_in_url() {
    let dir = tempfile::tempdir().unwrap();
    let payload = write_payload(dir.path(), false);
    let mut opts = options(true);
    opts.fqdn = Some("files.example.com".to_string());
    opts.path = Some("abcd".to_string());

    let session = TransferSession::send(opts, payload).await.unwrap();
    let port = session.local_addr().port();
    assert_eq!(session.base_url(), format!("http://files.example.com:{}", port));
    assert_eq!(
        session.send_url(),
        format!("http://files.example.com:{}/send/abcd", port)
    );
    assert_eq!(
        session.receive_url(),
        format!("http://files.example.com:{}/receive/abcd", port)
    );
    assert_eq!(session.url(), session.send_url());

    session.stop_signal().request(StopReason::UserAbort);
    wait_stopped(session).await;
}

/// 二维码页面不经过 Cookie 闸门，也不影响随后的下载
#[tokio::test]
async fn test_qr_page() {
    let dir = tempfile::tempdir().unwrap();
    let payload = write_payload(dir.path(), false);
    let session = TransferSession::send(options(true).with_qr_page(true), payload)
        .await
        .unwrap();
    let client = reqwest::Client::new();

    let response = client
        .get(session.qr_page_url())
        .header(USER_AGENT, BROWSER)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(SET_COOKIE).is_none());
    let page = response.text().await.unwrap();
    assert!(page.contains("<svg"));
    assert!(page.contains(&session.send_url()));

    claim(&client, &session.send_url()).await;

    session.stop_signal().request(StopReason::UserAbort);
    wait_stopped(session).await;
}

#[tokio::test]
async fn test_qr_page_disabled_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let session = TransferSession::receive(options(true), dir.path().to_path_buf())
        .await
        .unwrap();
    assert_eq!(session.url(), session.receive_url());

    let response = reqwest::get(session.qr_page_url()).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    session.stop_signal().request(StopReason::UserAbort);
    wait_stopped(session).await;
}

#[tokio::test]
async fn test_bind_failure() {
    let dir = tempfile::tempdir().unwrap();
    let first = TransferSession::send(options(true), write_payload(dir.path(), false))
        .await
        .unwrap();
    let taken: SocketAddr = first.local_addr();

    let mut opts = options(true);
    opts.port = taken.port();
    let err = match TransferSession::send(opts, write_payload(dir.path(), false)).await {
        Ok(_) => panic!("binding a used port must fail"),
        Err(e) => e,
    };
    assert!(matches!(err, SetupError::Bind { .. }));

    first.stop_signal().request(StopReason::UserAbort);
    wait_stopped(first).await;
}

#[tokio::test]
async fn test_invalid_tls_files() {
    let dir = tempfile::tempdir().unwrap();
    let cert = dir.path().join("cert.pem");
    let key = dir.path().join("key.pem");
    fs::write(&cert, "not a certificate").unwrap();
    fs::write(&key, "not a key").unwrap();

    let mut opts = options(true);
    opts.tls = Some(TlsFiles { cert, key });
    let result = TransferSession::send(opts, write_payload(dir.path(), false)).await;
    assert!(matches!(result, Err(SetupError::Tls { .. })));
}
