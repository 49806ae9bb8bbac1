use crate::error::SetupError;
use log::debug;
use std::net::IpAddr;
use std::time::Duration;

const PUBLIC_IP_ENDPOINT: &str = "http://checkip.amazonaws.com";

/// 查询本机的公网 IP
pub async fn public_ip() -> Result<IpAddr, SetupError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| SetupError::PublicIp(e.to_string()))?;

    let body = client
        .get(PUBLIC_IP_ENDPOINT)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| SetupError::PublicIp(e.to_string()))?
        .text()
        .await
        .map_err(|e| SetupError::PublicIp(e.to_string()))?;

    debug!("Public IP lookup returned {:?}", body.trim());

    body.trim()
        .parse()
        .map_err(|_| SetupError::PublicIp(format!("unexpected response {:?}", body.trim())))
}
