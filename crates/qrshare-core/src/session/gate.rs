//! 单次授权的 Cookie 闸门
//!
//! 第一个浏览器请求赢得闸门并获得会话 Cookie，之后只有携带同一 Cookie
//! 的请求才会被放行。

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use rand::rngs::OsRng;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// 会话标识的随机字节数
const IDENTITY_BYTES: usize = 40;

/// 闸门判定结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// 本请求赢得闸门，响应中需要下发此 Cookie 值
    Minted(String),
    /// 携带了正确的 Cookie
    Authorized,
    /// 尚未下发 Cookie，且请求方不是浏览器
    NotBrowser,
    /// 缺少或错误的 Cookie
    Rejected,
}

/// 生成不可猜测的会话标识
pub fn mint_identity() -> Result<String, rand::Error> {
    let mut bytes = [0u8; IDENTITY_BYTES];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(STANDARD.encode(bytes))
}

/// 判断 User-Agent 是否来自浏览器
pub fn is_browser(user_agent: Option<&str>) -> bool {
    user_agent.is_some_and(|ua| ua.starts_with("Mozilla"))
}

/// 从 `Cookie` 请求头中取出指定名称的值
pub fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key.trim() == name).then(|| value.trim().trim_matches('"'))
    })
}

#[derive(Debug, Default)]
pub struct CookieGate {
    claimed: AtomicBool,
    value: OnceLock<String>,
}

impl CookieGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// 尝试赢得闸门，整个会话中只有一次调用返回 true
    pub fn try_claim(&self) -> bool {
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }

    /// 记录赢家生成的 Cookie 值
    pub fn store(&self, value: String) {
        let _ = self.value.set(value);
    }

    pub fn value(&self) -> Option<&str> {
        self.value.get().map(String::as_str)
    }

    /// 校验请求携带的 Cookie
    ///
    /// 赢家尚未写入 Cookie 值时所有请求都会被拒绝。
    pub fn validate(&self, presented: Option<&str>) -> bool {
        match (self.value(), presented) {
            (Some(expected), Some(got)) => expected == got,
            _ => false,
        }
    }

    /// 对一个发送请求做出判定
    ///
    /// `Minted` 之外的结果都不会修改闸门状态。生成标识失败时闸门保持已占用，
    /// 后续请求全部被拒绝。
    pub fn decide(
        &self,
        user_agent: Option<&str>,
        presented: Option<&str>,
    ) -> Result<GateDecision, rand::Error> {
        if !self.is_claimed() {
            if !is_browser(user_agent) {
                return Ok(GateDecision::NotBrowser);
            }
            if self.try_claim() {
                let value = mint_identity()?;
                self.store(value.clone());
                return Ok(GateDecision::Minted(value));
            }
        }

        if self.validate(presented) {
            Ok(GateDecision::Authorized)
        } else {
            Ok(GateDecision::Rejected)
        }
    }
}
