//! 网络接口模块
//!
//! - 将配置中的接口名解析为可绑定的 IP 地址
//! - 枚举可供交互选择的接口
//! - 查询公网 IP（绑定到通配地址时生成 URL 使用）

mod public_ip;

pub use public_ip::public_ip;

use crate::error::SetupError;
use regex::Regex;
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::LazyLock;

/// 特殊接口名：绑定到所有接口
pub const ANY_INTERFACE: &str = "any";

/// 交互选择时默认隐藏的虚拟 / 回环 / 隧道接口
static IGNORED_INTERFACES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(veth|br-|docker|lo|EHC|XHC|bridge|gif|stf|p2p|awdl|utun|tun|tap)").unwrap()
});

/// 可选网络接口
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub name: String,
    pub address: IpAddr,
}

/// 解析接口名对应的绑定地址
///
/// `any` 直接返回 `0.0.0.0`，不枚举接口。
/// 优先返回 IPv4 地址，没有时才使用 IPv6；链路本地地址会被忽略。
pub fn resolve_bind_address(interface: &str) -> Result<IpAddr, SetupError> {
    if interface == ANY_INTERFACE {
        return Ok(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }

    let candidates: Vec<IpAddr> = if_addrs::get_if_addrs()?
        .into_iter()
        .filter(|iface| iface.name == interface)
        .map(|iface| iface.ip())
        .collect();

    if candidates.is_empty() {
        return Err(SetupError::NoSuchInterface(interface.to_string()));
    }

    pick_address(&candidates).ok_or_else(|| SetupError::NoUsableAddress(interface.to_string()))
}

/// 从同一接口的多个地址中选出一个可用地址
pub fn pick_address(candidates: &[IpAddr]) -> Option<IpAddr> {
    let mut usable = candidates.iter().copied().filter(|ip| !is_link_local(ip));
    let first = usable.next()?;
    if first.is_ipv4() {
        return Some(first);
    }
    Some(usable.find(IpAddr::is_ipv4).unwrap_or(first))
}

/// 枚举可用接口（按名称排序）
///
/// `list_all` 为 false 时过滤掉回环和虚拟接口。
/// 没有可用地址的接口（通常是未启用的接口）不会出现在列表中。
pub fn list_interfaces(list_all: bool) -> Result<Vec<InterfaceInfo>, SetupError> {
    let mut grouped: BTreeMap<String, Vec<IpAddr>> = BTreeMap::new();

    for iface in if_addrs::get_if_addrs()? {
        if !list_all && (iface.is_loopback() || IGNORED_INTERFACES.is_match(&iface.name)) {
            continue;
        }
        grouped.entry(iface.name.clone()).or_default().push(iface.ip());
    }

    Ok(grouped
        .into_iter()
        .filter_map(|(name, addrs)| {
            pick_address(&addrs).map(|address| InterfaceInfo { name, address })
        })
        .collect())
}

/// 是否为通配地址（0.0.0.0 / ::）
pub fn is_wildcard(ip: &IpAddr) -> bool {
    ip.is_unspecified()
}

/// URL 中使用的主机部分，IPv6 地址加方括号
pub fn format_host(ip: &IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => format!("[{}]", v6),
    }
}

fn is_link_local(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_link_local(),
        // fe80::/10
        IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) == 0xfe80,
    }
}
