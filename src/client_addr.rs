// 调用方身份：优先取 X-Forwarded-For 的第一个地址，否则使用连接对端地址。
use crate::ip_info::{ClientInfo, ClientInfoResolver};
use axum::http::HeaderMap;
use std::net::{IpAddr, SocketAddr};

pub const FORWARDED_FOR: &str = "x-forwarded-for";

pub fn forwarded_or_peer(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get(FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| peer.ip().to_string())
}

/// 本机回环地址（含 IPv4 映射的 IPv6 形式）与 `localhost`。
pub fn is_local_address(value: &str) -> bool {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("localhost") {
        return true;
    }
    match trimmed.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => ip.is_loopback(),
        Ok(IpAddr::V6(ip)) => {
            ip.is_loopback() || ip.to_ipv4_mapped().is_some_and(|mapped| mapped.is_loopback())
        }
        Err(_) => false,
    }
}

/// 用作记录分组键的身份；本机访问时换成服务器的公网地址。
pub async fn resolve_identity(
    resolver: &ClientInfoResolver,
    headers: &HeaderMap,
    peer: SocketAddr,
) -> String {
    let address = forwarded_or_peer(headers, peer);
    if is_local_address(&address) {
        return resolver.public_address().await;
    }
    address
}

/// 调用方的地理信息；本机访问时查询服务器自身。
pub async fn resolve_client_info(
    resolver: &ClientInfoResolver,
    headers: &HeaderMap,
    peer: SocketAddr,
) -> ClientInfo {
    let address = forwarded_or_peer(headers, peer);
    if is_local_address(&address) {
        return resolver.resolve_self().await;
    }
    resolver.resolve(Some(&address)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer(ip: [u8; 4]) -> SocketAddr {
        SocketAddr::from((ip, 40000))
    }

    #[test]
    fn forwarded_header_takes_first_entry() {
        let mut headers = HeaderMap::new();
        headers.insert(
            FORWARDED_FOR,
            HeaderValue::from_static(" 203.0.113.9 , 10.0.0.1, 10.0.0.2"),
        );
        assert_eq!(forwarded_or_peer(&headers, peer([10, 0, 0, 3])), "203.0.113.9");
    }

    #[test]
    fn missing_or_blank_header_uses_peer() {
        let mut headers = HeaderMap::new();
        assert_eq!(forwarded_or_peer(&headers, peer([192, 0, 2, 8])), "192.0.2.8");
        headers.insert(FORWARDED_FOR, HeaderValue::from_static("  "));
        assert_eq!(forwarded_or_peer(&headers, peer([192, 0, 2, 8])), "192.0.2.8");
    }

    #[test]
    fn loopback_forms_are_local() {
        for value in ["127.0.0.1", "127.8.0.1", "::1", "localhost", "::ffff:127.0.0.1"] {
            assert!(is_local_address(value), "{value}");
        }
        for value in ["192.168.1.2", "203.0.113.1", "2001:db8::1", "Unknown", ""] {
            assert!(!is_local_address(value), "{value}");
        }
    }

    #[tokio::test]
    async fn local_identity_uses_public_address() {
        let resolver = ClientInfoResolver::offline();
        let identity = resolve_identity(&resolver, &HeaderMap::new(), peer([127, 0, 0, 1])).await;
        assert_eq!(identity, "Unknown");

        let identity =
            resolve_identity(&resolver, &HeaderMap::new(), peer([198, 51, 100, 3])).await;
        assert_eq!(identity, "198.51.100.3");
    }
}
