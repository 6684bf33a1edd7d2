use std::net::{IpAddr, SocketAddr};

use axum::http::HeaderMap;

fn header_ip<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| v.parse::<IpAddr>().is_ok())
}

/// Address used to attribute a request for throttling and logs.
///
/// The socket peer, unless the peer is one of `trusted` proxies, in which case
/// the first `X-Forwarded-For` hop (else `X-Real-IP`) is used. Without a
/// peer the result is `"unknown"`.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trusted: &[IpAddr]) -> String {
    let Some(peer) = peer.map(|addr| addr.ip()) else {
        return "unknown".to_string();
    };
    if !trusted.contains(&peer) {
        return peer.to_string();
    }

    header_ip(headers, "x-forwarded-for")
        .or_else(|| header_ip(headers, "x-real-ip"))
        .map(str::to_string)
        .unwrap_or_else(|| peer.to_string())
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn forwarded() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("10.1.1.1"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.2"));
        headers
    }

    #[test]
    fn untrusted_peers_cannot_choose_their_address() {
        let peer: SocketAddr = "192.168.1.9:5000".parse().unwrap();
        assert_eq!(client_ip(&forwarded(), Some(peer), &[]), "192.168.1.9");
        assert_eq!(client_ip(&forwarded(), None, &[]), "unknown");
    }

    #[test]
    fn trusted_proxies_forward_the_client() {
        let peer: SocketAddr = "192.168.1.9:5000".parse().unwrap();
        let trusted = [peer.ip()];
        let mut headers = forwarded();
        assert_eq!(client_ip(&headers, Some(peer), &trusted), "203.0.113.7");

        headers.remove("x-forwarded-for");
        assert_eq!(client_ip(&headers, Some(peer), &trusted), "10.1.1.1");

        headers.insert("x-real-ip", HeaderValue::from_static("not-an-ip"));
        assert_eq!(client_ip(&headers, Some(peer), &trusted), "192.168.1.9");
    }
}
