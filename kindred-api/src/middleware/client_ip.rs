/// Client address resolution
///
/// Resolves the caller's IP once per request and stores it as a [`ClientIp`]
/// extension for the rate limiter and audit events.
///
/// `X-Forwarded-For` is only honoured when the TCP peer is one of the
/// configured `TRUSTED_PROXIES`. The header is then read right to left and
/// the first hop that is not itself a trusted proxy is the client; anything
/// further left was written by the client and is ignored.

use crate::app::AppState;
use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

/// Resolved caller address, `None` when the peer is unknown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientIp(pub Option<IpAddr>);

impl ClientIp {
    /// Address as recorded on audit events
    pub fn to_audit(self) -> Option<String> {
        self.0.map(|ip| ip.to_string())
    }

    /// Rate limit bucket component
    pub fn bucket(self) -> String {
        self.0
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<ClientIp>().copied().unwrap_or_default())
    }
}

/// Works out the client address from the peer and forwarding headers
pub fn resolve_client_ip(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trusted_proxies: &[IpAddr],
) -> Option<IpAddr> {
    let peer = peer?.ip();
    if !trusted_proxies.contains(&peer) {
        return Some(peer);
    }

    let hops: Vec<&str> = headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .collect();

    for hop in hops.iter().rev() {
        match hop.parse::<IpAddr>() {
            Ok(ip) if trusted_proxies.contains(&ip) => continue,
            Ok(ip) => return Some(ip),
            // Garbage from an untrusted writer: stop at the last hop we trust
            Err(_) => return Some(peer),
        }
    }

    Some(peer)
}

/// Stores the [`ClientIp`] for downstream layers and handlers
pub async fn client_ip_layer(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let ip = resolve_client_ip(request.headers(), peer, &state.config.api.trusted_proxies);
    request.extensions_mut().insert(ClientIp(ip));

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn forwarded(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(value));
        headers
    }

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_forwarded_for_ignored_without_trusted_proxy() {
        let headers = forwarded("203.0.113.7");

        let resolved = resolve_client_ip(&headers, Some(addr("198.51.100.4:5000")), &[]);

        assert_eq!(resolved, Some(ip("198.51.100.4")));
    }

    #[test]
    fn test_rotating_forwarded_for_keeps_one_bucket() {
        let peer = Some(addr("198.51.100.4:5000"));
        let first = ClientIp(resolve_client_ip(&forwarded("1.1.1.1"), peer, &[]));
        let second = ClientIp(resolve_client_ip(&forwarded("2.2.2.2"), peer, &[]));

        assert_eq!(first.bucket(), second.bucket());
    }

    #[test]
    fn test_trusted_proxy_uses_rightmost_untrusted_hop() {
        let proxies = [ip("10.0.0.2"), ip("10.0.0.1")];
        // Leftmost entry was supplied by the client
        let headers = forwarded("6.6.6.6, 203.0.113.7, 10.0.0.1");

        let resolved = resolve_client_ip(&headers, Some(addr("10.0.0.2:5000")), &proxies);

        assert_eq!(resolved, Some(ip("203.0.113.7")));
    }

    #[test]
    fn test_trusted_proxy_with_garbage_hop_falls_back_to_peer() {
        let proxies = [ip("10.0.0.2")];
        let headers = forwarded("203.0.113.7, not-an-ip");

        let resolved = resolve_client_ip(&headers, Some(addr("10.0.0.2:5000")), &proxies);

        assert_eq!(resolved, Some(ip("10.0.0.2")));
    }

    #[test]
    fn test_trusted_proxy_without_header_uses_peer() {
        let proxies = [ip("10.0.0.2")];

        let resolved = resolve_client_ip(&HeaderMap::new(), Some(addr("10.0.0.2:5000")), &proxies);

        assert_eq!(resolved, Some(ip("10.0.0.2")));
    }

    #[test]
    fn test_unknown_peer() {
        assert_eq!(resolve_client_ip(&forwarded("203.0.113.7"), None, &[]), None);
        assert_eq!(ClientIp(None).bucket(), "unknown");
        assert_eq!(ClientIp(None).to_audit(), None);
    }
}
