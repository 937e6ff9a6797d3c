//! Global per-IP request rate limiting (spec 4.13), the direct
//! generalization of the teacher's `http::rate_limit::sensitive_rate_limit_middleware`
//! from a fixed per-endpoint policy table down to one global
//! `shared::guardrails::RequestRateLimiter` policy. Remote-IP resolution
//! (trusted-proxy chain, `x-forwarded-for`, `x-real-ip`) is ported
//! verbatim from the teacher's `remote_ip`/`forwarded_client_ip`.

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;

use super::errors::app_error_response;
use super::observability::RequestContext;
use super::AppState;

pub(super) async fn request_rate_limit_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let request_id = req
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let ip = remote_ip(&req, &state.trusted_proxy_ips);
    let subject = ip.map(|ip| ip.to_string()).unwrap_or_else(|| "unknown".to_string());

    match state.request_limiter.check(&subject) {
        Ok(()) => next.run(req).await,
        Err(err) => app_error_response(&err, &request_id),
    }
}

fn remote_ip(req: &Request, trusted_proxy_ips: &HashSet<IpAddr>) -> Option<IpAddr> {
    let peer_ip = req.extensions().get::<ConnectInfo<SocketAddr>>().map(|connect_info| connect_info.0.ip())?;

    if !trusted_proxy_ips.contains(&peer_ip) {
        return Some(peer_ip);
    }

    forwarded_client_ip(req, trusted_proxy_ips, peer_ip).or(Some(peer_ip))
}

fn forwarded_client_ip(req: &Request, trusted_proxy_ips: &HashSet<IpAddr>, peer_ip: IpAddr) -> Option<IpAddr> {
    let mut chain = forwarded_for_chain(req);
    if !chain.is_empty() {
        chain.push(peer_ip);
        if let Some(client_ip) = first_untrusted_from_right(&chain, trusted_proxy_ips) {
            return Some(client_ip);
        }
    }

    req.headers().get("x-real-ip").and_then(|value| value.to_str().ok()).and_then(|value| value.trim().parse::<IpAddr>().ok())
}

fn forwarded_for_chain(req: &Request) -> Vec<IpAddr> {
    req.headers().get_all("x-forwarded-for").iter().filter_map(|value| value.to_str().ok()).flat_map(parse_ip_chain).collect()
}

fn parse_ip_chain(raw: &str) -> Vec<IpAddr> {
    raw.split(',').map(str::trim).filter(|entry| !entry.is_empty()).filter_map(|entry| entry.parse::<IpAddr>().ok()).collect()
}

fn first_untrusted_from_right(chain: &[IpAddr], trusted_proxy_ips: &HashSet<IpAddr>) -> Option<IpAddr> {
    chain.iter().rev().find(|ip| !trusted_proxy_ips.contains(ip)).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::header::HeaderName;

    #[test]
    fn prefers_connect_info_over_spoofable_forward_headers() {
        let trusted_proxy_ips = HashSet::new();
        let mut request = Request::builder().uri("/api/v1/stores").body(Body::empty()).expect("request builder should work");
        request.headers_mut().insert(HeaderName::from_static("x-forwarded-for"), "203.0.113.99".parse().expect("header value should parse"));
        request.extensions_mut().insert(ConnectInfo(SocketAddr::from(([10, 20, 30, 40], 8080))));

        assert_eq!(remote_ip(&request, &trusted_proxy_ips), Some(IpAddr::from([10, 20, 30, 40])));
    }

    #[test]
    fn uses_forwarded_chain_when_peer_is_a_trusted_proxy() {
        let trusted_proxy_ips = HashSet::from([IpAddr::from([10, 0, 0, 5])]);
        let mut request = Request::builder().uri("/api/v1/stores").body(Body::empty()).expect("request builder should work");
        request.headers_mut().insert(HeaderName::from_static("x-forwarded-for"), "198.51.100.20, 10.0.0.5".parse().expect("header value should parse"));
        request.extensions_mut().insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 5], 8080))));

        assert_eq!(remote_ip(&request, &trusted_proxy_ips), Some(IpAddr::from([198, 51, 100, 20])));
    }
}
