//! Client identity derivation from connection info and forwarding headers.
//!
//! # Design Decisions
//! - The peer socket address is the default identity, port stripped
//! - X-Forwarded-For / X-Real-IP are only honoured when explicitly trusted
//! - A request with no identity at all is an internal error, never a denial

use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Request};
use thiserror::Error;

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_REAL_IP: &str = "x-real-ip";

/// Failure to work out who sent a request.
#[derive(Debug, Error)]
pub enum ClientKeyError {
    #[error("request carries no peer address and no usable forwarding header")]
    MissingPeerAddr,
}

/// Derive the rate limiting key for a request.
pub fn client_key<B>(request: &Request<B>, trust_proxy_headers: bool) -> Result<String, ClientKeyError> {
    if trust_proxy_headers {
        if let Some(ip) = forwarded_ip(request.headers()) {
            return Ok(ip.to_string());
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .ok_or(ClientKeyError::MissingPeerAddr)
}

/// First valid address from X-Forwarded-For, then X-Real-IP.
fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let from_forwarded_for = headers
        .get(X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok());

    from_forwarded_for.or_else(|| {
        headers
            .get(X_REAL_IP)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    })
}
