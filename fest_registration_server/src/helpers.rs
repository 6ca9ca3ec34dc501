use std::{
    net::{IpAddr, SocketAddr},
    str::FromStr,
};

use actix_web::HttpRequest;
use log::{debug, trace};
use regex::Regex;

/// Get the remote IP address from the request. It uses 3 sources to determine the IP address, in decreasing order
/// of preference:
/// 1. The `X-Forwarded-For` header, iif `use_x_forwarded_for` is set to true in the configuration.
/// 2. The `Forwarded` header, iif `use_forwarded` is set to true in the configuration.
/// 3. The peer address from the connection info.
pub fn get_remote_ip(req: &HttpRequest, use_x_forwarded_for: bool, use_forwarded: bool) -> Option<IpAddr> {
    let mut result = None;
    if use_x_forwarded_for {
        trace!("💻️ Checking X-Forwarded-For header");
        // The left-most entry is the originating client
        result = req
            .headers()
            .get("X-Forwarded-For")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .and_then(parse_ip);
        if let Some(ip) = result {
            debug!("💻️ Using X-Forwarded-For header for remote address: {ip}");
        }
    }
    if use_forwarded && result.is_none() {
        trace!("💻️ Checking Forwarded header");
        result = req.headers().get("Forwarded").and_then(|v| v.to_str().ok()).and_then(forwarded_for);
        if let Some(ip) = result {
            debug!("💻️ Using Forwarded header for remote address: {ip}");
        }
    }
    result.or_else(|| {
        let peer_addr = req.connection_info().peer_addr().map(|a| a.to_string());
        trace!("💻️ Using peer address for remote address: {:?}", peer_addr);
        peer_addr.and_then(|s| parse_ip(&s))
    })
}

/// Extracts the first `for=` node of an RFC 7239 `Forwarded` header.
fn forwarded_for(header: &str) -> Option<IpAddr> {
    let re = Regex::new(r#"(?i)for=(?P<ip>"[^"]+"|[^;,\s]+)"#).ok()?;
    let caps = re.captures(header)?;
    let node = caps.name("ip")?.as_str().trim_matches('"');
    parse_ip(node)
}

/// Accepts bare addresses as well as `ip:port` and `[ipv6]:port` forms.
fn parse_ip(s: &str) -> Option<IpAddr> {
    let s = s.trim();
    IpAddr::from_str(s)
        .ok()
        .or_else(|| SocketAddr::from_str(s).ok().map(|a| a.ip()))
        .or_else(|| IpAddr::from_str(s.trim_start_matches('[').trim_end_matches(']')).ok())
}
