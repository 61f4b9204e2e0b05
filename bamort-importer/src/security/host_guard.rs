//! Adapter host allow-list and SSRF guard
//!
//! Every adapter base URL is checked before the first request is sent to it:
//! the host must be on the configured allow-list and must not name a
//! loopback, private or link-local address. With `resolve_dns` enabled the
//! resolved addresses are checked as well.

use super::SecurityError;
use bamort_common::config::SecurityConfig;
use reqwest::Url;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Allow-list of adapter hosts
#[derive(Debug, Clone)]
pub struct HostGuard {
    allowed: Vec<String>,
    resolve_dns: bool,
}

impl HostGuard {
    /// Entries are `host` or `host:port`, compared case-insensitively
    pub fn new(allowed: &[String], resolve_dns: bool) -> Self {
        Self {
            allowed: allowed
                .iter()
                .map(|entry| entry.trim().to_lowercase())
                .filter(|entry| !entry.is_empty())
                .collect(),
            resolve_dns,
        }
    }

    /// Guard for the `[security]` section; an empty allow-list admits no host
    pub fn from_config(config: &SecurityConfig) -> Self {
        Self::new(&config.allowed_adapter_hosts, config.resolve_adapter_hosts)
    }

    /// Check `base_url`, including resolved addresses when configured
    pub async fn check(&self, base_url: &str) -> Result<(), SecurityError> {
        let url = self.check_static(base_url)?;
        if !self.resolve_dns {
            return Ok(());
        }

        let host = url.host_str().unwrap_or_default().to_string();
        let port = url.port_or_known_default().unwrap_or(80);
        let addrs: Vec<_> = tokio::net::lookup_host((host.as_str(), port))
            .await
            .map_err(|e| rejected(&host, &format!("DNS lookup failed: {}", e)))?
            .collect();

        if let Some(addr) = addrs.iter().find(|addr| is_forbidden_ip(&addr.ip())) {
            return Err(rejected(&host, &format!("resolves to forbidden address {}", addr.ip())));
        }

        Ok(())
    }

    /// Check scheme, allow-list and literal address without network access
    pub fn check_static(&self, base_url: &str) -> Result<Url, SecurityError> {
        let url = Url::parse(base_url).map_err(|e| SecurityError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(SecurityError::InvalidUrl(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }

        let host = url
            .host_str()
            .ok_or_else(|| SecurityError::InvalidUrl(format!("{}: missing host", base_url)))?
            .to_lowercase();

        if host == "localhost" || host.ends_with(".localhost") {
            return Err(rejected(&host, "loopback host name"));
        }

        let bare = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = bare.parse::<IpAddr>() {
            if is_forbidden_ip(&ip) {
                return Err(rejected(&host, "loopback, private or link-local address"));
            }
        }

        if !self.is_allowed(&host, url.port_or_known_default()) {
            return Err(rejected(&host, "not on the adapter allow-list"));
        }

        Ok(url)
    }

    fn is_allowed(&self, host: &str, port: Option<u16>) -> bool {
        let with_port = port.map(|p| format!("{}:{}", host, p));
        self.allowed
            .iter()
            .any(|entry| entry == host || with_port.as_deref() == Some(entry.as_str()))
    }
}

fn rejected(host: &str, reason: &str) -> SecurityError {
    SecurityError::HostRejected {
        host: host.to_string(),
        reason: reason.to_string(),
    }
}

/// Loopback, private, link-local, unspecified and shared address space
pub fn is_forbidden_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_forbidden_v4(v4),
        IpAddr::V6(v6) => is_forbidden_v6(v6),
    }
}

fn is_forbidden_v4(ip: &Ipv4Addr) -> bool {
    let octets = ip.octets();
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        // 100.64.0.0/10 carrier-grade NAT
        || (octets[0] == 100 && (octets[1] & 0xc0) == 64)
}

fn is_forbidden_v6(ip: &Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_forbidden_v4(&v4);
    }
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        // fc00::/7 unique local
        || (first & 0xfe00) == 0xfc00
        // fe80::/10 link-local
        || (first & 0xffc0) == 0xfe80
}
