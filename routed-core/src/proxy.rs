//! Trusted-proxy and client-IP resolution.

use http::{HeaderMap, HeaderName};
use std::net::IpAddr;

/// A single trusted entry: an exact IP or a CIDR block.
#[derive(Debug, Clone)]
pub struct TrustedEntry {
    network: IpAddr,
    prefix_len: u8,
}

impl TrustedEntry {
    /// Parse either a bare IP (treated as a /32 or /128) or a `addr/prefix`
    /// CIDR. Returns `None` on anything unparseable; the caller (engine
    /// `build()`) turns that into a `ConfigurationError`.
    pub fn parse(entry: &str) -> Option<TrustedEntry> {
        match entry.split_once('/') {
            Some((addr, prefix)) => {
                let network: IpAddr = addr.parse().ok()?;
                let max_bits = if network.is_ipv4() { 32 } else { 128 };
                let prefix_len: u8 = prefix.parse().ok()?;
                if prefix_len > max_bits {
                    return None;
                }
                Some(TrustedEntry {
                    network,
                    prefix_len,
                })
            }
            None => {
                let network: IpAddr = entry.parse().ok()?;
                let prefix_len = if network.is_ipv4() { 32 } else { 128 };
                Some(TrustedEntry {
                    network,
                    prefix_len,
                })
            }
        }
    }

    fn contains(&self, candidate: &IpAddr) -> bool {
        match (self.network, candidate) {
            (IpAddr::V4(net), IpAddr::V4(cand)) => {
                let mask = mask_for(self.prefix_len, 32);
                (u32::from(net) & mask) == (u32::from(*cand) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(cand)) => {
                let mask = mask_for(self.prefix_len, 128);
                (u128::from(net) & mask) == (u128::from(*cand) & mask)
            }
            _ => false,
        }
    }
}

fn mask_for(prefix_len: u8, total_bits: u32) -> u128 {
    if prefix_len == 0 {
        0
    } else {
        u128::MAX << (total_bits - prefix_len as u32)
    }
}

/// The resolved policy used by `Context::client_ip` — the parsed, validated
/// form of `EngineConfig`'s trusted-proxy fields.
#[derive(Debug, Clone)]
pub struct ClientIpPolicy {
    /// Master switch (`forwardedByClientIP` in config): when `false`,
    /// `resolve` always returns the direct remote address, regardless of
    /// the feature flags below. The two finer-grained `features.*` flags
    /// refine this rather than replace it (see DESIGN.md).
    pub forwarded_by_client_ip: bool,
    pub enable_proxy_support: bool,
    pub enable_trusted_platform: bool,
    pub trusted_proxies: Vec<TrustedEntry>,
    pub trusted_platform_header: Option<HeaderName>,
    pub remote_ip_headers: Vec<HeaderName>,
}

impl Default for ClientIpPolicy {
    fn default() -> Self {
        ClientIpPolicy {
            forwarded_by_client_ip: true,
            enable_proxy_support: false,
            enable_trusted_platform: false,
            trusted_proxies: Vec::new(),
            trusted_platform_header: None,
            remote_ip_headers: Vec::new(),
        }
    }
}

impl ClientIpPolicy {
    fn is_trusted(&self, remote: &IpAddr) -> bool {
        self.trusted_proxies.iter().any(|entry| entry.contains(remote))
    }

    /// Resolve the effective client IP: trusted-platform header first, then
    /// proxy headers, then the direct remote address.
    pub fn resolve(&self, remote: IpAddr, headers: &HeaderMap) -> IpAddr {
        if !self.forwarded_by_client_ip {
            return remote;
        }

        if self.enable_trusted_platform && self.is_trusted(&remote) {
            if let Some(header) = &self.trusted_platform_header {
                if let Some(value) = headers.get(header).and_then(|v| v.to_str().ok()) {
                    let first = value.split(',').next().unwrap_or(value).trim();
                    if let Ok(ip) = first.parse::<IpAddr>() {
                        return ip;
                    }
                }
            }
        }

        if self.enable_proxy_support && self.is_trusted(&remote) {
            for header in &self.remote_ip_headers {
                if let Some(value) = headers.get(header).and_then(|v| v.to_str().ok()) {
                    let first = value.split(',').next().unwrap_or("").trim();
                    if !first.is_empty() {
                        if let Ok(ip) = first.parse::<IpAddr>() {
                            return ip;
                        }
                    }
                }
            }
        }

        remote
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn untrusted_remote_ignores_headers() {
        let policy = ClientIpPolicy {
            enable_proxy_support: true,
            trusted_proxies: vec![TrustedEntry::parse("10.0.0.0/8").unwrap()],
            remote_ip_headers: vec![HeaderName::from_static("x-forwarded-for")],
            ..Default::default()
        };
        let remote: IpAddr = "198.51.100.2".parse().unwrap();
        let headers = headers(&[("x-forwarded-for", "203.0.113.5")]);
        assert_eq!(policy.resolve(remote, &headers), remote);
    }

    #[test]
    fn trusted_remote_uses_first_forwarded_value() {
        let policy = ClientIpPolicy {
            enable_proxy_support: true,
            trusted_proxies: vec![TrustedEntry::parse("10.0.0.0/8").unwrap()],
            remote_ip_headers: vec![HeaderName::from_static("x-forwarded-for")],
            ..Default::default()
        };
        let remote: IpAddr = "10.1.2.3".parse().unwrap();
        let headers = headers(&[("x-forwarded-for", "203.0.113.5, 10.0.0.1")]);
        assert_eq!(policy.resolve(remote, &headers), "203.0.113.5".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn trusted_platform_header_takes_priority() {
        let policy = ClientIpPolicy {
            enable_proxy_support: true,
            enable_trusted_platform: true,
            trusted_proxies: vec![TrustedEntry::parse("10.0.0.0/8").unwrap()],
            trusted_platform_header: Some(HeaderName::from_static("cf-connecting-ip")),
            remote_ip_headers: vec![HeaderName::from_static("x-forwarded-for")],
        };
        let remote: IpAddr = "10.1.2.3".parse().unwrap();
        let headers = headers(&[
            ("cf-connecting-ip", "203.0.113.9"),
            ("x-forwarded-for", "203.0.113.5"),
        ]);
        assert_eq!(policy.resolve(remote, &headers), "203.0.113.9".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn cidr_v6_block_matches() {
        let entry = TrustedEntry::parse("2001:db8::/32").unwrap();
        assert!(entry.contains(&"2001:db8::1".parse().unwrap()));
        assert!(!entry.contains(&"2001:db9::1".parse().unwrap()));
    }
}
