//! HTTP proxy selection from the environment
//!
//! Follows the usual `HTTP_PROXY` / `HTTPS_PROXY` / `NO_PROXY` convention:
//! upper-case names win over lower-case ones, loopback targets are never
//! proxied, and a proxy value without a scheme is taken as `http://`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use percent_encoding::percent_decode_str;
use std::net::IpAddr;
use url::Url;

use crate::error::{Result, TunnelError};

/// Raw proxy environment values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxySettings {
    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,
    pub no_proxy: Option<String>,
}

/// A proxy selected for one target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyInfo {
    /// `host:port` to connect to (IPv6 hosts bracketed)
    pub addr: String,
    /// Decoded `user:password` from the proxy URL
    pub credentials: Option<(String, String)>,
}

impl ProxyInfo {
    /// Value for a `Proxy-Authorization` header, if credentials are set
    pub fn authorization(&self) -> Option<String> {
        self.credentials.as_ref().map(|(user, password)| {
            format!("Basic {}", BASE64.encode(format!("{}:{}", user, password)))
        })
    }
}

impl ProxySettings {
    /// Read settings from the process environment
    pub fn from_env() -> Self {
        // Under CGI, HTTP_PROXY may be a client-controlled request header
        let cgi = std::env::var_os("REQUEST_METHOD").is_some();
        Self {
            http_proxy: if cgi {
                None
            } else {
                env_first(&["HTTP_PROXY", "http_proxy"])
            },
            https_proxy: env_first(&["HTTPS_PROXY", "https_proxy"]),
            no_proxy: env_first(&["NO_PROXY", "no_proxy"]),
        }
    }

    /// Settings that never select a proxy
    pub fn direct() -> Self {
        Self::default()
    }

    /// Pick the proxy for `target`, or `None` to connect directly
    pub fn proxy_for(&self, target: &Url) -> Result<Option<ProxyInfo>> {
        let raw = match target.scheme() {
            "http" | "ws" => self.http_proxy.as_deref(),
            "https" | "wss" => self.https_proxy.as_deref(),
            _ => None,
        };
        let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
            return Ok(None);
        };

        let host = target
            .host_str()
            .ok_or_else(|| TunnelError::connect(format!("no host in {}", target)))?;
        let port = target.port_or_known_default().unwrap_or(80);
        if is_loopback(host) || self.bypassed(host, port) {
            return Ok(None);
        }

        parse_proxy(raw.trim()).map(Some)
    }

    fn bypassed(&self, host: &str, port: u16) -> bool {
        let Some(no_proxy) = self.no_proxy.as_deref() else {
            return false;
        };
        let host = host.to_ascii_lowercase();

        no_proxy
            .split(',')
            .map(|entry| entry.trim().to_ascii_lowercase())
            .filter(|entry| !entry.is_empty())
            .any(|entry| {
                if entry == "*" {
                    return true;
                }
                let (pattern, entry_port) = split_port(&entry);
                if entry_port.is_some_and(|p| p != port) {
                    return false;
                }
                match pattern.strip_prefix("*.").or_else(|| pattern.strip_prefix('.')) {
                    // Leading dot: subdomains only
                    Some(domain) => host.ends_with(&format!(".{}", domain)),
                    None => host == pattern || host.ends_with(&format!(".{}", pattern)),
                }
            })
    }
}

fn env_first(names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))
}

fn is_loopback(host: &str) -> bool {
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    host.trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .map(|ip| ip.is_loopback())
        .unwrap_or(false)
}

/// Split an optional `:port` suffix off a NO_PROXY entry
fn split_port(entry: &str) -> (&str, Option<u16>) {
    if let Some(rest) = entry.strip_prefix('[') {
        if let Some((ip, tail)) = rest.split_once(']') {
            return (ip, tail.strip_prefix(':').and_then(|p| p.parse().ok()));
        }
    }
    match entry.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => match port.parse() {
            Ok(port) => (host, Some(port)),
            Err(_) => (entry, None),
        },
        _ => (entry, None),
    }
}

fn parse_proxy(raw: &str) -> Result<ProxyInfo> {
    // "proxy.local:3128" would otherwise parse with scheme "proxy.local"
    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{}", raw)
    };
    let url = Url::parse(&with_scheme)
        .map_err(|e| TunnelError::ProxyConfig(format!("{:?}: {}", raw, e)))?;

    if url.scheme() != "http" {
        return Err(TunnelError::ProxyConfig(format!(
            "unsupported proxy scheme {:?}",
            url.scheme()
        )));
    }
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| TunnelError::ProxyConfig(format!("no host in {:?}", raw)))?;
    let port = url.port_or_known_default().unwrap_or(80);

    let credentials = if url.username().is_empty() {
        None
    } else {
        Some((
            percent_decode(url.username()),
            percent_decode(url.password().unwrap_or_default()),
        ))
    };

    Ok(ProxyInfo {
        addr: format!("{}:{}", host, port),
        credentials,
    })
}

fn percent_decode(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}
