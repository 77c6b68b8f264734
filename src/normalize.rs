//! URL canonicalization.
//!
//! Every literal rule key, ignore entry and incoming request URL goes through
//! [`normalize`] so that `http://host/` and `http://host:80/` land on the same
//! key.

use url::{Host, Url};

/// Canonicalize a URL into a stable lookup key.
///
/// `http` and `https` URLs without an explicit port get their scheme default
/// (80 or 443) written into the authority. Path, query and fragment are
/// copied from the input as written, dot segments and escapes included.
/// Input that does not parse as a URL is returned unchanged and treated as
/// an opaque key.
pub fn normalize(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(url) => canonical(raw, &url),
        Err(_) => raw.to_string(),
    }
}

fn canonical(raw: &str, url: &Url) -> String {
    let default_port = match url.scheme() {
        "http" => 80,
        "https" => 443,
        _ => return url.to_string(),
    };
    let (Some(host), Some(tail)) = (url.host_str(), raw_tail(raw.trim())) else {
        return url.to_string();
    };

    let mut key = format!("{}://", url.scheme());
    if !url.username().is_empty() {
        key.push_str(url.username());
        if let Some(password) = url.password() {
            key.push(':');
            key.push_str(password);
        }
        key.push('@');
    }
    key.push_str(host);
    key.push(':');
    key.push_str(&url.port().unwrap_or(default_port).to_string());
    if !tail.starts_with('/') {
        key.push('/');
    }
    key.push_str(tail);
    key
}

/// Everything after the authority of `raw`, untouched. `None` when the input
/// has no `//` authority marker.
fn raw_tail(raw: &str) -> Option<&str> {
    let (_, rest) = raw.split_once("://")?;
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    Some(&rest[end..])
}

/// Hostname of a URL, if it parses and has one.
pub fn hostname(raw: &str) -> Option<String> {
    Url::parse(raw)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
}

/// Whether the URL targets a loopback host (`localhost`, 127.0.0.0/8, `::1`).
pub fn is_loopback(raw: &str) -> bool {
    let Ok(url) = Url::parse(raw) else {
        return false;
    };
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

/// Whether the string parses as an absolute URL with a host.
pub fn is_valid(raw: &str) -> bool {
    Url::parse(raw).map(|url| url.has_host()).unwrap_or(false)
}

/// Resolve a redirect `Location` against the URL that produced it.
pub fn resolve_location(base: &str, location: &str) -> String {
    Url::parse(location)
        .or_else(|_| Url::parse(base).and_then(|base| base.join(location)))
        .map(|url| url.to_string())
        .unwrap_or_else(|_| location.to_string())
}
