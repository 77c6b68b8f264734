//! Network policy: decides whether an unmatched request may reach the
//! real network.

use crate::error::FakewebError;
use crate::matcher::MatchResult;
use crate::normalize::{is_loopback, is_valid, normalize};
use crate::registry::Registry;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Process-wide policy flags plus the ignore set.
#[derive(Debug, Clone)]
pub struct NetworkPolicy {
    /// Forward unmatched requests instead of denying them.
    pub allow_net_connect: bool,
    /// Forward unmatched loopback requests even when the network is off.
    pub allow_local_connect: bool,
    ignored: HashSet<String>,
}

impl Default for NetworkPolicy {
    fn default() -> Self {
        Self {
            allow_net_connect: true,
            allow_local_connect: true,
            ignored: HashSet::new(),
        }
    }
}

/// Outcome of checking one request.
#[derive(Debug)]
pub enum Verdict {
    /// A rule answers the request.
    Intercept(MatchResult),
    /// Hand the request to the real client untouched.
    Forward,
    /// Policy violation to be returned to the caller.
    Deny(FakewebError),
}

impl Verdict {
    pub fn is_intercept(&self) -> bool {
        matches!(self, Verdict::Intercept(_))
    }

    pub fn is_forward(&self) -> bool {
        matches!(self, Verdict::Forward)
    }

    pub fn is_deny(&self) -> bool {
        matches!(self, Verdict::Deny(_))
    }
}

impl NetworkPolicy {
    /// Exempt a URL from denial. Stored normalized.
    pub fn ignore(&mut self, uri: &str) {
        self.ignored.insert(normalize(uri));
    }

    pub fn is_ignored(&self, uri: &str) -> bool {
        self.ignored.contains(&normalize(uri))
    }

    pub fn ignored_count(&self) -> usize {
        self.ignored.len()
    }

    /// Back to defaults: network allowed, loopback allowed, nothing ignored.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Classify a request.
    ///
    /// `url` is `None` when the caller's options could not be turned into a
    /// URL at all.
    pub fn check(&self, registry: &Registry, url: Option<&str>, method: &str) -> Verdict {
        let method = method.to_uppercase();
        let url = url.map(normalize);

        if let Some(url) = &url {
            if let Some(result) = registry.find_match(url, &method) {
                debug!(rule = %result.rule, method = %method, url = %url, "Request intercepted");
                return Verdict::Intercept(result);
            }
        }

        let ignored = url.as_ref().is_some_and(|u| self.ignored.contains(u));
        if ignored || self.allow_net_connect {
            debug!(method = %method, url = ?url, ignored, "Request forwarded");
            return Verdict::Forward;
        }

        let url = match url {
            Some(url) if !url.is_empty() && is_valid(&url) => url,
            _ => {
                warn!(method = %method, "FAKEWEB: Invalid request");
                return Verdict::Deny(FakewebError::InvalidRequest);
            }
        };

        if self.allow_local_connect && is_loopback(&url) {
            debug!(method = %method, url = %url, "Local request forwarded");
            return Verdict::Forward;
        }

        let err = FakewebError::UnhandledRequest { method, url };
        warn!("{}", err);
        Verdict::Deny(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registration;

    fn closed() -> NetworkPolicy {
        NetworkPolicy {
            allow_net_connect: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let policy = NetworkPolicy::default();
        assert!(policy.allow_net_connect);
        assert!(policy.allow_local_connect);
        assert_eq!(policy.ignored_count(), 0);
    }

    #[test]
    fn test_match_intercepts_regardless_of_policy() {
        let mut registry = Registry::new();
        registry.register(Registration::new("http://x.test/a"));

        assert!(closed().check(&registry, Some("http://x.test/a"), "GET").is_intercept());
        assert!(NetworkPolicy::default()
            .check(&registry, Some("http://x.test/a"), "GET")
            .is_intercept());
    }

    #[test]
    fn test_open_network_forwards() {
        let registry = Registry::new();
        let verdict = NetworkPolicy::default().check(&registry, Some("http://www.test.com/"), "GET");
        assert!(verdict.is_forward());
    }

    #[test]
    fn test_closed_network_denies_with_method_and_url() {
        let registry = Registry::new();
        match closed().check(&registry, Some("http://www.test.com/"), "post") {
            Verdict::Deny(FakewebError::UnhandledRequest { method, url }) => {
                assert_eq!(method, "POST");
                assert_eq!(url, "http://www.test.com:80/");
            }
            other => panic!("expected unhandled request, got {:?}", other),
        }
    }

    #[test]
    fn test_uncovered_method_is_denied() {
        let mut registry = Registry::new();
        registry.register(Registration::new("http://x.test/a").method("POST"));

        assert!(closed().check(&registry, Some("http://x.test/a"), "GET").is_deny());
        assert!(NetworkPolicy::default()
            .check(&registry, Some("http://x.test/a"), "GET")
            .is_forward());
    }

    #[test]
    fn test_local_exception() {
        let registry = Registry::new();
        let mut policy = closed();
        assert!(policy.check(&registry, Some("http://localhost:4324"), "GET").is_forward());
        assert!(policy.check(&registry, Some("http://127.0.0.1/"), "GET").is_forward());

        policy.allow_local_connect = false;
        assert!(policy.check(&registry, Some("http://localhost:4324"), "GET").is_deny());
    }

    #[test]
    fn test_ignored_uri_forwards_without_local_exception() {
        let registry = Registry::new();
        let mut policy = closed();
        policy.allow_local_connect = false;
        policy.ignore("http://www.google.com:80/");

        assert!(policy.is_ignored("http://www.google.com/"));
        assert!(policy.check(&registry, Some("http://www.google.com/"), "GET").is_forward());
        assert!(policy.check(&registry, Some("http://www.google.com/x"), "GET").is_deny());
    }

    #[test]
    fn test_invalid_request() {
        let registry = Registry::new();
        let verdict = closed().check(&registry, None, "GET");
        assert!(matches!(verdict, Verdict::Deny(FakewebError::InvalidRequest)));

        let verdict = closed().check(&registry, Some("garbage"), "GET");
        assert!(matches!(verdict, Verdict::Deny(FakewebError::InvalidRequest)));
    }

    #[test]
    fn test_invalid_request_forwards_when_network_open() {
        let registry = Registry::new();
        assert!(NetworkPolicy::default().check(&registry, None, "GET").is_forward());
    }

    #[test]
    fn test_reset_restores_defaults() {
        let mut policy = closed();
        policy.allow_local_connect = false;
        policy.ignore("http://x.test/");
        policy.reset();

        assert!(policy.allow_net_connect);
        assert!(policy.allow_local_connect);
        assert!(!policy.is_ignored("http://x.test/"));
    }
}
