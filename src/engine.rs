//! The interception engine.

use crate::client::{
    Body, ClientResponse, Disconnected, Headers, HttpClient, OutgoingRequest, Payload,
    RequestOptions, RequestTarget, ResponseCallback, Scheme,
};
use crate::config::FixtureConfig;
use crate::error::{ConnectionError, FakewebError, Result};
use crate::normalize::{normalize, resolve_location};
use crate::policy::{NetworkPolicy, Verdict};
use crate::registry::{Registration, Registry};
use crate::spy::CallSpy;
use crate::stream::FakeRequest;
use crate::template::{BodyRequest, TemplateEngine};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Redirect hops followed before giving up.
pub const MAX_REDIRECTS: usize = 10;

/// Deterministic stand-in for an HTTP client.
///
/// Requests that match a registered rule get a canned response. Anything else
/// is forwarded to the upstream client or refused, depending on the
/// [`NetworkPolicy`].
pub struct FakeWeb {
    registry: Registry,
    policy: NetworkPolicy,
    templates: Arc<TemplateEngine>,
    upstream: Box<dyn HttpClient + Send + Sync>,
    /// Total calls through any entry point.
    requests_total: AtomicU64,
    requests_intercepted: AtomicU64,
    requests_forwarded: AtomicU64,
    requests_denied: AtomicU64,
}

impl Default for FakeWeb {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FakeWeb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeWeb")
            .field("registry", &self.registry)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl FakeWeb {
    /// Engine with no rules, default policy and no real network behind it.
    pub fn new() -> Self {
        Self::with_upstream(Disconnected)
    }

    /// Engine that forwards unmatched calls to `upstream`.
    pub fn with_upstream(upstream: impl HttpClient + Send + Sync + 'static) -> Self {
        Self {
            registry: Registry::new(),
            policy: NetworkPolicy::default(),
            templates: Arc::new(TemplateEngine::new()),
            upstream: Box::new(upstream),
            requests_total: AtomicU64::new(0),
            requests_intercepted: AtomicU64::new(0),
            requests_forwarded: AtomicU64::new(0),
            requests_denied: AtomicU64::new(0),
        }
    }

    /// Engine set up from a fixture configuration.
    pub fn from_config(config: &FixtureConfig) -> anyhow::Result<Self> {
        let mut web = Self::new();
        web.apply_config(config)?;
        Ok(web)
    }

    /// Load a fixture file into this engine, on top of existing rules.
    pub fn load_fixtures(&mut self, path: &Path) -> anyhow::Result<()> {
        let config = FixtureConfig::from_file(path)?;
        self.apply_config(&config)
    }

    fn apply_config(&mut self, config: &FixtureConfig) -> anyhow::Result<()> {
        config.validate()?;
        self.policy.allow_net_connect = config.settings.allow_net_connect;
        self.policy.allow_local_connect = config.settings.allow_local_connect;
        for uri in &config.ignore {
            self.ignore_uri(uri);
        }
        for (i, rule) in config.rules.iter().enumerate() {
            let registration = rule
                .to_registration()
                .map_err(|e| anyhow::anyhow!("Rule {}: {}", i, e))?;
            self.register_uri(registration);
        }
        info!(
            rules = config.rules.len(),
            ignored = config.ignore.len(),
            allow_net_connect = self.policy.allow_net_connect,
            "Fixtures loaded"
        );
        Ok(())
    }

    /// Register a rule and return its spy.
    pub fn register_uri(&mut self, registration: Registration) -> Arc<CallSpy> {
        self.registry.register(registration)
    }

    /// Always forward this URL, even with the network disabled.
    pub fn ignore_uri(&mut self, uri: &str) {
        info!(uri = %normalize(uri), "Ignoring URI");
        self.policy.ignore(uri);
    }

    /// Drop all rules and ignores and restore the default policy.
    pub fn tear_down(&mut self) {
        self.registry.clear();
        self.policy.reset();
        info!("Fakeweb torn down");
    }

    pub fn allow_net_connect(&self) -> bool {
        self.policy.allow_net_connect
    }

    pub fn set_allow_net_connect(&mut self, allow: bool) {
        self.policy.allow_net_connect = allow;
    }

    pub fn allow_local_connect(&self) -> bool {
        self.policy.allow_local_connect
    }

    pub fn set_allow_local_connect(&mut self, allow: bool) {
        self.policy.allow_local_connect = allow;
    }

    pub fn policy(&self) -> &NetworkPolicy {
        &self.policy
    }

    pub fn policy_mut(&mut self) -> &mut NetworkPolicy {
        &mut self.policy
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn is_ignored(&self, uri: &str) -> bool {
        self.policy.is_ignored(uri)
    }

    /// Registered key+method pairs.
    pub fn rule_count(&self) -> usize {
        self.registry.rule_count()
    }

    pub fn pattern_count(&self) -> usize {
        self.registry.pattern_count()
    }

    /// Classify a request without issuing it.
    pub fn is_intercepted(&self, url: Option<&str>, method: &str) -> Verdict {
        self.policy.check(&self.registry, url, method)
    }

    pub fn total_requests(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn total_intercepted(&self) -> u64 {
        self.requests_intercepted.load(Ordering::Relaxed)
    }

    pub fn total_forwarded(&self) -> u64 {
        self.requests_forwarded.load(Ordering::Relaxed)
    }

    pub fn total_denied(&self) -> u64 {
        self.requests_denied.load(Ordering::Relaxed)
    }

    /// Run the policy check for one call and bump the counters.
    fn guard(&self, url: Option<&str>, method: &str) -> Verdict {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        let verdict = self.is_intercepted(url, method);
        let counter = match &verdict {
            Verdict::Intercept(_) => &self.requests_intercepted,
            Verdict::Forward => &self.requests_forwarded,
            Verdict::Deny(_) => &self.requests_denied,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        verdict
    }

    fn get_following(&self, options: RequestOptions, hops: usize) -> Result<ClientResponse> {
        let spec = match self.guard(Some(&options.uri), "GET") {
            Verdict::Intercept(result) => result.spec,
            Verdict::Forward => return self.upstream.get(options),
            Verdict::Deny(err) => return Err(err),
        };

        spec.spy().record_use();
        if spec.simulates_failure() {
            return Err(ConnectionError::refused().into());
        }

        let status_code = spec.next_status();
        if (300..400).contains(&status_code) && options.follow_redirect {
            if let Some(location) = spec.location() {
                if hops >= MAX_REDIRECTS {
                    return Err(FakewebError::TooManyRedirects {
                        url: options.uri,
                        limit: MAX_REDIRECTS,
                    });
                }
                let target = resolve_location(&options.uri, location);
                debug!(from = %options.uri, to = %target, status = status_code, "Following redirect");
                let next = RequestOptions {
                    uri: target,
                    ..options
                };
                return self.get_following(next, hops + 1);
            }
        }

        let url = normalize(&options.uri);
        let request = BodyRequest {
            url: &url,
            method: "GET",
            payload: &Payload::Empty,
        };
        let response = spec.respond(status_code, &request, &self.templates)?;
        deliver(response.status_code, response.headers, response.body, options.json)
    }
}

/// Callback-shim delivery: optionally parse the body as JSON. A JSON request
/// against an empty rule fails to parse like an empty document.
fn deliver(
    status_code: u16,
    headers: Headers,
    body: Option<Body>,
    json: bool,
) -> Result<ClientResponse> {
    let body = match body {
        Some(body) if json => Some(body.into_json()?),
        None if json => Some(Body::Text(String::new()).into_json()?),
        body => body,
    };
    Ok(ClientResponse {
        status_code,
        headers,
        body,
    })
}

impl HttpClient for FakeWeb {
    fn get(&self, options: RequestOptions) -> Result<ClientResponse> {
        self.get_following(options, 0)
    }

    fn post(&self, options: RequestOptions) -> Result<ClientResponse> {
        let spec = match self.guard(Some(&options.uri), "POST") {
            Verdict::Intercept(result) => result.spec,
            Verdict::Forward => return self.upstream.post(options),
            Verdict::Deny(err) => return Err(err),
        };

        let spy = spec.spy();
        spy.record_use();
        spy.capture_post(options.body.clone(), options.form.clone());
        if spec.simulates_failure() {
            return Err(ConnectionError::refused().into());
        }

        let url = normalize(&options.uri);
        let payload = Payload::from_post(options.body.as_deref(), options.form.as_ref());
        let request = BodyRequest {
            url: &url,
            method: "POST",
            payload: &payload,
        };
        let response = spec.resolve(&request, &self.templates)?;
        deliver(response.status_code, response.headers, response.body, options.json)
    }

    fn request(
        &self,
        scheme: Scheme,
        target: RequestTarget,
        on_response: Option<ResponseCallback>,
    ) -> Result<Box<dyn OutgoingRequest>> {
        let url = target.to_url(scheme);
        let method = target.method();
        let spec = match self.guard(url.as_deref(), &method) {
            Verdict::Intercept(result) => result.spec,
            Verdict::Forward => return self.upstream.request(scheme, target, on_response),
            Verdict::Deny(err) => return Err(err),
        };

        spec.spy().record_use();
        let url = normalize(url.as_deref().unwrap_or_default());
        Ok(Box::new(FakeRequest::new(
            spec,
            url,
            method,
            Arc::clone(&self.templates),
            on_response,
        )))
    }
}
