//! Rule storage.
//!
//! Literal rules live in a map keyed by normalized URL; pattern rules in a
//! list kept in registration order. Both hold a method table mapping an
//! upper-cased method name (or `ANY`) to a [`ResponseSpec`].

use crate::client::{Body, Headers, Payload};
use crate::matcher::{method_key, Pattern, UriKey, ANY_METHOD};
use crate::response::{BodySource, ResponseSpec, StatusCode};
use crate::spy::CallSpy;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Everything needed to register one rule.
#[derive(Debug, Clone)]
pub struct Registration {
    pub uri: UriKey,
    /// `None` registers for every method.
    pub method: Option<String>,
    pub body: BodySource,
    pub status: StatusCode,
    pub headers: Headers,
    /// Written into the response headers as `content-type`.
    pub content_type: Option<String>,
    /// Fail with a refused connection instead of responding.
    pub exception: bool,
}

impl Registration {
    pub fn new(uri: impl Into<UriKey>) -> Self {
        Self {
            uri: uri.into(),
            method: None,
            body: BodySource::Empty,
            status: StatusCode::default(),
            headers: Headers::new(),
            content_type: None,
            exception: false,
        }
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Static body returned as-is.
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = BodySource::Static(body.into());
        self
    }

    /// Body computed from the request payload on every call.
    pub fn body_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&Payload) -> Option<Body> + Send + Sync + 'static,
    {
        self.body = BodySource::Function(Arc::new(f));
        self
    }

    /// Text file re-read on every call.
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.body = BodySource::File(path.into());
        self
    }

    /// Binary file re-read on every call.
    pub fn binary_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.body = BodySource::BinaryFile(path.into());
        self
    }

    /// Handlebars template rendered against the request.
    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.body = BodySource::Template(template.into());
        self
    }

    pub fn status(mut self, status: impl Into<StatusCode>) -> Self {
        self.status = status.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn exception(mut self) -> Self {
        self.exception = true;
        self
    }
}

/// Per-rule mapping from method to response spec.
#[derive(Debug, Default)]
pub struct MethodTable {
    entries: HashMap<String, Arc<ResponseSpec>>,
}

impl MethodTable {
    fn insert(&mut self, method: String, spec: Arc<ResponseSpec>) -> bool {
        self.entries.insert(method, spec).is_some()
    }

    /// Exact method first, then `ANY`. The flag tells whether `ANY` answered.
    pub(crate) fn lookup(&self, method: &str) -> Option<(Arc<ResponseSpec>, bool)> {
        if let Some(spec) = self.entries.get(method) {
            return Some((Arc::clone(spec), false));
        }
        self.entries
            .get(ANY_METHOD)
            .map(|spec| (Arc::clone(spec), true))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A pattern and its method table.
#[derive(Debug)]
pub struct PatternRule {
    pub pattern: Pattern,
    pub methods: MethodTable,
}

/// All registered rules.
#[derive(Debug, Default)]
pub struct Registry {
    literals: HashMap<String, MethodTable>,
    patterns: Vec<PatternRule>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a rule and return its spy.
    ///
    /// A pattern keeps its first registration position; re-registering the
    /// same key and method replaces the older response spec.
    pub fn register(&mut self, registration: Registration) -> Arc<CallSpy> {
        let method = registration
            .method
            .as_deref()
            .map(method_key)
            .unwrap_or_else(|| ANY_METHOD.to_string());
        let spec = Arc::new(ResponseSpec::from_registration(&registration));
        let spy = Arc::clone(spec.spy());

        let key = registration.uri.normalized();
        let replaced = match key {
            UriKey::Literal(url) => {
                info!(uri = %url, method = %method, "Registered rule");
                self.literals.entry(url).or_default().insert(method, spec)
            }
            UriKey::Pattern(pattern) => {
                info!(pattern = %pattern.source(), method = %method, "Registered pattern rule");
                let idx = match self.patterns.iter().position(|r| r.pattern.same_key(&pattern)) {
                    Some(idx) => idx,
                    None => {
                        self.patterns.push(PatternRule {
                            pattern,
                            methods: MethodTable::default(),
                        });
                        self.patterns.len() - 1
                    }
                };
                self.patterns[idx].methods.insert(method, spec)
            }
        };
        if replaced {
            debug!("Replaced previously registered response");
        }

        spy
    }

    /// Drop every rule.
    pub fn clear(&mut self) {
        self.literals.clear();
        self.patterns.clear();
    }

    pub(crate) fn patterns(&self) -> &[PatternRule] {
        &self.patterns
    }

    /// Method table of a normalized literal URL.
    pub(crate) fn literal(&self, url: &str) -> Option<&MethodTable> {
        self.literals.get(url)
    }

    /// Number of literal URLs with at least one rule.
    pub fn literal_count(&self) -> usize {
        self.literals.len()
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// Total registered key+method pairs.
    pub fn rule_count(&self) -> usize {
        self.literals.values().map(MethodTable::len).sum::<usize>()
            + self.patterns.iter().map(|r| r.methods.len()).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.literals.is_empty() && self.patterns.is_empty()
    }
}
