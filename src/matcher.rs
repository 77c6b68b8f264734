//! Rule keys and match resolution.
//!
//! Patterns are walked first in registration order and the first pattern that
//! matches decides; only then is the literal normalized URL looked up. Within
//! a rule, a method-specific entry wins over the `ANY` entry.

use crate::normalize::normalize;
use crate::registry::Registry;
use crate::response::ResponseSpec;
use regex::Regex;
use std::sync::Arc;

/// Method-table key that matches every method.
pub const ANY_METHOD: &str = "ANY";

/// A structural URL pattern.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Matches when the regex finds a match anywhere in the URL.
    Regex(Regex),
    /// Matches when the glob matches the whole URL.
    Glob {
        source: String,
        matcher: globset::GlobMatcher,
    },
}

impl Pattern {
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Pattern::Regex)
    }

    pub fn glob(pattern: &str) -> Result<Self, globset::Error> {
        let glob = globset::Glob::new(pattern)?;
        Ok(Pattern::Glob {
            source: pattern.to_string(),
            matcher: glob.compile_matcher(),
        })
    }

    /// Source text, used to deduplicate registrations.
    pub fn source(&self) -> &str {
        match self {
            Pattern::Regex(regex) => regex.as_str(),
            Pattern::Glob { source, .. } => source,
        }
    }

    pub fn is_match(&self, url: &str) -> bool {
        match self {
            Pattern::Regex(regex) => regex.is_match(url),
            Pattern::Glob { matcher, .. } => matcher.is_match(url),
        }
    }

    /// Whether two patterns are the same registration key.
    pub fn same_key(&self, other: &Pattern) -> bool {
        matches!(
            (self, other),
            (Pattern::Regex(_), Pattern::Regex(_)) | (Pattern::Glob { .. }, Pattern::Glob { .. })
        ) && self.source() == other.source()
    }
}

impl From<Regex> for Pattern {
    fn from(regex: Regex) -> Self {
        Pattern::Regex(regex)
    }
}

/// What a rule is registered under.
#[derive(Debug, Clone)]
pub enum UriKey {
    /// A URL, stored in normalized form.
    Literal(String),
    Pattern(Pattern),
}

impl UriKey {
    /// Key as stored: literal URLs are normalized, patterns kept verbatim.
    pub fn normalized(self) -> UriKey {
        match self {
            UriKey::Literal(url) => UriKey::Literal(normalize(&url)),
            pattern => pattern,
        }
    }

    pub fn describe(&self) -> &str {
        match self {
            UriKey::Literal(url) => url,
            UriKey::Pattern(pattern) => pattern.source(),
        }
    }
}

impl From<&str> for UriKey {
    fn from(url: &str) -> Self {
        UriKey::Literal(url.to_string())
    }
}

impl From<String> for UriKey {
    fn from(url: String) -> Self {
        UriKey::Literal(url)
    }
}

impl From<Regex> for UriKey {
    fn from(regex: Regex) -> Self {
        UriKey::Pattern(Pattern::Regex(regex))
    }
}

impl From<Pattern> for UriKey {
    fn from(pattern: Pattern) -> Self {
        UriKey::Pattern(pattern)
    }
}

/// Result of resolving a request against the registry.
#[derive(Debug, Clone)]
pub struct MatchResult {
    /// The matched response spec
    pub spec: Arc<ResponseSpec>,
    /// Key of the rule that matched (pattern source or normalized URL)
    pub rule: String,
    /// Whether the `ANY` entry answered because the method had none
    pub via_any: bool,
}

/// Upper-cased method name used as a method-table key.
pub fn method_key(method: &str) -> String {
    method.to_uppercase()
}

impl Registry {
    /// Find the response spec for a request.
    ///
    /// `url` may be raw; it is normalized before lookup.
    pub fn find_match(&self, url: &str, method: &str) -> Option<MatchResult> {
        let url = normalize(url);
        let method = method_key(method);

        if let Some(rule) = self.patterns().iter().find(|r| r.pattern.is_match(&url)) {
            return rule.methods.lookup(&method).map(|(spec, via_any)| MatchResult {
                spec,
                rule: rule.pattern.source().to_string(),
                via_any,
            });
        }

        self.literal(&url)
            .and_then(|methods| methods.lookup(&method))
            .map(|(spec, via_any)| MatchResult {
                spec,
                rule: url.clone(),
                via_any,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Body;
    use crate::registry::Registration;

    fn body_of(result: &MatchResult) -> Option<Body> {
        match result.spec.body_source() {
            crate::response::BodySource::Static(body) => Some(body.clone()),
            _ => None,
        }
    }

    #[test]
    fn test_literal_match_normalizes_port() {
        let mut registry = Registry::new();
        registry.register(Registration::new("http://www.readme.com/").body("readme"));

        let result = registry.find_match("http://www.readme.com:80/", "GET").unwrap();
        assert_eq!(result.rule, "http://www.readme.com:80/");
        assert_eq!(body_of(&result), Some(Body::from("readme")));
        assert!(result.via_any);
    }

    #[test]
    fn test_method_specific_wins_over_any() {
        let mut registry = Registry::new();
        registry.register(Registration::new("http://x.test/").body("any"));
        registry.register(Registration::new("http://x.test/").method("POST").body("post"));

        let post = registry.find_match("http://x.test/", "post").unwrap();
        assert_eq!(body_of(&post), Some(Body::from("post")));
        assert!(!post.via_any);

        let get = registry.find_match("http://x.test/", "GET").unwrap();
        assert_eq!(body_of(&get), Some(Body::from("any")));
    }

    #[test]
    fn test_uncovered_method_does_not_match() {
        let mut registry = Registry::new();
        registry.register(Registration::new("http://x.test/").method("POST"));

        assert!(registry.find_match("http://x.test/", "GET").is_none());
        assert!(registry.find_match("http://x.test/", "POST").is_some());
    }

    #[test]
    fn test_pattern_precedes_literal() {
        let mut registry = Registry::new();
        registry.register(Registration::new("http://testing.com/some_url").body("literal"));
        registry.register(Registration::new(Regex::new("testing.com").unwrap()).body("pattern"));

        let result = registry.find_match("http://testing.com/some_url", "GET").unwrap();
        assert_eq!(body_of(&result), Some(Body::from("pattern")));
        assert_eq!(result.rule, "testing.com");
    }

    #[test]
    fn test_first_pattern_in_registration_order_wins() {
        let mut registry = Registry::new();
        registry.register(Registration::new(Regex::new("x\\.test").unwrap()).body("first"));
        registry.register(Registration::new(Regex::new("/a$").unwrap()).body("second"));

        let result = registry.find_match("http://x.test/a", "GET").unwrap();
        assert_eq!(body_of(&result), Some(Body::from("first")));
    }

    #[test]
    fn test_first_matching_pattern_decides_even_without_method() {
        let mut registry = Registry::new();
        registry.register(Registration::new(Regex::new("x\\.test").unwrap()).method("POST"));
        registry.register(Registration::new("http://x.test/a").body("literal"));

        assert!(registry.find_match("http://x.test/a", "GET").is_none());
    }

    #[test]
    fn test_pattern_sees_normalized_url() {
        let mut registry = Registry::new();
        registry.register(Registration::new(Regex::new(":80/").unwrap()).body("ported"));

        assert!(registry.find_match("http://x.test/a", "GET").is_some());
        assert!(registry.find_match("https://x.test/a", "GET").is_none());
    }

    #[test]
    fn test_glob_pattern() {
        let mut registry = Registry::new();
        registry.register(
            Registration::new(Pattern::glob("https://api.test:443/users/*").unwrap()).body("user"),
        );

        assert!(registry.find_match("https://api.test/users/42", "GET").is_some());
        assert!(registry.find_match("https://api.test/posts/42", "GET").is_none());
    }

    #[test]
    fn test_same_key() {
        let a = Pattern::regex("x").unwrap();
        let b = Pattern::regex("x").unwrap();
        let c = Pattern::glob("x").unwrap();
        assert!(a.same_key(&b));
        assert!(!a.same_key(&c));
    }
}
