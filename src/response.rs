//! Response synthesis for a matched rule.
//!
//! A [`ResponseSpec`] is immutable apart from two pieces of state: the status
//! cursor, which advances once per resolved call, and the [`CallSpy`].

use crate::client::{Body, Headers, Payload};
use crate::error::{FakewebError, Result};
use crate::registry::Registration;
use crate::spy::CallSpy;
use crate::template::{BodyRequest, TemplateEngine};
use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

/// Header key the content-type override is written under.
pub const CONTENT_TYPE: &str = "content-type";

/// Computes a body from the request payload.
pub type BodyFn = Arc<dyn Fn(&Payload) -> Option<Body> + Send + Sync>;

/// Where a rule's body comes from.
#[derive(Clone, Default)]
pub enum BodySource {
    /// No body at all.
    #[default]
    Empty,
    Static(Body),
    /// UTF-8 text file, read on every call.
    File(PathBuf),
    /// Raw bytes, read on every call.
    BinaryFile(PathBuf),
    Function(BodyFn),
    /// Handlebars template rendered against the request.
    Template(String),
}

impl fmt::Debug for BodySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodySource::Empty => f.write_str("Empty"),
            BodySource::Static(body) => f.debug_tuple("Static").field(body).finish(),
            BodySource::File(path) => f.debug_tuple("File").field(path).finish(),
            BodySource::BinaryFile(path) => f.debug_tuple("BinaryFile").field(path).finish(),
            BodySource::Function(_) => f.write_str("Function(..)"),
            BodySource::Template(t) => f.debug_tuple("Template").field(t).finish(),
        }
    }
}

impl BodySource {
    /// Produce the body for one call.
    pub fn produce(
        &self,
        request: &BodyRequest<'_>,
        templates: &TemplateEngine,
    ) -> Result<Option<Body>> {
        match self {
            BodySource::Empty => Ok(None),
            BodySource::Static(body) => Ok(Some(body.clone())),
            BodySource::File(path) => std::fs::read_to_string(path)
                .map(|text| Some(Body::Text(text)))
                .map_err(|source| FakewebError::Fixture {
                    path: path.clone(),
                    source,
                }),
            BodySource::BinaryFile(path) => std::fs::read(path)
                .map(|bytes| Some(Body::Binary(bytes)))
                .map_err(|source| FakewebError::Fixture {
                    path: path.clone(),
                    source,
                }),
            BodySource::Function(f) => Ok(f(request.payload)),
            BodySource::Template(template) => {
                Ok(Some(Body::Text(templates.render(template, request)?)))
            }
        }
    }
}

/// Status code as registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusCode {
    Fixed(u16),
    /// Consumed front to back, one per call; the last value repeats.
    Sequence(Vec<u16>),
}

impl Default for StatusCode {
    fn default() -> Self {
        StatusCode::Fixed(200)
    }
}

impl From<u16> for StatusCode {
    fn from(code: u16) -> Self {
        StatusCode::Fixed(code)
    }
}

impl From<Vec<u16>> for StatusCode {
    fn from(codes: Vec<u16>) -> Self {
        StatusCode::Sequence(codes)
    }
}

impl<const N: usize> From<[u16; N]> for StatusCode {
    fn from(codes: [u16; N]) -> Self {
        StatusCode::Sequence(codes.to_vec())
    }
}

#[derive(Debug)]
enum StatusCursor {
    Fixed(u16),
    Sequence(Mutex<VecDeque<u16>>),
}

impl StatusCursor {
    fn new(status: &StatusCode) -> Self {
        match status {
            StatusCode::Fixed(code) => StatusCursor::Fixed(*code),
            StatusCode::Sequence(codes) => {
                StatusCursor::Sequence(Mutex::new(codes.iter().copied().collect()))
            }
        }
    }

    fn next(&self) -> u16 {
        match self {
            StatusCursor::Fixed(code) => *code,
            StatusCursor::Sequence(codes) => {
                let mut codes = codes.lock().unwrap_or_else(PoisonError::into_inner);
                match codes.len() {
                    0 => 200,
                    1 => codes[0],
                    _ => codes.pop_front().unwrap_or(200),
                }
            }
        }
    }
}

/// A concrete response for one call.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedResponse {
    pub status_code: u16,
    pub headers: Headers,
    pub body: Option<Body>,
}

/// How to answer one method of one rule.
#[derive(Debug)]
pub struct ResponseSpec {
    body: BodySource,
    status: StatusCursor,
    headers: Headers,
    content_type: Option<String>,
    exception: bool,
    spy: Arc<CallSpy>,
}

impl ResponseSpec {
    pub(crate) fn from_registration(registration: &Registration) -> Self {
        Self {
            body: registration.body.clone(),
            status: StatusCursor::new(&registration.status),
            headers: registration.headers.clone(),
            content_type: registration.content_type.clone(),
            exception: registration.exception,
            spy: Arc::new(CallSpy::new()),
        }
    }

    pub fn spy(&self) -> &Arc<CallSpy> {
        &self.spy
    }

    pub fn body_source(&self) -> &BodySource {
        &self.body
    }

    /// Whether calls must fail with a refused connection.
    pub fn simulates_failure(&self) -> bool {
        self.exception
    }

    /// Status for this call. Advances a sequence cursor.
    pub fn next_status(&self) -> u16 {
        self.status.next()
    }

    /// Copy of the registered headers with the content-type override applied.
    pub fn response_headers(&self) -> Headers {
        let mut headers = self.headers.clone();
        if let Some(content_type) = &self.content_type {
            headers.retain(|name, _| !name.eq_ignore_ascii_case(CONTENT_TYPE));
            headers.insert(CONTENT_TYPE.to_string(), content_type.clone());
        }
        headers
    }

    /// Registered `Location` header, matched case-insensitively.
    pub fn location(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("location"))
            .map(|(_, value)| value.as_str())
    }

    /// Resolve the rest of the response around an already drawn status.
    pub fn respond(
        &self,
        status_code: u16,
        request: &BodyRequest<'_>,
        templates: &TemplateEngine,
    ) -> Result<ResolvedResponse> {
        Ok(ResolvedResponse {
            status_code,
            headers: self.response_headers(),
            body: self.body.produce(request, templates)?,
        })
    }

    /// Draw the next status and resolve the full response.
    pub fn resolve(
        &self,
        request: &BodyRequest<'_>,
        templates: &TemplateEngine,
    ) -> Result<ResolvedResponse> {
        let status_code = self.next_status();
        self.respond(status_code, request, templates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn spec(registration: Registration) -> ResponseSpec {
        ResponseSpec::from_registration(&registration)
    }

    fn get<'a>(payload: &'a Payload) -> BodyRequest<'a> {
        BodyRequest {
            url: "http://x.test:80/",
            method: "GET",
            payload,
        }
    }

    #[test]
    fn test_fixed_status_is_stable() {
        let spec = spec(Registration::new("http://x.test/").status(301));
        for _ in 0..5 {
            assert_eq!(spec.next_status(), 301);
        }
    }

    #[test]
    fn test_default_status_is_200() {
        let spec = spec(Registration::new("http://x.test/"));
        assert_eq!(spec.next_status(), 200);
    }

    #[test]
    fn test_status_sequence_pins_last() {
        let spec = spec(Registration::new("http://x.test/a").status([200, 404]));
        assert_eq!(spec.next_status(), 200);
        assert_eq!(spec.next_status(), 404);
        assert_eq!(spec.next_status(), 404);
    }

    #[test]
    fn test_longer_sequence() {
        let spec = spec(Registration::new("http://x.test/a").status(vec![500, 502, 503, 200]));
        let seen: Vec<u16> = (0..6).map(|_| spec.next_status()).collect();
        assert_eq!(seen, vec![500, 502, 503, 200, 200, 200]);
    }

    #[test]
    fn test_degenerate_sequences() {
        let empty = spec(Registration::new("http://x.test/").status(Vec::<u16>::new()));
        assert_eq!(empty.next_status(), 200);
        assert_eq!(empty.next_status(), 200);

        let single = spec(Registration::new("http://x.test/").status([418]));
        assert_eq!(single.next_status(), 418);
        assert_eq!(single.next_status(), 418);
    }

    #[test]
    fn test_content_type_override() {
        let spec = spec(
            Registration::new("http://x.test/")
                .header("Content-Type", "text/html")
                .header("location", "testing")
                .content_type("testing"),
        );
        let headers = spec.response_headers();
        assert_eq!(headers.get("content-type").map(String::as_str), Some("testing"));
        assert!(!headers.contains_key("Content-Type"));
        assert_eq!(headers.get("location").map(String::as_str), Some("testing"));
    }

    #[test]
    fn test_headers_are_copied() {
        let spec = spec(Registration::new("http://x.test/").header("X-A", "1"));
        let mut headers = spec.response_headers();
        headers.insert("X-B".to_string(), "2".to_string());
        assert!(!spec.response_headers().contains_key("X-B"));
    }

    #[test]
    fn test_location_lookup() {
        let spec = spec(Registration::new("http://x.test/").header("Location", "/next"));
        assert_eq!(spec.location(), Some("/next"));
    }

    #[test]
    fn test_empty_body_is_none() {
        let spec = spec(Registration::new("http://x.test/"));
        let response = spec.resolve(&get(&Payload::Empty), &TemplateEngine::new()).unwrap();
        assert_eq!(response.body, None);
        assert_eq!(response.status_code, 200);
    }

    #[test]
    fn test_function_body_receives_payload() {
        let spec = spec(Registration::new("http://x.test/").body_fn(|payload| match payload {
            Payload::Text(text) => Some(Body::Text(text.to_uppercase())),
            _ => None,
        }));
        let payload = Payload::Text("hi".to_string());
        let response = spec.resolve(&get(&payload), &TemplateEngine::new()).unwrap();
        assert_eq!(response.body, Some(Body::from("HI")));
    }

    #[test]
    fn test_file_is_reread_every_call() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "first").unwrap();
        let spec = spec(Registration::new("http://x.test/").file(file.path()));
        let templates = TemplateEngine::new();

        let response = spec.resolve(&get(&Payload::Empty), &templates).unwrap();
        assert_eq!(response.body, Some(Body::from("first")));

        std::fs::write(file.path(), "second").unwrap();
        let response = spec.resolve(&get(&Payload::Empty), &templates).unwrap();
        assert_eq!(response.body, Some(Body::from("second")));
    }

    #[test]
    fn test_binary_file_is_raw_bytes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let bytes = [0xff_u8, 0xd8, 0x00, 0x7f];
        file.write_all(&bytes).unwrap();
        let spec = spec(Registration::new("http://x.test/").binary_file(file.path()));

        let response = spec.resolve(&get(&Payload::Empty), &TemplateEngine::new()).unwrap();
        assert_eq!(response.body, Some(Body::Binary(bytes.to_vec())));
    }

    #[test]
    fn test_missing_file_is_fixture_error() {
        let spec = spec(Registration::new("http://x.test/").file("/nonexistent/fakeweb.txt"));
        let err = spec.resolve(&get(&Payload::Empty), &TemplateEngine::new()).unwrap_err();
        assert!(matches!(err, FakewebError::Fixture { .. }));
    }

    #[test]
    fn test_template_body() {
        let spec = spec(Registration::new("http://x.test/").template("{{method}} {{url}}"));
        let response = spec.resolve(&get(&Payload::Empty), &TemplateEngine::new()).unwrap();
        assert_eq!(response.body, Some(Body::from("GET http://x.test:80/")));
    }
}
