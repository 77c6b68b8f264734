//! The client port that code under test depends on.
//!
//! Production code holds a `dyn HttpClient`; tests hand it a
//! [`FakeWeb`](crate::FakeWeb) instead of a real client. The trait covers the
//! four entry points: high-level `get` and `post`, and low-level streaming
//! `request` over plain or encrypted HTTP.

use crate::error::{ConnectionError, FakewebError, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::io::Write;

/// Response header map, names kept as supplied.
pub type Headers = HashMap<String, String>;

/// Decoded form fields of a POST.
pub type Form = BTreeMap<String, String>;

/// Request payload handed to body functions and templates.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(untagged)]
pub enum Payload {
    #[default]
    Empty,
    Text(String),
    Form(Form),
}

impl Payload {
    /// Payload of a high-level POST: the form wins over the raw body.
    pub fn from_post(body: Option<&str>, form: Option<&Form>) -> Self {
        match (form, body) {
            (Some(form), _) => Payload::Form(form.clone()),
            (None, Some(body)) => Payload::Text(body.to_string()),
            (None, None) => Payload::Empty,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// A response body. Text and binary content are never mixed.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Text(String),
    Binary(Vec<u8>),
    Json(serde_json::Value),
}

impl Body {
    /// Raw bytes as they would go over the wire.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Body::Text(text) => text.as_bytes().to_vec(),
            Body::Binary(bytes) => bytes.clone(),
            Body::Json(value) => value.to_string().into_bytes(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Body::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Parse the body as JSON. A JSON body is returned as-is.
    pub fn into_json(self) -> Result<Body> {
        let value = match self {
            Body::Json(value) => value,
            Body::Text(text) => serde_json::from_str(&text)?,
            Body::Binary(bytes) => serde_json::from_slice(&bytes)?,
        };
        Ok(Body::Json(value))
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Text(text.to_string())
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Binary(bytes)
    }
}

impl From<serde_json::Value> for Body {
    fn from(value: serde_json::Value) -> Self {
        Body::Json(value)
    }
}

/// Options for a high-level GET or POST.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub uri: String,
    /// Raw POST body.
    pub body: Option<String>,
    /// POST form fields.
    pub form: Option<Form>,
    /// Parse the response body as JSON before returning it.
    pub json: bool,
    /// Follow 3xx responses that carry a `Location` header (GET only).
    pub follow_redirect: bool,
}

impl RequestOptions {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            body: None,
            form: None,
            json: false,
            follow_redirect: true,
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_form<K, V>(mut self, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.form = Some(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    pub fn json(mut self) -> Self {
        self.json = true;
        self
    }

    pub fn follow_redirect(mut self, follow: bool) -> Self {
        self.follow_redirect = follow;
        self
    }
}

impl From<&str> for RequestOptions {
    fn from(uri: &str) -> Self {
        Self::new(uri)
    }
}

impl From<String> for RequestOptions {
    fn from(uri: String) -> Self {
        Self::new(uri)
    }
}

/// Status line and headers of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status_code: u16,
    pub headers: Headers,
}

/// A fully buffered high-level response.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientResponse {
    pub status_code: u16,
    pub headers: Headers,
    /// `None` when the rule defines no body.
    pub body: Option<Body>,
}

impl ClientResponse {
    pub fn text(&self) -> Option<&str> {
        self.body.as_ref().and_then(Body::as_text)
    }
}

/// Transport used by a low-level request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

/// Socket-level options of a low-level request.
#[derive(Debug, Clone, Default)]
pub struct HttpRequestOptions {
    /// Preferred over `host` when both are set.
    pub hostname: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub path: Option<String>,
    /// Defaults to `GET`.
    pub method: Option<String>,
}

/// Target of a low-level request: a full URL or socket-level options.
#[derive(Debug, Clone)]
pub enum RequestTarget {
    Url(String),
    Options(HttpRequestOptions),
}

impl RequestTarget {
    /// Build the request URL. `None` when the options carry neither a port
    /// nor a path.
    pub fn to_url(&self, scheme: Scheme) -> Option<String> {
        match self {
            RequestTarget::Url(url) => Some(url.clone()),
            RequestTarget::Options(opts) => {
                let host = opts
                    .hostname
                    .as_deref()
                    .or(opts.host.as_deref())
                    .unwrap_or("");
                let path = opts.path.as_deref().unwrap_or("");
                match opts.port {
                    Some(port) => Some(format!("{}://{}:{}{}", scheme.as_str(), host, port, path)),
                    None if opts.path.is_some() => {
                        Some(format!("{}://{}{}", scheme.as_str(), host, path))
                    }
                    None => None,
                }
            }
        }
    }

    pub fn method(&self) -> String {
        match self {
            RequestTarget::Url(_) => "GET".to_string(),
            RequestTarget::Options(opts) => opts
                .method
                .as_deref()
                .unwrap_or("GET")
                .to_uppercase(),
        }
    }
}

impl From<&str> for RequestTarget {
    fn from(url: &str) -> Self {
        RequestTarget::Url(url.to_string())
    }
}

impl From<String> for RequestTarget {
    fn from(url: String) -> Self {
        RequestTarget::Url(url)
    }
}

impl From<HttpRequestOptions> for RequestTarget {
    fn from(opts: HttpRequestOptions) -> Self {
        RequestTarget::Options(opts)
    }
}

/// Invoked with the response head once the response is ready.
pub type ResponseCallback = Box<dyn FnOnce(&ResponseHead) + Send>;

/// Notifications emitted by a streamed response, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEvent {
    Response(ResponseHead),
    Data(Vec<u8>),
    Error(ConnectionError),
    End,
    Close,
}

/// Writable half of a low-level call.
pub trait OutgoingRequest: Send {
    /// Buffer a chunk of the request body.
    fn write(&mut self, chunk: &[u8]);

    /// Signal end-of-request and obtain the response.
    fn end(self: Box<Self>) -> Result<Box<dyn IncomingResponse>>;
}

/// Readable half of a low-level call.
pub trait IncomingResponse: Send {
    fn head(&self) -> &ResponseHead;

    /// Next pending notification, `None` once the stream is closed.
    fn next_event(&mut self) -> Option<ResponseEvent>;

    /// Write the whole body into `sink` and flush it.
    fn pipe(self: Box<Self>, sink: &mut dyn Write) -> std::io::Result<()>;

    /// Drain the remaining notifications and collect the data chunks.
    fn read_body(&mut self) -> std::result::Result<Vec<u8>, ConnectionError> {
        let mut body = Vec::new();
        while let Some(event) = self.next_event() {
            match event {
                ResponseEvent::Data(chunk) => body.extend_from_slice(&chunk),
                ResponseEvent::Error(err) => return Err(err),
                _ => {}
            }
        }
        Ok(body)
    }
}

/// The capability set an HTTP client offers to code under test.
pub trait HttpClient {
    fn get(&self, options: RequestOptions) -> Result<ClientResponse>;

    fn post(&self, options: RequestOptions) -> Result<ClientResponse>;

    fn request(
        &self,
        scheme: Scheme,
        target: RequestTarget,
        on_response: Option<ResponseCallback>,
    ) -> Result<Box<dyn OutgoingRequest>>;

    /// Callback-style GET: `callback` runs once with the response.
    fn get_with<R>(
        &self,
        options: impl Into<RequestOptions>,
        callback: impl FnOnce(ClientResponse) -> R,
    ) -> Result<R>
    where
        Self: Sized,
    {
        self.get(options.into()).map(callback)
    }

    /// Callback-style POST: `callback` runs once with the response.
    fn post_with<R>(
        &self,
        options: impl Into<RequestOptions>,
        callback: impl FnOnce(ClientResponse) -> R,
    ) -> Result<R>
    where
        Self: Sized,
    {
        self.post(options.into()).map(callback)
    }

    fn http_request(&self, target: impl Into<RequestTarget>) -> Result<Box<dyn OutgoingRequest>>
    where
        Self: Sized,
    {
        self.request(Scheme::Http, target.into(), None)
    }

    fn https_request(&self, target: impl Into<RequestTarget>) -> Result<Box<dyn OutgoingRequest>>
    where
        Self: Sized,
    {
        self.request(Scheme::Https, target.into(), None)
    }
}

/// Upstream used when no real client is attached: every forwarded call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct Disconnected;

impl HttpClient for Disconnected {
    fn get(&self, options: RequestOptions) -> Result<ClientResponse> {
        Err(FakewebError::NoUpstream {
            method: "GET".to_string(),
            url: options.uri,
        })
    }

    fn post(&self, options: RequestOptions) -> Result<ClientResponse> {
        Err(FakewebError::NoUpstream {
            method: "POST".to_string(),
            url: options.uri,
        })
    }

    fn request(
        &self,
        scheme: Scheme,
        target: RequestTarget,
        _on_response: Option<ResponseCallback>,
    ) -> Result<Box<dyn OutgoingRequest>> {
        Err(FakewebError::NoUpstream {
            method: target.method(),
            url: target.to_url(scheme).unwrap_or_default(),
        })
    }
}
