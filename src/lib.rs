//! Fakeweb
//!
//! Deterministic HTTP interception for test suites. Code under test talks to
//! an injected [`HttpClient`]; tests hand it a [`FakeWeb`] loaded with canned
//! responses, so nothing leaves the process unless the policy allows it.
//!
//! # Features
//!
//! - **Literal and pattern rules**: match by normalized URL, regex or glob,
//!   per method or for any method
//! - **Response sources**: static bodies, text and binary files re-read on
//!   every call, body functions, Handlebars templates
//! - **Status sequences**: cycle through status codes, pinning the last one
//! - **Failure simulation**: refuse the connection instead of responding
//! - **Call spies**: use counts and captured request payloads per rule
//! - **Network policy**: deny unmatched traffic, with loopback and ignore-list
//!   exemptions
//! - **Two transport shims**: buffered GET/POST and streamed request objects
//!
//! # Example
//!
//! ```
//! use fakeweb::{FakeWeb, HttpClient, Registration, RequestOptions};
//!
//! let mut web = FakeWeb::new();
//! web.set_allow_net_connect(false);
//! let spy = web.register_uri(Registration::new("http://x.test/a").status([200, 404]));
//!
//! let first = web.get(RequestOptions::new("http://x.test/a")).unwrap();
//! let second = web.get(RequestOptions::new("http://x.test:80/a")).unwrap();
//! assert_eq!((first.status_code, second.status_code), (200, 404));
//! assert_eq!(spy.use_count(), 2);
//! ```
//!
//! # Example Fixture File
//!
//! ```yaml
//! settings:
//!   allow_net_connect: false
//! rules:
//!   - uri: http://x.test/hello
//!     method: GET
//!     body:
//!       type: text
//!       content: "Hello, World!"
//! ```

pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod matcher;
pub mod normalize;
pub mod policy;
pub mod registry;
pub mod response;
pub mod spy;
pub mod stream;
pub mod template;

pub use client::{
    Body, ClientResponse, HttpClient, HttpRequestOptions, IncomingResponse, OutgoingRequest,
    Payload, RequestOptions, RequestTarget, ResponseEvent, ResponseHead, Scheme,
};
pub use config::FixtureConfig;
pub use engine::FakeWeb;
pub use error::{ConnectionError, FakewebError, Result};
pub use matcher::{Pattern, UriKey};
pub use policy::{NetworkPolicy, Verdict};
pub use registry::Registration;
pub use response::{BodySource, StatusCode};
pub use spy::CallSpy;
