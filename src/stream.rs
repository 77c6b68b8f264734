//! Streaming shim for low-level request/response pairs.
//!
//! A [`FakeRequest`] buffers writes until `end()`. Ending it resolves the
//! rule and yields a [`FakeResponse`] whose notifications come out in a fixed
//! order: `Response`, then `Data`, `End`, `Close` on success, or `Response`,
//! `Error`, `Close` for a simulated connection failure.

use crate::client::{
    Body, IncomingResponse, OutgoingRequest, Payload, ResponseCallback, ResponseEvent, ResponseHead,
};
use crate::error::{ConnectionError, Result};
use crate::response::ResponseSpec;
use crate::template::{BodyRequest, TemplateEngine};
use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::debug;

/// Writable half of an intercepted low-level call.
pub struct FakeRequest {
    spec: Arc<ResponseSpec>,
    url: String,
    method: String,
    templates: Arc<TemplateEngine>,
    on_response: Option<ResponseCallback>,
    buffer: Vec<u8>,
}

impl FakeRequest {
    pub(crate) fn new(
        spec: Arc<ResponseSpec>,
        url: String,
        method: String,
        templates: Arc<TemplateEngine>,
        on_response: Option<ResponseCallback>,
    ) -> Self {
        Self {
            spec,
            url,
            method,
            templates,
            on_response,
            buffer: Vec::new(),
        }
    }

    /// Finish the request and build the response.
    pub fn finish(self) -> Result<FakeResponse> {
        let FakeRequest {
            spec,
            url,
            method,
            templates,
            on_response,
            buffer,
        } = self;

        let request_body = String::from_utf8_lossy(&buffer).into_owned();
        let head = ResponseHead {
            status_code: spec.next_status(),
            headers: spec.response_headers(),
        };
        debug!(url = %url, method = %method, status = head.status_code, "Streaming response");

        let response = if spec.simulates_failure() {
            FakeResponse::failed(head)
        } else {
            spec.spy().capture_body(request_body.clone());
            let payload = if request_body.is_empty() {
                Payload::Empty
            } else {
                Payload::Text(request_body)
            };
            let request = BodyRequest {
                url: &url,
                method: &method,
                payload: &payload,
            };
            let body = spec.body_source().produce(&request, &templates)?;
            FakeResponse::succeeded(head, body)
        };

        if let Some(callback) = on_response {
            callback(response.head());
        }
        Ok(response)
    }
}

impl OutgoingRequest for FakeRequest {
    fn write(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    fn end(self: Box<Self>) -> Result<Box<dyn IncomingResponse>> {
        Ok(Box::new((*self).finish()?))
    }
}

/// Readable half of an intercepted low-level call.
#[derive(Debug)]
pub struct FakeResponse {
    head: ResponseHead,
    body: Option<Body>,
    failed: bool,
    events: VecDeque<ResponseEvent>,
}

impl FakeResponse {
    fn succeeded(head: ResponseHead, body: Option<Body>) -> Self {
        let data = body.as_ref().map(Body::to_bytes).unwrap_or_default();
        let events = VecDeque::from([
            ResponseEvent::Response(head.clone()),
            ResponseEvent::Data(data),
            ResponseEvent::End,
            ResponseEvent::Close,
        ]);
        Self {
            head,
            body,
            failed: false,
            events,
        }
    }

    fn failed(head: ResponseHead) -> Self {
        let events = VecDeque::from([
            ResponseEvent::Response(head.clone()),
            ResponseEvent::Error(ConnectionError::refused()),
            ResponseEvent::Close,
        ]);
        Self {
            head,
            body: None,
            failed: true,
            events,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.head.status_code
    }

    /// Resolved body, `None` for an empty rule or a failed connection.
    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    /// Whether this response carries a simulated connection failure.
    pub fn is_failure(&self) -> bool {
        self.failed
    }
}

impl Iterator for FakeResponse {
    type Item = ResponseEvent;

    fn next(&mut self) -> Option<ResponseEvent> {
        self.events.pop_front()
    }
}

impl IncomingResponse for FakeResponse {
    fn head(&self) -> &ResponseHead {
        &self.head
    }

    fn next_event(&mut self) -> Option<ResponseEvent> {
        self.events.pop_front()
    }

    fn pipe(self: Box<Self>, sink: &mut dyn Write) -> io::Result<()> {
        if self.failed {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                ConnectionError::refused(),
            ));
        }
        if let Some(body) = &self.body {
            sink.write_all(&body.to_bytes())?;
        }
        sink.flush()
    }
}
