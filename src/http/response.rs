//! Write side of the transport: status, headers and body of one response.
//!
//! A [`Response`] is handed to filters and handlers, which commit a status
//! with [`write_header`](Response::write_header), set headers and stream body
//! bytes through [`std::io::Write`]. It also carries what content negotiation
//! needs: the request's `Accept` value, the media types the selected route
//! produces, and the registry of entity accessors.

use std::io;
use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use serde::Serialize;

use super::{HEADER_CONTENT_TYPE, Headers, StatusCode};
use crate::entity::accept::sorted_media_ranges;
use crate::entity::{EntityAccessor, EntityError, EntityRegistry, JsonAccessor, XmlAccessor};

/// An HTTP/1.1 response under construction.
///
/// # Examples
///
/// ```
/// use restmux::http::{Response, StatusCode};
///
/// let mut response = Response::new(StatusCode::Ok);
/// response.set_pretty_print(false);
/// response.write_as_json(StatusCode::Created, &serde_json::json!({"id": 1})).unwrap();
///
/// let bytes = response.into_bytes();
/// let text = std::str::from_utf8(&bytes).unwrap();
/// assert!(text.starts_with("HTTP/1.1 201 Created\r\n"));
/// assert!(text.contains("Content-Type: application/json\r\n"));
/// assert!(text.ends_with("{\"id\":1}"));
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    status_written: bool,
    headers: Headers,
    body: Vec<u8>,
    keep_alive: bool,
    pretty_print: bool,
    request_accept: String,
    route_produces: Vec<String>,
    default_mime_type: Option<String>,
    registry: Arc<EntityRegistry>,
}

impl Response {
    /// Creates a response with the given status, an empty body, pretty output
    /// and the process-wide accessor registry.
    pub fn new(status: StatusCode) -> Self {
        Self::with_registry(status, EntityRegistry::shared())
    }

    /// Like [`Response::new`] but negotiating against `registry`.
    pub fn with_registry(status: StatusCode, registry: Arc<EntityRegistry>) -> Self {
        Self {
            status,
            status_written: false,
            headers: Headers::new(),
            body: Vec::new(),
            keep_alive: true,
            pretty_print: true,
            request_accept: String::new(),
            route_produces: Vec::new(),
            default_mime_type: None,
            registry,
        }
    }

    /// Appends a response header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the body from a string.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into().into_bytes();
        self
    }

    /// Controls whether `Connection: keep-alive` or `Connection: close` is written.
    #[must_use]
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Commits the status code.
    ///
    /// Only the first call counts; later calls are logged and ignored, the same
    /// way a status line cannot be rewritten once it is on the wire.
    pub fn write_header(&mut self, status: StatusCode) {
        if self.status_written {
            tracing::warn!(
                committed = %self.status,
                ignored = %status,
                "superfluous write_header call"
            );
            return;
        }
        self.status = status;
        self.status_written = true;
    }

    /// Replaces every value of header `name`.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.set(name, value);
    }

    /// Appends a header in place.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name, value);
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// `true` once a status has been committed explicitly or by writing body bytes.
    pub fn is_status_written(&self) -> bool {
        self.status_written
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body_ref(&self) -> &[u8] {
        &self.body
    }

    pub fn is_pretty_print(&self) -> bool {
        self.pretty_print
    }

    /// Selects indented (`true`) or compact (`false`) entity output.
    pub fn set_pretty_print(&mut self, pretty: bool) {
        self.pretty_print = pretty;
    }

    /// The `Accept` header of the request this response answers.
    pub fn request_accept(&self) -> &str {
        &self.request_accept
    }

    /// Media types the selected route declared it produces.
    pub fn route_produces(&self) -> &[String] {
        &self.route_produces
    }

    pub fn registry(&self) -> &Arc<EntityRegistry> {
        &self.registry
    }

    /// Fallback media type used when the `Accept` header selects no accessor.
    pub fn set_default_mime_type(&mut self, mime: Option<String>) {
        self.default_mime_type = mime;
    }

    pub(crate) fn negotiate_for(&mut self, request_accept: &str, route_produces: &[String]) {
        self.request_accept = request_accept.to_owned();
        self.route_produces = route_produces.to_vec();
    }

    /// Picks the accessor for writing an entity.
    ///
    /// `Accept` entries are tried by descending quality. An entry equal to a
    /// produced type wins if an accessor is registered for it; `*/*` takes the
    /// first produced type that has one. Failing that, the raw `Accept` value
    /// is resolved, then the default media type, then the produced types in
    /// order.
    pub fn entity_writer(&self) -> Option<Arc<dyn EntityAccessor>> {
        for range in sorted_media_ranges(&self.request_accept) {
            for produced in &self.route_produces {
                if *produced == range.media {
                    if let Some(writer) = self.registry.resolve(&range.media) {
                        return Some(writer);
                    }
                }
            }
            if range.media == "*/*" {
                if let Some(writer) = self.first_producible() {
                    return Some(writer);
                }
            }
        }
        if let Some(writer) = self.registry.resolve(&self.request_accept) {
            return Some(writer);
        }
        match &self.default_mime_type {
            Some(mime) => self.registry.resolve(mime),
            None => self.first_producible(),
        }
    }

    fn first_producible(&self) -> Option<Arc<dyn EntityAccessor>> {
        self.route_produces
            .iter()
            .find_map(|mime| self.registry.resolve(mime))
    }

    /// Writes `value` with status 200 using the negotiated accessor.
    pub fn write_entity<T: Serialize>(&mut self, value: &T) -> Result<(), EntityError> {
        self.write_header_and_entity(StatusCode::Ok, Some(value))
    }

    /// Writes `status` and, when present, `value` using the negotiated accessor.
    ///
    /// When no accessor can satisfy the request the status becomes
    /// `406 Not Acceptable` and nothing else is written.
    pub fn write_header_and_entity<T: Serialize>(
        &mut self,
        status: StatusCode,
        value: Option<&T>,
    ) -> Result<(), EntityError> {
        let Some(writer) = self.entity_writer() else {
            tracing::debug!(accept = %self.request_accept, "no entity writer for request");
            self.write_header(StatusCode::NotAcceptable);
            return Ok(());
        };
        let value = value.map(|v| v as &dyn erased_serde::Serialize);
        writer.write(self, status, value)
    }

    /// Writes `value` as JSON regardless of negotiation.
    pub fn write_as_json<T: Serialize>(
        &mut self,
        status: StatusCode,
        value: &T,
    ) -> Result<(), EntityError> {
        JsonAccessor::default().write(self, status, Some(value))
    }

    /// Writes `value` as XML regardless of negotiation.
    pub fn write_as_xml<T: Serialize>(
        &mut self,
        status: StatusCode,
        value: &T,
    ) -> Result<(), EntityError> {
        XmlAccessor::default().write(self, status, Some(value))
    }

    /// Commits `status` and writes `reason` as a plain-text body.
    pub fn write_error_string(&mut self, status: StatusCode, reason: &str) {
        self.set_header(HEADER_CONTENT_TYPE, "text/plain; charset=utf-8");
        self.write_header(status);
        self.body.extend_from_slice(reason.as_bytes());
    }

    /// Serializes the response into HTTP/1.1 wire format.
    ///
    /// Adds `Content-Type: text/plain; charset=utf-8` to a non-empty body that
    /// has no content type, then `Connection` and `Content-Length`.
    pub fn into_bytes(mut self) -> BytesMut {
        let content_length = self.body.len();

        if !self.body.is_empty() && !self.headers.contains(HEADER_CONTENT_TYPE) {
            self.headers
                .insert(HEADER_CONTENT_TYPE, "text/plain; charset=utf-8");
        }
        let connection = if self.keep_alive {
            "keep-alive"
        } else {
            "close"
        };
        self.headers.insert("Connection", connection);

        let mut buf = BytesMut::with_capacity(128 + self.headers.len() * 64 + content_length);
        buf.put(
            format!(
                "HTTP/1.1 {} {}\r\n",
                self.status.as_u16(),
                self.status.canonical_reason()
            )
            .as_bytes(),
        );
        for (name, value) in self.headers.iter() {
            buf.put(format!("{name}: {value}\r\n").as_bytes());
        }
        buf.put(format!("Content-Length: {content_length}\r\n").as_bytes());
        buf.put(&b"\r\n"[..]);
        buf.put(self.body.as_slice());
        buf
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::Ok)
    }
}

/// Body bytes. The first write commits the current status if none was committed.
impl io::Write for Response {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.status_written = true;
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
