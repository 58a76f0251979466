//! Content accessor registry: body (de)serialization keyed by MIME type.
//!
//! An [`EntityAccessor`] knows one wire format. It decodes a request body into
//! a value and encodes a value into a response body. Accessors are registered
//! in an [`EntityRegistry`] under a MIME type and looked up when a handler
//! calls [`Context::read_entity`](crate::context::Context::read_entity) or
//! [`Response::write_entity`].
//!
//! Lookup is exact first. On a miss the registry falls back to any registered
//! key that is a substring of the requested type, so
//! `application/json; charset=utf-8` still finds the JSON accessor. The
//! fallback is loose: a key `"xml"` also answers for
//! `application/vnd.custom+xml`.
//!
//! The accessor trait is object safe: values cross it as
//! `&dyn erased_serde::Serialize`, and decoding hands an erased deserializer
//! to a sink supplied by the caller, who knows the concrete target type.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use erased_serde::{Deserializer as ErasedDeserializer, Error as DecodeError};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::http::{HEADER_CONTENT_TYPE, Response, StatusCode};

pub mod accept;
pub mod json;
pub mod xml;

pub use json::JsonAccessor;
pub use xml::XmlAccessor;

pub const MIME_JSON: &str = "application/json";
pub const MIME_XML: &str = "application/xml";
/// Assumed for a body-carrying request that arrives without a `Content-Type`.
pub const MIME_OCTET: &str = "application/octet-stream";

/// Errors raised while reading or writing an entity body.
///
/// A write error leaves the response in whatever state the encoder reached;
/// treat its status, headers and body as indeterminate.
#[derive(Debug, Error)]
pub enum EntityError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML encoding error: {0}")]
    XmlEncode(#[from] quick_xml::se::SeError),

    #[error("unable to decode entity: {0}")]
    Decode(#[from] DecodeError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("unable to unmarshal content of type: {content_type}")]
    UnsupportedContentType { content_type: String },

    #[error("accessor finished without producing a value")]
    NotDecoded,
}

/// Receives the erased deserializer an accessor builds over a request body.
pub type DecodeSink<'a> =
    dyn for<'de> FnMut(&mut dyn ErasedDeserializer<'de>) -> Result<(), DecodeError> + 'a;

/// Reads and writes values in one encoding such as JSON or XML.
pub trait EntityAccessor: Send + Sync {
    /// Builds a decoder over `body` and passes it to `sink` exactly once.
    fn read(&self, body: &mut dyn io::Read, sink: &mut DecodeSink<'_>) -> Result<(), EntityError>;

    /// Writes `value` with `status` onto `resp`.
    ///
    /// `None` writes the status only, never an empty representation. Otherwise
    /// the response's pretty-print flag selects between streaming a compact
    /// encoding and rendering an indented one before anything is written.
    fn write(
        &self,
        resp: &mut Response,
        status: StatusCode,
        value: Option<&dyn erased_serde::Serialize>,
    ) -> Result<(), EntityError>;
}

/// Decodes `body` into a `T` through `accessor`.
pub fn decode<T: DeserializeOwned>(
    accessor: &dyn EntityAccessor,
    mut body: &[u8],
) -> Result<T, EntityError> {
    let mut entity = None;
    accessor.read(&mut body, &mut |de| {
        entity = Some(erased_serde::deserialize::<T>(de)?);
        Ok(())
    })?;
    entity.ok_or(EntityError::NotDecoded)
}

// Writes an already rendered representation: status, header, prolog, body.
fn write_rendered(
    resp: &mut Response,
    status: StatusCode,
    content_type: &str,
    prolog: Option<&str>,
    output: &[u8],
) -> io::Result<()> {
    use std::io::Write;

    resp.set_header(HEADER_CONTENT_TYPE, content_type);
    resp.write_header(status);
    if let Some(prolog) = prolog {
        resp.write_all(prolog.as_bytes())?;
    }
    resp.write_all(output)
}

static SHARED: LazyLock<Arc<EntityRegistry>> =
    LazyLock::new(|| Arc::new(EntityRegistry::with_defaults()));

/// MIME type to accessor mapping behind a read-write lock.
///
/// Registration takes the write lock, lookups the read lock. Entries are
/// replaced but never removed.
///
/// # Examples
///
/// ```
/// use restmux::entity::{EntityRegistry, JsonAccessor, MIME_JSON};
///
/// let registry = EntityRegistry::with_defaults();
/// assert!(registry.resolve(MIME_JSON).is_some());
/// assert!(registry.resolve("application/json; charset=utf-8").is_some());
///
/// registry.register("text/x-json", JsonAccessor::new("text/x-json"));
/// assert!(registry.resolve("text/x-json").is_some());
/// ```
pub struct EntityRegistry {
    accessors: RwLock<HashMap<String, Arc<dyn EntityAccessor>>>,
}

impl EntityRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            accessors: RwLock::new(HashMap::new()),
        }
    }

    /// A registry holding the JSON and XML accessors.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(MIME_JSON, JsonAccessor::default());
        registry.register(MIME_XML, XmlAccessor::default());
        registry
    }

    /// The process-wide registry, created with the defaults on first use.
    pub fn shared() -> Arc<Self> {
        Arc::clone(&SHARED)
    }

    /// Adds or replaces the accessor for `mime`.
    pub fn register(&self, mime: impl Into<String>, accessor: impl EntityAccessor + 'static) {
        let mime = mime.into();
        tracing::debug!(mime = %mime, "registering entity accessor");
        self.accessors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(mime, Arc::new(accessor));
    }

    /// Finds the accessor for `mime`.
    ///
    /// Exact key first. Otherwise every key contained in `mime` qualifies and
    /// the longest one wins, ties broken by key order, so the answer does not
    /// depend on hash iteration order.
    pub fn resolve(&self, mime: &str) -> Option<Arc<dyn EntityAccessor>> {
        let accessors = self
            .accessors
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(accessor) = accessors.get(mime) {
            return Some(Arc::clone(accessor));
        }
        accessors
            .iter()
            .filter(|(key, _)| mime.contains(key.as_str()))
            .max_by_key(|&(key, _)| (key.len(), Reverse(key.as_str())))
            .map(|(_, accessor)| Arc::clone(accessor))
    }

    /// Registered MIME types, sorted.
    pub fn mime_types(&self) -> Vec<String> {
        let accessors = self
            .accessors
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<String> = accessors.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for EntityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRegistry")
            .field("mime_types", &self.mime_types())
            .finish()
    }
}
