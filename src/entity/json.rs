//! JSON accessor backed by `serde_json`.

use std::io::{self, Write};

use super::{DecodeSink, EntityAccessor, EntityError, MIME_JSON, write_rendered};
use crate::http::{HEADER_CONTENT_TYPE, Response, StatusCode};

/// Reads and writes JSON.
///
/// Number literals decoded into `serde_json::Value` keep their exact text, so
/// integers wider than `f64` can represent survive a round trip.
#[derive(Debug, Clone)]
pub struct JsonAccessor {
    content_type: String,
}

impl JsonAccessor {
    /// `content_type` is what [`write`](EntityAccessor::write) puts in the
    /// `Content-Type` header.
    pub fn new(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
        }
    }
}

impl Default for JsonAccessor {
    fn default() -> Self {
        Self::new(MIME_JSON)
    }
}

impl EntityAccessor for JsonAccessor {
    fn read(&self, body: &mut dyn io::Read, sink: &mut DecodeSink<'_>) -> Result<(), EntityError> {
        let mut de = serde_json::Deserializer::from_reader(body);
        sink(&mut <dyn erased_serde::Deserializer>::erase(&mut de))?;
        de.end()?;
        Ok(())
    }

    fn write(
        &self,
        resp: &mut Response,
        status: StatusCode,
        value: Option<&dyn erased_serde::Serialize>,
    ) -> Result<(), EntityError> {
        let Some(value) = value else {
            resp.write_header(status);
            return Ok(());
        };
        if resp.is_pretty_print() {
            let output = serde_json::to_vec_pretty(&value)?;
            write_rendered(resp, status, &self.content_type, None, &output)?;
            return Ok(());
        }
        resp.set_header(HEADER_CONTENT_TYPE, self.content_type.as_str());
        resp.write_header(status);
        serde_json::to_writer(&mut *resp, &value)?;
        resp.flush()?;
        Ok(())
    }
}
