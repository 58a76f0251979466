//! Documentation metadata attached to routes and services.
//!
//! Nothing here takes part in matching or dispatch. It exists so that API
//! description tooling can walk a [`Service`](crate::service::Service) and
//! describe every route, its parameters and its error responses.

use std::collections::BTreeMap;

use serde::Serialize;

/// Where a documented parameter travels in the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    Path,
    Query,
    Body,
    Header,
    Form,
}

/// A documented request parameter.
///
/// The constructors mirror common usage: path and body parameters start out
/// required, the others optional, and every kind but body is typed `string`.
///
/// ```
/// use restmux::route::{Parameter, ParameterKind};
///
/// let id = Parameter::path("id", "identifier of the user");
/// assert!(id.is_required());
/// assert_eq!(id.get_data_type(), Some("string"));
///
/// let limit = Parameter::query("limit", "page size").data_type("integer").default_value("20");
/// assert_eq!(limit.kind(), ParameterKind::Query);
/// assert!(!limit.is_required());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Parameter {
    name: String,
    description: String,
    kind: ParameterKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    data_type: Option<String>,
    required: bool,
    allow_multiple: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    default_value: Option<String>,
}

impl Parameter {
    fn new(kind: ParameterKind, name: &str, description: &str, required: bool) -> Self {
        Self {
            name: name.to_owned(),
            description: description.to_owned(),
            kind,
            data_type: (kind != ParameterKind::Body).then(|| "string".to_owned()),
            required,
            allow_multiple: false,
            default_value: None,
        }
    }

    pub fn path(name: &str, description: &str) -> Self {
        Self::new(ParameterKind::Path, name, description, true)
    }

    pub fn query(name: &str, description: &str) -> Self {
        Self::new(ParameterKind::Query, name, description, false)
    }

    /// A request body; required and untyped until [`data_type`](Self::data_type) is called.
    pub fn body(name: &str, description: &str) -> Self {
        Self::new(ParameterKind::Body, name, description, true)
    }

    pub fn header(name: &str, description: &str) -> Self {
        Self::new(ParameterKind::Header, name, description, false)
    }

    /// A field of an `application/x-www-form-urlencoded` body.
    pub fn form(name: &str, description: &str) -> Self {
        Self::new(ParameterKind::Form, name, description, false)
    }

    #[must_use]
    pub fn data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = Some(data_type.into());
        self
    }

    #[must_use]
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    #[must_use]
    pub fn allow_multiple(mut self, allow_multiple: bool) -> Self {
        self.allow_multiple = allow_multiple;
        self
    }

    #[must_use]
    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn kind(&self) -> ParameterKind {
        self.kind
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn allows_multiple(&self) -> bool {
        self.allow_multiple
    }

    pub fn get_data_type(&self) -> Option<&str> {
        self.data_type.as_deref()
    }

    pub fn get_default_value(&self) -> Option<&str> {
        self.default_value.as_deref()
    }
}

/// A documented non-success outcome of a route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseError {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<serde_json::Value>,
}

/// Everything a route says about itself for documentation purposes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RouteDoc {
    pub summary: String,
    pub notes: String,
    pub operation: String,
    pub parameters: Vec<Parameter>,
    /// Keyed by status code; a later entry for the same code replaces the earlier one.
    pub response_errors: BTreeMap<u16, ResponseError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_sample: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_sample: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor_defaults() {
        let body = Parameter::body("user", "the new user");
        assert!(body.is_required());
        assert_eq!(body.get_data_type(), None);

        let header = Parameter::header("X-Trace", "trace id");
        assert!(!header.is_required());
        assert_eq!(header.get_data_type(), Some("string"));

        let form = Parameter::form("name", "display name");
        assert_eq!(form.kind(), ParameterKind::Form);
        assert!(!form.is_required());
    }

    #[test]
    fn parameter_serializes_kind_lowercase() {
        let json = serde_json::to_value(Parameter::path("id", "user id")).unwrap();
        assert_eq!(json["kind"], "path");
        assert_eq!(json["required"], true);
        assert!(json.get("default_value").is_none());
    }

    #[test]
    fn setters_override_defaults() {
        let p = Parameter::query("tag", "filter")
            .required(true)
            .allow_multiple(true)
            .default_value("all");
        assert!(p.is_required());
        assert!(p.allows_multiple());
        assert_eq!(p.get_default_value(), Some("all"));
    }
}
