//! Container configuration.

use serde::Deserialize;

/// Requests larger than this are rejected with `413` (8 MiB).
pub const DEFAULT_MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;

/// Settings shared by every request a [`Container`](crate::router::Container) serves.
///
/// Missing fields take their defaults, so partial documents are fine:
///
/// ```
/// use restmux::config::ContainerConfig;
///
/// let config = ContainerConfig::from_json(r#"{"pretty_print": false}"#).unwrap();
/// assert!(!config.pretty_print);
/// assert_eq!(config.default_response_mime_type, None);
/// assert_eq!(config.max_request_size, 8 * 1024 * 1024);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Indent entity output.
    pub pretty_print: bool,
    /// Media type written when `Accept` negotiation selects nothing.
    pub default_response_mime_type: Option<String>,
    pub max_request_size: usize,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            pretty_print: true,
            default_response_mime_type: None,
            max_request_size: DEFAULT_MAX_REQUEST_SIZE,
        }
    }
}

impl ContainerConfig {
    /// Parses a JSON document.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error for malformed input or mistyped fields.
    pub fn from_json(input: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        let config = ContainerConfig::from_json("{}").unwrap();
        assert_eq!(config, ContainerConfig::default());
    }

    #[test]
    fn all_fields() {
        let config = ContainerConfig::from_json(
            r#"{"pretty_print": false, "default_response_mime_type": "application/xml", "max_request_size": 1024}"#,
        )
        .unwrap();
        assert!(!config.pretty_print);
        let mime = config.default_response_mime_type.as_deref();
        assert_eq!(mime, Some("application/xml"));
        assert_eq!(config.max_request_size, 1024);
    }

    #[test]
    fn wrong_type_is_an_error() {
        let result = ContainerConfig::from_json(r#"{"max_request_size": "big"}"#);
        assert!(result.is_err());
    }
}
