//! Path templates: compile `/users/{id}` style patterns and match them.
//!
//! A template is split on `/` into segments. Each segment is one of:
//!
//! | Segment         | Matches                                              |
//! |-----------------|------------------------------------------------------|
//! | `users`         | exactly `users`                                      |
//! | `{id}`          | any single segment                                   |
//! | `{id:[0-9]+}`   | a single segment satisfying the regex                |
//! | `{path:*}`      | everything from here to the end, slashes included    |
//!
//! Compilation produces two things: a [`Regex`] for testing concrete paths and
//! the raw segment tokens used by [`extract`] to pull parameter values out of
//! a path that is already known to match.
//!
//! Regex fragments must not contain `/`; the template is split on slashes
//! before any fragment is looked at.

use std::fmt;

use regex::Regex;
use thiserror::Error;

mod params;

pub use params::{PathParams, extract};

/// Errors raised while compiling a path template.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("invalid path template {template:?}: {source}")]
    InvalidRegex {
        template: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid path template {template:?}: unterminated variable {segment:?}")]
    MalformedVariable { template: String, segment: String },
}

/// Splits `path` on `/`, dropping empty segments.
///
/// `/a//b/` and `a/b` both tokenize to `["a", "b"]`; `/` tokenizes to nothing.
pub fn tokenize_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// A compiled path template.
///
/// # Examples
///
/// ```
/// use restmux::path::PathTemplate;
///
/// let template = PathTemplate::compile("/items/{id:[0-9]+}").unwrap();
/// assert!(template.is_match("/items/42"));
/// assert!(!template.is_match("/items/abc"));
/// assert_eq!(template.extract("/items/42").get("id"), Some("42"));
///
/// let files = PathTemplate::compile("/files/{path:*}").unwrap();
/// assert_eq!(files.extract("/files/a/b/c").get("path"), Some("a/b/c"));
/// ```
#[derive(Debug, Clone)]
pub struct PathTemplate {
    source: String,
    tokens: Vec<String>,
    var_names: Vec<String>,
    literal_count: usize,
    matcher: Regex,
}

impl PathTemplate {
    /// Compiles `template`.
    ///
    /// # Errors
    ///
    /// - [`TemplateError::MalformedVariable`]: a segment opens `{` but does not end with `}`.
    /// - [`TemplateError::InvalidRegex`]: a `{name:regex}` fragment does not compile.
    pub fn compile(template: &str) -> Result<Self, TemplateError> {
        let tokens = tokenize_path(template);
        let mut expression = String::from("^");
        let mut var_names = Vec::new();
        let mut literal_count = 0;

        for token in &tokens {
            expression.push('/');
            match Segment::parse(token) {
                Some(Segment::Variable { name, pattern }) => {
                    var_names.push(name.to_owned());
                    match pattern {
                        None => expression.push_str("([^/]+?)"),
                        Some("*") => expression.push_str("(.*)"),
                        Some(pattern) => {
                            expression.push('(');
                            expression.push_str(pattern);
                            expression.push(')');
                        }
                    }
                }
                Some(Segment::Literal(literal)) => {
                    literal_count += literal.len();
                    expression.push_str(&regex::escape(literal));
                }
                None => {
                    return Err(TemplateError::MalformedVariable {
                        template: template.to_owned(),
                        segment: (*token).to_owned(),
                    });
                }
            }
        }
        // Anything past the template is captured by the last group.
        expression.push_str("(/.*)?$");

        let matcher = Regex::new(&expression).map_err(|e| TemplateError::InvalidRegex {
            template: template.to_owned(),
            source: e,
        })?;

        Ok(Self {
            source: template.to_owned(),
            tokens: tokens.into_iter().map(str::to_owned).collect(),
            var_names,
            literal_count,
            matcher,
        })
    }

    /// The template text this was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Raw segment tokens, braces and regex fragments included.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Parameter names in template order.
    pub fn var_names(&self) -> &[String] {
        &self.var_names
    }

    pub fn var_count(&self) -> usize {
        self.var_names.len()
    }

    /// Number of characters in literal segments; more literal text means a
    /// more specific template.
    pub fn literal_count(&self) -> usize {
        self.literal_count
    }

    /// Matches the template against the start of `path` and returns the
    /// unmatched remainder (`""` when the whole path was consumed).
    pub fn match_prefix<'p>(&self, path: &'p str) -> Option<&'p str> {
        let captures = self.matcher.captures(path)?;
        let rest = captures.get(captures.len() - 1).map_or("", |m| m.as_str());
        Some(rest)
    }

    /// `true` when the template matches all of `path`, allowing one trailing slash.
    pub fn is_match(&self, path: &str) -> bool {
        matches!(self.match_prefix(path), Some("" | "/"))
    }

    /// Pulls parameter values out of `path`. See [`extract`].
    pub fn extract(&self, path: &str) -> PathParams {
        extract(&self.tokens, path)
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

// One template segment, borrowed from its token.
#[derive(Debug, PartialEq)]
enum Segment<'a> {
    Literal(&'a str),
    Variable {
        name: &'a str,
        pattern: Option<&'a str>,
    },
}

impl<'a> Segment<'a> {
    // `None` for a `{` segment without a closing `}`.
    fn parse(token: &'a str) -> Option<Self> {
        let Some(inner) = token.strip_prefix('{') else {
            return Some(Segment::Literal(token));
        };
        let inner = inner.strip_suffix('}')?;
        Some(match inner.split_once(':') {
            Some((name, pattern)) => Segment::Variable {
                name: name.trim(),
                pattern: Some(pattern.trim()),
            },
            None => Segment::Variable {
                name: inner.trim(),
                pattern: None,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_drops_empty_segments() {
        assert_eq!(tokenize_path("/a//b/"), ["a", "b"]);
        assert_eq!(tokenize_path("a/b"), ["a", "b"]);
        assert!(tokenize_path("/").is_empty());
        assert!(tokenize_path("").is_empty());
    }

    #[test]
    fn segment_kinds() {
        assert_eq!(Segment::parse("users"), Some(Segment::Literal("users")));
        assert_eq!(
            Segment::parse("{id}"),
            Some(Segment::Variable {
                name: "id",
                pattern: None
            })
        );
        assert_eq!(
            Segment::parse("{id:[0-9]{2,}}"),
            Some(Segment::Variable {
                name: "id",
                pattern: Some("[0-9]{2,}")
            })
        );
        assert_eq!(Segment::parse("{id"), None);
    }

    #[test]
    fn equivalent_spellings_compile_alike() {
        let a = PathTemplate::compile("/a//b/").unwrap();
        let b = PathTemplate::compile("/a/b").unwrap();
        assert_eq!(a.tokens(), b.tokens());
        assert!(a.is_match("/a/b"));
        assert!(b.is_match("/a/b/"));
    }

    #[test]
    fn root_matches_everything_as_prefix() {
        let root = PathTemplate::compile("/").unwrap();
        assert!(root.tokens().is_empty());
        assert!(root.is_match("/"));
        assert!(root.is_match(""));
        assert_eq!(root.match_prefix("/users/1"), Some("/users/1"));
        assert!(!root.is_match("/users"));
    }

    #[test]
    fn literal_segments_match_exactly() {
        let t = PathTemplate::compile("/api/v1.0").unwrap();
        assert!(t.is_match("/api/v1.0"));
        assert!(!t.is_match("/api/v1x0"));
        assert!(!t.is_match("/api"));
        assert_eq!(t.literal_count(), "apiv1.0".len());
    }

    #[test]
    fn simple_variable_takes_one_segment() {
        let t = PathTemplate::compile("/users/{id}").unwrap();
        assert!(t.is_match("/users/42"));
        assert!(!t.is_match("/users/42/posts"));
        assert_eq!(t.match_prefix("/users/42/posts"), Some("/posts"));
        assert!(t.match_prefix("/accounts/42").is_none());
        assert_eq!(t.var_names(), ["id"]);
    }

    #[test]
    fn regex_variable_constrains_segment() {
        let t = PathTemplate::compile("/items/{id:[0-9]+}").unwrap();
        assert!(t.is_match("/items/123"));
        assert!(!t.is_match("/items/abc"));
    }

    #[test]
    fn tail_wildcard_spans_slashes() {
        let t = PathTemplate::compile("/files/{path:*}").unwrap();
        assert!(t.is_match("/files/a/b/c"));
        assert!(t.is_match("/files/"));
        assert_eq!(t.var_count(), 1);
    }

    #[test]
    fn bad_regex_is_rejected() {
        let err = PathTemplate::compile("/items/{id:[0-9+}").unwrap_err();
        assert!(matches!(err, TemplateError::InvalidRegex { .. }));
        assert!(err.to_string().contains("/items/{id:[0-9+}"));
    }

    #[test]
    fn unterminated_variable_is_rejected() {
        let err = PathTemplate::compile("/items/{id").unwrap_err();
        assert!(matches!(
            err,
            TemplateError::MalformedVariable { ref segment, .. } if segment == "{id"
        ));
    }

    #[test]
    fn extract_through_template() {
        let t = PathTemplate::compile("/users/{uid}/posts/{pid}").unwrap();
        let params = t.extract("/users/7/posts/99");
        assert_eq!(params.get("uid"), Some("7"));
        assert_eq!(params.get("pid"), Some("99"));
    }
}
