use std::collections::HashMap;

use super::tokenize_path;

/// Path parameters pulled out of a request path by a matched template.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct PathParams {
    map: HashMap<String, String>,
}

impl PathParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `key -> value`, replacing an earlier value for the same key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.map.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Maps the variables in `tokens` to the corresponding segments of `url_path`.
///
/// The path is assumed to already match the template, so regex constraints
/// are not checked again. A path shorter than the template yields `""` for
/// the missing segments. A `{name:*}` token takes the rest of the path,
/// slash-joined, and ends extraction.
///
/// ```
/// use restmux::path::extract;
///
/// let tokens = ["files".to_owned(), "{path:*}".to_owned(), "{never}".to_owned()];
/// let params = extract(&tokens, "/files/a/b/c");
/// assert_eq!(params.get("path"), Some("a/b/c"));
/// assert_eq!(params.len(), 1);
/// ```
pub fn extract(tokens: &[String], url_path: &str) -> PathParams {
    let url_parts = tokenize_path(url_path);
    let mut params = PathParams::new();

    for (i, token) in tokens.iter().enumerate() {
        let Some(inner) = token
            .strip_prefix('{')
            .map(|t| t.strip_suffix('}').unwrap_or(t))
        else {
            continue;
        };
        let value = url_parts.get(i).copied().unwrap_or("");
        match inner.split_once(':') {
            Some((name, pattern)) if pattern.trim() == "*" => {
                let rest = url_parts.get(i..).map(|p| p.join("/")).unwrap_or_default();
                params.insert(name.trim(), rest);
                break;
            }
            Some((name, _)) => params.insert(name.trim(), value),
            None => params.insert(inner.trim(), value),
        }
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(template: &str) -> Vec<String> {
        tokenize_path(template)
            .into_iter()
            .map(str::to_owned)
            .collect()
    }

    #[test]
    fn simple_variable() {
        let params = extract(&tokens("/users/{id}"), "/users/42");
        assert_eq!(params.get("id"), Some("42"));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn literals_are_not_surfaced() {
        let params = extract(&tokens("/root/static/{id}"), "/root/static/x");
        assert!(!params.contains("root"));
        assert!(!params.contains("static"));
        assert_eq!(params.get("id"), Some("x"));
    }

    #[test]
    fn regex_variable_is_not_revalidated() {
        let params = extract(&tokens("/items/{id:[0-9]+}"), "/items/abc");
        assert_eq!(params.get("id"), Some("abc"));
    }

    #[test]
    fn tail_wildcard_stops_extraction() {
        let params = extract(&tokens("/files/{path:*}/{after}"), "/files/a/b/c");
        assert_eq!(params.get("path"), Some("a/b/c"));
        assert!(!params.contains("after"));
    }

    #[test]
    fn tail_wildcard_past_end_is_empty() {
        let params = extract(&tokens("/files/{path:*}"), "/files");
        assert_eq!(params.get("path"), Some(""));
    }

    #[test]
    fn short_path_degrades_to_empty_values() {
        let params = extract(&tokens("/users/{uid}/posts/{pid}"), "/users/7");
        assert_eq!(params.get("uid"), Some("7"));
        assert_eq!(params.get("pid"), Some(""));
    }

    #[test]
    fn repeated_name_last_wins() {
        let params = extract(&tokens("/{x}/{x}"), "/first/second");
        assert_eq!(params.get("x"), Some("second"));
    }

    #[test]
    fn empty_template_extracts_nothing() {
        assert!(extract(&[], "/anything/here").is_empty());
    }
}
