use std::future::Future;
use std::sync::Arc;

use serde::Serialize;

use super::{BoxFuture, Parameter, ResponseError, Route, RouteDoc, RouteError, RouteHandler};
use crate::context::Context;
use crate::filter::FilterFn;
use crate::http::{Method, Response};
use crate::path::PathTemplate;

/// Collects everything a [`Route`] needs, then compiles it with [`build`](Self::build).
///
/// A builder obtained from a service shortcut such as
/// [`ServiceBuilder::get`](crate::service::ServiceBuilder::get) already
/// carries the service root path. A builder made with [`RouteBuilder::new`]
/// picks up the root of the service it is added to.
///
/// # Examples
///
/// ```
/// use restmux::http::{Method, Response};
/// use restmux::route::{Parameter, RouteBuilder};
///
/// let route = RouteBuilder::new()
///     .root("/users/")
///     .method(Method::Get)
///     .path("/{id}")
///     .doc("find a user")
///     .param(Parameter::path("id", "identifier of the user"))
///     .produces(["application/json"])
///     .to(|_ctx, resp: Response| async move { resp })
///     .build()
///     .unwrap();
///
/// assert_eq!(route.path(), "/users/{id}");
/// assert_eq!(route.relative_path(), "/{id}");
/// assert_eq!(route.doc().operation, "GET /users/{id}");
/// ```
#[derive(Default)]
#[must_use]
pub struct RouteBuilder {
    root_path: Option<String>,
    current_path: String,
    method: Option<Method>,
    produces: Vec<String>,
    consumes: Vec<String>,
    handler: Option<RouteHandler>,
    filters: Vec<FilterFn>,
    doc: RouteDoc,
}

impl RouteBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the root path the relative path is appended to.
    pub fn root(mut self, root: impl Into<String>) -> Self {
        self.root_path = Some(root.into());
        self
    }

    /// Sets the HTTP method; `GET` when never called.
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Sets the path template relative to the root.
    pub fn path(mut self, sub_path: impl Into<String>) -> Self {
        self.current_path = sub_path.into();
        self
    }

    /// Binds the async handler.
    pub fn to<H, Fut>(mut self, handler: H) -> Self
    where
        H: Fn(Context, Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        let handler: RouteHandler =
            Arc::new(move |ctx: Context, resp: Response| -> BoxFuture<Response> {
                Box::pin(handler(ctx, resp))
            });
        self.handler = Some(handler);
        self
    }

    /// Appends a filter that runs only for this route.
    pub fn filter(mut self, filter: FilterFn) -> Self {
        self.filters.push(filter);
        self
    }

    /// Replaces the media types this route produces.
    pub fn produces<I, S>(mut self, mime_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.produces = mime_types.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the media types this route consumes.
    pub fn consumes<I, S>(mut self, mime_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.consumes = mime_types.into_iter().map(Into::into).collect();
        self
    }

    pub fn doc(mut self, summary: impl Into<String>) -> Self {
        self.doc.summary = summary.into();
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.doc.notes = notes.into();
        self
    }

    /// Names the operation; defaults to `"<METHOD> <path>"`.
    pub fn operation(mut self, name: impl Into<String>) -> Self {
        self.doc.operation = name.into();
        self
    }

    pub fn param(mut self, parameter: Parameter) -> Self {
        self.doc.parameters.push(parameter);
        self
    }

    /// Records an example request payload.
    pub fn reads<T: Serialize>(mut self, sample: &T) -> Self {
        self.doc.read_sample = sample_value(sample);
        self
    }

    /// Records an example response payload.
    pub fn writes<T: Serialize>(mut self, sample: &T) -> Self {
        self.doc.write_sample = sample_value(sample);
        self
    }

    /// Documents a possible outcome of the route.
    pub fn returns(
        mut self,
        code: u16,
        message: impl Into<String>,
        model: Option<serde_json::Value>,
    ) -> Self {
        self.doc.response_errors.insert(
            code,
            ResponseError {
                code,
                message: message.into(),
                model,
            },
        );
        self
    }

    // Fills in what the owning service provides and the builder left unset.
    pub(crate) fn inherit(&mut self, root: &str, produces: &[String], consumes: &[String]) {
        if self.root_path.is_none() {
            self.root_path = Some(root.to_owned());
        }
        if self.produces.is_empty() {
            self.produces = produces.to_vec();
        }
        if self.consumes.is_empty() {
            self.consumes = consumes.to_vec();
        }
    }

    /// Compiles the route.
    ///
    /// # Errors
    ///
    /// - [`RouteError::MissingHandler`]: [`to`](Self::to) was never called.
    /// - [`RouteError::InvalidTemplate`]: the joined path does not compile.
    pub fn build(self) -> Result<Route, RouteError> {
        let method = self.method.unwrap_or(Method::Get);
        let path = join_paths(self.root_path.as_deref().unwrap_or(""), &self.current_path);
        let Some(handler) = self.handler else {
            return Err(RouteError::MissingHandler {
                method: method.to_string(),
                path,
            });
        };
        let template = PathTemplate::compile(&path)?;

        let mut doc = self.doc;
        if doc.operation.is_empty() {
            doc.operation = format!("{method} {path}");
        }

        Ok(Route {
            method,
            path,
            relative_path: self.current_path,
            produces: self.produces,
            consumes: self.consumes,
            handler,
            filters: self.filters,
            template,
            doc,
        })
    }
}

fn join_paths(root: &str, sub: &str) -> String {
    format!(
        "{}/{}",
        root.trim_end_matches('/'),
        sub.trim_start_matches('/')
    )
}

fn sample_value<T: Serialize>(sample: &T) -> Option<serde_json::Value> {
    match serde_json::to_value(sample) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(error = %e, "documentation sample is not serializable");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::Serialize;

    use super::*;

    fn noop() -> RouteBuilder {
        RouteBuilder::new()
            .to(|_ctx, resp: Response| async move { resp })
    }

    #[test]
    fn join_trims_one_side_each() {
        assert_eq!(join_paths("/users/", "/{id}"), "/users/{id}");
        assert_eq!(join_paths("/users", "{id}"), "/users/{id}");
        assert_eq!(join_paths("/", ""), "/");
        assert_eq!(join_paths("", ""), "/");
        assert_eq!(join_paths("/users", ""), "/users/");
    }

    #[test]
    fn missing_handler_is_an_error() {
        let err = RouteBuilder::new()
            .method(Method::Post)
            .path("/users")
            .build()
            .unwrap_err();
        let RouteError::MissingHandler { method, path } = err else {
            panic!("expected a missing handler error, got {err:?}");
        };
        assert_eq!(method, "POST");
        assert_eq!(path, "/users");
    }

    #[test]
    fn invalid_template_is_an_error() {
        let err = noop().path("/items/{id:[0-9}").build().unwrap_err();
        assert!(matches!(err, RouteError::InvalidTemplate(_)));
    }

    #[test]
    fn method_defaults_to_get() {
        let route = noop().path("/ping").build().unwrap();
        assert_eq!(route.method(), &Method::Get);
    }

    #[test]
    fn inherit_only_fills_gaps() {
        let mut builder = noop().root("/own").produces(["text/csv"]);
        let produces = ["application/json".to_owned()];
        let consumes = ["application/xml".to_owned()];
        builder.inherit("/svc", &produces, &consumes);
        let route = builder.path("/x").build().unwrap();
        assert_eq!(route.path(), "/own/x");
        assert_eq!(route.produces(), ["text/csv"]);
        assert_eq!(route.consumes(), ["application/xml"]);
    }

    #[test]
    fn documentation_is_recorded() {
        #[derive(Serialize)]
        struct User {
            name: &'static str,
        }

        let route = noop()
            .path("/users")
            .doc("create a user")
            .notes("names must be unique")
            .operation("createUser")
            .reads(&User { name: "ada" })
            .returns(409, "duplicate name", None)
            .returns(409, "name already taken", None)
            .build()
            .unwrap();

        let doc = route.doc();
        assert_eq!(doc.summary, "create a user");
        assert_eq!(doc.operation, "createUser");
        assert_eq!(doc.read_sample.as_ref().unwrap()["name"], "ada");
        assert_eq!(doc.response_errors.len(), 1);
        assert_eq!(doc.response_errors[&409].message, "name already taken");
    }
}
