//! Routes: one method + path template bound to a handler.
//!
//! A [`Route`] is produced by a [`RouteBuilder`] and never changes afterwards.
//! It answers the questions the dispatcher asks while narrowing candidates:
//! does the path match ([`PathTemplate::is_match`] on [`Route::template`]),
//! does the method match, can the route consume the request's
//! `Content-Type`, can it produce something the client `Accept`s. Once
//! selected, [`Route::wrap`] binds the request to the route and
//! [`Route::dispatch_with`] runs the filters and the handler.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;

use crate::context::Context;
use crate::entity::MIME_OCTET;
use crate::entity::accept::bare_media_types;
use crate::filter::{FilterChain, FilterFn};
use crate::http::{Method, Request, Response};
use crate::path::{PathParams, PathTemplate, TemplateError};

mod builder;
mod doc;

pub use builder::RouteBuilder;
pub use doc::{Parameter, ParameterKind, ResponseError, RouteDoc};

/// A boxed, sendable future.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Type-erased async handler bound to a route.
///
/// The handler receives the request [`Context`] and the [`Response`] to write
/// into, and hands the response back when it is done.
pub type RouteHandler =
    Arc<dyn Fn(Context, Response) -> BoxFuture<Response> + Send + Sync + 'static>;

/// Errors raised while building a route.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("route {method} {path} has no handler")]
    MissingHandler { method: String, path: String },

    #[error(transparent)]
    InvalidTemplate(#[from] TemplateError),
}

/// A compiled, immutable route.
pub struct Route {
    method: Method,
    path: String,
    relative_path: String,
    produces: Vec<String>,
    consumes: Vec<String>,
    handler: RouteHandler,
    filters: Vec<FilterFn>,
    template: PathTemplate,
    doc: RouteDoc,
}

impl Route {
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Root path joined with the relative path, exactly as it was built.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The sub path given to the builder, without the service root.
    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    pub fn produces(&self) -> &[String] {
        &self.produces
    }

    pub fn consumes(&self) -> &[String] {
        &self.consumes
    }

    pub fn handler(&self) -> &RouteHandler {
        &self.handler
    }

    pub fn filters(&self) -> &[FilterFn] {
        &self.filters
    }

    pub fn template(&self) -> &PathTemplate {
        &self.template
    }

    pub fn doc(&self) -> &RouteDoc {
        &self.doc
    }

    /// `true` when the route can produce one of the media types in `accept`.
    ///
    /// Quality parameters are ignored. A candidate of `*/*`, or a produced
    /// type of `*/*`, always matches.
    ///
    /// ```
    /// use restmux::http::Response;
    /// use restmux::route::RouteBuilder;
    ///
    /// let route = RouteBuilder::new()
    ///     .path("/users")
    ///     .produces(["application/json"])
    ///     .to(|_ctx, resp: Response| async move { resp })
    ///     .build()
    ///     .unwrap();
    /// assert!(route.matches_accept("text/html, application/json;q=0.9"));
    /// assert!(route.matches_accept("*/*"));
    /// assert!(!route.matches_accept("application/xml"));
    /// ```
    pub fn matches_accept(&self, accept: &str) -> bool {
        bare_media_types(accept).any(|candidate| {
            candidate == "*/*"
                || self
                    .produces
                    .iter()
                    .any(|produced| produced == "*/*" || produced == candidate)
        })
    }

    /// `true` when the route can consume a body of type `content_type`.
    ///
    /// A route that declares no consumed types takes anything. An empty
    /// header is accepted outright for methods that carry no body; for the
    /// others it stands for `application/octet-stream`.
    pub fn matches_content_type(&self, content_type: &str) -> bool {
        if self.consumes.is_empty() {
            return true;
        }
        let content_type = if content_type.is_empty() {
            if self.method.carries_no_body() {
                return true;
            }
            MIME_OCTET
        } else {
            content_type
        };
        bare_media_types(content_type).any(|candidate| {
            self.consumes
                .iter()
                .any(|consumed| consumed == "*/*" || consumed == candidate)
        })
    }

    /// Path parameters of `url_path`, which must already match this route.
    pub fn extract_parameters(&self, url_path: &str) -> PathParams {
        self.template.extract(url_path)
    }

    /// Binds `request` and `response` to this route.
    ///
    /// The context receives the path parameters and the route path; the
    /// response learns the request's `Accept` value and the produced types so
    /// that entity writes can negotiate a format.
    pub fn wrap(&self, request: Request, mut response: Response) -> (Context, Response) {
        let params = self.extract_parameters(request.path());
        response.negotiate_for(request.accept(), &self.produces);
        let mut ctx = Context::with_registry(request, Arc::clone(response.registry()));
        ctx.bind_route(params, &self.path);
        (ctx, response)
    }

    /// Runs the route's filters, then the handler.
    pub async fn dispatch(&self, ctx: Context, resp: Response) -> Response {
        self.dispatch_with(ctx, resp, &[]).await
    }

    /// Runs `outer` filters, then the route's own filters, then the handler.
    ///
    /// With no filters at all the handler is called directly.
    pub async fn dispatch_with(
        &self,
        ctx: Context,
        resp: Response,
        outer: &[FilterFn],
    ) -> Response {
        if outer.is_empty() && self.filters.is_empty() {
            return (self.handler)(ctx, resp).await;
        }
        let filters: Vec<FilterFn> = outer.iter().chain(&self.filters).cloned().collect();
        FilterChain::new(filters, Arc::clone(&self.handler))
            .process(ctx, resp)
            .await
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("produces", &self.produces)
            .field("consumes", &self.consumes)
            .field("filters", &self.filters.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::filter::filter_fn;
    use crate::http::StatusCode;

    fn echo_route(method: Method, path: &str) -> RouteBuilder {
        RouteBuilder::new()
            .method(method)
            .path(path)
            .to(|ctx: Context, mut resp: Response| async move {
                let id = ctx.path_param("id").unwrap_or_default().to_owned();
                let _ = resp.write_all(id.as_bytes());
                resp
            })
    }

    fn route_producing(produces: &[&str]) -> Route {
        echo_route(Method::Get, "/users/{id}")
            .produces(produces.iter().copied())
            .build()
            .unwrap()
    }

    fn route_consuming(method: Method, consumes: &[&str]) -> Route {
        echo_route(method, "/users")
            .consumes(consumes.iter().copied())
            .build()
            .unwrap()
    }

    // ── matches_accept ────────────────────────────────────────────────────────

    #[test]
    fn wildcard_accept_matches_any_route() {
        assert!(route_producing(&["application/xml"]).matches_accept("*/*"));
        assert!(route_producing(&[]).matches_accept("*/*"));
        assert!(route_producing(&[]).matches_accept("text/plain, */*;q=0.1"));
    }

    #[test]
    fn quality_suffix_is_ignored() {
        let json = route_producing(&["application/json"]);
        assert!(json.matches_accept("application/json;q=0.9"));
        let accept = " text/html ; q=1 , application/json ; q=0.2";
        assert!(json.matches_accept(accept));
        assert!(!json.matches_accept("application/xml;q=0.9"));
    }

    #[test]
    fn wildcard_producer_matches_anything() {
        let any = route_producing(&["*/*"]);
        assert!(any.matches_accept("application/xml"));
        assert!(any.matches_accept(""));
    }

    #[test]
    fn empty_produces_rejects_specific_accept() {
        assert!(!route_producing(&[]).matches_accept("application/json"));
    }

    // ── matches_content_type ──────────────────────────────────────────────────

    #[test]
    fn no_consumes_takes_anything() {
        let route = route_consuming(Method::Post, &[]);
        assert!(route.matches_content_type("text/csv"));
        assert!(route.matches_content_type(""));
    }

    #[test]
    fn bodyless_method_accepts_missing_content_type() {
        let bodyless = [
            Method::Get,
            Method::Head,
            Method::Options,
            Method::Delete,
            Method::Trace,
        ];
        for method in bodyless {
            let route = route_consuming(method, &["application/json"]);
            assert!(route.matches_content_type(""));
        }
    }

    #[test]
    fn missing_content_type_on_post_means_octet_stream() {
        let json = route_consuming(Method::Post, &["application/json"]);
        assert!(!json.matches_content_type(""));
        let octet = route_consuming(Method::Post, &[MIME_OCTET]);
        assert!(octet.matches_content_type(""));
    }

    #[test]
    fn content_type_parameters_are_stripped() {
        let route = route_consuming(Method::Put, &["application/json"]);
        let with_charset = "application/json; charset=utf-8";
        assert!(route.matches_content_type(with_charset));
        assert!(!route.matches_content_type("application/xml"));
        let any = route_consuming(Method::Put, &["*/*"]);
        assert!(any.matches_content_type("text/csv"));
    }

    #[test]
    fn custom_lowercase_method_is_not_bodyless() {
        let route = route_consuming(Method::Custom("get".to_owned()), &["application/json"]);
        assert!(!route.matches_content_type(""));
    }

    // ── wrap / dispatch ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn wrap_binds_params_and_negotiation() {
        let route = route_producing(&["application/json"]);
        let request = Request::new(Method::Get, "/users/42")
            .header("Accept", "application/xml");
        let (ctx, resp) = route.wrap(request, Response::new(StatusCode::Ok));

        assert_eq!(ctx.path_param("id"), Some("42"));
        assert_eq!(ctx.selected_route_path(), "/users/{id}");
        assert_eq!(resp.request_accept(), "application/xml");
        assert_eq!(resp.route_produces(), ["application/json"]);

        let resp = route.dispatch(ctx, resp).await;
        assert_eq!(resp.body_ref(), b"42");
    }

    #[tokio::test]
    async fn outer_filters_run_before_route_filters() {
        let route = echo_route(Method::Get, "/users/{id}")
            .filter(filter_fn(|ctx, mut resp: Response, chain| async move {
                let _ = resp.write_all(b"route:");
                chain.process(ctx, resp).await
            }))
            .build()
            .unwrap();
        let outer = filter_fn(|ctx, mut resp: Response, chain| async move {
            let _ = resp.write_all(b"outer:");
            chain.process(ctx, resp).await
        });

        let request = Request::new(Method::Get, "/users/7");
        let (ctx, resp) = route.wrap(request, Response::new(StatusCode::Ok));
        let resp = route.dispatch_with(ctx, resp, &[outer]).await;
        assert_eq!(resp.body_ref(), b"outer:route:7");
    }

    #[test]
    fn display_is_method_and_path() {
        let route = route_producing(&[]);
        assert_eq!(route.to_string(), "GET /users/{id}");
    }
}
