//! Request dispatch: pick a service, pick a route, run it.
//!
//! A [`Container`] holds every [`Service`] of an application. For each request
//! it narrows the candidates step by step:
//!
//! | Step | Keeps                                               | Nothing left means        |
//! |------|-----------------------------------------------------|---------------------------|
//! | 1    | the most specific service whose root prefixes the path | `404 Not Found`        |
//! | 2    | its routes whose template matches the whole path    | `404 Not Found`           |
//! | 3    | routes with the request method                      | `405 Method Not Allowed`  |
//! | 4    | routes consuming the request `Content-Type`         | `415 Unsupported Media Type` |
//! | 5    | routes producing something in `Accept`              | `406 Not Acceptable`      |
//!
//! The first route left standing, in insertion order, handles the request.
//! Service specificity is the number of literal characters in the root
//! template, then the number of variables, both higher first.

use std::cmp::Reverse;
use std::sync::Arc;

use tracing::debug;

use crate::config::ContainerConfig;
use crate::entity::EntityRegistry;
use crate::filter::FilterFn;
use crate::http::{Method, Request, Response, StatusCode};
use crate::route::Route;
use crate::service::Service;

/// Outcome of route selection.
#[derive(Debug, Clone)]
pub enum RouteSelection {
    Matched {
        service: Arc<Service>,
        route: Arc<Route>,
    },
    NotFound,
    MethodNotAllowed,
    UnsupportedMediaType,
    NotAcceptable,
}

impl RouteSelection {
    /// Status code of a no-match outcome; `None` for [`RouteSelection::Matched`].
    pub fn failure_status(&self) -> Option<StatusCode> {
        match self {
            Self::Matched { .. } => None,
            Self::NotFound => Some(StatusCode::NotFound),
            Self::MethodNotAllowed => Some(StatusCode::MethodNotAllowed),
            Self::UnsupportedMediaType => Some(StatusCode::UnsupportedMediaType),
            Self::NotAcceptable => Some(StatusCode::NotAcceptable),
        }
    }
}

/// The set of services an application exposes.
///
/// # Examples
///
/// ```rust,no_run
/// use restmux::http::{Method, Request, Response, StatusCode};
/// use restmux::router::Container;
/// use restmux::service::ServiceBuilder;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let ping = ServiceBuilder::new().path("/ping");
/// let pong = ping.get("").to(|_ctx, mut resp: Response| async move {
///     resp.write_error_string(StatusCode::Ok, "pong");
///     resp
/// });
///
/// let mut container = Container::new();
/// container.add(ping.route(pong).build()?);
///
/// let response = container.dispatch(Request::new(Method::Get, "/ping")).await;
/// assert_eq!(response.body_ref(), b"pong");
/// # Ok(())
/// # }
/// ```
pub struct Container {
    services: Vec<Arc<Service>>,
    filters: Vec<FilterFn>,
    registry: Arc<EntityRegistry>,
    config: ContainerConfig,
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl Container {
    /// An empty container with default configuration and the process-wide
    /// accessor registry.
    pub fn new() -> Self {
        Self::with_config(ContainerConfig::default())
    }

    pub fn with_config(config: ContainerConfig) -> Self {
        Self {
            services: Vec::new(),
            filters: Vec::new(),
            registry: EntityRegistry::shared(),
            config,
        }
    }

    /// Uses `registry` instead of the process-wide one for every request.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<EntityRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Adds a service.
    pub fn add(&mut self, service: Service) -> &mut Self {
        debug!(root = %service.root_path(), routes = service.routes().len(), "service added");
        self.services.push(Arc::new(service));
        self
    }

    /// Appends a filter that runs for every matched request, before service
    /// and route filters.
    pub fn filter(&mut self, filter: FilterFn) -> &mut Self {
        self.filters.push(filter);
        self
    }

    pub fn services(&self) -> &[Arc<Service>] {
        &self.services
    }

    pub fn registry(&self) -> &Arc<EntityRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    /// Selects the route for a request. An empty `accept` means `*/*`.
    pub fn select_route(
        &self,
        method: &Method,
        path: &str,
        accept: &str,
        content_type: &str,
    ) -> RouteSelection {
        let Some(service) = self
            .services
            .iter()
            .filter(|service| service.template().match_prefix(path).is_some())
            .min_by_key(|service| {
                let template = service.template();
                (
                    Reverse(template.literal_count()),
                    Reverse(template.var_count()),
                )
            })
        else {
            debug!(%path, "no service root matches");
            return RouteSelection::NotFound;
        };

        let routes = service.routes();
        let by_path: Vec<&Arc<Route>> = routes
            .iter()
            .filter(|route| route.template().is_match(path))
            .collect();
        if by_path.is_empty() {
            debug!(%path, root = %service.root_path(), "no route matches path");
            return RouteSelection::NotFound;
        }

        let by_method: Vec<&Arc<Route>> = by_path
            .into_iter()
            .filter(|route| route.method() == method)
            .collect();
        if by_method.is_empty() {
            debug!(%method, %path, "no route matches method");
            return RouteSelection::MethodNotAllowed;
        }

        let by_content_type: Vec<&Arc<Route>> = by_method
            .into_iter()
            .filter(|route| route.matches_content_type(content_type))
            .collect();
        if by_content_type.is_empty() {
            debug!(%method, %path, %content_type, "no route consumes content type");
            return RouteSelection::UnsupportedMediaType;
        }

        let accept = if accept.is_empty() { "*/*" } else { accept };
        let Some(route) = by_content_type
            .into_iter()
            .find(|route| route.matches_accept(accept))
        else {
            debug!(%method, %path, %accept, "no route produces an acceptable type");
            return RouteSelection::NotAcceptable;
        };

        debug!(root = %service.root_path(), %route, "route selected");
        RouteSelection::Matched {
            service: Arc::clone(service),
            route: Arc::clone(route),
        }
    }

    /// Routes `request` and runs container, service and route filters, then
    /// the handler.
    ///
    /// A request that selects no route is answered with 404, 405, 415 or 406
    /// and a short plain-text body.
    pub async fn dispatch(&self, request: Request) -> Response {
        let mut response = Response::with_registry(StatusCode::Ok, Arc::clone(&self.registry));
        response.set_pretty_print(self.config.pretty_print);
        response.set_default_mime_type(self.config.default_response_mime_type.clone());

        let selection = self.select_route(
            request.method(),
            request.path(),
            request.accept(),
            request.content_type(),
        );
        let (service, route) = match selection {
            RouteSelection::Matched { service, route } => (service, route),
            failure => {
                let status = failure.failure_status().unwrap_or(StatusCode::NotFound);
                let reason = format!("{}: {}", status.as_u16(), status.canonical_reason());
                response.write_error_string(status, &reason);
                return response;
            }
        };

        let (ctx, resp) = route.wrap(request, response);
        let filters: Vec<FilterFn> = self
            .filters
            .iter()
            .chain(service.filters())
            .cloned()
            .collect();
        route.dispatch_with(ctx, resp, &filters).await
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::context::Context;
    use crate::entity::{MIME_JSON, MIME_XML};
    use crate::filter::filter_fn;
    use crate::route::RouteBuilder;
    use crate::service::ServiceBuilder;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct User {
        id: String,
    }

    fn tagged(builder: RouteBuilder, tag: &'static str) -> RouteBuilder {
        builder.to(move |_ctx: Context, mut resp: Response| async move {
            let _ = resp.write_all(tag.as_bytes());
            resp
        })
    }

    fn users_service() -> Service {
        let b = ServiceBuilder::new()
            .path("/users")
            .produces([MIME_JSON, MIME_XML])
            .consumes([MIME_JSON]);
        let find = b.get("/{id}").to(|ctx: Context, mut resp: Response| async move {
            let user = User {
                id: ctx.path_param("id").unwrap_or_default().to_owned(),
            };
            if let Err(e) = resp.write_entity(&user) {
                resp.write_error_string(StatusCode::InternalServerError, &e.to_string());
            }
            resp
        });
        let create = b.post("").to(|ctx: Context, mut resp: Response| async move {
            match ctx.read_entity::<User>() {
                Ok(user) => {
                    let _ = resp.write_header_and_entity(StatusCode::Created, Some(&user));
                }
                Err(e) => resp.write_error_string(StatusCode::BadRequest, &e.to_string()),
            }
            resp
        });
        let me = tagged(b.get("/me"), "me");
        b.route(find).route(create).route(me).build().unwrap()
    }

    fn container() -> Container {
        let mut container = Container::with_config(ContainerConfig {
            pretty_print: false,
            ..ContainerConfig::default()
        });
        container.add(users_service());
        container
    }

    fn get(path: &str) -> Request {
        Request::new(Method::Get, path)
    }

    // ── select_route ──────────────────────────────────────────────────────────

    #[test]
    fn most_specific_service_wins() {
        let generic = ServiceBuilder::new().path("/{tenant}");
        let g = tagged(generic.get("/{id}"), "generic");
        let specific = ServiceBuilder::new().path("/users");
        let s = tagged(specific.get("/{id}"), "specific");

        let mut container = Container::new();
        container.add(generic.route(g).build().unwrap());
        container.add(specific.route(s).build().unwrap());

        match container.select_route(&Method::Get, "/users/1", "", "") {
            RouteSelection::Matched { service, .. } => assert_eq!(service.root_path(), "/users"),
            other => panic!("expected a match, got {other:?}"),
        }
    }

    #[test]
    fn first_inserted_route_wins_among_equals() {
        let c = container();
        match c.select_route(&Method::Get, "/users/me", "*/*", "") {
            RouteSelection::Matched { route, .. } => assert_eq!(route.path(), "/users/{id}"),
            other => panic!("expected a match, got {other:?}"),
        }
    }

    #[test]
    fn no_match_outcomes() {
        let c = container();
        assert!(matches!(
            c.select_route(&Method::Get, "/accounts/1", "", ""),
            RouteSelection::NotFound
        ));
        assert!(matches!(
            c.select_route(&Method::Get, "/users/1/posts", "", ""),
            RouteSelection::NotFound
        ));
        assert!(matches!(
            c.select_route(&Method::Delete, "/users/1", "", ""),
            RouteSelection::MethodNotAllowed
        ));
        assert!(matches!(
            c.select_route(&Method::Post, "/users", "", "text/csv"),
            RouteSelection::UnsupportedMediaType
        ));
        assert!(matches!(
            c.select_route(&Method::Get, "/users/1", "text/html", ""),
            RouteSelection::NotAcceptable
        ));
    }

    #[test]
    fn trailing_slash_is_tolerated() {
        let c = container();
        assert!(matches!(
            c.select_route(&Method::Get, "/users/1/", "", ""),
            RouteSelection::Matched { .. }
        ));
    }

    // ── dispatch ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn negotiates_xml_when_asked() {
        let c = container();
        let resp = c
            .dispatch(get("/users/42").header("Accept", "application/xml"))
            .await;
        assert_eq!(resp.status(), StatusCode::Ok);
        assert_eq!(resp.headers().get("content-type"), Some(MIME_XML));
        assert_eq!(resp.body_ref(), b"<User><id>42</id></User>");
    }

    #[tokio::test]
    async fn json_by_default() {
        let c = container();
        let resp = c.dispatch(get("/users/42")).await;
        assert_eq!(resp.headers().get("content-type"), Some(MIME_JSON));
        assert_eq!(resp.body_ref(), br#"{"id":"42"}"#);
    }

    #[tokio::test]
    async fn body_round_trip() {
        let c = container();
        let request = Request::new(Method::Post, "/users")
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .body(r#"{"id":"ada"}"#);
        let resp = c.dispatch(request).await;
        assert_eq!(resp.status(), StatusCode::Created);
        assert_eq!(resp.body_ref(), br#"{"id":"ada"}"#);
    }

    #[tokio::test]
    async fn failures_become_plain_text() {
        let c = container();
        let resp = c.dispatch(Request::new(Method::Put, "/users/1")).await;
        assert_eq!(resp.status(), StatusCode::MethodNotAllowed);
        assert_eq!(resp.body_ref(), b"405: Method Not Allowed");

        let resp = c.dispatch(get("/nowhere")).await;
        assert_eq!(resp.status(), StatusCode::NotFound);
        assert_eq!(resp.body_ref(), b"404: Not Found");
    }

    #[tokio::test]
    async fn filters_run_container_then_service_then_route() {
        let trace = |tag: &'static str| {
            filter_fn(move |ctx, mut resp: Response, chain| async move {
                let _ = resp.write_all(tag.as_bytes());
                chain.process(ctx, resp).await
            })
        };

        let b = ServiceBuilder::new().path("/f").filter(trace("service,"));
        let route = tagged(b.get("").filter(trace("route,")), "handler");
        let mut c = Container::new();
        c.add(b.route(route).build().unwrap());
        c.filter(trace("container,"));

        let resp = c.dispatch(get("/f")).await;
        assert_eq!(resp.body_ref(), b"container,service,route,handler");
    }

    #[tokio::test]
    async fn dynamic_routes_are_seen_by_dispatch() {
        let b = ServiceBuilder::new().path("/dyn").dynamic_routes(true);
        let mut c = Container::new();
        c.add(b.build().unwrap());

        let service = Arc::clone(&c.services()[0]);
        let resp = c.dispatch(get("/dyn/x")).await;
        assert_eq!(resp.status(), StatusCode::NotFound);

        service.add_route(tagged(service.get("/x"), "x")).unwrap();
        assert_eq!(c.dispatch(get("/dyn/x")).await.body_ref(), b"x");

        service.remove_route("/dyn/x", "GET").unwrap();
        let resp = c.dispatch(get("/dyn/x")).await;
        assert_eq!(resp.status(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn default_mime_type_from_config() {
        let mut c = Container::with_config(ContainerConfig {
            pretty_print: false,
            default_response_mime_type: Some(MIME_XML.to_owned()),
            ..ContainerConfig::default()
        });

        let b = ServiceBuilder::new().path("/report").produces(["text/csv"]);
        let report = b.get("").to(|_ctx: Context, mut resp: Response| async move {
            let user = User {
                id: "r1".to_owned(),
            };
            let _ = resp.write_entity(&user);
            resp
        });
        c.add(b.route(report).build().unwrap());

        // No accessor handles text/csv, so the configured default is used.
        let request = get("/report").header("Accept", "text/csv");
        let resp = c.dispatch(request).await;
        assert_eq!(resp.headers().get("content-type"), Some(MIME_XML));
        assert_eq!(resp.body_ref(), b"<User><id>r1</id></User>");
    }
}
