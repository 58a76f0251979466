//! Services: a root path plus the routes beneath it.
//!
//! A [`ServiceBuilder`] collects the root path, defaults and route builders,
//! and [`build`](ServiceBuilder::build) compiles everything at once. The
//! resulting [`Service`] is fixed unless dynamic routes were enabled, in which
//! case routes can be added and removed while requests are being served.
//!
//! ```
//! use restmux::http::Response;
//! use restmux::service::ServiceBuilder;
//!
//! let users = ServiceBuilder::new()
//!     .path("/users")
//!     .produces(["application/json"]);
//! let find = users.get("/{id}").to(|_ctx, resp: Response| async move { resp });
//! let service = users.route(find).build().unwrap();
//!
//! assert_eq!(service.root_path(), "/users");
//! assert_eq!(service.routes()[0].path(), "/users/{id}");
//! assert_eq!(service.routes()[0].produces(), ["application/json"]);
//! ```

use std::borrow::Cow;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;

use crate::filter::FilterFn;
use crate::http::Method;
use crate::path::{PathTemplate, TemplateError};
use crate::route::{Parameter, Route, RouteBuilder, RouteError};

/// Errors raised while configuring a service or changing its routes.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid service root path: {0}")]
    InvalidRootPath(#[source] TemplateError),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error("dynamic routes are not enabled")]
    DynamicRoutesDisabled,
}

/// Configures a [`Service`].
#[derive(Default)]
#[must_use]
pub struct ServiceBuilder {
    root_path: Option<String>,
    dynamic_routes: bool,
    produces: Vec<String>,
    consumes: Vec<String>,
    path_parameters: Vec<Parameter>,
    filters: Vec<FilterFn>,
    documentation: String,
    api_version: String,
    routes: Vec<RouteBuilder>,
}

impl ServiceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the root path template every route is relative to; `/` when unset.
    pub fn path(mut self, root: impl Into<String>) -> Self {
        self.root_path = Some(root.into());
        self
    }

    /// Allows routes to be added and removed after [`build`](Self::build).
    pub fn dynamic_routes(mut self, enabled: bool) -> Self {
        self.dynamic_routes = enabled;
        self
    }

    /// Media types produced by routes that do not declare their own.
    pub fn produces<I, S>(mut self, mime_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.produces = mime_types.into_iter().map(Into::into).collect();
        self
    }

    /// Media types consumed by routes that do not declare their own.
    pub fn consumes<I, S>(mut self, mime_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.consumes = mime_types.into_iter().map(Into::into).collect();
        self
    }

    /// Documents a parameter of the root path.
    pub fn param(mut self, parameter: Parameter) -> Self {
        self.path_parameters.push(parameter);
        self
    }

    /// Appends a filter that runs for every route of the service.
    pub fn filter(mut self, filter: FilterFn) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn doc(mut self, documentation: impl Into<String>) -> Self {
        self.documentation = documentation.into();
        self
    }

    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    /// Queues a route; routes are compiled and kept in the order they were added.
    pub fn route(mut self, builder: RouteBuilder) -> Self {
        self.routes.push(builder);
        self
    }

    fn current_root(&self) -> &str {
        self.root_path.as_deref().unwrap_or("/")
    }

    /// A route builder for `method` seeded with the current root path.
    pub fn method(&self, method: Method) -> RouteBuilder {
        RouteBuilder::new().root(self.current_root()).method(method)
    }

    pub fn get(&self, sub_path: &str) -> RouteBuilder {
        self.method(Method::Get).path(sub_path)
    }

    pub fn post(&self, sub_path: &str) -> RouteBuilder {
        self.method(Method::Post).path(sub_path)
    }

    pub fn put(&self, sub_path: &str) -> RouteBuilder {
        self.method(Method::Put).path(sub_path)
    }

    pub fn patch(&self, sub_path: &str) -> RouteBuilder {
        self.method(Method::Patch).path(sub_path)
    }

    pub fn delete(&self, sub_path: &str) -> RouteBuilder {
        self.method(Method::Delete).path(sub_path)
    }

    pub fn head(&self, sub_path: &str) -> RouteBuilder {
        self.method(Method::Head).path(sub_path)
    }

    pub fn options(&self, sub_path: &str) -> RouteBuilder {
        self.method(Method::Options).path(sub_path)
    }

    /// Compiles the root path and every queued route.
    ///
    /// Routes that declare no produced or consumed types take the service
    /// defaults; routes created without a root take the service root.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::InvalidRootPath`]: the root path does not compile.
    /// - [`ServiceError::Route`]: a route fails to build.
    pub fn build(self) -> Result<Service, ServiceError> {
        let root_path = match self.root_path {
            Some(root) if !root.is_empty() => root,
            _ => "/".to_owned(),
        };
        let template = PathTemplate::compile(&root_path)
            .map_err(ServiceError::InvalidRootPath)?;

        let mut routes = Vec::with_capacity(self.routes.len());
        for mut builder in self.routes {
            builder.inherit(&root_path, &self.produces, &self.consumes);
            let route = builder.build()?;
            tracing::debug!(root = %root_path, route = %route, "route registered");
            routes.push(Arc::new(route));
        }

        let routes = if self.dynamic_routes {
            RouteTable::Dynamic(RwLock::new(routes))
        } else {
            RouteTable::Fixed(routes)
        };

        Ok(Service {
            root_path,
            template,
            routes,
            produces: self.produces,
            consumes: self.consumes,
            path_parameters: self.path_parameters,
            filters: self.filters,
            documentation: self.documentation,
            api_version: self.api_version,
        })
    }
}

// Fixed tables are written once at build time and read without locking.
enum RouteTable {
    Fixed(Vec<Arc<Route>>),
    Dynamic(RwLock<Vec<Arc<Route>>>),
}

/// A compiled root path and its routes.
pub struct Service {
    root_path: String,
    template: PathTemplate,
    routes: RouteTable,
    produces: Vec<String>,
    consumes: Vec<String>,
    path_parameters: Vec<Parameter>,
    filters: Vec<FilterFn>,
    documentation: String,
    api_version: String,
}

impl Service {
    pub fn root_path(&self) -> &str {
        &self.root_path
    }

    pub fn template(&self) -> &PathTemplate {
        &self.template
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self.routes, RouteTable::Dynamic(_))
    }

    /// The routes in insertion order.
    ///
    /// A fixed service lends its table. A dynamic one returns a snapshot
    /// copied under the read lock; later changes do not show up in it.
    pub fn routes(&self) -> Cow<'_, [Arc<Route>]> {
        match &self.routes {
            RouteTable::Fixed(routes) => Cow::Borrowed(routes.as_slice()),
            RouteTable::Dynamic(lock) => {
                Cow::Owned(lock.read().unwrap_or_else(PoisonError::into_inner).clone())
            }
        }
    }

    /// Compiles and appends a route.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::DynamicRoutesDisabled`]: the service is fixed.
    /// - [`ServiceError::Route`]: the route fails to build.
    pub fn add_route(&self, mut builder: RouteBuilder) -> Result<(), ServiceError> {
        let RouteTable::Dynamic(lock) = &self.routes else {
            return Err(ServiceError::DynamicRoutesDisabled);
        };
        builder.inherit(&self.root_path, &self.produces, &self.consumes);
        let route = Arc::new(builder.build()?);
        tracing::debug!(root = %self.root_path, route = %route, "route added");
        lock.write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(route);
        Ok(())
    }

    /// Removes every route whose path and method strings equal the arguments.
    ///
    /// The comparison is textual: `/users/` does not remove `/users`, and
    /// `{id}` does not remove `{uid}`. Removing nothing is not an error.
    ///
    /// # Errors
    ///
    /// [`ServiceError::DynamicRoutesDisabled`]: the service is fixed.
    pub fn remove_route(&self, path: &str, method: &str) -> Result<(), ServiceError> {
        let RouteTable::Dynamic(lock) = &self.routes else {
            return Err(ServiceError::DynamicRoutesDisabled);
        };
        let mut routes = lock.write().unwrap_or_else(PoisonError::into_inner);
        let before = routes.len();
        routes.retain(|route| !(route.method().as_str() == method && route.path() == path));
        tracing::debug!(
            root = %self.root_path,
            %method,
            %path,
            removed = before - routes.len(),
            "route removal"
        );
        Ok(())
    }

    /// A route builder for `method` seeded with the root path.
    pub fn method(&self, method: Method) -> RouteBuilder {
        RouteBuilder::new()
            .root(self.root_path.as_str())
            .method(method)
    }

    pub fn get(&self, sub_path: &str) -> RouteBuilder {
        self.method(Method::Get).path(sub_path)
    }

    pub fn post(&self, sub_path: &str) -> RouteBuilder {
        self.method(Method::Post).path(sub_path)
    }

    pub fn put(&self, sub_path: &str) -> RouteBuilder {
        self.method(Method::Put).path(sub_path)
    }

    pub fn patch(&self, sub_path: &str) -> RouteBuilder {
        self.method(Method::Patch).path(sub_path)
    }

    pub fn delete(&self, sub_path: &str) -> RouteBuilder {
        self.method(Method::Delete).path(sub_path)
    }

    pub fn head(&self, sub_path: &str) -> RouteBuilder {
        self.method(Method::Head).path(sub_path)
    }

    pub fn options(&self, sub_path: &str) -> RouteBuilder {
        self.method(Method::Options).path(sub_path)
    }

    pub fn produces(&self) -> &[String] {
        &self.produces
    }

    pub fn consumes(&self) -> &[String] {
        &self.consumes
    }

    pub fn filters(&self) -> &[FilterFn] {
        &self.filters
    }

    /// Documented parameters of the root path.
    pub fn path_parameters(&self) -> &[Parameter] {
        &self.path_parameters
    }

    pub fn documentation(&self) -> &str {
        &self.documentation
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("root_path", &self.root_path)
            .field("dynamic", &self.is_dynamic())
            .field("routes", &self.routes().len())
            .field("filters", &self.filters.len())
            .finish_non_exhaustive()
    }
}
