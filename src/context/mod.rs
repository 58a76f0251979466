//! Per-request context handed to filters and handlers.
//!
//! A [`Context`] owns the [`Request`], the path parameters of the selected
//! route and a type-keyed [`Extensions`] map that filters use to pass values
//! on to handlers (an authenticated principal, a request id, ...).

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::entity::{self, EntityError, EntityRegistry};
use crate::http::Request;
use crate::path::PathParams;

/// Type-erased map of request attributes, one value per type.
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value`, returning the previous value of the same type.
    pub fn insert<T>(&mut self, value: T) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    pub fn get<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    pub fn get_mut<T>(&mut self) -> Option<&mut T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get_mut(&TypeId::of::<T>())
            .and_then(|value| value.downcast_mut::<T>())
    }

    pub fn remove<T>(&mut self) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl std::fmt::Debug for Extensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extensions")
            .field("len", &self.map.len())
            .finish()
    }
}

/// The request as seen by a filter or handler.
#[derive(Debug)]
pub struct Context {
    request: Request,
    params: PathParams,
    selected_route_path: String,
    attributes: Extensions,
    registry: Arc<EntityRegistry>,
}

impl Context {
    /// Creates a context that decodes bodies through the process-wide registry.
    pub fn new(request: Request) -> Self {
        Self::with_registry(request, EntityRegistry::shared())
    }

    pub fn with_registry(request: Request, registry: Arc<EntityRegistry>) -> Self {
        Self {
            request,
            params: PathParams::new(),
            selected_route_path: String::new(),
            attributes: Extensions::new(),
            registry,
        }
    }

    pub(crate) fn bind_route(&mut self, params: PathParams, route_path: &str) {
        self.params = params;
        self.selected_route_path = route_path.to_owned();
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn params(&self) -> &PathParams {
        &self.params
    }

    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.request.query_param(name)
    }

    pub fn header_param(&self, name: &str) -> Option<&str> {
        self.request.headers().get(name)
    }

    /// Path template of the route that matched, e.g. `/users/{id}`; empty
    /// before a route is selected.
    pub fn selected_route_path(&self) -> &str {
        &self.selected_route_path
    }

    pub fn attributes(&self) -> &Extensions {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut Extensions {
        &mut self.attributes
    }

    pub fn registry(&self) -> &Arc<EntityRegistry> {
        &self.registry
    }

    /// Decodes the request body with the accessor registered for its
    /// `Content-Type`.
    ///
    /// # Errors
    ///
    /// - [`EntityError::UnsupportedContentType`]: no accessor resolves for the
    ///   request's content type.
    /// - Any decoding error of the selected accessor.
    ///
    /// # Examples
    ///
    /// ```
    /// use restmux::context::Context;
    /// use restmux::http::{Method, Request};
    ///
    /// #[derive(serde::Deserialize)]
    /// struct NewUser {
    ///     name: String,
    /// }
    ///
    /// let request = Request::new(Method::Post, "/users")
    ///     .header("Content-Type", "application/json; charset=utf-8")
    ///     .body(r#"{"name":"ada"}"#);
    /// let user: NewUser = Context::new(request).read_entity().unwrap();
    /// assert_eq!(user.name, "ada");
    /// ```
    pub fn read_entity<T: DeserializeOwned>(&self) -> Result<T, EntityError> {
        let content_type = self.request.content_type();
        let Some(reader) = self.registry.resolve(content_type) else {
            return Err(EntityError::UnsupportedContentType {
                content_type: content_type.to_owned(),
            });
        };
        entity::decode(reader.as_ref(), self.request.body_bytes())
    }
}
