//! # restmux
//!
//! Route HTTP requests to handlers by path template, method and media type,
//! and read and write bodies in whatever format the client negotiates.
//!
//! The pieces, bottom up:
//!
//! - [`path`] compiles templates such as `/users/{id}` or `/files/{path:*}`
//!   and extracts parameters from concrete paths.
//! - [`route`] binds a method and template to an async handler, with the
//!   media types it produces and consumes.
//! - [`service`] groups routes under a root path with shared defaults.
//! - [`router`] holds services in a [`Container`] and dispatches requests.
//! - [`entity`] is the registry of body accessors (JSON and XML built in).
//! - [`server`] runs a container on a Tokio TCP listener.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use restmux::http::{Response, StatusCode};
//! use restmux::router::Container;
//! use restmux::server::Server;
//! use restmux::service::ServiceBuilder;
//!
//! #[derive(serde::Serialize)]
//! struct Greeting {
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let hello = ServiceBuilder::new()
//!         .path("/hello")
//!         .produces(["application/json", "application/xml"]);
//!     let greet = hello.get("/{name}").to(|ctx, mut resp: Response| async move {
//!         let name = ctx.path_param("name").unwrap_or("world").to_owned();
//!         if let Err(e) = resp.write_entity(&Greeting { name }) {
//!             resp.write_error_string(StatusCode::InternalServerError, &e.to_string());
//!         }
//!         resp
//!     });
//!
//!     let mut container = Container::new();
//!     container.add(hello.route(greet).build()?);
//!
//!     Server::bind("127.0.0.1:8080").await?.serve(container).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod entity;
pub mod filter;
pub mod http;
pub mod path;
pub mod route;
pub mod router;
pub mod server;
pub mod service;

pub use config::ContainerConfig;
pub use context::Context;
pub use entity::{EntityAccessor, EntityError, EntityRegistry};
pub use filter::{FilterChain, FilterFn};
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use route::{Route, RouteBuilder, RouteError};
pub use router::{Container, RouteSelection};
pub use server::{Server, ServerError};
pub use service::{Service, ServiceBuilder, ServiceError};
