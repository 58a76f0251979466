//! A small user registry served over HTTP.
//!
//! ```text
//! cargo run --example users
//! curl -H 'Accept: application/xml' localhost:8080/users/1
//! curl -X POST -H 'Content-Type: application/json' -d '{"id":"2","name":"Grace"}' localhost:8080/users
//! ```
//!
//! Set `RESTMUX_CONFIG` to a JSON document to override container settings,
//! e.g. `{"pretty_print": false}`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use restmux::config::ContainerConfig;
use restmux::context::Context;
use restmux::entity::{MIME_JSON, MIME_XML};
use restmux::filter::{LoggingFilter, filter_fn, from_filter};
use restmux::http::{Response, StatusCode};
use restmux::route::Parameter;
use restmux::router::Container;
use restmux::server::Server;
use restmux::service::ServiceBuilder;
use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct User {
    id: String,
    name: String,
}

#[derive(Debug, Serialize)]
struct Users {
    user: Vec<User>,
}

type Store = Arc<Mutex<BTreeMap<String, User>>>;

fn users_service(store: &Store) -> Result<restmux::service::Service, restmux::ServiceError> {
    let ws = ServiceBuilder::new()
        .path("/users")
        .doc("Manage users")
        .produces([MIME_JSON, MIME_XML])
        .consumes([MIME_JSON, MIME_XML])
        .filter(filter_fn(|ctx, mut resp: Response, chain| async move {
            resp.add_header("X-Service", "users");
            chain.process(ctx, resp).await
        }));

    let s = Arc::clone(store);
    let list = ws
        .get("")
        .doc("list all users")
        .writes(&Users { user: Vec::new() })
        .to(move |_ctx: Context, mut resp: Response| {
            let s = Arc::clone(&s);
            async move {
                let user = s
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .values()
                    .cloned()
                    .collect();
                if let Err(e) = resp.write_entity(&Users { user }) {
                    tracing::error!(error = %e, "failed to write users");
                }
                resp
            }
        });

    let s = Arc::clone(store);
    let find = ws
        .get("/{user-id}")
        .doc("get a user")
        .param(Parameter::path("user-id", "identifier of the user"))
        .returns(404, "user not found", None)
        .to(move |ctx: Context, mut resp: Response| {
            let s = Arc::clone(&s);
            async move {
                let id = ctx.path_param("user-id").unwrap_or_default();
                let user = s
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get(id)
                    .cloned();
                match user {
                    Some(user) => {
                        if let Err(e) = resp.write_entity(&user) {
                            tracing::error!(error = %e, "failed to write user");
                        }
                    }
                    None => {
                        resp.write_error_string(StatusCode::NotFound, "user could not be found")
                    }
                }
                resp
            }
        });

    let s = Arc::clone(store);
    let create = ws
        .post("")
        .doc("create a user")
        .param(Parameter::body("user", "the user to create"))
        .reads(&User {
            id: "1".to_owned(),
            name: "Ada".to_owned(),
        })
        .returns(400, "malformed user", None)
        .to(move |ctx: Context, mut resp: Response| {
            let s = Arc::clone(&s);
            async move {
                match ctx.read_entity::<User>() {
                    Ok(user) => {
                        s.lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .insert(user.id.clone(), user.clone());
                        let status = StatusCode::Created;
                        if let Err(e) = resp.write_header_and_entity(status, Some(&user)) {
                            tracing::error!(error = %e, "failed to write user");
                        }
                    }
                    Err(e) => resp.write_error_string(StatusCode::BadRequest, &e.to_string()),
                }
                resp
            }
        });

    let s = Arc::clone(store);
    let remove = ws
        .delete("/{user-id}")
        .doc("delete a user")
        .to(move |ctx: Context, mut resp: Response| {
            let s = Arc::clone(&s);
            async move {
                let id = ctx.path_param("user-id").unwrap_or_default();
                s.lock().unwrap_or_else(PoisonError::into_inner).remove(id);
                resp.write_header(StatusCode::NoContent);
                resp
            }
        });

    ws.route(list)
        .route(find)
        .route(create)
        .route(remove)
        .build()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "restmux=debug,users=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match std::env::var("RESTMUX_CONFIG") {
        Ok(raw) => ContainerConfig::from_json(&raw)?,
        Err(_) => ContainerConfig::default(),
    };

    let store: Store = Arc::default();
    let ada = User {
        id: "1".to_owned(),
        name: "Ada".to_owned(),
    };
    store
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(ada.id.clone(), ada);

    let mut container = Container::with_config(config);
    container
        .filter(from_filter(Arc::new(LoggingFilter)))
        .add(users_service(&store)?);

    let server = Server::bind("127.0.0.1:8080").await?;
    tracing::info!(address = %server.local_addr(), "users demo ready");
    server.serve(container).await?;
    Ok(())
}
