//! Filters: code that runs around route handlers.
//!
//! A filter receives the request [`Context`], the [`Response`] and a
//! [`FilterChain`] positioned just after itself. It may:
//!
//! - **Pass through**: `chain.process(ctx, resp).await`.
//! - **Short-circuit**: write to the response and return it without calling
//!   `process`; later filters and the handler never run.
//! - **Decorate**: call `process`, then adjust what comes back.
//!
//! Filters are attached at three levels, run outermost first: container,
//! service, route.

use std::future::Future;
use std::sync::Arc;

use tokio::time::Instant;

use crate::context::Context;
use crate::http::Response;
use crate::route::{BoxFuture, RouteHandler};

/// A type-erased, reference-counted filter function.
///
/// Build one with [`filter_fn`] from a closure or with [`from_filter`] from a
/// [`Filter`] implementation.
pub type FilterFn =
    Arc<dyn Fn(Context, Response, FilterChain) -> BoxFuture<Response> + Send + Sync + 'static>;

/// Cursor into the filters still to run for one request, ending in the handler.
///
/// Consumed by [`process`](Self::process), so each filter advances the chain
/// at most once.
pub struct FilterChain {
    filters: Vec<FilterFn>,
    // Next filter to invoke.
    index: usize,
    target: RouteHandler,
}

impl FilterChain {
    /// Creates a chain that runs `filters` in order, then `target`.
    pub fn new(filters: Vec<FilterFn>, target: RouteHandler) -> Self {
        Self {
            filters,
            index: 0,
            target,
        }
    }

    /// Invokes the next filter, or the handler once every filter has run.
    pub fn process(mut self, ctx: Context, resp: Response) -> BoxFuture<Response> {
        match self.filters.get(self.index).cloned() {
            Some(filter) => {
                self.index += 1;
                filter(ctx, resp, self)
            }
            None => (self.target)(ctx, resp),
        }
    }

    /// Number of filters that have not run yet.
    pub fn remaining(&self) -> usize {
        self.filters.len() - self.index
    }
}

/// Implemented by filters that carry configuration or state.
///
/// # Examples
///
/// ```rust,no_run
/// use restmux::context::Context;
/// use restmux::filter::{Filter, FilterChain};
/// use restmux::http::{Response, StatusCode};
/// use restmux::route::BoxFuture;
///
/// struct RequireToken(String);
///
/// impl Filter for RequireToken {
///     fn filter(&self, ctx: Context, mut resp: Response, chain: FilterChain) -> BoxFuture<Response> {
///         let allowed = ctx.header_param("X-Token") == Some(self.0.as_str());
///         Box::pin(async move {
///             if !allowed {
///                 resp.write_error_string(StatusCode::Unauthorized, "missing token");
///                 return resp;
///             }
///             chain.process(ctx, resp).await
///         })
///     }
/// }
/// ```
pub trait Filter: Send + Sync {
    fn filter(&self, ctx: Context, resp: Response, chain: FilterChain) -> BoxFuture<Response>;
}

/// Converts a [`Filter`] into a [`FilterFn`].
pub fn from_filter<F>(filter: Arc<F>) -> FilterFn
where
    F: Filter + 'static,
{
    Arc::new(move |ctx: Context, resp: Response, chain: FilterChain| {
        filter.filter(ctx, resp, chain)
    })
}

/// Converts an async closure into a [`FilterFn`].
///
/// ```
/// use restmux::filter::filter_fn;
///
/// let tag = filter_fn(|ctx, mut resp, chain| async move {
///     resp.add_header("X-Served-By", "restmux");
///     chain.process(ctx, resp).await
/// });
/// # drop(tag);
/// ```
pub fn filter_fn<F, Fut>(f: F) -> FilterFn
where
    F: Fn(Context, Response, FilterChain) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(
        move |ctx: Context, resp: Response, chain: FilterChain| -> BoxFuture<Response> {
            Box::pin(f(ctx, resp, chain))
        },
    )
}

/// Logs method, path, status and elapsed time of every request it sees.
///
/// Emits one `tracing::info!` event after the rest of the chain has run.
pub struct LoggingFilter;

impl Filter for LoggingFilter {
    fn filter(&self, ctx: Context, resp: Response, chain: FilterChain) -> BoxFuture<Response> {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.request().method().to_string();
            let path = ctx.request().path().to_owned();

            let response = chain.process(ctx, resp).await;

            tracing::info!(
                %method,
                %path,
                status = response.status().as_u16(),
                elapsed = ?start.elapsed(),
                "request handled"
            );
            response
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::http::{Method, Request, StatusCode};

    fn target() -> RouteHandler {
        Arc::new(|_ctx: Context, mut resp: Response| -> BoxFuture<Response> {
            Box::pin(async move {
                let _ = resp.write_all(b"handler");
                resp
            })
        })
    }

    fn ctx() -> Context {
        Context::new(Request::new(Method::Get, "/"))
    }

    fn appending(tag: &'static str) -> FilterFn {
        filter_fn(move |ctx, mut resp: Response, chain| async move {
            let _ = resp.write_all(tag.as_bytes());
            chain.process(ctx, resp).await
        })
    }

    #[tokio::test]
    async fn empty_chain_calls_target() {
        let resp = FilterChain::new(Vec::new(), target())
            .process(ctx(), Response::new(StatusCode::Ok))
            .await;
        assert_eq!(resp.body_ref(), b"handler");
    }

    #[tokio::test]
    async fn filters_run_in_order() {
        let chain = FilterChain::new(vec![appending("a,"), appending("b,")], target());
        assert_eq!(chain.remaining(), 2);
        let resp = chain.process(ctx(), Response::new(StatusCode::Ok)).await;
        assert_eq!(resp.body_ref(), b"a,b,handler");
    }

    #[tokio::test]
    async fn short_circuit_skips_the_rest() {
        let reached = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&reached);
        let counting = filter_fn(move |ctx, resp, chain| {
            counter.fetch_add(1, Ordering::SeqCst);
            chain.process(ctx, resp)
        });
        let deny = filter_fn(|_ctx, mut resp: Response, _chain| async move {
            resp.write_error_string(StatusCode::Unauthorized, "denied");
            resp
        });

        let resp = FilterChain::new(vec![deny, counting], target())
            .process(ctx(), Response::new(StatusCode::Ok))
            .await;
        assert_eq!(resp.status(), StatusCode::Unauthorized);
        assert_eq!(resp.body_ref(), b"denied");
        assert_eq!(reached.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn decorating_filter_sees_handler_output() {
        let decorate = filter_fn(|ctx, resp, chain: FilterChain| async move {
            let mut resp = chain.process(ctx, resp).await;
            resp.add_header("X-Body-Len", resp.body_ref().len().to_string());
            resp
        });
        let resp = FilterChain::new(vec![decorate], target())
            .process(ctx(), Response::new(StatusCode::Ok))
            .await;
        assert_eq!(resp.headers().get("x-body-len"), Some("7"));
    }

    #[tokio::test]
    async fn logging_filter_passes_through() {
        let chain = FilterChain::new(vec![from_filter(Arc::new(LoggingFilter))], target());
        let resp = chain.process(ctx(), Response::new(StatusCode::Ok)).await;
        assert_eq!(resp.body_ref(), b"handler");
    }
}
