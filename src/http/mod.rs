//! The HTTP server. It serves the GraphQL API under exactly one path.
//!
//! This file itself contains fairly little logic and just sets up the `hyper`
//! server and catches panics. The main logic is in `handlers.rs`.

use std::{
    convert::Infallible,
    future::Future,
    net::{IpAddr, SocketAddr},
    panic::AssertUnwindSafe,
    sync::Arc,
    time::Duration,
};

use bytes::Bytes;
use futures::FutureExt;
use http_body_util::Full;
use hyper::body::{Body, Incoming};
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::{conn::auto, graceful::GracefulShutdown},
    service::TowerToHyperService,
};
use tokio::net::TcpListener;
use tower::{util::Either, Service, ServiceBuilder, ServiceExt};
use tower_http::cors::CorsLayer;

use crate::{api::Schema, auth::JwtContext, config::Config, prelude::*, store::Store};


mod cors;
mod handlers;
mod log;
mod response;


pub(crate) use self::cors::CorsConfig;


/// HTTP server configuration.
#[derive(Debug, Clone, confique::Config)]
pub(crate) struct HttpConfig {
    /// The TCP port the HTTP server should listen on.
    #[config(default = 3080)]
    pub(crate) port: u16,

    /// The bind address to listen on.
    #[config(default = "127.0.0.1")]
    pub(crate) address: IpAddr,

    /// The path under which the GraphQL API is served. A trailing slash in
    /// requests is ignored.
    #[config(default = "/graphql")]
    pub(crate) path: String,

    /// Maximum size of request bodies in bytes. Larger requests are answered
    /// with "413 Payload Too Large".
    #[config(default = 102_400)]
    pub(crate) max_body_size: usize,
}

/// How long we wait for open connections to finish after a shutdown signal.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);


type Response<B = Full<Bytes>> = hyper::Response<B>;
type Request<B = Incoming> = hyper::Request<B>;


/// Context that the request handler has access to.
struct Context {
    schema: Arc<dyn Schema>,
    store: Store,
    jwt: Option<JwtContext>,
    /// The API path without trailing slash.
    api_path: String,
    max_body_size: usize,
    log_headers: bool,
}

impl Context {
    fn new(config: &Config, schema: impl Schema, store: Store) -> Self {
        Self {
            schema: Arc::new(schema),
            store,
            jwt: JwtContext::new(&config.jwt),
            api_path: config.http.path.trim_end_matches('/').to_owned(),
            max_body_size: config.http.max_body_size,
            log_headers: config.log.log_http_headers,
        }
    }
}


/// Starts the HTTP server and runs it until a shutdown signal is received.
pub(crate) async fn serve(config: &Config, schema: impl Schema, store: Store) -> Result<()> {
    if config.jwt.secret.is_none() {
        info!("No JWT secret configured: all API requests are anonymous");
    }

    let cors = config.cors.layer().context("invalid CORS configuration")?;
    let ctx = Arc::new(Context::new(config, schema, store));

    let addr = SocketAddr::new(config.http.address, config.http.port);
    let listener = TcpListener::bind(addr).await
        .with_context(|| format!("failed to bind to {addr}"))?;
    info!("Listening on http://{}{}", listener.local_addr()?, config.http.path);

    accept_loop(listener, service::<Incoming>(ctx, cors), shutdown_signal()).await;
    info!("HTTP server shut down");
    Ok(())
}

/// The whole request handling as `tower` service. CORS only applies to the
/// API path: other paths are answered by the handler alone.
fn service<B>(
    ctx: Arc<Context>,
    cors: Option<CorsLayer>,
) -> impl Service<
    Request<B>,
    Response = Response,
    Error = Infallible,
    Future: Send + 'static,
> + Clone + Send + 'static
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let api_path = ctx.api_path.clone();
    let handler = tower::service_fn(move |req: Request<B>| {
        handle_internal_errors(handlers::handle(req, Arc::clone(&ctx)))
    });

    let api = ServiceBuilder::new()
        .option_layer(cors.map(|cors| {
            ServiceBuilder::new().map_request(cors::as_preflight::<B>).layer(cors)
        }))
        .service(handler.clone());

    tower::service_fn(move |req: Request<B>| {
        let service = if req.uri().path().trim_end_matches('/') == api_path {
            Either::Left(api.clone())
        } else {
            Either::Right(handler.clone())
        };
        service.oneshot(req)
    })
}

/// Accepts connections and serves each on its own task, until `shutdown`
/// resolves. Then waits (up to a timeout) for open connections to finish.
async fn accept_loop<S>(listener: TcpListener, service: S, shutdown: impl Future<Output = ()>)
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    let builder = auto::Builder::new(TokioExecutor::new());
    let graceful = GracefulShutdown::new();
    let mut shutdown = std::pin::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("Failed to accept TCP connection: {e}");
                        continue;
                    }
                };

                let service = TowerToHyperService::new(service.clone());
                let conn = builder
                    .serve_connection_with_upgrades(TokioIo::new(stream), service)
                    .into_owned();
                let conn = graceful.watch(conn);
                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        debug!("Error serving connection from {peer}: {e}");
                    }
                });
            }
            () = &mut shutdown => {
                info!("Shutdown signal received, waiting for open connections");
                break;
            }
        }
    }

    drop(listener);
    tokio::select! {
        () = graceful.shutdown() => debug!("All connections closed"),
        () = tokio::time::sleep(SHUTDOWN_TIMEOUT) => {
            warn!("Open connections did not finish within {SHUTDOWN_TIMEOUT:?}, closing them");
        }
    }
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => { s.recv().await; }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

/// Wraps another future and catches all panics that might occur when
/// resolving/polling it. This ensures that we always answer with `500`
/// instead of just closing the connection.
async fn handle_internal_errors(
    future: impl Future<Output = Response>,
) -> Result<Response, Infallible> {
    // The `AssertUnwindSafe` says: if the future panics, the remaining
    // application state is not broken. Handlers do not share mutable state.
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(response) => Ok(response),
        Err(panic) => {
            let msg = panic.downcast_ref::<String>()
                .map(|s| s.as_str())
                .or(panic.downcast_ref::<&str>().copied());

            match msg {
                Some(msg) => error!("INTERNAL SERVER ERROR: HTTP handler panicked: '{msg}'"),
                None => error!("INTERNAL SERVER ERROR: HTTP handler panicked"),
            }

            Ok(response::internal_server_error())
        }
    }
}
