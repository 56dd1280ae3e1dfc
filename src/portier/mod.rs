pub mod handlers;

use crate::{
    backend::{Backend, RetryPolicy},
    cli::globals::GlobalArgs,
    gate::{self, Verdict},
    session::Session,
};
use anyhow::Result;
use axum::{
    body::Body,
    extract::Request,
    http::{HeaderName, HeaderValue, Method},
    middleware::{self, Next},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{debug_span, info, Span};
use ulid::Ulid;

pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "",
};

#[derive(Clone)]
pub struct AppState {
    pub backend: Backend,
}

/// Build the gateway router: gated navigation in front of the backend proxy.
#[must_use]
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_origin(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/auth/login", post(handlers::login))
        .route("/auth/logout", post(handlers::logout))
        .fallback(handlers::proxy)
        .layer(middleware::from_fn(authorize))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors),
        )
        .with_state(state)
}

/// Serve the gateway
/// # Errors
/// Returns an error if the server fails to start
pub async fn new(port: u16, globals: GlobalArgs) -> Result<()> {
    let backend = Backend::new(globals.api_url, RetryPolicy::default())?;

    let app = app(AppState { backend });

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

/// Route authorization gate: exactly one terminal outcome per request, no
/// fall-through to the proxy without an explicit allow.
async fn authorize(request: Request, next: Next) -> Response {
    let session = Session::from_headers(request.headers());

    match gate::evaluate(request.uri().path(), &session) {
        Verdict::Allow => next.run(request).await,
        Verdict::Redirect(target) => Redirect::temporary(target).into_response(),
    }
}

// span
fn make_span(request: &axum::http::Request<Body>) -> Span {
    let headers = request.headers();
    let path = request.uri().path();
    let request_id = headers
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    debug_span!("http-request", path, ?headers, request_id)
}
