use anyhow::Result;
use axum::{
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use base64ct::{Base64UrlUnpadded, Encoding};
use portier::{
    backend::{Backend, RetryPolicy},
    portier::{app, AppState},
    session::Session,
};
use reqwest::{header::COOKIE, redirect::Policy};
use serde_json::{json, Value};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::net::TcpListener;
use url::Url;

fn token_with_roles(roles: &[&str]) -> String {
    let header = Base64UrlUnpadded::encode_string(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = Base64UrlUnpadded::encode_string(
        json!({"sub": "someone", "roles": roles}).to_string().as_bytes(),
    );

    format!("{header}.{payload}.signature")
}

fn quick_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        base_delay: Duration::from_millis(10),
    }
}

async fn serve(app: Router) -> Result<Url> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        let _ = axum::serve(listener, app.into_make_service()).await;
    });

    Ok(Url::parse(&format!("http://{addr}"))?)
}

/// Route that answers 503 `failures` times, then 200.
fn flaky_route(failures: usize, hits: Arc<AtomicUsize>) -> Router {
    Router::new().route(
        "/api/rooms",
        get(move || {
            let hits = hits.clone();

            async move {
                let attempt = hits.fetch_add(1, Ordering::SeqCst);

                if attempt < failures {
                    StatusCode::SERVICE_UNAVAILABLE.into_response()
                } else {
                    Json(json!({"rooms": ["101", "102"]})).into_response()
                }
            }
        }),
    )
}

async fn echo_authorization(headers: HeaderMap) -> impl IntoResponse {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();

    Json(json!({"authorization": bearer}))
}

async fn stub_login(payload: Json<Value>) -> impl IntoResponse {
    if payload.0["username"] == "gerente" && payload.0["password"] == "secreto" {
        (
            StatusCode::OK,
            Json(json!({"access_token": "stub.session.token"})),
        )
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "bad credentials"})),
        )
    }
}

fn stub_backend() -> Router {
    Router::new()
        .route("/", get(|| async { "home" }))
        .route("/oauth/login", post(stub_login))
        .route(
            "/dashboard/users",
            get(|| async { Json(json!([{"username": "gerente"}])) }),
        )
        .route("/whoami", get(echo_authorization))
}

async fn spawn_gateway(backend_url: Url) -> Result<Url> {
    let backend = Backend::new(backend_url, quick_retry())?;

    serve(app(AppState { backend })).await
}

fn no_redirect_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .redirect(Policy::none())
        .build()?)
}

#[tokio::test]
async fn test_backend_retries_transient_failures_then_succeeds() -> Result<()> {
    let hits = Arc::new(AtomicUsize::new(0));
    let base_url = serve(flaky_route(2, hits.clone())).await?;

    let backend = Backend::new(base_url, quick_retry())?;

    let response = backend.get("/api/rooms", &Session::default()).await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(hits.load(Ordering::SeqCst), 3);

    let body: Value = response.json().await?;
    assert_eq!(body["rooms"][0], "101");

    Ok(())
}

#[tokio::test]
async fn test_backend_exhausts_retry_budget() -> Result<()> {
    let hits = Arc::new(AtomicUsize::new(0));
    let base_url = serve(flaky_route(usize::MAX, hits.clone())).await?;

    let backend = Backend::new(base_url, quick_retry())?;

    let response = backend.get("/api/rooms", &Session::default()).await?;

    // The exhausted failure surfaces unchanged to the caller
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    // First attempt plus exactly three retries
    assert_eq!(hits.load(Ordering::SeqCst), 4);

    Ok(())
}

#[tokio::test]
async fn test_backend_never_retries_client_errors() -> Result<()> {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();

    let app = Router::new().route(
        "/api/rooms/999",
        get(move || {
            let counter = counter.clone();

            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                StatusCode::NOT_FOUND
            }
        }),
    );

    let backend = Backend::new(serve(app).await?, quick_retry())?;

    let response = backend.get("/api/rooms/999", &Session::default()).await?;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    Ok(())
}

#[tokio::test]
async fn test_backend_attaches_bearer_token() -> Result<()> {
    let app = Router::new().route("/whoami", get(echo_authorization));
    let backend = Backend::new(serve(app).await?, quick_retry())?;

    let session = Session::with_token("tok123");
    let response = backend.get("/whoami", &session).await?;

    let body: Value = response.json().await?;
    assert_eq!(body["authorization"], "Bearer tok123");

    Ok(())
}

#[tokio::test]
async fn test_backend_sends_unauthenticated_without_token() -> Result<()> {
    let app = Router::new().route("/whoami", get(echo_authorization));
    let backend = Backend::new(serve(app).await?, quick_retry())?;

    let response = backend.get("/whoami", &Session::default()).await?;

    let body: Value = response.json().await?;
    assert_eq!(body["authorization"], "");

    Ok(())
}

#[tokio::test]
async fn test_gateway_allows_public_path_without_token() -> Result<()> {
    let gateway = spawn_gateway(serve(stub_backend()).await?).await?;
    let client = no_redirect_client()?;

    let response = client.get(gateway.join("/")?).send().await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await?, "home");

    Ok(())
}

#[tokio::test]
async fn test_gateway_health_is_public() -> Result<()> {
    let gateway = spawn_gateway(serve(stub_backend()).await?).await?;
    let client = no_redirect_client()?;

    let response = client.get(gateway.join("/health")?).send().await?;

    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await?;
    assert_eq!(body["name"], "portier");

    Ok(())
}

#[tokio::test]
async fn test_gateway_redirects_anonymous_dashboard_to_login() -> Result<()> {
    let gateway = spawn_gateway(serve(stub_backend()).await?).await?;
    let client = no_redirect_client()?;

    let response = client.get(gateway.join("/dashboard/rooms")?).send().await?;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        response.headers().get("location").unwrap().to_str()?,
        "/auth/login"
    );

    Ok(())
}

#[tokio::test]
async fn test_gateway_forbids_dashboard_without_admin_role() -> Result<()> {
    let gateway = spawn_gateway(serve(stub_backend()).await?).await?;
    let client = no_redirect_client()?;

    let token = token_with_roles(&["ROLE_USER"]);
    let response = client
        .get(gateway.join("/dashboard")?)
        .header(COOKIE, format!("access_token={token}"))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        response.headers().get("location").unwrap().to_str()?,
        "/forbidden"
    );

    Ok(())
}

#[tokio::test]
async fn test_gateway_proxies_dashboard_for_admin() -> Result<()> {
    let gateway = spawn_gateway(serve(stub_backend()).await?).await?;
    let client = no_redirect_client()?;

    let token = token_with_roles(&["ROLE_ADMIN"]);
    let response = client
        .get(gateway.join("/dashboard/users")?)
        .header(COOKIE, format!("access_token={token}"))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await?;
    assert_eq!(body[0]["username"], "gerente");

    Ok(())
}

#[tokio::test]
async fn test_gateway_forwards_bearer_to_backend() -> Result<()> {
    let gateway = spawn_gateway(serve(stub_backend()).await?).await?;
    let client = no_redirect_client()?;

    let token = token_with_roles(&["ROLE_USER"]);
    let response = client
        .get(gateway.join("/whoami")?)
        .header(COOKIE, format!("access_token={token}"))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await?;
    assert_eq!(body["authorization"], format!("Bearer {token}"));

    Ok(())
}

#[tokio::test]
async fn test_gateway_login_sets_session_cookie() -> Result<()> {
    let gateway = spawn_gateway(serve(stub_backend()).await?).await?;
    let client = no_redirect_client()?;

    let response = client
        .post(gateway.join("/auth/login")?)
        .json(&json!({"username": "gerente", "password": "secreto"}))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::OK);

    let cookie = response
        .headers()
        .get("set-cookie")
        .unwrap()
        .to_str()?
        .to_string();
    assert!(cookie.starts_with("access_token=stub.session.token"));
    assert!(cookie.contains("Path=/"));
    assert!(cookie.contains("SameSite=Strict"));

    let body: Value = response.json().await?;
    assert_eq!(body["access_token"], "stub.session.token");

    Ok(())
}

#[tokio::test]
async fn test_gateway_login_passes_credential_errors_through() -> Result<()> {
    let gateway = spawn_gateway(serve(stub_backend()).await?).await?;
    let client = no_redirect_client()?;

    let response = client
        .post(gateway.join("/auth/login")?)
        .json(&json!({"username": "gerente", "password": "wrong"}))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get("set-cookie").is_none());

    let body: Value = response.json().await?;
    assert_eq!(body["error"], "bad credentials");

    Ok(())
}

#[tokio::test]
async fn test_gateway_logout_expires_cookie() -> Result<()> {
    let gateway = spawn_gateway(serve(stub_backend()).await?).await?;
    let client = no_redirect_client()?;

    let response = client.post(gateway.join("/auth/logout")?).send().await?;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers().get("location").unwrap().to_str()?,
        "/auth/login"
    );

    let cookie = response.headers().get("set-cookie").unwrap().to_str()?;
    assert!(cookie.starts_with("access_token=;"));
    assert!(cookie.contains("Expires=Thu, 01 Jan 1970"));

    Ok(())
}

#[tokio::test]
async fn test_gateway_redirects_undecodable_token_to_login() -> Result<()> {
    let gateway = spawn_gateway(serve(stub_backend()).await?).await?;
    let client = no_redirect_client()?;

    let response = client
        .get(gateway.join("/dashboard")?)
        .header(COOKIE, "access_token=not-a-real-token")
        .send()
        .await?;

    // An undecodable token counts as no token: login, not forbidden
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        response.headers().get("location").unwrap().to_str()?,
        "/auth/login"
    );

    Ok(())
}
