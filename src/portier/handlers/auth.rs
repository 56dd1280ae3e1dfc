use crate::{
    gate::LOGIN_PATH,
    portier::AppState,
    session::{session_cookie, Session, CLEAR_SESSION_COOKIE},
};
use axum::{
    extract::State,
    http::{header::SET_COOKIE, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, instrument};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Credentials {
    username: String,
    password: String,
}

/// Passthrough to the backend login; on success the session cookie is set
/// from the returned token so the gate can vouch for subsequent navigation.
#[utoipa::path(
    post,
    path = "/auth/login",
    responses(
        (status = 200, description = "Login successful, session cookie set", content_type = "application/json"),
        (status = 400, description = "Missing credentials payload"),
        (status = 502, description = "Backend unreachable or returned an unusable response"),
    ),
    tag = "portier"
)]
#[instrument(skip_all)]
pub async fn login(State(state): State<AppState>, payload: Option<Json<Credentials>>) -> Response {
    let Some(Json(credentials)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    debug!("login attempt for {}", credentials.username);

    let response = match state
        .backend
        .post("/oauth/login", &Session::default(), &credentials)
        .await
    {
        Ok(response) => response,
        Err(error) => {
            error!("Error reaching backend login: {:?}", error);

            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    let status = response.status();

    let body: Value = match response.json().await {
        Ok(body) => body,
        Err(error) => {
            error!("Error reading backend login response: {:?}", error);

            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    // Credential errors pass through untouched for the screen to display
    if !status.is_success() {
        return (status, Json(body)).into_response();
    }

    let Some(token) = body["access_token"].as_str() else {
        error!("Backend login response carried no access_token");

        return StatusCode::BAD_GATEWAY.into_response();
    };

    let Ok(cookie) = HeaderValue::from_str(&session_cookie(token)) else {
        error!("Issued token is not usable as a cookie value");

        return StatusCode::BAD_GATEWAY.into_response();
    };

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, cookie);

    (status, headers, Json(body)).into_response()
}

/// Expire the session cookie and send the user back to the login page.
/// No server-side state is touched; the token simply stops being attached.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 303, description = "Session cleared, redirected to login"),
    ),
    tag = "portier"
)]
pub async fn logout() -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, HeaderValue::from_static(CLEAR_SESSION_COOKIE));

    (headers, Redirect::to(LOGIN_PATH)).into_response()
}
