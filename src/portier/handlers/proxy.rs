use crate::{portier::AppState, session::Session};
use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{error, instrument};

const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Forward an allowed navigation request to the backend, bearer attached.
///
/// The gate has already produced its verdict by the time this runs; the proxy
/// only re-issues the call and hands the backend's answer back unchanged.
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn proxy(State(state): State<AppState>, request: Request) -> Response {
    let session = Session::from_headers(request.headers());

    let (parts, body) = request.into_parts();

    let path_and_query = parts
        .uri
        .path_and_query()
        .map_or_else(|| parts.uri.path().to_string(), ToString::to_string);

    let content_type = parts.headers.get(CONTENT_TYPE).cloned();

    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(error) => {
            error!("Error buffering request body: {:?}", error);

            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };

    let response = match state
        .backend
        .forward(
            parts.method,
            &path_and_query,
            &session,
            content_type,
            bytes.to_vec(),
        )
        .await
    {
        Ok(response) => response,
        Err(error) => {
            error!("Error forwarding request to backend: {:?}", error);

            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    let status = response.status();
    let content_type = response.headers().get(CONTENT_TYPE).cloned();

    match response.bytes().await {
        Ok(body) => {
            let mut headers = HeaderMap::new();

            if let Some(content_type) = content_type {
                headers.insert(CONTENT_TYPE, content_type);
            }

            (status, headers, Body::from(body)).into_response()
        }
        Err(error) => {
            error!("Error reading backend response: {:?}", error);

            StatusCode::BAD_GATEWAY.into_response()
        }
    }
}
