use crate::session::Session;
use anyhow::Result;
use reqwest::{
    header::{HeaderValue, CONTENT_TYPE},
    Client, Method, Request, RequestBuilder, Response, StatusCode,
};
use secrecy::ExposeSecret;
use serde::Serialize;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{instrument, warn};
use url::Url;

static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

/// Retry policy for transient backend failures.
///
/// An explicit value injected into [`Backend`] so the loop can be exercised
/// against a stub server with short delays. Defaults follow the production
/// budget: three retries with linear backoff (1s, 2s, 3s).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry `attempt` (1-based): attempt x base delay.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    /// Server-side failures are transient; 4xx are caller errors, never retried.
    #[must_use]
    pub fn retryable_status(&self, status: StatusCode) -> bool {
        status.is_server_error()
    }

    /// Network-level failures worth retrying.
    #[must_use]
    pub fn retryable_error(&self, error: &reqwest::Error) -> bool {
        error.is_connect() || error.is_timeout()
    }
}

/// The single configured client all feature code talks to the backend through.
///
/// Injects the session bearer token into every outgoing request and retries
/// transient failures per the [`RetryPolicy`]. Does not cache responses and
/// holds no mutable state; concurrent calls retry independently.
#[derive(Debug, Clone)]
pub struct Backend {
    client: Client,
    base_url: Url,
    retry: RetryPolicy,
}

impl Backend {
    /// Build the client against a fixed base address.
    ///
    /// # Errors
    /// Returns an error if the underlying client cannot be constructed
    pub fn new(base_url: Url, retry: RetryPolicy) -> Result<Self> {
        let client = Client::builder().user_agent(APP_USER_AGENT).build()?;

        Ok(Self {
            client,
            base_url,
            retry,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// # Errors
    /// Returns an error on exhausted retries or a non-retryable transport failure
    #[instrument(skip(self, session))]
    pub async fn get(&self, path: &str, session: &Session) -> Result<Response> {
        let builder = self.client.get(self.endpoint(path)?);

        self.execute(self.authorize(builder, session).build()?).await
    }

    /// # Errors
    /// Returns an error on exhausted retries or a non-retryable transport failure
    #[instrument(skip(self, session, body))]
    pub async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        session: &Session,
        body: &T,
    ) -> Result<Response> {
        let builder = self.client.post(self.endpoint(path)?).json(body);

        self.execute(self.authorize(builder, session).build()?).await
    }

    /// # Errors
    /// Returns an error on exhausted retries or a non-retryable transport failure
    #[instrument(skip(self, session, body))]
    pub async fn put<T: Serialize + ?Sized>(
        &self,
        path: &str,
        session: &Session,
        body: &T,
    ) -> Result<Response> {
        let builder = self.client.put(self.endpoint(path)?).json(body);

        self.execute(self.authorize(builder, session).build()?).await
    }

    /// # Errors
    /// Returns an error on exhausted retries or a non-retryable transport failure
    #[instrument(skip(self, session))]
    pub async fn delete(&self, path: &str, session: &Session) -> Result<Response> {
        let builder = self.client.delete(self.endpoint(path)?);

        self.execute(self.authorize(builder, session).build()?).await
    }

    /// Re-issue an incoming request against the backend, preserving method,
    /// path, query and body.
    ///
    /// # Errors
    /// Returns an error on exhausted retries or a non-retryable transport failure
    #[instrument(skip(self, session, content_type, body))]
    pub async fn forward(
        &self,
        method: Method,
        path_and_query: &str,
        session: &Session,
        content_type: Option<HeaderValue>,
        body: Vec<u8>,
    ) -> Result<Response> {
        let mut builder = self.client.request(method, self.endpoint(path_and_query)?);

        if let Some(content_type) = content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }

        if !body.is_empty() {
            builder = builder.body(body);
        }

        self.execute(self.authorize(builder, session).build()?).await
    }

    // Base address and relative path are concatenated, keeping any path
    // prefix the configured base carries.
    fn endpoint(&self, path: &str) -> Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');

        Ok(Url::parse(&format!("{base}{path}"))?)
    }

    fn authorize(&self, builder: RequestBuilder, session: &Session) -> RequestBuilder {
        match session.token() {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        }
    }

    /// Send with the retry budget: network errors and 5xx responses are
    /// retried with linear backoff, anything else returns to the caller
    /// unchanged for interpretation.
    async fn execute(&self, request: Request) -> Result<Response> {
        let mut attempt = 0;

        loop {
            // Streaming bodies cannot be replayed; single shot
            let Some(this_try) = request.try_clone() else {
                return Ok(self.client.execute(request).await?);
            };

            match self.client.execute(this_try).await {
                Ok(response)
                    if self.retry.retryable_status(response.status())
                        && attempt < self.retry.max_retries =>
                {
                    attempt += 1;
                    let delay = self.retry.delay(attempt);

                    warn!(
                        "Backend returned {}, retry {} in {:?}",
                        response.status(),
                        attempt,
                        delay
                    );

                    sleep(delay).await;
                }

                Ok(response) => return Ok(response),

                Err(error)
                    if self.retry.retryable_error(&error)
                        && attempt < self.retry.max_retries =>
                {
                    attempt += 1;
                    let delay = self.retry.delay(attempt);

                    warn!("Network error: {}, retry {} in {:?}", error, attempt, delay);

                    sleep(delay).await;
                }

                Err(error) => return Err(error.into()),
            }
        }
    }
}
