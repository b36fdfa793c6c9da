//! HTTP transport for portal requests.
//!
//! Every same-origin request carries the session's cookie jar and merges
//! `Set-Cookie` headers back into it. Redirects are followed here rather than by reqwest so
//! that cookies set on intermediate hops (the login POST's 302, for instance)
//! are not lost. Network failures and 5xx responses are retried with
//! exponential backoff; 4xx responses are not.

use super::config::PortalConfig;
use super::cookies::CookieJar;
use super::error::PortalError;
use super::types::PortalPage;
use rand::Rng;
use reqwest::header::{COOKIE, LOCATION, SET_COOKIE};
use reqwest::redirect::Policy;
use reqwest::{Client, Method, StatusCode};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

/// Upper bound for a single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// One logical request, before redirects.
#[derive(Debug, Clone)]
pub struct PortalRequest {
    pub method: Method,
    pub url: Url,
    /// URL-encoded form body for POSTs
    pub form: Option<Vec<(String, String)>>,
}

impl PortalRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            form: None,
        }
    }

    pub fn post_form(url: Url, form: Vec<(String, String)>) -> Self {
        Self {
            method: Method::POST,
            url,
            form: Some(form),
        }
    }
}

/// A single hop's response.
struct RawResponse {
    status: StatusCode,
    location: Option<String>,
    body: String,
}

/// Cookie-carrying HTTP client with bounded retries.
#[derive(Debug, Clone)]
pub struct PortalTransport {
    client: Client,
    max_retries: u32,
    backoff_base: Duration,
    max_redirects: usize,
}

impl PortalTransport {
    /// Creates a transport using the timeouts and retry policy in `config`.
    pub fn new(config: &PortalConfig) -> Result<Self, PortalError> {
        let client = Client::builder()
            .redirect(Policy::none())
            .user_agent(&config.user_agent)
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| PortalError::PortalUnreachable {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            max_retries: config.max_retries,
            backoff_base: config.backoff_base(),
            max_redirects: config.max_redirects,
        })
    }

    /// Performs a request, following redirects, and returns the final page.
    ///
    /// The jar is borrowed mutably for the whole call, so one session's jar can
    /// never serve two requests at once. It belongs to the origin of `request`;
    /// hops to any other origin go out without it and their cookies are dropped.
    pub async fn execute(
        &self,
        jar: &mut CookieJar,
        request: PortalRequest,
        correlation_id: &str,
    ) -> Result<PortalPage, PortalError> {
        let origin = request.url.origin();
        let mut current = request;

        for _ in 0..=self.max_redirects {
            let mut foreign = CookieJar::new();
            let hop_jar = if current.url.origin() == origin {
                &mut *jar
            } else {
                debug!(
                    correlation_id = %correlation_id,
                    url = %current.url,
                    "Cross-origin hop, withholding session cookies"
                );
                &mut foreign
            };
            let response = self.send_with_retry(hop_jar, &current, correlation_id).await?;
            let status = response.status;

            if status.is_redirection() {
                if let Some(location) = response.location.as_deref() {
                    let next = current.url.join(location).map_err(|e| {
                        PortalError::MalformedDocument {
                            message: format!("bad redirect location '{location}': {e}"),
                        }
                    })?;
                    debug!(
                        correlation_id = %correlation_id,
                        status = status.as_u16(),
                        location = %next,
                        "Following portal redirect"
                    );
                    current = match status {
                        // 307/308 replay the method and body
                        StatusCode::TEMPORARY_REDIRECT | StatusCode::PERMANENT_REDIRECT => {
                            PortalRequest { url: next, ..current }
                        }
                        _ => PortalRequest::get(next),
                    };
                    continue;
                }
            }

            if status.is_success() {
                return Ok(PortalPage {
                    status: status.as_u16(),
                    url: current.url,
                    body: response.body,
                });
            }

            return Err(PortalError::PortalRejected {
                status: status.as_u16(),
                url: current.url.to_string(),
            });
        }

        warn!(
            correlation_id = %correlation_id,
            url = %current.url,
            max_redirects = self.max_redirects,
            "Too many portal redirects"
        );
        Err(PortalError::PortalRejected {
            status: StatusCode::LOOP_DETECTED.as_u16(),
            url: current.url.to_string(),
        })
    }

    /// Sends one hop, retrying transient failures.
    async fn send_with_retry(
        &self,
        jar: &mut CookieJar,
        request: &PortalRequest,
        correlation_id: &str,
    ) -> Result<RawResponse, PortalError> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let start = Instant::now();
            let result = self.send_once(jar, request).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;

            match result {
                Ok(response) if response.status.is_server_error() => {
                    if attempt > self.max_retries {
                        return Err(PortalError::PortalServerError {
                            status: response.status.as_u16(),
                            url: request.url.to_string(),
                            attempts: attempt,
                        });
                    }
                    warn!(
                        correlation_id = %correlation_id,
                        url = %request.url,
                        status = response.status.as_u16(),
                        attempt = attempt,
                        "Portal returned server error, retrying"
                    );
                }
                Ok(response) => {
                    debug!(
                        correlation_id = %correlation_id,
                        method = %request.method,
                        url = %request.url,
                        status = response.status.as_u16(),
                        elapsed_ms = elapsed_ms,
                        "Portal request completed"
                    );
                    return Ok(response);
                }
                Err(e) if e.is_retryable() && attempt <= self.max_retries => {
                    warn!(
                        correlation_id = %correlation_id,
                        url = %request.url,
                        error = %e,
                        attempt = attempt,
                        "Portal request failed, retrying"
                    );
                }
                Err(e) => return Err(e),
            }

            tokio::time::sleep(self.backoff_delay(attempt)).await;
        }
    }

    async fn send_once(
        &self,
        jar: &mut CookieJar,
        request: &PortalRequest,
    ) -> Result<RawResponse, PortalError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone());
        if let Some(cookie) = jar.header_value() {
            builder = builder.header(COOKIE, cookie);
        }
        if let Some(form) = &request.form {
            builder = builder.form(form);
        }

        let response = builder.send().await?;

        for value in response.headers().get_all(SET_COOKIE) {
            if let Ok(value) = value.to_str() {
                jar.merge_set_cookie(value);
            }
        }

        let status = response.status();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;

        Ok(RawResponse {
            status,
            location,
            body,
        })
    }

    /// Calculates retry delay with exponential backoff and jitter.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.backoff_base.as_millis() as u64;
        let exponential = base.saturating_mul(2u64.pow(attempt.saturating_sub(1).min(5)));
        let capped = exponential.min(MAX_BACKOFF.as_millis() as u64);
        // Add jitter: 0-20% of the delay
        let jitter = rand::thread_rng().gen_range(0..=(capped / 5));
        Duration::from_millis(capped + jitter)
    }
}
