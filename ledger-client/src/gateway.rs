//! The single way out to the ledger service.
//!
//! Every request picks up the current bearer token on the way out, and every
//! response goes through [`Gateway::check`] on the way back in. A 401 for a
//! request that carried the current token ends the session before the error
//! reaches the caller. Nothing is retried here.
use reqwest::Method;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::config::ClientConfig;
use crate::session::SessionManager;
use crate::transport::{HttpRequest, HttpResponse, RequestBody, Transport, TransportError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GatewayErrorKind {
    /// Could not reach the server.
    Unreachable,
    Timeout,
    /// 401. The session has already been torn down when the caller sees this.
    Unauthorized,
    /// Any other 4xx. The message is meant for display.
    Validation,
    Server,
    /// 2xx with a body we could not make sense of.
    Decode,
}

impl std::fmt::Display for GatewayErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            GatewayErrorKind::Unreachable => "network error",
            GatewayErrorKind::Timeout => "timeout",
            GatewayErrorKind::Unauthorized => "unauthorized",
            GatewayErrorKind::Validation => "rejected",
            GatewayErrorKind::Server => "server error",
            GatewayErrorKind::Decode => "unexpected response",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct GatewayError {
    pub kind: GatewayErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl GatewayError {
    pub fn new(kind: GatewayErrorKind, status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            kind,
            status,
            message: message.into(),
        }
    }

    fn from_response(response: &HttpResponse) -> Self {
        let kind = match response.status {
            401 => GatewayErrorKind::Unauthorized,
            400..=499 => GatewayErrorKind::Validation,
            _ => GatewayErrorKind::Server,
        };
        Self::new(kind, Some(response.status), error_message(response))
    }

    /// Unreachable or timed out. The caller may retry.
    pub fn is_network(&self) -> bool {
        matches!(
            self.kind,
            GatewayErrorKind::Unreachable | GatewayErrorKind::Timeout
        )
    }

    pub fn is_unauthorized(&self) -> bool {
        self.kind == GatewayErrorKind::Unauthorized
    }
}

impl From<TransportError> for GatewayError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Timeout(message) => {
                GatewayError::new(GatewayErrorKind::Timeout, None, message)
            }
            TransportError::Unreachable(message) | TransportError::Other(message) => {
                GatewayError::new(GatewayErrorKind::Unreachable, None, message)
            }
        }
    }
}

/// Prefers the server's `{ "message": ... }`, falls back to the raw body.
fn error_message(response: &HttpResponse) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: String,
    }

    if let Ok(ErrorBody { message }) = response.json::<ErrorBody>()
        && !message.is_empty()
    {
        return message;
    }
    let text = response.text();
    if text.trim().is_empty() {
        format!("HTTP {}", response.status)
    } else {
        text
    }
}

/// The `{ status, data }` wrapper the service puts around every entity.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

fn decode_error(response: &HttpResponse, e: serde_json::Error) -> GatewayError {
    GatewayError::new(GatewayErrorKind::Decode, Some(response.status), e.to_string())
}

/// Decodes the `data` field of an enveloped response.
pub fn decode_data<T: DeserializeOwned>(response: &HttpResponse) -> Result<T, GatewayError> {
    response
        .json::<Envelope<T>>()
        .map(|envelope| envelope.data)
        .map_err(|e| decode_error(response, e))
}

/// Decodes the whole body.
pub fn decode<T: DeserializeOwned>(response: &HttpResponse) -> Result<T, GatewayError> {
    response
        .json::<T>()
        .map_err(|e| decode_error(response, e))
}

pub struct Gateway {
    base: String,
    transport: Arc<dyn Transport>,
    session: Arc<SessionManager>,
}

impl Gateway {
    pub fn new(
        config: &ClientConfig,
        transport: Arc<dyn Transport>,
        session: Arc<SessionManager>,
    ) -> Self {
        Self {
            base: config.api_base(),
            transport,
            session,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
        mut headers: Vec<(String, String)>,
    ) -> Result<HttpResponse, GatewayError> {
        // snapshot: the token this request carries is the one a 401 refers to
        let token = self.session.token();
        if let Some(token) = &token {
            headers.retain(|(name, _)| !name.eq_ignore_ascii_case("authorization"));
            headers.push(("Authorization".to_string(), format!("Bearer {token}")));
        }

        log::debug!("{method} {path}");
        let request = HttpRequest {
            method,
            url: self.url(path),
            headers,
            body,
        };

        let response = self.transport.send(request).await.inspect_err(|e| {
            log::warn!("Request to {path} failed: {e}");
        })?;

        self.check(response, token.as_deref()).await
    }

    async fn check(
        &self,
        response: HttpResponse,
        token_used: Option<&str>,
    ) -> Result<HttpResponse, GatewayError> {
        if response.is_success() {
            return Ok(response);
        }

        let error = GatewayError::from_response(&response);
        if error.is_unauthorized()
            && let Some(token_used) = token_used
        {
            // the session manager logs storage failures itself; the caller still gets the 401
            let _ = self.session.expire(token_used).await;
        }
        Err(error)
    }

    /// Sends `body` and decodes the whole response body.
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
    ) -> Result<T, GatewayError> {
        let response = self.request(method, path, body, Vec::new()).await?;
        decode(&response)
    }

    /// Sends `body` and returns the decoded `data` of the response envelope.
    pub async fn request_data<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
    ) -> Result<T, GatewayError> {
        let response = self.request(method, path, body, Vec::new()).await?;
        decode_data(&response)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        self.request_data(Method::GET, path, RequestBody::Empty)
            .await
    }
}
