//! Shared response handling for the HTTP collaborators.

use reqwest::{Response, StatusCode};
use vizor_core::VizorError;

/// Which external service a request went to; picks the error variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Collaborator {
    Launcher,
    Proxy,
}

impl Collaborator {
    fn error(self, status: Option<u16>, message: String, retryable: bool) -> VizorError {
        match self {
            Collaborator::Launcher => VizorError::provisioner(status, message, retryable),
            Collaborator::Proxy => VizorError::route_table(status, message, retryable),
        }
    }
}

/// When a failed request may be sent again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Replay {
    /// Repeating the request has no further effect.
    Idempotent,
    /// The request has a side effect (e.g. starting a named container), so
    /// only a request that never reached the server may be repeated.
    UnsentOnly,
}

/// Maps a failed send (no response at all) of an idempotent request.
pub(crate) fn transport_error(target: Collaborator, context: &str, err: reqwest::Error) -> VizorError {
    transport_error_with(target, context, err, Replay::Idempotent)
}

/// Maps a failed send. A timeout means the server may have acted on the
/// request.
pub(crate) fn transport_error_with(
    target: Collaborator,
    context: &str,
    err: reqwest::Error,
    replay: Replay,
) -> VizorError {
    let retryable = match replay {
        Replay::Idempotent => err.is_connect() || err.is_timeout(),
        Replay::UnsentOnly => err.is_connect(),
    };
    target.error(None, format!("{context}: {err}"), retryable)
}

/// 429 and 5xx are worth another attempt.
pub(crate) fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Maps a non-success response to an idempotent request, consuming its body
/// for the message.
pub(crate) async fn status_error(target: Collaborator, context: &str, response: Response) -> VizorError {
    status_error_with(target, context, response, Replay::Idempotent).await
}

/// Maps a non-success response. Only idempotent requests retry on 429/5xx.
pub(crate) async fn status_error_with(
    target: Collaborator,
    context: &str,
    response: Response,
    replay: Replay,
) -> VizorError {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    target.error(
        Some(status.as_u16()),
        format!("{context}: {}", body.trim()),
        replay == Replay::Idempotent && is_retryable_status(status),
    )
}
