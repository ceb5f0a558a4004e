//! Shared HTTP plumbing for the adapters

use super::RemoteError;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

/// Send a request and turn any failure into a classified [`RemoteError`]
pub(super) async fn send(request: RequestBuilder, context: &str) -> Result<Response, RemoteError> {
    let response = request
        .send()
        .await
        .map_err(|e| classify_error(&e, context))?;

    let status = response.status();
    if !status.is_success() {
        return Err(classify_status(status, context));
    }

    Ok(response)
}

pub(super) async fn send_text(request: RequestBuilder, context: &str) -> Result<String, RemoteError> {
    send(request, context)
        .await?
        .text()
        .await
        .map_err(|e| classify_error(&e, context))
}

pub(super) async fn send_json<T: DeserializeOwned>(
    request: RequestBuilder,
    context: &str,
) -> Result<T, RemoteError> {
    send(request, context)
        .await?
        .json()
        .await
        .map_err(|e| classify_error(&e, context))
}

pub(super) fn classify_status(status: StatusCode, context: &str) -> RemoteError {
    let message = format!("{}: HTTP {}", context, status);
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        RemoteError::transient(message)
    } else {
        RemoteError::permanent(message)
    }
}

pub(super) fn classify_error(err: &reqwest::Error, context: &str) -> RemoteError {
    if let Some(status) = err.status() {
        return classify_status(status, context);
    }

    let message = format!("{}: {}", context, err);
    if err.is_decode() || err.is_builder() {
        RemoteError::permanent(message)
    } else {
        RemoteError::transient(message)
    }
}
