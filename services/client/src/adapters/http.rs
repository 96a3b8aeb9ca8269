//! services/client/src/adapters/http.rs
//!
//! Shared plumbing for the adapters that talk to the hosted backend over HTTP.

use reqwest::{Response, StatusCode};
use serde::Deserialize;
use todo_core::ports::{PortError, PortResult};

/// The error body shapes returned by the backend's auth and storage APIs.
#[derive(Deserialize, Default)]
struct ErrorBody {
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

impl ErrorBody {
    fn into_message(self) -> Option<String> {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
    }
}

pub fn transport_error(e: reqwest::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

/// Maps an HTTP status and backend message to the port error taxonomy.
pub fn status_error(status: StatusCode, message: String) -> PortError {
    match status {
        StatusCode::UNAUTHORIZED => PortError::Unauthorized,
        StatusCode::FORBIDDEN => PortError::Forbidden(message),
        StatusCode::NOT_FOUND => PortError::NotFound(message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY | StatusCode::CONFLICT => {
            PortError::Invalid(message)
        }
        _ => PortError::Unexpected(format!("{}: {}", status, message)),
    }
}

/// Passes successful responses through and turns everything else into a `PortError`.
pub async fn check(response: Response) -> PortResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(ErrorBody::into_message)
        .unwrap_or(body);
    Err(status_error(status, message))
}
