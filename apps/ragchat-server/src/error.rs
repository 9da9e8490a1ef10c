//! Conversion of library errors into HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use ragchat_core::{Error, ProviderErrorKind};

pub const APOLOGY: &str = "Sorry, couldn't process your request at the moment.";

/// Which response shape the failing route uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    /// `{"response": <apology>, "error": ...}`
    Query,
    /// `{"message": ..., "error": ...}`
    Admin,
}

#[derive(Debug)]
pub struct ApiError {
    surface: Surface,
    status: StatusCode,
    error: String,
}

impl ApiError {
    pub fn for_query(err: &Error) -> Self {
        Self { surface: Surface::Query, status: status_for(err), error: err.to_string() }
    }

    pub fn for_admin(err: &Error) -> Self {
        Self { surface: Surface::Admin, status: status_for(err), error: err.to_string() }
    }

    pub fn status(&self) -> StatusCode { self.status }
}

pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::NotReady => StatusCode::SERVICE_UNAVAILABLE,
        Error::RebuildInProgress => StatusCode::CONFLICT,
        Error::Provider(p) if p.kind == ProviderErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        Error::Provider(_) => StatusCode::BAD_GATEWAY,
        Error::InvalidConfig(_) | Error::LoadIo { .. } | Error::SnapshotCorruptOrMissing { .. } | Error::Persist { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self.surface {
            Surface::Query => json!({ "response": APOLOGY, "error": self.error }),
            Surface::Admin => {
                let message = match self.status {
                    StatusCode::CONFLICT => "Index update already in progress",
                    StatusCode::SERVICE_UNAVAILABLE => "Index is not ready",
                    _ => "Index update failed",
                };
                json!({ "message": message, "error": self.error })
            }
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragchat_core::ProviderError;

    #[test]
    fn provider_errors_map_to_gateway_statuses() {
        let timeout: Error = ProviderError::new(ProviderErrorKind::Timeout, "slow").into();
        let limited: Error = ProviderError::new(ProviderErrorKind::RateLimited, "429").into();
        assert_eq!(status_for(&timeout), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(status_for(&limited), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for(&Error::NotReady), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_for(&Error::RebuildInProgress), StatusCode::CONFLICT);
    }
}
