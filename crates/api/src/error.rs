use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::{json, Value};
use staybook_core::error::{AggregationError, CoreError, IndexError, SearchError, StoreError};

/// Seconds clients are told to wait before retrying a dependency failure.
const RETRY_AFTER_SECS: u64 = 1;

/// Application-level error type for HTTP handlers.
///
/// Wraps the domain taxonomies of `staybook_core`. Implements [`IntoResponse`] to produce consistent JSON error
/// responses of the form `{ "error", "code" }`, plus `details` where the
/// caller can act on them.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

struct ErrorParts {
    status: StatusCode,
    code: &'static str,
    message: String,
    details: Option<Value>,
    retry_after: bool,
}

impl ErrorParts {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
            retry_after: false,
        }
    }

    fn retryable(mut self) -> Self {
        self.retry_after = true;
        self
    }

    fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "An internal error occurred",
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let parts = match &self {
            AppError::Core(core) => classify_core(core),
            AppError::Aggregation(err) => classify_aggregation(err),
            AppError::Index(err) => classify_index(err),
            AppError::Search(SearchError::InvalidQuery(core)) => classify_core(core),
            AppError::Search(SearchError::Store(err)) | AppError::Store(err) => classify_store(err),
        };

        let mut body = json!({
            "error": parts.message,
            "code": parts.code,
        });
        if let Some(details) = parts.details {
            body["details"] = details;
        }

        let mut response = (parts.status, axum::Json(body)).into_response();
        if parts.retry_after {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(RETRY_AFTER_SECS));
        }
        response
    }
}

fn classify_core(err: &CoreError) -> ErrorParts {
    match err {
        CoreError::Validation(msg) => {
            ErrorParts::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
        }
    }
}

/// Store messages carry driver text and are only logged.
fn classify_store(err: &StoreError) -> ErrorParts {
    match err {
        StoreError::Corrupt(_) => {
            tracing::error!(error = %err, "Corrupt record in store");
            ErrorParts::internal()
        }
        StoreError::Unavailable(_) | StoreError::Timeout => {
            tracing::warn!(error = %err, "Store unavailable");
            ErrorParts::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "STORE_UNAVAILABLE",
                "The data store is temporarily unavailable",
            )
            .retryable()
        }
    }
}

fn classify_aggregation(err: &AggregationError) -> ErrorParts {
    match err {
        AggregationError::BookingNotFound(id) => ErrorParts::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("Booking with id {id} not found"),
        ),
        AggregationError::PartialDependencyFailure(unresolved) => {
            for failure in unresolved {
                tracing::warn!(
                    entity = %failure.entity_ref,
                    detail = failure.detail.as_deref().unwrap_or(""),
                    "Booking view dependency unavailable"
                );
            }
            let mut parts = ErrorParts::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "DEPENDENCY_UNAVAILABLE",
                err.to_string(),
            )
            .retryable();
            parts.details = Some(json!({ "unresolved": unresolved }));
            parts
        }
        AggregationError::InvalidFilter(msg) => {
            ErrorParts::new(StatusCode::BAD_REQUEST, "INVALID_FILTER", msg.clone())
        }
        AggregationError::Cancelled => {
            ErrorParts::new(StatusCode::REQUEST_TIMEOUT, "CANCELLED", err.to_string())
        }
        AggregationError::Store(store) => classify_store(store),
    }
}

fn classify_index(err: &IndexError) -> ErrorParts {
    match err {
        IndexError::LeaseContention { .. } => {
            ErrorParts::new(StatusCode::CONFLICT, "LEASE_CONTENTION", err.to_string()).retryable()
        }
        IndexError::BuildFailed { .. } => {
            tracing::error!(error = %err, "Geo index build failed");
            ErrorParts::new(StatusCode::INTERNAL_SERVER_ERROR, "INDEX_BUILD_FAILED", err.to_string())
        }
        IndexError::LeaseLost { .. } => {
            tracing::error!(error = %err, "Geo index episode aborted");
            ErrorParts::new(StatusCode::CONFLICT, "LEASE_LOST", err.to_string())
        }
        IndexError::VerificationFailed { .. } => {
            tracing::error!(error = %err, "Geo index verification failed");
            ErrorParts::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INDEX_VERIFICATION_FAILED",
                err.to_string(),
            )
        }
        IndexError::InvalidTransition { .. } => {
            ErrorParts::new(StatusCode::CONFLICT, "INVALID_TRANSITION", err.to_string())
        }
        IndexError::StateConflict { .. } => {
            ErrorParts::new(StatusCode::CONFLICT, "STATE_CONFLICT", err.to_string())
        }
        IndexError::Store(store) => classify_store(store),
    }
}

#[cfg(test)]
mod tests {
    use staybook_core::entity::ForeignEntityRef;
    use staybook_core::error::ResolutionError;

    use super::*;

    #[test]
    fn partial_failure_is_retryable_503() {
        let err = AppError::from(AggregationError::PartialDependencyFailure(vec![
            ResolutionError::unavailable(ForeignEntityRef::owner(3), "timeout"),
        ]));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "1");
    }

    #[tokio::test]
    async fn partial_failure_body_omits_store_diagnostics() {
        let err = AppError::from(AggregationError::PartialDependencyFailure(vec![
            ResolutionError::unavailable(ForeignEntityRef::owner(3), "password authentication failed"),
        ]));
        let body = axum::body::to_bytes(err.into_response().into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();

        let unresolved = &json["details"]["unresolved"][0];
        assert_eq!(unresolved["kind"], "unavailable");
        assert_eq!(unresolved["ref"]["id"], 3);
        assert!(unresolved.get("detail").is_none());
        assert!(!String::from_utf8_lossy(&body).contains("password"));
    }

    #[test]
    fn corrupt_record_is_500_without_retry() {
        let err = AppError::from(AggregationError::Store(StoreError::Corrupt(
            "booking 7 has status 'archived'".into(),
        )));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get(RETRY_AFTER).is_none());
    }

    #[test]
    fn invalid_search_input_is_400() {
        let err = AppError::from(SearchError::InvalidQuery(CoreError::Validation("bad".into())));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn booking_not_found_is_404() {
        let err = AppError::from(AggregationError::BookingNotFound(9));
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn lease_contention_is_409() {
        let err = AppError::from(IndexError::LeaseContention {
            key_spec: "k".into(),
            holder: "h".into(),
            expires_at: chrono::Utc::now(),
        });
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }
}
