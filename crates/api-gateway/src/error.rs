//! HTTP error responses

use axum::extract::rejection::JsonRejection;
use axum::extract::FromRequest;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{async_trait, Json};
use serde::de::DeserializeOwned;
use tracing::{debug, error, warn};

use common::{Error, ErrorResponse};

/// Error returned by a handler, rendered as `{"detail": ...}`
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: detail.into(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        if e.is_precondition() {
            debug!(error = %e, "Lifecycle precondition failed");
            Self::bad_request(e.to_string())
        } else if e.is_client_error() {
            warn!(error = %e, "Rejected request");
            Self::bad_request(e.to_string())
        } else {
            error!(error = %e, "Request failed");
            Self::internal(e.to_string())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { detail: self.detail })).into_response()
    }
}

/// JSON body whose rejections are reported as 400 with a `detail` body
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S, B> FromRequest<S, B> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
    B: Send + 'static,
    Json<T>: FromRequest<S, B, Rejection = JsonRejection>,
{
    type Rejection = ApiError;

    async fn from_request(req: Request<B>, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError::bad_request(rejection.body_text())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_errors_map_to_status_codes() {
        assert_eq!(ApiError::from(Error::AlreadyLoading).status, StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::from(Error::AlreadyLoaded).status, StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::from(Error::NoModelLoaded).status, StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::from(Error::ModelLoading).status, StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::from(Error::InvalidArgument("top_p".into())).status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(Error::ModelLoad("boom".into())).status,
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(Error::Generation("boom".into())).status,
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(Error::Undeploy("boom".into())).status,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_detail_is_error_message() {
        let error = ApiError::from(Error::NoModelLoaded);
        assert_eq!(
            error.detail,
            "No model is currently loaded. Please deploy a model first."
        );
    }
}
