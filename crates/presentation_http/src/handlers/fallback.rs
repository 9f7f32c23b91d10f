//! Handler for paths no route matched

use axum::http::Uri;

use crate::error::ApiError;

/// Answer unknown paths with a JSON 404
pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(format!("No route for {}", uri.path()))
}
