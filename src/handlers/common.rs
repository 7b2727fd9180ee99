use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use validator::Validate;

use crate::errors::ServiceError;
use crate::ApiResponse;

/// Validate a request body, turning field errors into one readable message.
pub fn validate_input<T: Validate>(input: &T) -> Result<(), ServiceError> {
    input.validate().map_err(ServiceError::from)
}

pub fn success_response<T: Serialize>(data: T) -> (StatusCode, Json<ApiResponse<T>>) {
    (StatusCode::OK, Json(ApiResponse::success(data)))
}

pub fn created_response<T: Serialize>(data: T) -> (StatusCode, Json<ApiResponse<T>>) {
    (StatusCode::CREATED, Json(ApiResponse::success(data)))
}
