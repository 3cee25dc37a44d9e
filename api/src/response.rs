use application::ApplicationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json as JsonResponse, Response},
};
use domain::RecordId;
use serde_json::{Value, json};
use tracing::{error, warn};

// --- Success Envelopes ---

pub fn data(status: StatusCode, data: Value) -> Response {
    (status, JsonResponse(json!({ "success": true, "data": data }))).into_response()
}

pub fn created(id: RecordId) -> Response {
    (
        StatusCode::CREATED,
        JsonResponse(json!({ "success": true, "id": id })),
    )
        .into_response()
}

pub fn done() -> Response {
    (StatusCode::OK, JsonResponse(json!({ "success": true }))).into_response()
}

// --- Failure Envelopes ---

/// Maps an `ApplicationError` to its status code and JSON body.
///
/// `point` names the failed operation (e.g. `update_pet`) and is echoed back
/// to the caller. Field validation failures list the offending fields instead.
pub fn map_application_error_to_response(point: &str, err: ApplicationError) -> Response {
    let (status, message) = match err {
        ApplicationError::MissingFields(fields) => {
            return validation_failure("Required fields are missing or empty.", "missing", fields);
        }
        ApplicationError::BlockedFields(fields) => {
            return validation_failure(
                "Some of the given fields cannot be changed.",
                "blocked",
                fields,
            );
        }
        e @ ApplicationError::NotFound { .. } => (StatusCode::NOT_FOUND, e.to_string()),
        ApplicationError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
        ApplicationError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        ApplicationError::DomainError(domain_err) => {
            warn!(point, "Domain validation failed: {}", domain_err);
            (StatusCode::BAD_REQUEST, domain_err.to_string())
        }
        ApplicationError::Internal(msg) => {
            error!(point, "Internal error: {}", msg);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An internal server error occurred".to_string(),
            )
        }
        ApplicationError::StorageError { collection, source } => {
            error!(point, collection = %collection, "Storage error: {}", source);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An internal server error occurred".to_string(),
            )
        }
    };
    (
        status,
        JsonResponse(json!({ "success": false, "point": point, "message": message })),
    )
        .into_response()
}

fn validation_failure(error: &str, kind: &str, fields: Vec<String>) -> Response {
    let mut body = json!({ "success": false, "error": error });
    body[kind] = json!(fields);
    (StatusCode::UNPROCESSABLE_ENTITY, JsonResponse(body)).into_response()
}
