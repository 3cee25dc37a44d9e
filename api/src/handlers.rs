use crate::response::{created, data, done, map_application_error_to_response};
use application::{ApplicationError, ResourceService, query_from_params};
use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use domain::{RecordId, SearchQuery};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Shared state of one resource's routes.
pub type Resource = Arc<dyn ResourceService>;

pub async fn health_check() -> impl IntoResponse {
    info!("Health check endpoint called");
    (StatusCode::OK, "OK")
}

fn parse_id(raw: &str) -> Result<RecordId, ApplicationError> {
    Ok(raw.parse::<RecordId>()?)
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApplicationError> {
    payload.map(|Json(value)| value).map_err(|rejection| {
        warn!("Rejected request body: {}", rejection.body_text());
        ApplicationError::InvalidInput(rejection.body_text())
    })
}

/// GET /<resource>: lists everything, or filters when query parameters are given.
pub async fn list_handler(
    State(resource): State<Resource>,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    let info = resource.info();
    info!(collection = info.collection, filters = params.len(), "Received list request");
    let outcome = if params.is_empty() {
        resource.list().await
    } else {
        resource.search(query_from_params(params)).await
    };
    match outcome {
        Ok(views) => data(StatusCode::OK, Value::Array(views)),
        Err(e) => {
            error!(collection = info.collection, "Failed to list via handler: {}", e);
            map_application_error_to_response(&info.point("list"), e)
        }
    }
}

/// POST /<resource>/search with a JSON `{logic, criteria}` body.
pub async fn search_handler(
    State(resource): State<Resource>,
    payload: Result<Json<SearchQuery>, JsonRejection>,
) -> Response {
    let info = resource.info();
    let outcome = match body(payload) {
        Ok(query) => {
            info!(
                collection = info.collection,
                logic = query.logic.as_str(),
                criteria = query.criteria.len(),
                "Received search request via POST"
            );
            resource.search(query).await
        }
        Err(e) => Err(e),
    };
    match outcome {
        Ok(views) => data(StatusCode::OK, Value::Array(views)),
        Err(e) => {
            error!(collection = info.collection, "Failed to search via handler: {}", e);
            map_application_error_to_response(&info.point("search"), e)
        }
    }
}

/// GET /<resource>/:id
pub async fn get_handler(State(resource): State<Resource>, Path(raw_id): Path<String>) -> Response {
    let info = resource.info();
    info!(collection = info.collection, id = %raw_id, "Received get request");
    let outcome = match parse_id(&raw_id) {
        Ok(id) => match resource.get(id).await {
            Ok(Some(view)) => Ok(view),
            Ok(None) => Err(ApplicationError::NotFound {
                collection: info.collection.to_string(),
                id,
            }),
            Err(e) => Err(e),
        },
        Err(e) => Err(e),
    };
    match outcome {
        Ok(view) => data(StatusCode::OK, view),
        Err(e) => {
            error!(collection = info.collection, id = %raw_id, "Failed to get via handler: {}", e);
            map_application_error_to_response(&format!("{}_by_id", info.point("get")), e)
        }
    }
}

/// POST /<resource>
pub async fn create_handler(
    State(resource): State<Resource>,
    payload: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Response {
    let info = resource.info();
    info!(collection = info.collection, "Received create request");
    let outcome = match body(payload) {
        Ok(fields) => resource.create(fields).await,
        Err(e) => Err(e),
    };
    match outcome {
        Ok(id) => {
            info!(
                collection = info.collection,
                id = %id,
                "Record created successfully via handler"
            );
            created(id)
        }
        Err(e) => {
            error!(collection = info.collection, "Failed to create via handler: {}", e);
            map_application_error_to_response(&info.point("create"), e)
        }
    }
}

/// PATCH /<resource>/:id
pub async fn update_handler(
    State(resource): State<Resource>,
    Path(raw_id): Path<String>,
    payload: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Response {
    let info = resource.info();
    info!(collection = info.collection, id = %raw_id, "Received update request");
    let outcome = match (parse_id(&raw_id), body(payload)) {
        (Ok(id), Ok(fields)) => resource.update(id, fields).await,
        (Err(e), _) | (_, Err(e)) => Err(e),
    };
    match outcome {
        Ok(()) => done(),
        Err(e) => {
            error!(
                collection = info.collection,
                id = %raw_id,
                "Failed to update via handler: {}", e
            );
            map_application_error_to_response(&info.point("update"), e)
        }
    }
}

/// DELETE /<resource>/:id
pub async fn delete_handler(
    State(resource): State<Resource>,
    Path(raw_id): Path<String>,
) -> Response {
    let info = resource.info();
    info!(collection = info.collection, id = %raw_id, "Received delete request");
    let outcome = match parse_id(&raw_id) {
        Ok(id) => resource.delete(id).await,
        Err(e) => Err(e),
    };
    match outcome {
        Ok(()) => {
            info!(
                collection = info.collection,
                id = %raw_id,
                "Record deleted successfully via handler"
            );
            done()
        }
        Err(e) => {
            error!(
                collection = info.collection,
                id = %raw_id,
                "Failed to delete via handler: {}", e
            );
            map_application_error_to_response(&info.point("delete"), e)
        }
    }
}
