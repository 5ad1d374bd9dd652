/// REST API handlers for HTTP endpoints.
/// Handles health checks and read-only inspection of the group table.

use crate::handlers::websocket::Router;
use actix_web::{web, HttpResponse, Result as ActixResult};
use serde_json::json;

/// List tracked groups in matchmaking order
/// GET /groups
pub async fn list_groups(router: web::Data<Router>) -> ActixResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(router.registry().snapshot()))
}

/// Get a single group by name (case-insensitive)
/// GET /groups/:name
pub async fn get_group(
    router: web::Data<Router>,
    name: web::Path<String>,
) -> ActixResult<HttpResponse> {
    match router.registry().get(&name) {
        Some(group) => Ok(HttpResponse::Ok().json(group)),
        None => Ok(HttpResponse::NotFound().json(json!({
            "error": "Group not found"
        }))),
    }
}

/// Health check endpoint
/// GET /health
pub async fn health() -> ActixResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(json!({
        "status": "ok"
    })))
}
