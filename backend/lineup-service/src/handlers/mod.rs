use actix_web::{error::QueryPayloadError, get, web, HttpRequest, HttpResponse};
use prometheus::{Encoder, Registry, TextEncoder};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::{LineupError, Result};
use crate::services::LineupService;

pub struct AppState {
    pub lineups: Arc<LineupService>,
    pub registry: Registry,
}

#[derive(Debug, Deserialize)]
pub struct LineupQuery {
    pub user_id: String,
    pub slate_count: Option<usize>,
    pub recommendation_count: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SlateQuery {
    pub user_id: String,
    pub recommendation_count: Option<usize>,
}

/// GET /api/v1/lineups/{lineup_id}
#[get("/api/v1/lineups/{lineup_id}")]
pub async fn get_lineup(
    path: web::Path<String>,
    query: web::Query<LineupQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let lineup_id = path.into_inner();
    let lineup = state
        .lineups
        .lineup(
            &lineup_id,
            &query.user_id,
            query.slate_count,
            query.recommendation_count,
        )
        .await?;

    Ok(HttpResponse::Ok().json(lineup))
}

/// GET /api/v1/slates/{slate_id}
#[get("/api/v1/slates/{slate_id}")]
pub async fn get_slate(
    path: web::Path<String>,
    query: web::Query<SlateQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let slate_id = path.into_inner();
    let slate = state
        .lineups
        .slate(&slate_id, &query.user_id, query.recommendation_count)
        .await?;

    Ok(HttpResponse::Ok().json(slate))
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

/// Prometheus text exposition of the service registry
pub async fn metrics(state: web::Data<AppState>) -> Result<HttpResponse> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&state.registry.gather(), &mut buffer)
        .map_err(|e| LineupError::Internal(format!("metrics encoding failed: {}", e)))?;

    Ok(HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer))
}

/// Malformed query strings get the same JSON error body as every other failure
fn query_error(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    LineupError::Validation(err.to_string()).into()
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::QueryConfig::default().error_handler(query_error))
        .service(get_lineup)
        .service(get_slate)
        .route("/health", web::get().to(health))
        .route("/metrics", web::get().to(metrics));
}
