use actix_web::{web, HttpResponse, Responder};
use mongodb::bson::doc;
use serde::Serialize;

use crate::database::MongoDB;

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub database: String,
    pub timestamp: i64,
}

/// GET /health - Liveness + a real ping no MongoDB
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health_check(db: web::Data<MongoDB>) -> impl Responder {
    let database = match db.database().run_command(doc! { "ping": 1 }).await {
        Ok(_) => "connected".to_string(),
        Err(e) => {
            log::warn!("⚠️ Health check ping failed: {}", e);
            "unreachable".to_string()
        }
    };

    let status = if database == "connected" { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        service: "mortgage-sync-service".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database,
        timestamp: chrono::Utc::now().timestamp(),
    })
}
