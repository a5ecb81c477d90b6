use actix_web::{web, HttpResponse, Responder, ResponseError};
use serde::{Deserialize, Serialize};

use crate::{database::MongoDB, services::application_service, utils::error::AppError};

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ContinuationRequest {
    pub email: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RedeemRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ContinuationResponse {
    pub success: bool,
    pub message: String,
}

/// POST /api/v1/continuation/request - Resposta idêntica exista ou não uma
/// application para o email (resistente a enumeração)
#[utoipa::path(
    post,
    path = "/api/v1/continuation/request",
    tag = "Continuation",
    request_body = ContinuationRequest,
    responses(
        (status = 200, description = "Same shape whether or not a match exists", body = ContinuationResponse)
    )
)]
pub async fn request_continuation(
    db: web::Data<MongoDB>,
    request: web::Json<ContinuationRequest>,
) -> impl Responder {
    match application_service::request_continuation(&db, &request.email).await {
        Ok(()) => HttpResponse::Ok().json(ContinuationResponse {
            success: true,
            message: "If an application exists for this email, a verification code has been sent."
                .to_string(),
        }),
        Err(e @ AppError::ValidationError(_)) => e.error_response(),
        Err(e) => {
            log::error!("❌ Continuation request failed: {}", e);
            e.error_response()
        }
    }
}

/// POST /api/v1/continuation/redeem - Troca um código válido pelo
/// application_id; o código é single-use
#[utoipa::path(
    post,
    path = "/api/v1/continuation/redeem",
    tag = "Continuation",
    request_body = RedeemRequest,
    responses(
        (status = 200, description = "Code redeemed"),
        (status = 400, description = "Invalid, used or expired code")
    )
)]
pub async fn redeem_code(
    db: web::Data<MongoDB>,
    request: web::Json<RedeemRequest>,
) -> impl Responder {
    match application_service::redeem_code(&db, &request.email, &request.code).await {
        Ok(application_id) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "application_id": application_id,
        })),
        Err(e) => {
            log::warn!("⚠️ Code redemption rejected: {}", e);
            e.error_response()
        }
    }
}
