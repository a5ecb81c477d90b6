use actix_web::{web, HttpResponse, Responder, ResponseError};
use serde::Deserialize;

use crate::{
    database::MongoDB,
    services::{application_service, participant_registry},
};

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ReconcileRequest {
    pub co_applicants: Vec<participant_registry::PersonFields>,
}

/// PUT /api/v1/applications/{id}/co-applicants - Reconcilia a lista inteira
/// de co-applicants contra o estado armazenado (upsert + remoção de órfãos)
#[utoipa::path(
    put,
    path = "/api/v1/applications/{id}/co-applicants",
    tag = "Co-applicants",
    request_body = ReconcileRequest,
    responses(
        (status = 200, description = "Reconciled participant set"),
        (status = 404, description = "Application not found")
    )
)]
pub async fn reconcile_co_applicants(
    db: web::Data<MongoDB>,
    application_id: web::Path<String>,
    request: web::Json<ReconcileRequest>,
) -> impl Responder {
    log::info!(
        "🔄 PUT /applications/{}/co-applicants ({} entries)",
        application_id,
        request.co_applicants.len()
    );

    match participant_registry::reconcile_co_applicants(&db, &application_id, &request.co_applicants)
        .await
    {
        Ok(participants) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "count": participants.len(),
        })),
        Err(e) => {
            log::error!("❌ Error reconciling co-applicants: {}", e);
            e.error_response()
        }
    }
}

/// DELETE /api/v1/applications/{id}/co-applicants/{index} - Remove um
/// co-applicant pelo índice do cliente e fecha o gap de orders
pub async fn delete_co_applicant(
    db: web::Data<MongoDB>,
    path: web::Path<(String, i32)>,
) -> impl Responder {
    let (application_id, index) = path.into_inner();
    let order = index + 2;

    log::info!("🗑️  DELETE /applications/{}/co-applicants/{}", application_id, index);

    match participant_registry::remove_co_applicant(&db, &application_id, order).await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({ "success": true })),
        Err(e) => {
            log::error!("❌ Error removing co-applicant: {}", e);
            e.error_response()
        }
    }
}

/// POST /api/v1/applications/{id}/co-applicants/{index}/steps/{n} - Salva o
/// step 3 ou 4 de um co-applicant específico
#[utoipa::path(
    post,
    path = "/api/v1/applications/{id}/co-applicants/{index}/steps/{step}",
    tag = "Co-applicants",
    request_body = application_service::CommitStepRequest,
    responses(
        (status = 200, description = "Step committed", body = application_service::CommitStepResponse),
        (status = 400, description = "Step not role-scoped"),
        (status = 404, description = "No co-applicant at that index")
    )
)]
pub async fn save_co_applicant_step(
    db: web::Data<MongoDB>,
    path: web::Path<(String, i32, i32)>,
    request: web::Json<application_service::CommitStepRequest>,
) -> impl Responder {
    let (application_id, index, step_number) = path.into_inner();

    log::info!(
        "📝 POST /applications/{}/co-applicants/{}/steps/{}",
        application_id,
        index,
        step_number
    );

    match application_service::commit_co_applicant_step(
        &db,
        &application_id,
        index,
        step_number,
        &request,
    )
    .await
    {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(e) => {
            log::error!(
                "❌ Co-applicant step {} failed for application {}: {}",
                step_number,
                application_id,
                e
            );
            e.error_response()
        }
    }
}
