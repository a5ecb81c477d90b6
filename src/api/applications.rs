use actix_web::{web, HttpResponse, Responder, ResponseError};
use serde::Deserialize;

use crate::{
    database::MongoDB,
    services::{application_service, co_applicant_records},
    utils::error::AppError,
};

/// POST /api/v1/applications - Cria uma application em draft no step 1
#[utoipa::path(
    post,
    path = "/api/v1/applications",
    tag = "Applications",
    responses(
        (status = 200, description = "Draft application created", body = application_service::StartApplicationResponse)
    )
)]
pub async fn create_application(db: web::Data<MongoDB>) -> impl Responder {
    match application_service::start_application(&db).await {
        Ok(response) => {
            log::info!("✅ Application created: {}", response.application_id);
            HttpResponse::Ok().json(response)
        }
        Err(e) => {
            log::error!("❌ Error creating application: {}", e);
            e.error_response()
        }
    }
}

/// GET /api/v1/applications/{id} - Reconstrói o view model completo
#[utoipa::path(
    get,
    path = "/api/v1/applications/{id}",
    tag = "Applications",
    responses(
        (status = 200, description = "Application view model", body = application_service::ApplicationView),
        (status = 404, description = "Application not found")
    )
)]
pub async fn get_application(
    db: web::Data<MongoDB>,
    application_id: web::Path<String>,
) -> impl Responder {
    match application_service::load_application(&db, &application_id).await {
        Ok(view) => HttpResponse::Ok().json(view),
        Err(e) => {
            log::error!("❌ Error loading application {}: {}", application_id, e);
            e.error_response()
        }
    }
}

/// PATCH /api/v1/applications/{id} - Atualiza metadata (loan, property)
pub async fn patch_application(
    db: web::Data<MongoDB>,
    application_id: web::Path<String>,
    request: web::Json<application_service::PatchApplicationRequest>,
) -> impl Responder {
    match application_service::patch_application(&db, &application_id, &request).await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({ "success": true })),
        Err(e) => {
            log::error!("❌ Error patching application {}: {}", application_id, e);
            e.error_response()
        }
    }
}

/// POST /api/v1/applications/{id}/steps/{n} - Commita um step do applicant
/// principal. Falha de storage não avança o step; falha de CRM vira warning.
#[utoipa::path(
    post,
    path = "/api/v1/applications/{id}/steps/{step}",
    tag = "Applications",
    request_body = application_service::CommitStepRequest,
    responses(
        (status = 200, description = "Step committed", body = application_service::CommitStepResponse),
        (status = 400, description = "Invalid step or payload"),
        (status = 404, description = "Application not found")
    )
)]
pub async fn save_step(
    db: web::Data<MongoDB>,
    path: web::Path<(String, i32)>,
    request: web::Json<application_service::CommitStepRequest>,
) -> impl Responder {
    let (application_id, step_number) = path.into_inner();

    log::info!("📝 POST /applications/{}/steps/{}", application_id, step_number);

    match application_service::commit_step(&db, &application_id, step_number, &request).await {
        Ok(response) => {
            if let Some(warning) = &response.sync_warning {
                log::warn!("⚠️ Step {} committed with sync warning: {}", step_number, warning);
            }
            HttpResponse::Ok().json(response)
        }
        Err(e) => {
            log::error!(
                "❌ Step {} commit failed for application {}: {}",
                step_number,
                application_id,
                e
            );
            e.error_response()
        }
    }
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct SubmitRequest {
    pub owner_contact_id: String,
}

/// POST /api/v1/applications/{id}/submit - Submissão final: cria os
/// registros CRM dos co-applicants a partir do estado durável. Sucesso
/// parcial é um estado terminal válido.
#[utoipa::path(
    post,
    path = "/api/v1/applications/{id}/submit",
    tag = "Applications",
    request_body = SubmitRequest,
    responses(
        (status = 200, description = "Per-item creation results", body = co_applicant_records::CoApplicantRecordsResult),
        (status = 404, description = "Application not found")
    )
)]
pub async fn submit_application(
    db: web::Data<MongoDB>,
    application_id: web::Path<String>,
    request: web::Json<SubmitRequest>,
) -> impl Responder {
    log::info!("🏁 POST /applications/{}/submit", application_id);

    // Final commit of the review step, then the CRM fan-out from durable state
    let commit = application_service::commit_step(
        &db,
        &application_id,
        crate::models::LAST_STEP,
        &application_service::CommitStepRequest::default(),
    )
    .await;

    if let Err(e) = commit {
        // Already-completed applications may still retry the fan-out
        if !matches!(e, AppError::ValidationError(_)) {
            log::error!("❌ Final commit failed for application {}: {}", application_id, e);
            return e.error_response();
        }
    }

    // Best-effort: create the CRM opportunity once (retries reuse the
    // recorded id). Its failure never blocks the fan-out below.
    if let Err(e) =
        application_service::ensure_opportunity(&db, &application_id, &request.owner_contact_id)
            .await
    {
        log::warn!("⚠️ Opportunity creation failed for {}: {}", application_id, e);
    }

    match co_applicant_records::create_co_applicant_external_records(
        &db,
        &application_id,
        &request.owner_contact_id,
    )
    .await
    {
        Ok(result) => {
            log::info!(
                "🏁 Submission of {}: created={}, skipped={}, errors={}",
                application_id,
                result.created,
                result.skipped,
                result.errors.len()
            );
            HttpResponse::Ok().json(result)
        }
        Err(e) => {
            log::error!("❌ Submission failed for application {}: {}", application_id, e);
            e.error_response()
        }
    }
}
