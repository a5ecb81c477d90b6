use actix_web::{web, HttpResponse, Responder, ResponseError};
use serde::Deserialize;

use crate::{database::MongoDB, services::token_vault};

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: String,
}

/// GET /api/v1/oauth/authorize - Gera a URL de autorização do CRM com state
/// para CSRF
pub async fn authorize() -> impl Responder {
    match token_vault::authorize_url() {
        Ok((auth_url, state)) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "auth_url": auth_url,
            "state": state,
        })),
        Err(e) => {
            log::error!("❌ Could not build authorize URL: {}", e);
            e.error_response()
        }
    }
}

/// GET /api/v1/oauth/callback - Troca o authorization code por tokens e
/// persiste a credencial (upsert por account id)
pub async fn callback(db: web::Data<MongoDB>, query: web::Query<CallbackQuery>) -> impl Responder {
    log::info!("🔑 GET /oauth/callback - exchanging authorization code");

    match token_vault::exchange_authorization_code(&db, &query.code).await {
        Ok(account_id) => {
            log::info!("✅ Credential stored for account {}", account_id);
            HttpResponse::Ok().json(serde_json::json!({
                "success": true,
                "account_id": account_id,
            }))
        }
        Err(e) => {
            log::error!("❌ Authorization code exchange failed: {}", e);
            e.error_response()
        }
    }
}
