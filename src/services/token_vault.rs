// ==================== TOKEN VAULT ====================
// Owns the CRM OAuth credential pair per external account id. Tokens are
// refreshed transactionally before use; a failed refresh never overwrites
// the stored credential. Concurrent refreshes for the same account are
// single-flighted so a rotating refresh token is consumed exactly once.

use crate::{database::MongoDB, models::OauthToken, utils::error::AppError};
use chrono::Utc;
use mongodb::bson::{doc, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::sync::Arc;

/// Refresh when the credential has less than this many seconds left.
pub const REFRESH_BUFFER_SECS: i64 = 5 * 60;

lazy_static::lazy_static! {
    // Per-account single-flight guards. The outer std Mutex only protects
    // the map; the inner tokio Mutex is held across the whole re-check +
    // refresh sequence.
    static ref REFRESH_GUARDS: std::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>> =
        std::sync::Mutex::new(HashMap::new());
}

fn refresh_guard(account_id: &str) -> Arc<tokio::sync::Mutex<()>> {
    let mut guards = REFRESH_GUARDS.lock().unwrap_or_else(|e| e.into_inner());
    guards
        .entry(account_id.to_string())
        .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
        .clone()
}

fn token_url() -> String {
    env::var("CRM_TOKEN_URL")
        .unwrap_or_else(|_| "https://services.leadconnectorhq.com/oauth/token".to_string())
}

fn client_credentials() -> Result<(String, String), AppError> {
    let client_id = env::var("CRM_CLIENT_ID")
        .map_err(|_| AppError::CredentialMissing("CRM_CLIENT_ID not configured".to_string()))?;
    let client_secret = env::var("CRM_CLIENT_SECRET")
        .map_err(|_| AppError::CredentialMissing("CRM_CLIENT_SECRET not configured".to_string()))?;
    Ok((client_id, client_secret))
}

/// Token endpoint response (both grant types).
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenEndpointResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    #[serde(rename = "locationId", default)]
    pub location_id: Option<String>,
}

/// True when the credential is inside the refresh window.
pub fn needs_refresh(expires_at: i64, now: i64) -> bool {
    expires_at - now < REFRESH_BUFFER_SECS
}

/// Returns a usable access token for the account, refreshing first whenever
/// the stored expiry falls inside the 5-minute buffer.
pub async fn get_valid_token(db: &MongoDB, account_id: &str) -> Result<String, AppError> {
    let collection = db.collection::<OauthToken>("oauth_tokens");

    let stored = collection
        .find_one(doc! { "account_id": account_id })
        .await?
        .ok_or_else(|| {
            AppError::CredentialMissing(format!("No stored credential for account {}", account_id))
        })?;

    if !needs_refresh(stored.expires_at, Utc::now().timestamp()) {
        return Ok(stored.access_token);
    }

    // Single-flight: the first caller refreshes, later callers re-read the
    // rotated credential instead of consuming the refresh token again.
    let guard = refresh_guard(account_id);
    let _held = guard.lock().await;

    let current = collection
        .find_one(doc! { "account_id": account_id })
        .await?
        .ok_or_else(|| {
            AppError::CredentialMissing(format!("No stored credential for account {}", account_id))
        })?;

    if !needs_refresh(current.expires_at, Utc::now().timestamp()) {
        log::debug!("🔑 Refresh already done by a concurrent caller for {}", account_id);
        return Ok(current.access_token);
    }

    refresh_token(db, account_id, &current.refresh_token).await
}

/// Exchanges the refresh token at the token endpoint. On success the new
/// access token, new expiry and the rotated refresh token (when one is
/// issued) are persisted; on failure the stored credential is left intact.
pub async fn refresh_token(
    db: &MongoDB,
    account_id: &str,
    refresh_token: &str,
) -> Result<String, AppError> {
    let (client_id, client_secret) = client_credentials()?;

    log::info!("🔄 Refreshing access token for account {}", account_id);

    let client = reqwest::Client::new();
    let response = client
        .post(token_url())
        .form(&[
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .send()
        .await
        .map_err(|e| AppError::RefreshFailed(format!("Token endpoint unreachable: {}", e)))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::RefreshFailed(format!(
            "Token endpoint returned {}: {}",
            status, body
        )));
    }

    let tokens: TokenEndpointResponse = response
        .json()
        .await
        .map_err(|e| AppError::RefreshFailed(format!("Invalid token response: {}", e)))?;

    let expires_at = Utc::now().timestamp() + tokens.expires_in;
    let now = BsonDateTime::now();

    // Keep the old refresh token unless the provider rotated it
    let new_refresh = tokens
        .refresh_token
        .clone()
        .unwrap_or_else(|| refresh_token.to_string());

    let collection = db.collection::<OauthToken>("oauth_tokens");
    collection
        .update_one(
            doc! { "account_id": account_id },
            doc! { "$set": {
                "access_token": &tokens.access_token,
                "refresh_token": &new_refresh,
                "expires_at": expires_at,
                "updated_at": now,
            } },
        )
        .await?;

    log::info!("✅ Token refreshed for account {} (expires_at={})", account_id, expires_at);

    Ok(tokens.access_token)
}

/// Idempotent upsert keyed by account id, called once after the
/// authorization-code exchange.
pub async fn save_initial(
    db: &MongoDB,
    account_id: &str,
    access_token: &str,
    refresh_token: &str,
    expires_in: i64,
) -> Result<(), AppError> {
    let expires_at = Utc::now().timestamp() + expires_in;
    let now = BsonDateTime::now();

    let collection = db.collection::<OauthToken>("oauth_tokens");
    collection
        .update_one(
            doc! { "account_id": account_id },
            doc! {
                "$set": {
                    "access_token": access_token,
                    "refresh_token": refresh_token,
                    "expires_at": expires_at,
                    "updated_at": now,
                },
                "$setOnInsert": {
                    "account_id": account_id,
                    "created_at": now,
                }
            },
        )
        .upsert(true)
        .await?;

    log::info!("💾 Stored initial credential for account {}", account_id);

    Ok(())
}

/// Builds the provider authorization redirect URL with a fresh CSRF state.
pub fn authorize_url() -> Result<(String, String), AppError> {
    let (client_id, _) = client_credentials()?;
    let redirect_uri = env::var("CRM_REDIRECT_URI")
        .unwrap_or_else(|_| "http://localhost:3002/api/v1/oauth/callback".to_string());
    let authorize_base = env::var("CRM_AUTHORIZE_URL").unwrap_or_else(|_| {
        "https://marketplace.leadconnectorhq.com/oauth/chooselocation".to_string()
    });

    let state = uuid::Uuid::new_v4().to_string();

    let url = reqwest::Url::parse_with_params(
        &authorize_base,
        &[
            ("response_type", "code"),
            ("client_id", client_id.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("scope", "contacts.write opportunities.write conversations/message.write"),
            ("state", state.as_str()),
        ],
    )
    .map_err(|e| AppError::ValidationError(format!("Invalid authorize URL: {}", e)))?;

    Ok((url.to_string(), state))
}

/// Exchanges an authorization code and stores the resulting credential.
/// Returns the external account id the provider bound the grant to.
pub async fn exchange_authorization_code(db: &MongoDB, code: &str) -> Result<String, AppError> {
    let (client_id, client_secret) = client_credentials()?;
    let redirect_uri = env::var("CRM_REDIRECT_URI")
        .unwrap_or_else(|_| "http://localhost:3002/api/v1/oauth/callback".to_string());

    let client = reqwest::Client::new();
    let response = client
        .post(token_url())
        .form(&[
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri.as_str()),
        ])
        .send()
        .await
        .map_err(|e| AppError::ExternalApiError(format!("Failed to exchange code: {}", e)))?;

    if !response.status().is_success() {
        return Err(AppError::ExternalApiError(format!(
            "Authorization code exchange returned {}",
            response.status()
        )));
    }

    let tokens: TokenEndpointResponse = response
        .json()
        .await
        .map_err(|e| AppError::ExternalApiError(format!("Invalid token response: {}", e)))?;

    let account_id = tokens
        .location_id
        .clone()
        .ok_or_else(|| AppError::ExternalApiError("No locationId in token response".to_string()))?;

    let refresh = tokens.refresh_token.as_deref().ok_or_else(|| {
        AppError::ExternalApiError("No refresh token in authorization response".to_string())
    })?;

    save_initial(db, &account_id, &tokens.access_token, refresh, tokens.expires_in).await?;

    Ok(account_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refreshes_inside_buffer() {
        let now = 1_700_000_000;
        assert!(needs_refresh(now + REFRESH_BUFFER_SECS - 1, now));
        assert!(needs_refresh(now, now));
        assert!(needs_refresh(now - 60, now)); // already expired
    }

    #[test]
    fn no_refresh_outside_buffer() {
        let now = 1_700_000_000;
        assert!(!needs_refresh(now + REFRESH_BUFFER_SECS, now));
        assert!(!needs_refresh(now + 3600, now));
    }

    #[test]
    fn guard_is_shared_per_account() {
        let a = refresh_guard("loc-1");
        let b = refresh_guard("loc-1");
        let c = refresh_guard("loc-2");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
