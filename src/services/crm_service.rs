// ==================== CRM SERVICE ====================
// External record mapper + thin client for the CRM contact/opportunity/
// custom-object APIs. Every push here is best-effort: failures come back as
// warnings, never as errors, because the durable write already succeeded by
// the time a sync runs. The pipeline-stage lookup is cached with a TTL so a
// stale catalogue refreshes itself without a restart.

use crate::{database::MongoDB, services::token_vault, utils::error::AppError};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::env;
use std::sync::RwLock;
use std::time::{Duration, Instant};

const API_VERSION: &str = "2021-07-28";

/// Pipeline-stage lookups are re-fetched after this long.
const STAGE_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

lazy_static::lazy_static! {
    static ref STAGE_CACHE: RwLock<HashMap<String, (String, Instant)>> =
        RwLock::new(HashMap::new());
}

pub fn api_base() -> String {
    env::var("CRM_API_BASE")
        .unwrap_or_else(|_| "https://services.leadconnectorhq.com".to_string())
}

pub fn location_id() -> Result<String, AppError> {
    env::var("CRM_LOCATION_ID")
        .map_err(|_| AppError::CredentialMissing("CRM_LOCATION_ID not configured".to_string()))
}

/// Internal field name → CRM contact field name, per step. Anything not in
/// the table stays local-only.
fn field_mapping(step_number: i32) -> &'static [(&'static str, &'static str)] {
    match step_number {
        1 | 2 => &[
            ("first_name", "firstName"),
            ("last_name", "lastName"),
            ("email", "email"),
            ("phone", "phone"),
            ("date_of_birth", "dateOfBirth"),
        ],
        3 => &[
            ("address_line1", "address1"),
            ("city", "city"),
            ("postal_code", "postalCode"),
            ("country", "country"),
            ("homeowner_status", "homeownerStatus"),
        ],
        4 => &[
            ("employment_status", "employmentStatus"),
            ("employer_name", "employerName"),
            ("annual_income", "annualIncome"),
        ],
        5 => &[
            ("other_assets", "otherAssets"),
            ("rental_property_count", "rentalPropertyCount"),
        ],
        _ => &[("loan_amount", "loanAmount"), ("property_value", "propertyValue")],
    }
}

/// Pure projection of a step payload onto CRM field names. Fields absent
/// from the input (missing, null, or empty string) are omitted rather than
/// sent as empty values.
pub fn map_step_to_external_fields(step_number: i32, data: &Value) -> Map<String, Value> {
    let mut fields = Map::new();
    let Some(object) = data.as_object() else {
        return fields;
    };

    for (internal, external) in field_mapping(step_number) {
        match object.get(*internal) {
            None | Some(Value::Null) => continue,
            Some(Value::String(s)) if s.is_empty() => continue,
            Some(value) => {
                fields.insert((*external).to_string(), value.clone());
            }
        }
    }

    fields
}

/// Monetary property in the CRM custom-object shape.
pub fn currency_property(value: f64) -> Value {
    json!({ "currency": "default", "value": value })
}

async fn bearer(db: &MongoDB) -> Result<String, AppError> {
    let account = location_id()?;
    token_vault::get_valid_token(db, &account).await
}

/// Creates or updates the CRM contact for the given fields, returning the
/// contact id. Used by the initial lead create and the co-applicant fan-out.
pub async fn upsert_contact(db: &MongoDB, fields: &Map<String, Value>) -> Result<String, AppError> {
    let token = bearer(db).await?;
    let mut payload = fields.clone();
    payload.insert("locationId".to_string(), json!(location_id()?));
    payload.insert("tags".to_string(), json!(["mortgage-application"]));

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/contacts/upsert", api_base()))
        .bearer_auth(&token)
        .header("Version", API_VERSION)
        .json(&Value::Object(payload))
        .send()
        .await
        .map_err(|e| AppError::ExternalApiError(format!("Contact upsert failed: {}", e)))?;

    if !response.status().is_success() {
        return Err(AppError::ExternalApiError(format!(
            "Contact upsert returned {}",
            response.status()
        )));
    }

    let body: Value = response
        .json()
        .await
        .map_err(|e| AppError::ExternalApiError(format!("Invalid contact response: {}", e)))?;

    body["contact"]["id"]
        .as_str()
        .or_else(|| body["id"].as_str())
        .map(String::from)
        .ok_or_else(|| AppError::ExternalApiError("No contact id in response".to_string()))
}

/// Updates the contact's fields for one committed step.
async fn update_contact(
    db: &MongoDB,
    contact_id: &str,
    fields: &Map<String, Value>,
) -> Result<(), AppError> {
    let token = bearer(db).await?;

    let client = reqwest::Client::new();
    let response = client
        .put(format!("{}/contacts/{}", api_base(), contact_id))
        .bearer_auth(&token)
        .header("Version", API_VERSION)
        .json(&Value::Object(fields.clone()))
        .send()
        .await
        .map_err(|e| AppError::ExternalApiError(format!("Contact update failed: {}", e)))?;

    if !response.status().is_success() {
        return Err(AppError::ExternalApiError(format!(
            "Contact update returned {}",
            response.status()
        )));
    }

    Ok(())
}

/// Resolves a pipeline stage id by name, going to the CRM only when the
/// cached value is missing or older than the TTL.
pub async fn pipeline_stage_id(
    db: &MongoDB,
    pipeline_id: &str,
    stage_name: &str,
) -> Result<String, AppError> {
    let cache_key = format!("{}:{}", pipeline_id, stage_name);

    if let Ok(cache) = STAGE_CACHE.read() {
        if let Some((stage_id, fetched_at)) = cache.get(&cache_key) {
            if fetched_at.elapsed() < STAGE_CACHE_TTL {
                return Ok(stage_id.clone());
            }
        }
    }

    let token = bearer(db).await?;
    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/opportunities/pipelines", api_base()))
        .bearer_auth(&token)
        .header("Version", API_VERSION)
        .query(&[("locationId", location_id()?)])
        .send()
        .await
        .map_err(|e| AppError::ExternalApiError(format!("Pipeline lookup failed: {}", e)))?;

    if !response.status().is_success() {
        return Err(AppError::ExternalApiError(format!(
            "Pipeline lookup returned {}",
            response.status()
        )));
    }

    let body: Value = response
        .json()
        .await
        .map_err(|e| AppError::ExternalApiError(format!("Invalid pipeline response: {}", e)))?;

    let stage_id = body["pipelines"]
        .as_array()
        .into_iter()
        .flatten()
        .filter(|p| p["id"].as_str() == Some(pipeline_id))
        .flat_map(|p| p["stages"].as_array().into_iter().flatten())
        .find(|s| s["name"].as_str() == Some(stage_name))
        .and_then(|s| s["id"].as_str())
        .map(String::from)
        .ok_or_else(|| {
            AppError::ExternalApiError(format!(
                "Stage '{}' not found in pipeline {}",
                stage_name, pipeline_id
            ))
        })?;

    if let Ok(mut cache) = STAGE_CACHE.write() {
        cache.insert(cache_key, (stage_id.clone(), Instant::now()));
    }

    Ok(stage_id)
}

/// Creates the opportunity marking this application in the CRM pipeline,
/// resolving the stage id through the TTL cache. Returns the opportunity id.
pub async fn create_opportunity(
    db: &MongoDB,
    contact_id: &str,
    name: &str,
    monetary_value: Option<f64>,
) -> Result<String, AppError> {
    let pipeline_id = env::var("CRM_PIPELINE_ID")
        .map_err(|_| AppError::CredentialMissing("CRM_PIPELINE_ID not configured".to_string()))?;
    let stage_name = env::var("CRM_PIPELINE_STAGE")
        .unwrap_or_else(|_| "Application Submitted".to_string());

    let stage_id = pipeline_stage_id(db, &pipeline_id, &stage_name).await?;
    let token = bearer(db).await?;

    let mut payload = json!({
        "name": name,
        "locationId": location_id()?,
        "pipelineId": pipeline_id,
        "pipelineStageId": stage_id,
        "status": "open",
        "contactId": contact_id,
    });
    if let Some(value) = monetary_value {
        payload["monetaryValue"] = json!(value);
    }

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/opportunities/", api_base()))
        .bearer_auth(&token)
        .header("Version", API_VERSION)
        .json(&payload)
        .send()
        .await
        .map_err(|e| AppError::ExternalApiError(format!("Opportunity create failed: {}", e)))?;

    if !response.status().is_success() {
        return Err(AppError::ExternalApiError(format!(
            "Opportunity create returned {}",
            response.status()
        )));
    }

    let body: Value = response
        .json()
        .await
        .map_err(|e| AppError::ExternalApiError(format!("Invalid opportunity response: {}", e)))?;

    body["opportunity"]["id"]
        .as_str()
        .or_else(|| body["id"].as_str())
        .map(String::from)
        .ok_or_else(|| AppError::ExternalApiError("No opportunity id in response".to_string()))
}

/// Best-effort push of one committed step to the CRM. Any failure (network
/// or API-level) is logged and returned as a warning string; it never aborts
/// the durable commit that already succeeded.
pub async fn sync_step(
    db: &MongoDB,
    external_contact_id: &str,
    step_number: i32,
    data: &Value,
) -> Option<String> {
    let fields = map_step_to_external_fields(step_number, data);
    if fields.is_empty() {
        return None;
    }

    match update_contact(db, external_contact_id, &fields).await {
        Ok(()) => {
            log::info!(
                "📡 Synced step {} to CRM contact {}",
                step_number,
                external_contact_id
            );
            None
        }
        Err(e) => {
            log::warn!(
                "⚠️ CRM sync for step {} failed (saved locally, sync pending): {}",
                step_number,
                e
            );
            Some(format!("Saved locally, CRM sync pending: {}", e))
        }
    }
}

/// Creates a custom-object record in the CRM (used for co-applicant
/// records). Returns the created record id.
pub async fn create_custom_object_record(
    db: &MongoDB,
    object_key: &str,
    owner_contact_id: &str,
    properties: &Map<String, Value>,
) -> Result<String, AppError> {
    let token = bearer(db).await?;

    let payload = json!({
        "locationId": location_id()?,
        "owner": [owner_contact_id],
        "followers": [owner_contact_id],
        "properties": properties,
    });

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/objects/{}/records", api_base(), object_key))
        .bearer_auth(&token)
        .header("Version", API_VERSION)
        .json(&payload)
        .send()
        .await
        .map_err(|e| AppError::ExternalApiError(format!("Record create failed: {}", e)))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::ExternalApiError(format!(
            "Record create returned {}: {}",
            status, body
        )));
    }

    let body: Value = response
        .json()
        .await
        .map_err(|e| AppError::ExternalApiError(format!("Invalid record response: {}", e)))?;

    body["record"]["id"]
        .as_str()
        .or_else(|| body["id"].as_str())
        .map(String::from)
        .ok_or_else(|| AppError::ExternalApiError("No record id in response".to_string()))
}

/// Delivers the continuation verification code through the CRM messaging
/// API. Best-effort: a delivery failure is logged and swallowed so the
/// response shape never betrays whether a matching application exists.
pub async fn send_verification_message(db: &MongoDB, contact_id: &str, code: &str) -> Option<String> {
    let token = match bearer(db).await {
        Ok(t) => t,
        Err(e) => {
            log::warn!("⚠️ Cannot deliver verification code: {}", e);
            return Some(e.to_string());
        }
    };

    let payload = json!({
        "type": "Email",
        "contactId": contact_id,
        "subject": "Your application continuation code",
        "message": format!("Your verification code is {}. It expires in 15 minutes.", code),
    });

    let client = reqwest::Client::new();
    let result = client
        .post(format!("{}/conversations/messages", api_base()))
        .bearer_auth(&token)
        .header("Version", API_VERSION)
        .json(&payload)
        .send()
        .await;

    match result {
        Ok(response) if response.status().is_success() => {
            log::info!("📧 Verification code delivered to contact {}", contact_id);
            None
        }
        Ok(response) => {
            log::warn!("⚠️ Verification delivery returned {}", response.status());
            Some(format!("Delivery returned {}", response.status()))
        }
        Err(e) => {
            log::warn!("⚠️ Verification delivery failed: {}", e);
            Some(format!("Delivery failed: {}", e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_omits_absent_and_empty_fields() {
        let data = json!({
            "first_name": "Jane",
            "last_name": "Doe",
            "phone": "",
            "date_of_birth": null,
        });
        let fields = map_step_to_external_fields(1, &data);
        assert_eq!(fields.get("firstName"), Some(&json!("Jane")));
        assert_eq!(fields.get("lastName"), Some(&json!("Doe")));
        assert!(!fields.contains_key("phone"));
        assert!(!fields.contains_key("dateOfBirth"));
        assert!(!fields.contains_key("email"));
    }

    #[test]
    fn mapping_is_step_scoped() {
        let data = json!({ "first_name": "Jane", "employment_status": "employed" });
        let step1 = map_step_to_external_fields(1, &data);
        assert!(step1.contains_key("firstName"));
        assert!(!step1.contains_key("employmentStatus"));

        let step4 = map_step_to_external_fields(4, &data);
        assert!(step4.contains_key("employmentStatus"));
        assert!(!step4.contains_key("firstName"));
    }

    #[test]
    fn non_object_payload_maps_to_nothing() {
        assert!(map_step_to_external_fields(1, &json!("not an object")).is_empty());
        assert!(map_step_to_external_fields(3, &Value::Null).is_empty());
    }

    #[test]
    fn currency_property_shape() {
        let prop = currency_property(285000.0);
        assert_eq!(prop["currency"], "default");
        assert_eq!(prop["value"], 285000.0);
    }
}
