// ==================== CO-APPLICANT RECORD CREATOR ====================
// Runs once at final submission. Re-reads participants from durable storage
// (never from client memory, so stale identities can't leak in), aggregates
// each co-applicant's identity/address/employment slices into one CRM
// custom-object record, and submits them one at a time. Partial success is
// a valid terminal state: the result carries per-item reasons, not a single
// pass/fail flag. The external_record_links guard makes retries idempotent.

use crate::{
    database::MongoDB,
    models::{EmploymentDetail, ExternalRecordLink, Participant, Person, ROLE_CO_APPLICANT},
    services::{crm_service, participant_registry},
    utils::error::AppError,
};
use mongodb::bson::{doc, DateTime as BsonDateTime};
use serde::Serialize;
use serde_json::{json, Map, Value};

const CO_APPLICANT_OBJECT_KEY: &str = "co_applicant";

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CoApplicantRecordsResult {
    pub success: bool,
    pub created: u32,
    pub skipped: u32,
    pub errors: Vec<String>,
}

/// Client-facing position of a co-applicant: order 2 is co-applicant 1.
fn item_error_line(order: i32, reason: &str) -> String {
    format!("Co-applicant {}: {}", order - 1, reason)
}

fn finalize(created: u32, skipped: u32, errors: Vec<String>) -> CoApplicantRecordsResult {
    CoApplicantRecordsResult {
        success: errors.is_empty(),
        created,
        skipped,
        errors,
    }
}

/// Aggregates one co-applicant's stored slices into the CRM record
/// properties, omitting anything never collected.
fn record_properties(
    participant: &Participant,
    person: &Person,
    employment: Option<&EmploymentDetail>,
) -> Map<String, Value> {
    let mut properties = Map::new();

    properties.insert("first_name".to_string(), json!(person.first_name));
    properties.insert("last_name".to_string(), json!(person.last_name));
    properties.insert("email".to_string(), json!(person.email));
    if let Some(phone) = &person.phone {
        properties.insert("phone".to_string(), json!(phone));
    }
    if let Some(dob) = &person.date_of_birth {
        properties.insert("date_of_birth".to_string(), json!(dob));
    }

    if let Some(line1) = &participant.address_line1 {
        properties.insert("address".to_string(), json!(line1));
    }
    if let Some(city) = &participant.city {
        properties.insert("city".to_string(), json!(city));
    }
    if let Some(postal) = &participant.postal_code {
        properties.insert("postal_code".to_string(), json!(postal));
    }

    if let Some(status) = &participant.employment_status {
        properties.insert("employment_status".to_string(), json!(status));
    }
    if let Some(detail) = employment {
        if let Some(employer) = &detail.employer_name {
            properties.insert("employer".to_string(), json!(employer));
        }
        if let Some(income) = detail.annual_income {
            properties.insert(
                "annual_income".to_string(),
                crm_service::currency_property(income),
            );
        }
    }

    properties
}

/// Creates one CRM record per co-applicant of the application, skipping
/// participants whose record already exists. Returns explicit per-item
/// counts and reasons; a failed item never escalates into total failure.
pub async fn create_co_applicant_external_records(
    db: &MongoDB,
    application_id: &str,
    owner_contact_id: &str,
) -> Result<CoApplicantRecordsResult, AppError> {
    let participants = participant_registry::list_participants(db, application_id).await?;
    let co_applicants: Vec<&Participant> = participants
        .iter()
        .filter(|p| p.role == ROLE_CO_APPLICANT)
        .collect();

    log::info!(
        "📤 Creating CRM records for {} co-applicant(s) of application {}",
        co_applicants.len(),
        application_id
    );

    let links = db.collection::<ExternalRecordLink>("external_record_links");
    let people = db.collection::<Person>("people");
    let employment_details = db.collection::<EmploymentDetail>("employment_details");

    let mut created = 0u32;
    let mut skipped = 0u32;
    let mut errors = Vec::new();

    for participant in co_applicants {
        // Idempotent retry: a stored link means the record already exists
        let existing = links
            .find_one(doc! { "participant_id": &participant.participant_id })
            .await?;
        if let Some(link) = existing {
            log::info!(
                "⏭️  Co-applicant {} already has CRM record {}, skipping",
                participant.order - 1,
                link.external_record_id
            );
            skipped += 1;
            continue;
        }

        let person = match people
            .find_one(doc! { "person_id": &participant.person_id })
            .await?
        {
            Some(p) => p,
            None => {
                errors.push(item_error_line(participant.order, "person record missing"));
                continue;
            }
        };

        let employment = employment_details
            .find_one(doc! { "participant_id": &participant.participant_id })
            .await?;

        let properties = record_properties(participant, &person, employment.as_ref());

        match crm_service::create_custom_object_record(
            db,
            CO_APPLICANT_OBJECT_KEY,
            owner_contact_id,
            &properties,
        )
        .await
        {
            Ok(record_id) => {
                links
                    .insert_one(ExternalRecordLink {
                        _id: None,
                        participant_id: participant.participant_id.clone(),
                        external_record_id: record_id.clone(),
                        created_at: Some(BsonDateTime::now()),
                    })
                    .await?;
                log::info!(
                    "✅ Created CRM record {} for co-applicant {}",
                    record_id,
                    participant.order - 1
                );
                created += 1;
            }
            Err(e) => {
                log::warn!(
                    "⚠️ CRM record creation failed for co-applicant {}: {}",
                    participant.order - 1,
                    e
                );
                errors.push(item_error_line(participant.order, &e.to_string()));
            }
        }
    }

    Ok(finalize(created, skipped, errors))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant_at(order: i32) -> Participant {
        Participant {
            _id: None,
            participant_id: format!("p-{}", order),
            application_id: "app-1".to_string(),
            person_id: format!("person-{}", order),
            role: ROLE_CO_APPLICANT.to_string(),
            order,
            address_line1: Some("4 Mill Lane".to_string()),
            address_line2: None,
            city: None,
            postal_code: None,
            country: None,
            homeowner_status: None,
            employment_status: Some("employed".to_string()),
            tax_country: None,
            other_assets: None,
            created_at: None,
            updated_at: None,
        }
    }

    fn person() -> Person {
        Person {
            _id: None,
            person_id: "person-2".to_string(),
            email: "co@x.com".to_string(),
            first_name: "Ana".to_string(),
            last_name: "Reis".to_string(),
            date_of_birth: None,
            phone: None,
            nationality: None,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn error_lines_use_client_facing_position() {
        // order 3 is the second co-applicant the client sees
        assert_eq!(
            item_error_line(3, "External API error: 422"),
            "Co-applicant 2: External API error: 422"
        );
    }

    #[test]
    fn partial_success_is_not_total_failure() {
        let result = finalize(1, 0, vec![item_error_line(3, "rejected")]);
        assert!(!result.success);
        assert_eq!(result.created, 1);
        assert_eq!(result.errors, vec!["Co-applicant 2: rejected"]);
    }

    #[test]
    fn all_created_reports_success() {
        let result = finalize(2, 1, Vec::new());
        assert!(result.success);
        assert_eq!(result.created, 2);
        assert_eq!(result.skipped, 1);
    }

    #[test]
    fn properties_omit_missing_slices() {
        let participant = participant_at(2);
        let properties = record_properties(&participant, &person(), None);
        assert_eq!(properties.get("first_name"), Some(&json!("Ana")));
        assert_eq!(properties.get("address"), Some(&json!("4 Mill Lane")));
        assert_eq!(properties.get("employment_status"), Some(&json!("employed")));
        assert!(!properties.contains_key("phone"));
        assert!(!properties.contains_key("employer"));
        assert!(!properties.contains_key("annual_income"));
    }

    #[test]
    fn income_uses_currency_shape() {
        let participant = participant_at(2);
        let detail = EmploymentDetail {
            _id: None,
            participant_id: "p-2".to_string(),
            employer_name: Some("Acme".to_string()),
            job_title: None,
            annual_income: Some(52000.0),
            years_employed: None,
            self_employed: false,
            business_name: None,
            created_at: None,
        };
        let properties = record_properties(&participant, &person(), Some(&detail));
        assert_eq!(properties["annual_income"]["currency"], "default");
        assert_eq!(properties["annual_income"]["value"], 52000.0);
    }
}
