// ==================== APPLICATION STATE STORE ====================
// Step state machine over the draft application: commit_step delegates the
// identity and data writes to the registry/synchronizer, advances
// current_step only on success (and only forward), and attaches the CRM
// sync outcome as a non-fatal warning. load_application rebuilds the step
// view model from the relational slices, defaulting anything never filled.
// The continuation flow gates re-loading behind a single-use 15-minute
// verification code and answers identically whether or not a match exists.

use crate::{
    database::MongoDB,
    models::{
        Application, ChildDependent, EmploymentDetail, FinancialCommitment, Participant, Person,
        RentalProperty, VerificationCode, FIRST_STEP, LAST_STEP, PRIMARY_ORDER, ROLE_CO_APPLICANT,
        ROLE_PRIMARY, STATUS_COMPLETED, STATUS_DRAFT,
    },
    services::{
        crm_service,
        participant_registry::{self, PersonFields},
        participant_sync::{
            self, AddressFields, DependentInput, EmploymentDetailInput, FinancialCommitmentInput,
            RentalPropertyInput,
        },
    },
    utils::error::AppError,
};
use chrono::Utc;
use futures::stream::StreamExt;
use mongodb::bson::{doc, oid::ObjectId, DateTime as BsonDateTime};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Continuation codes expire after this many seconds.
pub const CODE_TTL_SECS: i64 = 15 * 60;
const CODE_LENGTH: usize = 6;
const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

// ==================== REQUEST/RESPONSE MODELS ====================

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct StartApplicationResponse {
    pub success: bool,
    pub application_id: String,
    pub current_step: i32,
}

/// One step's payload. Sections irrelevant to the committed step are
/// ignored; sections relevant but absent fall back to empty defaults.
#[derive(Debug, Deserialize, Clone, Default, utoipa::ToSchema)]
pub struct CommitStepRequest {
    #[serde(default)]
    pub primary: Option<PersonFields>,
    #[serde(default)]
    pub co_applicants: Option<Vec<PersonFields>>,
    #[serde(default)]
    pub address: Option<AddressFields>,
    #[serde(default)]
    pub dependents: Option<Vec<DependentInput>>,
    #[serde(default)]
    pub employment_status: Option<String>,
    #[serde(default)]
    pub employment_detail: Option<EmploymentDetailInput>,
    #[serde(default)]
    pub financial_commitment: Option<FinancialCommitmentInput>,
    #[serde(default)]
    pub rental_properties: Option<Vec<RentalPropertyInput>>,
    #[serde(default)]
    pub other_assets: Option<f64>,
    #[serde(default)]
    pub loan_amount: Option<f64>,
    #[serde(default)]
    pub property_value: Option<f64>,
    /// CRM contact to mirror this step to, when one exists.
    #[serde(default)]
    pub external_contact_id: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CommitStepResponse {
    pub success: bool,
    pub application_id: String,
    pub current_step: i32,
    pub written: Vec<String>,
    /// Contact id when this commit created the CRM lead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_contact_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_warning: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct PatchApplicationRequest {
    #[serde(default)]
    pub loan_amount: Option<f64>,
    #[serde(default)]
    pub property_value: Option<f64>,
}

// ==================== VIEW MODEL ====================

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct PersonView {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nationality: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ParticipantView {
    pub participant_id: String,
    pub role: String,
    pub order: i32,
    pub person: PersonView,
    pub address: AddressFields,
    pub dependents: Vec<DependentInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employment_status: Option<String>,
    pub employment_detail: EmploymentDetailInput,
    pub financial_commitment: FinancialCommitmentInput,
    pub rental_properties: Vec<RentalPropertyInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other_assets: Option<f64>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ApplicationView {
    pub application_id: String,
    pub status: String,
    pub current_step: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loan_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_value: Option<f64>,
    pub primary: Option<ParticipantView>,
    pub co_applicants: Vec<ParticipantView>,
}

// ==================== PURE HELPERS ====================

/// current_step only moves forward, capped at the last step.
pub fn advance_step(current: i32, committed: i32) -> i32 {
    current.max((committed + 1).min(LAST_STEP))
}

/// Flattens a step request into the flat field map the external mapper
/// consumes: sub-objects contribute their own keys at the top level.
pub fn flatten_for_sync(request: &CommitStepRequest) -> Value {
    let mut flat = Map::new();

    let mut merge = |value: Value| {
        if let Value::Object(object) = value {
            flat.extend(object);
        }
    };

    if let Some(primary) = &request.primary {
        merge(serde_json::to_value(primary).unwrap_or(Value::Null));
    }
    if let Some(address) = &request.address {
        merge(serde_json::to_value(address).unwrap_or(Value::Null));
    }
    if let Some(detail) = &request.employment_detail {
        merge(serde_json::to_value(detail).unwrap_or(Value::Null));
    }
    if let Some(status) = &request.employment_status {
        flat.insert("employment_status".to_string(), Value::String(status.clone()));
    }
    if let Some(assets) = request.other_assets {
        flat.insert("other_assets".to_string(), assets.into());
    }
    if let Some(rentals) = &request.rental_properties {
        flat.insert("rental_property_count".to_string(), rentals.len().into());
    }
    if let Some(amount) = request.loan_amount {
        flat.insert("loan_amount".to_string(), amount.into());
    }
    if let Some(value) = request.property_value {
        flat.insert("property_value".to_string(), value.into());
    }

    Value::Object(flat)
}

pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_CHARSET[rng.gen_range(0..CODE_CHARSET.len())] as char)
        .collect()
}

/// Validates a stored code against the submitted one: case-insensitive
/// match, must be unused and unexpired.
pub fn code_is_redeemable(stored: &VerificationCode, submitted: &str, now: i64) -> Result<(), AppError> {
    if !stored.code.eq_ignore_ascii_case(submitted.trim()) {
        return Err(AppError::ValidationError("Invalid verification code".to_string()));
    }
    if stored.used {
        return Err(AppError::ValidationError(
            "Verification code already used".to_string(),
        ));
    }
    if now >= stored.expires_at {
        return Err(AppError::ValidationError("Verification code expired".to_string()));
    }
    Ok(())
}

/// Picks the code to redeem from the stored set, ordered newest first.
/// Returns the index of the first redeemable one; otherwise the rejection
/// reported comes from the newest code that actually matched the submitted
/// value, so a stale duplicate never masks the real reason.
pub fn pick_redeemable(
    stored: &[VerificationCode],
    submitted: &str,
    now: i64,
) -> Result<usize, AppError> {
    let mut rejection: Option<AppError> = None;

    for (index, candidate) in stored.iter().enumerate() {
        match code_is_redeemable(candidate, submitted, now) {
            Ok(()) => return Ok(index),
            Err(e) => {
                if rejection.is_none() && candidate.code.eq_ignore_ascii_case(submitted.trim()) {
                    rejection = Some(e);
                }
            }
        }
    }

    Err(rejection
        .unwrap_or_else(|| AppError::ValidationError("Invalid verification code".to_string())))
}

// ==================== APPLICATION LIFECYCLE ====================

async fn load_application_row(db: &MongoDB, application_id: &str) -> Result<Application, AppError> {
    db.collection::<Application>("applications")
        .find_one(doc! { "application_id": application_id })
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Application {} not found", application_id)))
}

/// Creates a draft application at step 1.
pub async fn start_application(db: &MongoDB) -> Result<StartApplicationResponse, AppError> {
    let now = BsonDateTime::now();
    let application = Application {
        _id: None,
        application_id: ObjectId::new().to_hex(),
        status: STATUS_DRAFT.to_string(),
        current_step: FIRST_STEP,
        loan_amount: None,
        property_value: None,
        opportunity_id: None,
        created_at: Some(now),
        updated_at: Some(now),
    };

    db.collection::<Application>("applications")
        .insert_one(&application)
        .await?;

    log::info!("📄 Started application {}", application.application_id);

    Ok(StartApplicationResponse {
        success: true,
        application_id: application.application_id,
        current_step: FIRST_STEP,
    })
}

pub async fn patch_application(
    db: &MongoDB,
    application_id: &str,
    request: &PatchApplicationRequest,
) -> Result<(), AppError> {
    let mut update = doc! { "updated_at": BsonDateTime::now() };
    if let Some(amount) = request.loan_amount {
        update.insert("loan_amount", amount);
    }
    if let Some(value) = request.property_value {
        update.insert("property_value", value);
    }

    let updated = db
        .collection::<Application>("applications")
        .update_one(
            doc! { "application_id": application_id },
            doc! { "$set": update },
        )
        .await?;

    if updated.matched_count == 0 {
        return Err(AppError::NotFound(format!(
            "Application {} not found",
            application_id
        )));
    }

    Ok(())
}

/// Creates the CRM opportunity for a submitted application at most once.
/// The created id is stored on the application row, so a re-submission
/// (the partial-failure retry path) reuses it instead of minting a second
/// opportunity for the same contact.
pub async fn ensure_opportunity(
    db: &MongoDB,
    application_id: &str,
    contact_id: &str,
) -> Result<String, AppError> {
    let application = load_application_row(db, application_id).await?;
    if let Some(existing) = application.opportunity_id {
        log::info!(
            "📡 Opportunity {} already recorded for application {}",
            existing,
            application_id
        );
        return Ok(existing);
    }

    let opportunity_id = crm_service::create_opportunity(
        db,
        contact_id,
        &format!("Mortgage application {}", application_id),
        application.loan_amount,
    )
    .await?;

    db.collection::<Application>("applications")
        .update_one(
            doc! { "application_id": application_id },
            doc! { "$set": {
                "opportunity_id": &opportunity_id,
                "updated_at": BsonDateTime::now(),
            } },
        )
        .await?;

    log::info!(
        "📡 Created opportunity {} for application {}",
        opportunity_id,
        application_id
    );
    Ok(opportunity_id)
}

/// Commits one step for the primary participant: durable writes first, step
/// advance on success only, CRM mirror last and best-effort. A storage
/// failure surfaces as an error and leaves current_step untouched.
pub async fn commit_step(
    db: &MongoDB,
    application_id: &str,
    step_number: i32,
    request: &CommitStepRequest,
) -> Result<CommitStepResponse, AppError> {
    if !(FIRST_STEP..=LAST_STEP).contains(&step_number) {
        return Err(AppError::ValidationError(format!(
            "Step {} is out of range (1-6)",
            step_number
        )));
    }

    let application = load_application_row(db, application_id).await?;
    if application.status == STATUS_COMPLETED {
        return Err(AppError::ValidationError(
            "Application is already completed".to_string(),
        ));
    }

    let mut written = Vec::new();

    match step_number {
        1 | 2 => {
            let primary = request.primary.as_ref().ok_or_else(|| {
                AppError::ValidationError("Primary applicant details are required".to_string())
            })?;
            participant_registry::ensure_primary(db, application_id, primary).await?;
            written.push("primary participant".to_string());

            if step_number == 2 {
                let co_applicants = request.co_applicants.as_deref().unwrap_or(&[]);
                let reconciled =
                    participant_registry::reconcile_co_applicants(db, application_id, co_applicants)
                        .await?;
                written.push(format!("{} co-applicant(s)", reconciled.len()));
            }
        }
        3 => {
            let participant =
                participant_registry::find_participant(db, application_id, PRIMARY_ORDER).await?;
            let address = request.address.clone().unwrap_or_default();
            let dependents = request.dependents.as_deref().unwrap_or(&[]);
            let outcome = participant_sync::save_home_and_dependents(
                db,
                &participant.participant_id,
                &address,
                dependents,
            )
            .await?;
            written.extend(outcome.written);
        }
        4 => {
            let participant =
                participant_registry::find_participant(db, application_id, PRIMARY_ORDER).await?;
            let status = request.employment_status.as_deref().ok_or_else(|| {
                AppError::ValidationError("Employment status is required".to_string())
            })?;
            let detail = request.employment_detail.clone().unwrap_or_default();
            let commitment = request.financial_commitment.clone().unwrap_or_default();
            let outcome = participant_sync::save_employment(
                db,
                &participant.participant_id,
                status,
                &detail,
                &commitment,
            )
            .await?;
            written.extend(outcome.written);
        }
        5 => {
            let participant =
                participant_registry::find_participant(db, application_id, PRIMARY_ORDER).await?;
            let rentals = request.rental_properties.as_deref().unwrap_or(&[]);
            let outcome = participant_sync::save_portfolio(
                db,
                &participant.participant_id,
                rentals,
                request.other_assets,
            )
            .await?;
            written.extend(outcome.written);
        }
        _ => {
            // Step 6: review/submit metadata only
            patch_application(
                db,
                application_id,
                &PatchApplicationRequest {
                    loan_amount: request.loan_amount,
                    property_value: request.property_value,
                },
            )
            .await?;
            written.push("application metadata".to_string());
        }
    }

    // Advance only after every durable write succeeded
    let new_step = advance_step(application.current_step, step_number);
    let mut update = doc! { "current_step": new_step, "updated_at": BsonDateTime::now() };
    if step_number == LAST_STEP {
        update.insert("status", STATUS_COMPLETED);
    }
    db.collection::<Application>("applications")
        .update_one(
            doc! { "application_id": application_id },
            doc! { "$set": update },
        )
        .await?;

    log::info!(
        "✅ Committed step {} for application {} (current_step {} -> {})",
        step_number,
        application_id,
        application.current_step,
        new_step
    );

    // Best-effort CRM mirror; its outcome never fails the commit. A step-1/2
    // commit without a known contact creates the lead, later steps update it.
    let data = flatten_for_sync(request);
    let (external_contact_id, sync_warning) = match &request.external_contact_id {
        Some(contact_id) => (
            Some(contact_id.clone()),
            crm_service::sync_step(db, contact_id, step_number, &data).await,
        ),
        None if step_number <= 2 => {
            let fields = crm_service::map_step_to_external_fields(step_number, &data);
            if fields.is_empty() {
                (None, None)
            } else {
                match crm_service::upsert_contact(db, &fields).await {
                    Ok(contact_id) => {
                        log::info!("📡 Created CRM lead {} for application {}", contact_id, application_id);
                        (Some(contact_id), None)
                    }
                    Err(e) => {
                        log::warn!("⚠️ CRM lead creation failed (saved locally): {}", e);
                        (None, Some(format!("Saved locally, CRM sync pending: {}", e)))
                    }
                }
            }
        }
        None => (None, None),
    };

    Ok(CommitStepResponse {
        success: true,
        application_id: application_id.to_string(),
        current_step: new_step,
        written,
        external_contact_id,
        sync_warning,
    })
}

/// Commits a role-scoped step (3 or 4) for one co-applicant addressed by
/// client list index. Does not advance the application's current_step; only
/// the primary flow drives it.
pub async fn commit_co_applicant_step(
    db: &MongoDB,
    application_id: &str,
    co_applicant_index: i32,
    step_number: i32,
    request: &CommitStepRequest,
) -> Result<CommitStepResponse, AppError> {
    if step_number != 3 && step_number != 4 {
        return Err(AppError::ValidationError(
            "Only steps 3 and 4 carry per-co-applicant data".to_string(),
        ));
    }
    if co_applicant_index < 0 {
        return Err(AppError::ValidationError(
            "Co-applicant index must be non-negative".to_string(),
        ));
    }

    let application = load_application_row(db, application_id).await?;
    let order = co_applicant_index + 2;
    let participant = participant_registry::find_participant(db, application_id, order).await?;

    let outcome = if step_number == 3 {
        let address = request.address.clone().unwrap_or_default();
        let dependents = request.dependents.as_deref().unwrap_or(&[]);
        participant_sync::save_home_and_dependents(
            db,
            &participant.participant_id,
            &address,
            dependents,
        )
        .await?
    } else {
        let status = request.employment_status.as_deref().ok_or_else(|| {
            AppError::ValidationError("Employment status is required".to_string())
        })?;
        let detail = request.employment_detail.clone().unwrap_or_default();
        let commitment = request.financial_commitment.clone().unwrap_or_default();
        participant_sync::save_employment(
            db,
            &participant.participant_id,
            status,
            &detail,
            &commitment,
        )
        .await?
    };

    log::info!(
        "✅ Committed step {} for co-applicant {} of application {}",
        step_number,
        co_applicant_index + 1,
        application_id
    );

    Ok(CommitStepResponse {
        success: true,
        application_id: application_id.to_string(),
        current_step: application.current_step,
        written: outcome.written,
        external_contact_id: None,
        sync_warning: None,
    })
}

// ==================== LOAD / CONTINUATION ====================

async fn participant_view(db: &MongoDB, participant: &Participant) -> Result<ParticipantView, AppError> {
    let person = db
        .collection::<Person>("people")
        .find_one(doc! { "person_id": &participant.person_id })
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("Person {} not found", participant.person_id))
        })?;

    let mut dependents = Vec::new();
    let mut cursor = db
        .collection::<ChildDependent>("person_children")
        .find(doc! { "person_id": &participant.person_id })
        .await?;
    while let Some(row) = cursor.next().await {
        if let Ok(child) = row {
            dependents.push(DependentInput {
                name: child.name,
                date_of_birth: child.date_of_birth,
            });
        }
    }

    // Missing nested objects default rather than fail: a participant who
    // never reached step 4 still loads cleanly.
    let employment_detail = db
        .collection::<EmploymentDetail>("employment_details")
        .find_one(doc! { "participant_id": &participant.participant_id })
        .await?
        .map(|d| EmploymentDetailInput {
            employer_name: d.employer_name,
            job_title: d.job_title,
            annual_income: d.annual_income,
            years_employed: d.years_employed,
            self_employed: d.self_employed,
            business_name: d.business_name,
        })
        .unwrap_or_default();

    let financial_commitment = db
        .collection::<FinancialCommitment>("financial_commitments")
        .find_one(doc! { "participant_id": &participant.participant_id })
        .await?
        .map(|c| FinancialCommitmentInput {
            monthly_commitments: c.monthly_commitments,
            outstanding_loans: c.outstanding_loans,
            credit_card_limits: c.credit_card_limits,
        })
        .unwrap_or_default();

    let mut rental_properties = Vec::new();
    let mut cursor = db
        .collection::<RentalProperty>("rental_properties")
        .find(doc! { "participant_id": &participant.participant_id })
        .await?;
    while let Some(row) = cursor.next().await {
        if let Ok(rental) = row {
            rental_properties.push(RentalPropertyInput {
                address: rental.address,
                estimated_value: rental.estimated_value,
                mortgage_balance: rental.mortgage_balance,
                monthly_rent: rental.monthly_rent,
            });
        }
    }

    Ok(ParticipantView {
        participant_id: participant.participant_id.clone(),
        role: participant.role.clone(),
        order: participant.order,
        person: PersonView {
            email: person.email,
            first_name: person.first_name,
            last_name: person.last_name,
            date_of_birth: person.date_of_birth,
            phone: person.phone,
            nationality: person.nationality,
        },
        address: AddressFields {
            address_line1: participant.address_line1.clone(),
            address_line2: participant.address_line2.clone(),
            city: participant.city.clone(),
            postal_code: participant.postal_code.clone(),
            country: participant.country.clone(),
            homeowner_status: participant.homeowner_status.clone(),
            tax_country: participant.tax_country.clone(),
        },
        dependents,
        employment_status: participant.employment_status.clone(),
        employment_detail,
        financial_commitment,
        rental_properties,
        other_assets: participant.other_assets,
    })
}

/// Reconstructs the full step view model from the stored slices.
pub async fn load_application(db: &MongoDB, application_id: &str) -> Result<ApplicationView, AppError> {
    let application = load_application_row(db, application_id).await?;
    let participants = participant_registry::list_participants(db, application_id).await?;

    let mut primary = None;
    let mut co_applicants = Vec::new();

    for participant in &participants {
        let view = participant_view(db, participant).await?;
        if participant.role == ROLE_PRIMARY {
            primary = Some(view);
        } else if participant.role == ROLE_CO_APPLICANT {
            co_applicants.push(view);
        }
    }

    Ok(ApplicationView {
        application_id: application.application_id,
        status: application.status,
        current_step: application.current_step,
        loan_amount: application.loan_amount,
        property_value: application.property_value,
        primary,
        co_applicants,
    })
}

/// Requests a continuation code for an email. The response is identical
/// whether or not an application exists (enumeration-resistant); when one
/// does, a code is stored and delivered out-of-band through the CRM.
pub async fn request_continuation(db: &MongoDB, email: &str) -> Result<(), AppError> {
    let normalized = email.trim().to_lowercase();
    if normalized.is_empty() {
        return Err(AppError::ValidationError("Email is required".to_string()));
    }

    let person = db
        .collection::<Person>("people")
        .find_one(doc! { "email": &normalized })
        .await?;

    let Some(person) = person else {
        log::info!("🔍 Continuation requested for unknown email (no code issued)");
        return Ok(());
    };

    // Latest application this person is primary on
    let options = mongodb::options::FindOneOptions::builder()
        .sort(doc! { "created_at": -1 })
        .build();
    let participant = db
        .collection::<Participant>("application_participants")
        .find_one(doc! { "person_id": &person.person_id, "role": ROLE_PRIMARY })
        .with_options(options)
        .await?;

    let Some(participant) = participant else {
        log::info!("🔍 Continuation requested for email with no primary application");
        return Ok(());
    };

    let code = generate_code();
    let challenge = VerificationCode {
        _id: None,
        email: normalized.clone(),
        code: code.clone(),
        application_id: participant.application_id.clone(),
        expires_at: Utc::now().timestamp() + CODE_TTL_SECS,
        used: false,
        created_at: Some(BsonDateTime::now()),
    };

    db.collection::<VerificationCode>("verification_codes")
        .insert_one(&challenge)
        .await?;

    log::info!(
        "🔐 Issued continuation code for application {}",
        participant.application_id
    );

    // Delivery is best-effort; a failure must not change the response shape
    let mut contact_fields = Map::new();
    contact_fields.insert("email".to_string(), Value::String(normalized));
    match crm_service::upsert_contact(db, &contact_fields).await {
        Ok(contact_id) => {
            crm_service::send_verification_message(db, &contact_id, &code).await;
        }
        Err(e) => log::warn!("⚠️ Could not resolve CRM contact for code delivery: {}", e),
    }

    Ok(())
}

/// Redeems a continuation code: single match, case-insensitive, unused and
/// unexpired. Success marks the code used (one-time) and returns the
/// application id.
pub async fn redeem_code(db: &MongoDB, email: &str, code: &str) -> Result<String, AppError> {
    let normalized = email.trim().to_lowercase();
    let collection = db.collection::<VerificationCode>("verification_codes");

    let options = mongodb::options::FindOptions::builder()
        .sort(doc! { "created_at": -1 })
        .build();
    let mut cursor = collection
        .find(doc! { "email": &normalized })
        .with_options(options)
        .await?;

    let mut candidates = Vec::new();
    while let Some(row) = cursor.next().await {
        candidates.push(row?);
    }

    let now = Utc::now().timestamp();
    let index = pick_redeemable(&candidates, code, now)?;
    let stored = &candidates[index];

    collection
        .update_one(
            doc! { "_id": stored._id },
            doc! { "$set": { "used": true } },
        )
        .await?;

    log::info!(
        "🔓 Continuation code redeemed for application {}",
        stored.application_id
    );
    Ok(stored.application_id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn challenge(code: &str, used: bool, expires_at: i64) -> VerificationCode {
        VerificationCode {
            _id: None,
            email: "a@x.com".to_string(),
            code: code.to_string(),
            application_id: "app-1".to_string(),
            expires_at,
            used,
            created_at: None,
        }
    }

    #[test]
    fn step_only_advances_forward() {
        assert_eq!(advance_step(1, 1), 2);
        assert_eq!(advance_step(4, 2), 4); // backward commit keeps progress
        assert_eq!(advance_step(5, 5), 6);
        assert_eq!(advance_step(6, 6), 6); // capped at the last step
    }

    #[test]
    fn generated_codes_are_six_uppercase_alphanumerics() {
        for _ in 0..50 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn code_matches_case_insensitively() {
        let now = 1_700_000_000;
        let stored = challenge("A1B2C3", false, now + 60);
        assert!(code_is_redeemable(&stored, "a1b2c3", now).is_ok());
        assert!(code_is_redeemable(&stored, " A1B2C3 ", now).is_ok());
        assert!(code_is_redeemable(&stored, "XXXXXX", now).is_err());
    }

    #[test]
    fn used_code_cannot_be_redeemed_again() {
        let now = 1_700_000_000;
        let stored = challenge("A1B2C3", true, now + 60);
        assert!(code_is_redeemable(&stored, "A1B2C3", now).is_err());
    }

    #[test]
    fn expired_code_fails_even_if_never_used() {
        let now = 1_700_000_000;
        let stored = challenge("A1B2C3", false, now - 1);
        assert!(code_is_redeemable(&stored, "A1B2C3", now).is_err());
        // exactly at the boundary counts as expired
        let boundary = challenge("A1B2C3", false, now);
        assert!(code_is_redeemable(&boundary, "A1B2C3", now).is_err());
    }

    #[test]
    fn rejection_reports_the_newest_matching_code() {
        let now = 1_700_000_000;
        // Newest first, as redeem_code fetches them: the latest code has
        // expired, an older duplicate was already used.
        let candidates = vec![
            challenge("A1B2C3", false, now - 1),
            challenge("A1B2C3", true, now + 60),
        ];
        let err = pick_redeemable(&candidates, "A1B2C3", now).unwrap_err();
        assert!(err.to_string().contains("expired"), "got: {}", err);
    }

    #[test]
    fn non_matching_codes_yield_the_generic_rejection() {
        let now = 1_700_000_000;
        let candidates = vec![challenge("A1B2C3", true, now + 60)];
        let err = pick_redeemable(&candidates, "ZZZZZZ", now).unwrap_err();
        assert!(err.to_string().contains("Invalid"), "got: {}", err);
    }

    #[test]
    fn newest_redeemable_code_wins() {
        let now = 1_700_000_000;
        let candidates = vec![
            challenge("A1B2C3", false, now + 60),
            challenge("A1B2C3", false, now + 60),
        ];
        assert_eq!(pick_redeemable(&candidates, "a1b2c3", now).unwrap(), 0);
    }

    #[test]
    fn application_rows_predate_opportunity_tracking() {
        let row = doc! {
            "application_id": "app-1",
            "status": "completed",
            "current_step": 6,
        };
        let application: Application = mongodb::bson::from_document(row).unwrap();
        assert_eq!(application.opportunity_id, None);

        let row = doc! {
            "application_id": "app-1",
            "status": "completed",
            "current_step": 6,
            "opportunity_id": "opp-9",
        };
        let application: Application = mongodb::bson::from_document(row).unwrap();
        assert_eq!(application.opportunity_id, Some("opp-9".to_string()));
    }

    #[test]
    fn flatten_merges_sections_into_one_map() {
        let request = CommitStepRequest {
            primary: Some(PersonFields {
                email: "a@x.com".to_string(),
                first_name: "Jo".to_string(),
                last_name: "Bloggs".to_string(),
                date_of_birth: None,
                phone: None,
                nationality: None,
            }),
            employment_status: Some("employed".to_string()),
            other_assets: Some(1000.0),
            ..Default::default()
        };
        let flat = flatten_for_sync(&request);
        assert_eq!(flat["email"], json!("a@x.com"));
        assert_eq!(flat["first_name"], json!("Jo"));
        assert_eq!(flat["employment_status"], json!("employed"));
        assert_eq!(flat["other_assets"], json!(1000.0));
    }
}
