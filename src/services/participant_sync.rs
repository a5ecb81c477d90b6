// ==================== PARTICIPANT DATA SYNCHRONIZER ====================
// Idempotently persists each step's scalar and nested-collection data for
// one participant. Scalars are updated in place; owned collections are
// replaced wholesale (delete-all-then-insert-all) so a re-save can never
// duplicate or leak stale rows. Each save is a sequence of dependent writes,
// not one transaction: the outcome names every logical unit written, and a
// failure names the unit it died in so the caller can retry the idempotent
// replace.

use crate::{
    database::MongoDB,
    models::{ChildDependent, EmploymentDetail, FinancialCommitment, Participant, RentalProperty},
    utils::error::AppError,
};
use mongodb::bson::{doc, DateTime as BsonDateTime, Document};
use serde::{Deserialize, Serialize};

// ==================== INPUT MODELS ====================

#[derive(Debug, Serialize, Deserialize, Clone, Default, utoipa::ToSchema)]
pub struct AddressFields {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub address_line1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub address_line2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub homeowner_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tax_country: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, utoipa::ToSchema)]
pub struct DependentInput {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
    pub date_of_birth: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, utoipa::ToSchema)]
pub struct EmploymentDetailInput {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub employer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub job_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub annual_income: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub years_employed: Option<f64>,
    #[serde(default)]
    pub self_employed: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub business_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, utoipa::ToSchema)]
pub struct FinancialCommitmentInput {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub monthly_commitments: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub outstanding_loans: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub credit_card_limits: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, utoipa::ToSchema)]
pub struct RentalPropertyInput {
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub estimated_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub mortgage_balance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub monthly_rent: Option<f64>,
}

/// Names every logical unit a save persisted, so a partial failure is
/// distinguishable from a blanket one.
#[derive(Debug, Serialize, Default, utoipa::ToSchema)]
pub struct SyncOutcome {
    pub written: Vec<String>,
}

impl SyncOutcome {
    fn record(&mut self, unit: &str) {
        self.written.push(unit.to_string());
    }
}

fn unit_error(unit: &str, e: mongodb::error::Error) -> AppError {
    AppError::DatabaseError(format!("{} write failed: {}", unit, e))
}

/// Builds the `$set` document for an address save, omitting absent fields
/// so a partial payload never blanks columns saved earlier.
pub fn address_update_doc(address: &AddressFields) -> Document {
    let mut update = Document::new();
    if let Some(v) = &address.address_line1 {
        update.insert("address_line1", v);
    }
    if let Some(v) = &address.address_line2 {
        update.insert("address_line2", v);
    }
    if let Some(v) = &address.city {
        update.insert("city", v);
    }
    if let Some(v) = &address.postal_code {
        update.insert("postal_code", v);
    }
    if let Some(v) = &address.country {
        update.insert("country", v);
    }
    if let Some(v) = &address.homeowner_status {
        update.insert("homeowner_status", v);
    }
    if let Some(v) = &address.tax_country {
        update.insert("tax_country", v);
    }
    update
}

async fn load_participant(db: &MongoDB, participant_id: &str) -> Result<Participant, AppError> {
    db.collection::<Participant>("application_participants")
        .find_one(doc! { "participant_id": participant_id })
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Participant {} not found", participant_id)))
}

// ==================== SAVE OPERATIONS ====================

/// Step-3 save: participant address scalars updated in place, then the
/// owning person's dependents replaced wholesale. Calling twice with the
/// same input leaves identical rows.
pub async fn save_home_and_dependents(
    db: &MongoDB,
    participant_id: &str,
    address: &AddressFields,
    dependents: &[DependentInput],
) -> Result<SyncOutcome, AppError> {
    let participant = load_participant(db, participant_id).await?;
    let now = BsonDateTime::now();
    let mut outcome = SyncOutcome::default();

    // 1. Scalar columns on the participant
    let mut update = address_update_doc(address);
    update.insert("updated_at", now);

    db.collection::<Participant>("application_participants")
        .update_one(
            doc! { "participant_id": participant_id },
            doc! { "$set": update },
        )
        .await
        .map_err(|e| unit_error("participant address", e))?;
    outcome.record("participant address");

    // 2. Replace the person's dependents (owned by the Person, so shared
    //    across that person's applications)
    let children = db.collection::<ChildDependent>("person_children");
    children
        .delete_many(doc! { "person_id": &participant.person_id })
        .await
        .map_err(|e| unit_error("dependents", e))?;

    if !dependents.is_empty() {
        let rows: Vec<ChildDependent> = dependents
            .iter()
            .map(|d| ChildDependent {
                _id: None,
                person_id: participant.person_id.clone(),
                name: d.name.clone(),
                date_of_birth: d.date_of_birth.clone(),
                created_at: Some(now),
            })
            .collect();
        children
            .insert_many(rows)
            .await
            .map_err(|e| unit_error("dependents", e))?;
    }
    outcome.record("dependents");

    log::info!(
        "💾 Saved home + {} dependent(s) for participant {}",
        dependents.len(),
        participant_id
    );

    Ok(outcome)
}

/// Step-4 save: employment_status scalar, then the singleton snapshot rows
/// for employment detail and financial commitment, each replaced by
/// delete + insert so at most one row per participant ever exists.
pub async fn save_employment(
    db: &MongoDB,
    participant_id: &str,
    employment_status: &str,
    detail: &EmploymentDetailInput,
    commitment: &FinancialCommitmentInput,
) -> Result<SyncOutcome, AppError> {
    let now = BsonDateTime::now();
    let mut outcome = SyncOutcome::default();

    // 1. Scalar on the participant
    let updated = db
        .collection::<Participant>("application_participants")
        .update_one(
            doc! { "participant_id": participant_id },
            doc! { "$set": { "employment_status": employment_status, "updated_at": now } },
        )
        .await
        .map_err(|e| unit_error("employment status", e))?;

    if updated.matched_count == 0 {
        return Err(AppError::NotFound(format!(
            "Participant {} not found",
            participant_id
        )));
    }
    outcome.record("employment status");

    // 2. Replace the employment detail snapshot
    let details = db.collection::<EmploymentDetail>("employment_details");
    details
        .delete_many(doc! { "participant_id": participant_id })
        .await
        .map_err(|e| unit_error("employment detail", e))?;
    details
        .insert_one(EmploymentDetail {
            _id: None,
            participant_id: participant_id.to_string(),
            employer_name: detail.employer_name.clone(),
            job_title: detail.job_title.clone(),
            annual_income: detail.annual_income,
            years_employed: detail.years_employed,
            self_employed: detail.self_employed,
            business_name: detail.business_name.clone(),
            created_at: Some(now),
        })
        .await
        .map_err(|e| unit_error("employment detail", e))?;
    outcome.record("employment detail");

    // 3. Replace the financial commitment snapshot
    let commitments = db.collection::<FinancialCommitment>("financial_commitments");
    commitments
        .delete_many(doc! { "participant_id": participant_id })
        .await
        .map_err(|e| unit_error("financial commitment", e))?;
    commitments
        .insert_one(FinancialCommitment {
            _id: None,
            participant_id: participant_id.to_string(),
            monthly_commitments: commitment.monthly_commitments,
            outstanding_loans: commitment.outstanding_loans,
            credit_card_limits: commitment.credit_card_limits,
            created_at: Some(now),
        })
        .await
        .map_err(|e| unit_error("financial commitment", e))?;
    outcome.record("financial commitment");

    log::info!("💾 Saved employment data for participant {}", participant_id);

    Ok(outcome)
}

/// Step-5 save: rental properties replaced wholesale, then the other_assets
/// scalar updated in place.
pub async fn save_portfolio(
    db: &MongoDB,
    participant_id: &str,
    rental_properties: &[RentalPropertyInput],
    other_assets: Option<f64>,
) -> Result<SyncOutcome, AppError> {
    // Fail fast before any write when the participant is unknown
    load_participant(db, participant_id).await?;

    let now = BsonDateTime::now();
    let mut outcome = SyncOutcome::default();

    // 1. Replace rental properties
    let rentals = db.collection::<RentalProperty>("rental_properties");
    rentals
        .delete_many(doc! { "participant_id": participant_id })
        .await
        .map_err(|e| unit_error("rental properties", e))?;

    if !rental_properties.is_empty() {
        let rows: Vec<RentalProperty> = rental_properties
            .iter()
            .map(|r| RentalProperty {
                _id: None,
                participant_id: participant_id.to_string(),
                address: r.address.clone(),
                estimated_value: r.estimated_value,
                mortgage_balance: r.mortgage_balance,
                monthly_rent: r.monthly_rent,
                created_at: Some(now),
            })
            .collect();
        rentals
            .insert_many(rows)
            .await
            .map_err(|e| unit_error("rental properties", e))?;
    }
    outcome.record("rental properties");

    // 2. Scalar on the participant
    let mut update = doc! { "updated_at": now };
    if let Some(assets) = other_assets {
        update.insert("other_assets", assets);
    }
    db.collection::<Participant>("application_participants")
        .update_one(
            doc! { "participant_id": participant_id },
            doc! { "$set": update },
        )
        .await
        .map_err(|e| unit_error("other assets", e))?;
    outcome.record("other assets");

    log::info!(
        "💾 Saved portfolio ({} rental(s)) for participant {}",
        rental_properties.len(),
        participant_id
    );

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_doc_omits_absent_fields() {
        let address = AddressFields {
            address_line1: Some("12 High St".to_string()),
            city: Some("Leeds".to_string()),
            ..Default::default()
        };
        let update = address_update_doc(&address);
        assert_eq!(update.get_str("address_line1").unwrap(), "12 High St");
        assert_eq!(update.get_str("city").unwrap(), "Leeds");
        assert!(!update.contains_key("postal_code"));
        assert!(!update.contains_key("homeowner_status"));
    }

    #[test]
    fn empty_address_builds_empty_doc() {
        assert!(address_update_doc(&AddressFields::default()).is_empty());
    }

    #[test]
    fn outcome_records_units_in_order() {
        let mut outcome = SyncOutcome::default();
        outcome.record("participant address");
        outcome.record("dependents");
        assert_eq!(outcome.written, vec!["participant address", "dependents"]);
    }
}
