use serde::{Deserialize, Serialize};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::DateTime as BsonDateTime;

/// Singleton "current snapshot" row per participant, replaced wholesale on
/// every step-4 save (delete + insert, never patched in place).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EmploymentDetail {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub participant_id: String,
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
    pub created_at: Option<BsonDateTime>,
}

/// Singleton snapshot per participant, same replace semantics as
/// EmploymentDetail.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FinancialCommitment {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub participant_id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub monthly_commitments: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub outstanding_loans: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub credit_card_limits: Option<f64>,
    pub created_at: Option<BsonDateTime>,
}
