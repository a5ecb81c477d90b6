use serde::{Deserialize, Serialize};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::DateTime as BsonDateTime;

pub const ROLE_PRIMARY: &str = "primary";
pub const ROLE_CO_APPLICANT: &str = "co_applicant";

/// Order of the primary participant. Co-applicants occupy 2..N, contiguous,
/// matching the client array index + 2.
pub const PRIMARY_ORDER: i32 = 1;

/// Documento da collection "application_participants" - liga uma Person a
/// uma Application com dados escopados ao papel (primary / co-applicant)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Participant {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub participant_id: String,
    pub application_id: String,
    pub person_id: String,
    pub role: String,
    pub order: i32,
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
    pub employment_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tax_country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub other_assets: Option<f64>,
    pub created_at: Option<BsonDateTime>,
    pub updated_at: Option<BsonDateTime>,
}
