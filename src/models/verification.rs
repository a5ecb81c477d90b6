use serde::{Deserialize, Serialize};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::DateTime as BsonDateTime;

/// Verification code gating the continuation flow: 6 uppercase alphanumeric
/// chars, 15-minute TTL, single use, matched case-insensitively.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VerificationCode {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub email: String,
    pub code: String,
    pub application_id: String,
    /// Absolute expiry, unix seconds.
    pub expires_at: i64,
    #[serde(default)]
    pub used: bool,
    pub created_at: Option<BsonDateTime>,
}
