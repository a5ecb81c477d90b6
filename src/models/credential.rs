use serde::{Deserialize, Serialize};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::DateTime as BsonDateTime;

/// Documento da collection "oauth_tokens" - um por external account id
/// (unique index), nunca duplicado.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OauthToken {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub account_id: String,
    pub access_token: String,
    pub refresh_token: String,
    /// Absolute expiry, unix seconds.
    pub expires_at: i64,
    pub created_at: Option<BsonDateTime>,
    pub updated_at: Option<BsonDateTime>,
}

/// Marks that a participant's CRM record was already created - idempotency
/// guard against duplicate creation on retry.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ExternalRecordLink {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub participant_id: String,
    pub external_record_id: String,
    pub created_at: Option<BsonDateTime>,
}
