use serde::{Deserialize, Serialize};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::DateTime as BsonDateTime;

pub const STATUS_DRAFT: &str = "draft";
pub const STATUS_COMPLETED: &str = "completed";

pub const FIRST_STEP: i32 = 1;
pub const LAST_STEP: i32 = 6;

/// Documento da collection "applications"
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Application {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub application_id: String,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default = "default_step")]
    pub current_step: i32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub loan_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub property_value: Option<f64>,
    /// CRM opportunity created at submission, at most one per application.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub opportunity_id: Option<String>,
    pub created_at: Option<BsonDateTime>,
    pub updated_at: Option<BsonDateTime>,
}

fn default_status() -> String {
    STATUS_DRAFT.to_string()
}

fn default_step() -> i32 {
    FIRST_STEP
}
