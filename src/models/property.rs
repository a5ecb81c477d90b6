use serde::{Deserialize, Serialize};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::DateTime as BsonDateTime;

/// 0..N rental properties per participant, replaced wholesale on each
/// portfolio save.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RentalProperty {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub participant_id: String,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub estimated_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub mortgage_balance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub monthly_rent: Option<f64>,
    pub created_at: Option<BsonDateTime>,
}
