use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A number as clients send it. Form inputs often post `"5"` instead of `5`,
/// and older documents may hold doubles, so all three are kept as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Amount {
    Int(i64),
    Float(f64),
    Text(String),
}

/// A surplus food listing. Every field is optional on input and unknown ones
/// are kept in `extra`; the store assigns `_id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Food {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Owner of the listing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub food_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub food_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub food_quantity: Option<Amount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pickup_location: Option<String>,
    /// ISO-8601 text, so lexical order is chronological order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expired_date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub donator_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub donator_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub food_status: Option<String>,
    /// Any other field the client sent; stored and returned untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Fields of a [`Food`] that may be changed after posting. Anything else in
/// the request body is ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub food_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub food_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub food_quantity: Option<Amount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pickup_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expired_date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub food_status: Option<String>,
}

impl FoodPatch {
    pub fn is_empty(&self) -> bool {
        self.food_name.is_none()
            && self.food_image.is_none()
            && self.food_quantity.is_none()
            && self.pickup_location.is_none()
            && self.expired_date_time.is_none()
            && self.additional_notes.is_none()
            && self.food_status.is_none()
    }
}

/// A user's request for someone else's listing. `(food_id, requester_email)` is unique.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodRequest {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Hex identifier of the requested [`Food`], stored as plain text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub food_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requester_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requester_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requester_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub food_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub food_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub donator_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub donator_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pickup_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expired_date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub donation_money: Option<Amount>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortParams {
    pub sort_by: Option<String>,
}

// Write results use the camelCase shape the web client already parses.

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertOutcome {
    pub acknowledged: bool,
    pub inserted_id: String,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOutcome {
    pub acknowledged: bool,
    pub matched_count: u64,
    pub modified_count: u64,
    pub upserted_id: Option<String>,
    pub upserted_count: u64,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    pub acknowledged: bool,
    pub deleted_count: u64,
}
