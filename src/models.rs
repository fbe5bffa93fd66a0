use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Product payload accepted on create and update. `image` may be an
/// inline data-URI image; it is swapped for a hosted URL before the
/// record is persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductInput {
    pub product_name: String,
    pub product_description: String,
    pub image: String,
    pub category: String,
    pub brand: String,
    pub colour: String,
    pub dimensions: String,
    pub box_includes: String,
    pub dynamic_attributes: HashMap<String, String>,
    pub amount_in_stock: u32,
    pub price: i64,
}

/// Product as returned to clients: stored fields plus the canonical
/// string form of the database identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: String,
    #[serde(flatten)]
    pub product: ProductInput,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzePostRequest {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct AnalyzePostResponse {
    pub image: Vec<String>,
    pub attributes: Value,
}
