use serde::{Deserialize, Serialize};

use crate::domain::{Business, BusinessField, BusinessId};

/// One fetch response: a row batch plus pagination metadata. `total_count`
/// is a best-effort snapshot and may go stale under concurrent writes;
/// `has_more` is the authoritative end-of-data signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessPage {
    pub items: Vec<Business>,
    pub next_cursor: i64,
    pub has_more: bool,
    pub total_count: i64,
}

impl BusinessPage {
    /// The page a caller sees when a fetch fails outright: nothing loaded,
    /// cursor unchanged, no more data claimed.
    pub fn empty(cursor: i64) -> Self {
        Self {
            items: Vec::new(),
            next_cursor: cursor,
            has_more: false,
            total_count: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub cursor: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkUpdateRequest {
    pub field: BusinessField,
    pub value: String,
    pub ids: Vec<BusinessId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkUpdateResponse {
    pub items: Vec<Business>,
}
