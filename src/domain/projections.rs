use serde::{Deserialize, Serialize};

use super::RecordId;

// ============================================================================
// Local Projections of Upstream Records
// ============================================================================
//
// Orders and products are owned by peer services. This service only keeps
// the identifiers it needs, keyed by the upstream id.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: RecordId,
    #[serde(default)]
    pub customer_id: Option<RecordId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: RecordId,
}
