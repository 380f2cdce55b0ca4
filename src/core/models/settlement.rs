use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::core::money::Money;

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct Settlement {
    pub id: String,
    pub group_id: String,
    pub paid_by: String,
    pub paid_to: String,
    #[schema(value_type = String, example = "10.00")]
    pub amount: Money,
    pub note: Option<String>,
    #[schema(value_type = String, example = "2024-06-01T12:34:56Z")]
    pub settled_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default)]
pub struct SettlementQuery {
    pub paid_by: Option<String>,
    pub paid_to: Option<String>,
    pub skip: u32,
    pub limit: Option<u32>,
}

/// A settlement as seen by a particular user.
#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct SettlementView {
    #[serde(flatten)]
    pub settlement: Settlement,
    pub can_delete: bool,
}

impl SettlementView {
    pub fn for_user(settlement: Settlement, user_id: &str) -> Self {
        let can_delete = settlement.paid_by == user_id;
        SettlementView { settlement, can_delete }
    }
}
