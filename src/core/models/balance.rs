use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::core::money::Money;

/// A live ledger row: `debtor_id` owes `creditor_id` a strictly positive `amount`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UserBalance {
    pub debtor_id: String,
    pub creditor_id: String,
    pub group_id: String,
    pub amount: Money,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    OwesYou,
    YouOwe,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct BalanceView {
    pub group_id: String,
    pub other_user_id: String,
    #[schema(value_type = String, example = "10.00")]
    pub net_amount: Money,
    pub direction: Direction,
}
