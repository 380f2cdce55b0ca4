use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::attachment::Attachment;
use crate::core::money::Money;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum SplitKind {
    Equal,
    Custom,
}

impl SplitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SplitKind::Equal => "EQUAL",
            SplitKind::Custom => "CUSTOM",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "EQUAL" => Some(SplitKind::Equal),
            "CUSTOM" => Some(SplitKind::Custom),
            _ => None,
        }
    }
}

impl std::fmt::Display for SplitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct Expense {
    pub id: String,
    pub group_id: String,
    pub created_by: String,
    pub title: String,
    pub description: Option<String>,
    #[schema(value_type = String, example = "30.00")]
    pub total_amount: Money,
    pub split_kind: SplitKind,
    #[schema(value_type = String, example = "2024-06-01T12:34:56Z")]
    pub created_at: DateTime<Utc>,
}

/// One participant's share of an expense.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct ExpenseSplit {
    pub id: String,
    pub expense_id: String,
    pub user_id: String,
    #[schema(value_type = String, example = "10.00")]
    pub amount: Money,
}

/// A caller-supplied share for a CUSTOM split.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct SplitShare {
    pub user_id: String,
    #[schema(value_type = String, example = "12.50")]
    pub amount: Money,
}

/// How an expense is divided between participants.
#[derive(Clone, Debug, PartialEq)]
pub enum SplitSpec {
    /// Evenly over every current member of the group.
    Equal,
    Custom(Vec<SplitShare>),
}

impl SplitSpec {
    pub fn kind(&self) -> SplitKind {
        match self {
            SplitSpec::Equal => SplitKind::Equal,
            SplitSpec::Custom(_) => SplitKind::Custom,
        }
    }

    /// Build from the wire representation. Shares are ignored for EQUAL splits.
    pub fn from_parts(kind: SplitKind, shares: Option<Vec<SplitShare>>) -> Self {
        match kind {
            SplitKind::Equal => SplitSpec::Equal,
            SplitKind::Custom => SplitSpec::Custom(shares.unwrap_or_default()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct NewExpense {
    pub group_id: String,
    pub title: String,
    pub description: Option<String>,
    pub total_amount: Money,
    pub split: SplitSpec,
}

/// Fields of an expense that may be changed after creation. `None` leaves the
/// field untouched.
#[derive(Clone, Debug, Default)]
pub struct ExpensePatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub total_amount: Option<Money>,
    pub split: Option<SplitSpec>,
}

impl ExpensePatch {
    /// Whether applying the patch changes how the expense is folded into the ledger.
    pub fn touches_ledger(&self) -> bool {
        self.total_amount.is_some() || self.split.is_some()
    }
}

#[derive(Clone, Debug, Default)]
pub struct ExpenseQuery {
    pub created_by: Option<String>,
    pub min_amount: Option<Money>,
    pub max_amount: Option<Money>,
    pub skip: u32,
    pub limit: Option<u32>,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct ExpenseDetails {
    pub expense: Expense,
    pub splits: Vec<ExpenseSplit>,
    pub attachments: Vec<Attachment>,
    pub can_edit: bool,
}
