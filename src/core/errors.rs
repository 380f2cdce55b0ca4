use serde::Serialize;
use thiserror::Error;

use crate::core::money::Money;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub title: String,
    pub description: String,
}

/// Broad classification used by callers to decide how to surface an error.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Authentication,
    Authorization,
    Conflict,
    Consistency,
    NotFound,
    Internal,
}

#[derive(Error, Debug, Serialize, PartialEq)]
pub enum TripsplitError {
    #[error("Group {0} not found")]
    GroupNotFound(String),
    #[error("Expense {0} not found")]
    ExpenseNotFound(String),
    #[error("Settlement {0} not found")]
    SettlementNotFound(String),
    #[error("Attachment {0} not found")]
    AttachmentNotFound(String),

    #[error("User {0} is not a group member")]
    NotGroupMember(String),
    #[error("User {0} is not group owner")]
    NotGroupOwner(String),
    #[error("User {0} is already a group member")]
    AlreadyGroupMember(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Custom split requires a non-empty splits list")]
    EmptySplit,
    #[error("Custom split total ({actual}) does not match total amount ({expected})")]
    SplitMismatch { expected: Money, actual: Money },
    #[error("Not enough users in the group to split with: {0}")]
    NotEnoughMembers(usize),
    #[error("Invalid split: {0}")]
    InvalidSplit(String),
    #[error("User {0} is not a group member for split")]
    InvalidSplitUser(String),
    #[error("User {0} appears more than once in the split")]
    DuplicateSplitUser(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Cannot create settlement to self")]
    SelfSettlement,
    #[error("Invalid input for field `{0}`: {1:?}")]
    InvalidInput(String, FieldError),
    #[error("Attachment is {size} bytes, the limit is {limit}")]
    AttachmentTooLarge { size: usize, limit: usize },

    #[error("No balance between debtor {debtor_id} and creditor {creditor_id} in group {group_id}")]
    BalanceNotFound {
        group_id: String,
        debtor_id: String,
        creditor_id: String,
    },
    #[error("No previous balance record found from {payer_id} to {payee_id}")]
    NoBalanceFound { payer_id: String, payee_id: String },
    #[error("Amount exceeds debt. Max allowed: {owed}")]
    AmountExceedsDebt { requested: Money, owed: Money },
    #[error("Ledger invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Cache error: {0}")]
    CacheError(String),
    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

impl TripsplitError {
    pub fn kind(&self) -> ErrorKind {
        use TripsplitError::*;
        match self {
            GroupNotFound(_) | ExpenseNotFound(_) | SettlementNotFound(_) | AttachmentNotFound(_) => {
                ErrorKind::NotFound
            }
            NotGroupMember(_) | NotGroupOwner(_) | Forbidden(_) => ErrorKind::Authorization,
            Unauthenticated(_) => ErrorKind::Authentication,
            AlreadyGroupMember(_) => ErrorKind::Conflict,
            EmptySplit
            | SplitMismatch { .. }
            | NotEnoughMembers(_)
            | InvalidSplit(_)
            | InvalidSplitUser(_)
            | DuplicateSplitUser(_)
            | InvalidAmount(_)
            | SelfSettlement
            | InvalidInput(..)
            | AttachmentTooLarge { .. } => ErrorKind::Validation,
            BalanceNotFound { .. } | NoBalanceFound { .. } | AmountExceedsDebt { .. } | InvariantViolation(_) => {
                ErrorKind::Consistency
            }
            DatabaseError(_) | StorageError(_) | CacheError(_) | InternalServerError(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable identifier, safe to match on from clients.
    pub fn code(&self) -> &'static str {
        use TripsplitError::*;
        match self {
            GroupNotFound(_) => "GROUP_NOT_FOUND",
            ExpenseNotFound(_) => "EXPENSE_NOT_FOUND",
            SettlementNotFound(_) => "SETTLEMENT_NOT_FOUND",
            AttachmentNotFound(_) => "ATTACHMENT_NOT_FOUND",
            NotGroupMember(_) => "NOT_GROUP_MEMBER",
            NotGroupOwner(_) => "NOT_GROUP_OWNER",
            AlreadyGroupMember(_) => "ALREADY_GROUP_MEMBER",
            Forbidden(_) => "FORBIDDEN",
            Unauthenticated(_) => "UNAUTHENTICATED",
            EmptySplit => "EMPTY_SPLIT",
            SplitMismatch { .. } => "SPLIT_MISMATCH",
            NotEnoughMembers(_) => "NOT_ENOUGH_MEMBERS",
            InvalidSplit(_) => "INVALID_SPLIT",
            InvalidSplitUser(_) => "INVALID_SPLIT_USER",
            DuplicateSplitUser(_) => "DUPLICATE_SPLIT_USER",
            InvalidAmount(_) => "INVALID_AMOUNT",
            SelfSettlement => "SELF_SETTLEMENT",
            InvalidInput(..) => "INVALID_INPUT",
            AttachmentTooLarge { .. } => "ATTACHMENT_TOO_LARGE",
            BalanceNotFound { .. } => "BALANCE_NOT_FOUND",
            NoBalanceFound { .. } => "NO_BALANCE_FOUND",
            AmountExceedsDebt { .. } => "AMOUNT_EXCEEDS_DEBT",
            InvariantViolation(_) => "INVARIANT_VIOLATION",
            DatabaseError(_) => "DATABASE_ERROR",
            StorageError(_) => "STORAGE_ERROR",
            CacheError(_) => "CACHE_ERROR",
            InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }
}

impl From<rusqlite::Error> for TripsplitError {
    fn from(error: rusqlite::Error) -> Self {
        TripsplitError::DatabaseError(error.to_string())
    }
}
