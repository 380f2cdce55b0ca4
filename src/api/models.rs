use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::{IntoParams, ToSchema};

use crate::core::errors::{ErrorKind, TripsplitError};
use crate::core::models::expense::{ExpensePatch, ExpenseQuery, NewExpense, SplitKind, SplitShare, SplitSpec};
use crate::core::models::settlement::SettlementQuery;
use crate::core::money::Money;

const DEFAULT_PAGE_SIZE: u32 = 100;
const MAX_PAGE_SIZE: u32 = 1000;

// Request structs for JSON payloads
#[derive(Deserialize, ToSchema)]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default)]
    pub member_ids: Vec<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct AddMemberRequest {
    pub user_id: String,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateExpenseRequest {
    pub title: String,
    pub description: Option<String>,
    #[schema(value_type = String, example = "30.00")]
    pub total_amount: Money,
    pub split_kind: SplitKind,
    /// Required for CUSTOM splits, ignored for EQUAL ones.
    pub splits: Option<Vec<SplitShare>>,
}

impl CreateExpenseRequest {
    pub fn into_new_expense(self, group_id: String) -> NewExpense {
        NewExpense {
            group_id,
            title: self.title,
            description: self.description,
            total_amount: self.total_amount,
            split: SplitSpec::from_parts(self.split_kind, self.splits),
        }
    }
}

#[derive(Deserialize, ToSchema, Default)]
pub struct UpdateExpenseRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    #[schema(value_type = Option<String>, example = "45.00")]
    pub total_amount: Option<Money>,
    pub split_kind: Option<SplitKind>,
    pub splits: Option<Vec<SplitShare>>,
}

impl From<UpdateExpenseRequest> for ExpensePatch {
    fn from(req: UpdateExpenseRequest) -> Self {
        let split = match (req.split_kind, req.splits) {
            (Some(kind), splits) => Some(SplitSpec::from_parts(kind, splits)),
            (None, Some(splits)) => Some(SplitSpec::Custom(splits)),
            (None, None) => None,
        };
        ExpensePatch {
            title: req.title,
            description: req.description,
            total_amount: req.total_amount,
            split,
        }
    }
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ExpenseListParams {
    pub created_by: Option<String>,
    #[param(value_type = Option<String>)]
    pub min_amount: Option<Money>,
    #[param(value_type = Option<String>)]
    pub max_amount: Option<Money>,
    pub skip: Option<u32>,
    pub limit: Option<u32>,
}

impl From<ExpenseListParams> for ExpenseQuery {
    fn from(params: ExpenseListParams) -> Self {
        ExpenseQuery {
            created_by: params.created_by,
            min_amount: params.min_amount,
            max_amount: params.max_amount,
            skip: params.skip.unwrap_or(0),
            limit: Some(params.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)),
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct CreateSettlementRequest {
    pub paid_to: String,
    #[schema(value_type = String, example = "10.00")]
    pub amount: Money,
    pub note: Option<String>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SettlementListParams {
    pub paid_by: Option<String>,
    pub paid_to: Option<String>,
    pub skip: Option<u32>,
    pub limit: Option<u32>,
}

impl From<SettlementListParams> for SettlementQuery {
    fn from(params: SettlementListParams) -> Self {
        SettlementQuery {
            paid_by: params.paid_by,
            paid_to: params.paid_to,
            skip: params.skip.unwrap_or(0),
            limit: params.limit.map(|l| l.clamp(1, MAX_PAGE_SIZE)),
        }
    }
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UploadParams {
    /// Original name of the uploaded file.
    pub filename: String,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

// Error response struct
#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    #[schema(value_type = String, example = "validation")]
    pub kind: ErrorKind,
    #[schema(example = "SPLIT_MISMATCH")]
    pub code: String,
    pub error: String,
}

// Newtype wrapper for TripsplitError to implement IntoResponse
#[derive(Debug)]
pub struct ApiError(pub TripsplitError);

impl From<TripsplitError> for ApiError {
    fn from(err: TripsplitError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            TripsplitError::NoBalanceFound { .. } => StatusCode::NOT_FOUND,
            TripsplitError::AmountExceedsDebt { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            TripsplitError::BalanceNotFound { .. } => StatusCode::CONFLICT,
            TripsplitError::InvariantViolation(_) => StatusCode::INTERNAL_SERVER_ERROR,
            err => match err.kind() {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::Authentication => StatusCode::UNAUTHORIZED,
                ErrorKind::Authorization => StatusCode::FORBIDDEN,
                ErrorKind::Conflict | ErrorKind::Consistency => StatusCode::CONFLICT,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let error_message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(code = self.0.code(), error = %self.0, "Request failed");
            "Internal server error".to_string()
        } else {
            self.0.to_string()
        };
        let body = ErrorResponse {
            kind: self.0.kind(),
            code: self.0.code().to_string(),
            error: error_message,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_errors_map_to_documented_statuses() {
        let not_found = ApiError(TripsplitError::NoBalanceFound {
            payer_id: "b".to_string(),
            payee_id: "a".to_string(),
        });
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let exceeds = ApiError(TripsplitError::AmountExceedsDebt {
            requested: Money::from_cents(1100),
            owed: Money::from_cents(1000),
        });
        assert_eq!(exceeds.status(), StatusCode::UNPROCESSABLE_ENTITY);

        assert_eq!(ApiError(TripsplitError::EmptySplit).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError(TripsplitError::Unauthenticated("no token".to_string())).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError(TripsplitError::DatabaseError("disk full".to_string())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn patch_request_picks_split_from_kind_or_shares() {
        let patch: ExpensePatch = UpdateExpenseRequest {
            split_kind: Some(SplitKind::Equal),
            ..Default::default()
        }
        .into();
        assert_eq!(patch.split, Some(SplitSpec::Equal));

        let patch: ExpensePatch = UpdateExpenseRequest {
            title: Some("Dinner".to_string()),
            ..Default::default()
        }
        .into();
        assert!(patch.split.is_none());
        assert!(!patch.touches_ledger());
    }

    #[test]
    fn list_params_default_and_clamp_page_size() {
        let query: ExpenseQuery = ExpenseListParams {
            created_by: None,
            min_amount: None,
            max_amount: None,
            skip: None,
            limit: Some(5000),
        }
        .into();
        assert_eq!(query.limit, Some(MAX_PAGE_SIZE));
        assert_eq!(query.skip, 0);
    }
}
