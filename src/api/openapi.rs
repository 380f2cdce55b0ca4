use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::{
    api::models::{
        AddMemberRequest, CreateExpenseRequest, CreateGroupRequest, CreateSettlementRequest, ErrorResponse,
        HealthResponse, UpdateExpenseRequest,
    },
    core::models::{
        attachment::Attachment,
        balance::{BalanceView, Direction},
        expense::{Expense, ExpenseDetails, ExpenseSplit, SplitKind, SplitShare},
        group::{Group, GroupMember, Role},
        settlement::{Settlement, SettlementView},
    },
};

#[derive(OpenApi)]
#[openapi(
    paths(
        super::handlers::health,
        super::handlers::create_group,
        super::handlers::list_members,
        super::handlers::add_member,
        super::handlers::list_expenses,
        super::handlers::create_expense,
        super::handlers::delete_expense,
        super::handlers::get_expense,
        super::handlers::update_expense,
        super::handlers::list_attachments,
        super::handlers::upload_attachment,
        super::handlers::get_attachment,
        super::handlers::delete_attachment,
        super::handlers::list_settlements,
        super::handlers::create_settlement,
        super::handlers::get_settlement,
        super::handlers::delete_settlement,
        super::handlers::get_group_balances,
        super::handlers::get_all_user_balances
    ),
    components(schemas(
        CreateGroupRequest,
        AddMemberRequest,
        CreateExpenseRequest,
        UpdateExpenseRequest,
        CreateSettlementRequest,
        HealthResponse,
        ErrorResponse,
        Group,
        GroupMember,
        Role,
        Expense,
        ExpenseSplit,
        ExpenseDetails,
        SplitKind,
        SplitShare,
        Attachment,
        Settlement,
        SettlementView,
        BalanceView,
        Direction
    )),
    modifiers(&BearerAuth),
    info(
        title = "Tripsplit API",
        description = "API for sharing group expenses and settling the resulting debts",
        version = "0.1.0"
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "Bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).bearer_format("JWT").build()),
            );
        }
    }
}
