use crate::{
    api::models::*,
    auth::jwt::Claims,
    core::{
        errors::TripsplitError,
        models::{
            attachment::Attachment,
            balance::BalanceView,
            expense::{Expense, ExpenseDetails},
            group::{Group, GroupMember},
            settlement::{Settlement, SettlementView},
        },
        services::TripsplitService,
    },
    infrastructure::{blob::local::LocalBlobStore, cache::in_memory::InMemoryCache, storage::sqlite::SqliteStorage},
};
use axum::{
    Extension, Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::IntoResponse,
};
use http::header;
use tower_http::limit::RequestBodyLimitLayer;

use std::sync::Arc;

pub type AppService = TripsplitService<SqliteStorage, InMemoryCache, LocalBlobStore>;

// Middleware to validate JWT
async fn auth_middleware(
    State(service): State<Arc<AppService>>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<impl IntoResponse, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| TripsplitError::Unauthenticated("Missing Authorization header".to_string()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| TripsplitError::Unauthenticated("Invalid Authorization header".to_string()))?;

    let claims = service.validate_token(token)?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

// Define API routes
pub fn api_routes(service: Arc<AppService>) -> Router {
    // Oversized uploads past this are cut off with 413; the service reports the exact limit.
    let body_limit = service.max_attachment_bytes().saturating_add(1);

    Router::new()
        .route("/groups", axum::routing::post(create_group))
        .route(
            "/groups/{group_id}/members",
            axum::routing::get(list_members).post(add_member),
        )
        .route(
            "/groups/{group_id}/expenses",
            axum::routing::get(list_expenses).post(create_expense),
        )
        .route(
            "/groups/{group_id}/expenses/{expense_id}",
            axum::routing::delete(delete_expense),
        )
        .route(
            "/expenses/{expense_id}",
            axum::routing::get(get_expense).patch(update_expense),
        )
        .route(
            "/expenses/{expense_id}/attachments",
            axum::routing::get(list_attachments).post(upload_attachment),
        )
        .route(
            "/expenses/{expense_id}/attachments/{attachment_id}",
            axum::routing::get(get_attachment).delete(delete_attachment),
        )
        .route(
            "/groups/{group_id}/settlements",
            axum::routing::get(list_settlements).post(create_settlement),
        )
        .route(
            "/groups/{group_id}/settlements/{settlement_id}",
            axum::routing::get(get_settlement).delete(delete_settlement),
        )
        .route("/groups/{group_id}/balances", axum::routing::get(get_group_balances))
        .route("/balances", axum::routing::get(get_all_user_balances))
        .route_layer(middleware::from_fn_with_state(service.clone(), auth_middleware))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .with_state(service)
}

#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    )
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

#[utoipa::path(
    post,
    path = "/api/groups",
    request_body = CreateGroupRequest,
    responses(
        (status = 201, description = "Group created successfully", body = Group),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn create_group(
    State(service): State<Arc<AppService>>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<Group>), ApiError> {
    let group = service.create_group(req.name, &claims.sub, req.member_ids).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

#[utoipa::path(
    get,
    path = "/api/groups/{group_id}/members",
    params(
        ("group_id" = String, Path, description = "ID of the group")
    ),
    responses(
        (status = 200, description = "Members retrieved successfully", body = Vec<GroupMember>),
        (status = 403, description = "Not a group member", body = ErrorResponse),
        (status = 404, description = "Group not found", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn list_members(
    State(service): State<Arc<AppService>>,
    Extension(claims): Extension<Claims>,
    Path(group_id): Path<String>,
) -> Result<Json<Vec<GroupMember>>, ApiError> {
    let members = service.list_members(&group_id, &claims.sub).await?;
    Ok(Json(members))
}

#[utoipa::path(
    post,
    path = "/api/groups/{group_id}/members",
    params(
        ("group_id" = String, Path, description = "ID of the group")
    ),
    request_body = AddMemberRequest,
    responses(
        (status = 201, description = "Member added successfully", body = GroupMember),
        (status = 403, description = "Not the group owner", body = ErrorResponse),
        (status = 404, description = "Group not found", body = ErrorResponse),
        (status = 409, description = "Already a member", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn add_member(
    State(service): State<Arc<AppService>>,
    Extension(claims): Extension<Claims>,
    Path(group_id): Path<String>,
    Json(req): Json<AddMemberRequest>,
) -> Result<(StatusCode, Json<GroupMember>), ApiError> {
    let member = service.add_member(&group_id, &req.user_id, &claims.sub).await?;
    Ok((StatusCode::CREATED, Json(member)))
}

#[utoipa::path(
    get,
    path = "/api/groups/{group_id}/expenses",
    params(
        ("group_id" = String, Path, description = "ID of the group"),
        ExpenseListParams
    ),
    responses(
        (status = 200, description = "Expenses retrieved successfully", body = Vec<Expense>),
        (status = 403, description = "Not a group member", body = ErrorResponse),
        (status = 404, description = "Group not found", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn list_expenses(
    State(service): State<Arc<AppService>>,
    Extension(claims): Extension<Claims>,
    Path(group_id): Path<String>,
    Query(params): Query<ExpenseListParams>,
) -> Result<Json<Vec<Expense>>, ApiError> {
    let expenses = service.list_expenses(&group_id, &claims.sub, params.into()).await?;
    Ok(Json(expenses))
}

#[utoipa::path(
    post,
    path = "/api/groups/{group_id}/expenses",
    params(
        ("group_id" = String, Path, description = "ID of the group")
    ),
    request_body = CreateExpenseRequest,
    responses(
        (status = 201, description = "Expense created successfully", body = ExpenseDetails),
        (status = 400, description = "Invalid amount or split", body = ErrorResponse),
        (status = 403, description = "Not a group member", body = ErrorResponse),
        (status = 404, description = "Group not found", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn create_expense(
    State(service): State<Arc<AppService>>,
    Extension(claims): Extension<Claims>,
    Path(group_id): Path<String>,
    Json(req): Json<CreateExpenseRequest>,
) -> Result<(StatusCode, Json<ExpenseDetails>), ApiError> {
    let details = service
        .create_expense(&claims.sub, req.into_new_expense(group_id))
        .await?;
    Ok((StatusCode::CREATED, Json(details)))
}

#[utoipa::path(
    delete,
    path = "/api/groups/{group_id}/expenses/{expense_id}",
    params(
        ("group_id" = String, Path, description = "ID of the group"),
        ("expense_id" = String, Path, description = "ID of the expense")
    ),
    responses(
        (status = 204, description = "Expense deleted"),
        (status = 403, description = "Only the creator can delete", body = ErrorResponse),
        (status = 404, description = "Expense not found", body = ErrorResponse),
        (status = 409, description = "Ledger out of sync with the expense", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn delete_expense(
    State(service): State<Arc<AppService>>,
    Extension(claims): Extension<Claims>,
    Path((group_id, expense_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    service.delete_expense(&group_id, &expense_id, &claims.sub).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/expenses/{expense_id}",
    params(
        ("expense_id" = String, Path, description = "ID of the expense")
    ),
    responses(
        (status = 200, description = "Expense with splits and attachments", body = ExpenseDetails),
        (status = 403, description = "Not a group member", body = ErrorResponse),
        (status = 404, description = "Expense not found", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn get_expense(
    State(service): State<Arc<AppService>>,
    Extension(claims): Extension<Claims>,
    Path(expense_id): Path<String>,
) -> Result<Json<ExpenseDetails>, ApiError> {
    let details = service.get_expense(&expense_id, &claims.sub).await?;
    Ok(Json(details))
}

#[utoipa::path(
    patch,
    path = "/api/expenses/{expense_id}",
    params(
        ("expense_id" = String, Path, description = "ID of the expense")
    ),
    request_body = UpdateExpenseRequest,
    responses(
        (status = 200, description = "Expense updated", body = ExpenseDetails),
        (status = 400, description = "Invalid amount or split", body = ErrorResponse),
        (status = 403, description = "Only the creator can edit", body = ErrorResponse),
        (status = 404, description = "Expense not found", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn update_expense(
    State(service): State<Arc<AppService>>,
    Extension(claims): Extension<Claims>,
    Path(expense_id): Path<String>,
    Json(req): Json<UpdateExpenseRequest>,
) -> Result<Json<ExpenseDetails>, ApiError> {
    let details = service.update_expense(&expense_id, &claims.sub, req.into()).await?;
    Ok(Json(details))
}

#[utoipa::path(
    get,
    path = "/api/expenses/{expense_id}/attachments",
    params(
        ("expense_id" = String, Path, description = "ID of the expense")
    ),
    responses(
        (status = 200, description = "Attachments of the expense", body = Vec<Attachment>),
        (status = 403, description = "Not a group member", body = ErrorResponse),
        (status = 404, description = "Expense not found", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn list_attachments(
    State(service): State<Arc<AppService>>,
    Extension(claims): Extension<Claims>,
    Path(expense_id): Path<String>,
) -> Result<Json<Vec<Attachment>>, ApiError> {
    let attachments = service.list_attachments(&expense_id, &claims.sub).await?;
    Ok(Json(attachments))
}

#[utoipa::path(
    post,
    path = "/api/expenses/{expense_id}/attachments",
    params(
        ("expense_id" = String, Path, description = "ID of the expense"),
        UploadParams
    ),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 201, description = "Attachment stored", body = Attachment),
        (status = 400, description = "Attachment too large", body = ErrorResponse),
        (status = 403, description = "Not a group member", body = ErrorResponse),
        (status = 404, description = "Expense not found", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn upload_attachment(
    State(service): State<Arc<AppService>>,
    Extension(claims): Extension<Claims>,
    Path(expense_id): Path<String>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Attachment>), ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("application/octet-stream");
    let attachment = service
        .upload_attachment(&expense_id, &claims.sub, &params.filename, content_type, body.to_vec())
        .await?;
    Ok((StatusCode::CREATED, Json(attachment)))
}

#[utoipa::path(
    get,
    path = "/api/expenses/{expense_id}/attachments/{attachment_id}",
    params(
        ("expense_id" = String, Path, description = "ID of the expense"),
        ("attachment_id" = String, Path, description = "ID of the attachment")
    ),
    responses(
        (status = 200, description = "Attachment payload", content_type = "application/octet-stream"),
        (status = 403, description = "Not a group member", body = ErrorResponse),
        (status = 404, description = "Attachment not found", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn get_attachment(
    State(service): State<Arc<AppService>>,
    Extension(claims): Extension<Claims>,
    Path((expense_id, attachment_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let (attachment, bytes) = service
        .get_attachment_content(&expense_id, &attachment_id, &claims.sub)
        .await?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        attachment.original_filename.replace(['"', '\\'], "_")
    );
    Ok((
        [
            (header::CONTENT_TYPE, attachment.content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

#[utoipa::path(
    delete,
    path = "/api/expenses/{expense_id}/attachments/{attachment_id}",
    params(
        ("expense_id" = String, Path, description = "ID of the expense"),
        ("attachment_id" = String, Path, description = "ID of the attachment")
    ),
    responses(
        (status = 204, description = "Attachment deleted"),
        (status = 403, description = "Only the expense creator can delete", body = ErrorResponse),
        (status = 404, description = "Attachment not found", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn delete_attachment(
    State(service): State<Arc<AppService>>,
    Extension(claims): Extension<Claims>,
    Path((expense_id, attachment_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    service
        .delete_attachment(&expense_id, &attachment_id, &claims.sub)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/groups/{group_id}/settlements",
    params(
        ("group_id" = String, Path, description = "ID of the group"),
        SettlementListParams
    ),
    responses(
        (status = 200, description = "Settlements retrieved successfully", body = Vec<SettlementView>),
        (status = 403, description = "Not a group member", body = ErrorResponse),
        (status = 404, description = "Group not found", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn list_settlements(
    State(service): State<Arc<AppService>>,
    Extension(claims): Extension<Claims>,
    Path(group_id): Path<String>,
    Query(params): Query<SettlementListParams>,
) -> Result<Json<Vec<SettlementView>>, ApiError> {
    let settlements = service.list_settlements(&group_id, &claims.sub, params.into()).await?;
    Ok(Json(settlements))
}

#[utoipa::path(
    post,
    path = "/api/groups/{group_id}/settlements",
    params(
        ("group_id" = String, Path, description = "ID of the group")
    ),
    request_body = CreateSettlementRequest,
    responses(
        (status = 201, description = "Settlement recorded", body = Settlement),
        (status = 400, description = "Invalid amount or self settlement", body = ErrorResponse),
        (status = 404, description = "No balance to settle", body = ErrorResponse),
        (status = 422, description = "Amount exceeds debt", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn create_settlement(
    State(service): State<Arc<AppService>>,
    Extension(claims): Extension<Claims>,
    Path(group_id): Path<String>,
    Json(req): Json<CreateSettlementRequest>,
) -> Result<(StatusCode, Json<Settlement>), ApiError> {
    let settlement = service
        .create_settlement(&group_id, &claims.sub, &req.paid_to, req.amount, req.note)
        .await?;
    Ok((StatusCode::CREATED, Json(settlement)))
}

#[utoipa::path(
    get,
    path = "/api/groups/{group_id}/settlements/{settlement_id}",
    params(
        ("group_id" = String, Path, description = "ID of the group"),
        ("settlement_id" = String, Path, description = "ID of the settlement")
    ),
    responses(
        (status = 200, description = "Settlement retrieved", body = SettlementView),
        (status = 403, description = "Not a group member", body = ErrorResponse),
        (status = 404, description = "Settlement not found", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn get_settlement(
    State(service): State<Arc<AppService>>,
    Extension(claims): Extension<Claims>,
    Path((group_id, settlement_id)): Path<(String, String)>,
) -> Result<Json<SettlementView>, ApiError> {
    let settlement = service.get_settlement(&group_id, &settlement_id, &claims.sub).await?;
    Ok(Json(settlement))
}

#[utoipa::path(
    delete,
    path = "/api/groups/{group_id}/settlements/{settlement_id}",
    params(
        ("group_id" = String, Path, description = "ID of the group"),
        ("settlement_id" = String, Path, description = "ID of the settlement")
    ),
    responses(
        (status = 204, description = "Settlement deleted and debt restored"),
        (status = 403, description = "Only the payer can delete", body = ErrorResponse),
        (status = 404, description = "Settlement not found", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn delete_settlement(
    State(service): State<Arc<AppService>>,
    Extension(claims): Extension<Claims>,
    Path((group_id, settlement_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    service.delete_settlement(&group_id, &settlement_id, &claims.sub).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/groups/{group_id}/balances",
    params(
        ("group_id" = String, Path, description = "ID of the group")
    ),
    responses(
        (status = 200, description = "Caller's balances in the group", body = Vec<BalanceView>),
        (status = 403, description = "Not a group member", body = ErrorResponse),
        (status = 404, description = "Group not found", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn get_group_balances(
    State(service): State<Arc<AppService>>,
    Extension(claims): Extension<Claims>,
    Path(group_id): Path<String>,
) -> Result<Json<Vec<BalanceView>>, ApiError> {
    let balances = service.get_group_balances(&group_id, &claims.sub).await?;
    Ok(Json(balances))
}

#[utoipa::path(
    get,
    path = "/api/balances",
    responses(
        (status = 200, description = "Caller's balances across all groups", body = Vec<BalanceView>),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn get_all_user_balances(
    State(service): State<Arc<AppService>>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<BalanceView>>, ApiError> {
    let balances = service.get_all_user_balances(&claims.sub).await?;
    Ok(Json(balances))
}
