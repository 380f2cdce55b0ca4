use crate::auth::jwt::{Claims, JwtService};
use crate::config::Config;
use crate::core::balances::project_balances;
use crate::core::errors::{FieldError, TripsplitError};
use crate::core::ledger::BalanceLedger;
use crate::core::models::{
    attachment::Attachment,
    balance::BalanceView,
    expense::{
        Expense, ExpenseDetails, ExpensePatch, ExpenseQuery, ExpenseSplit, NewExpense, SplitKind, SplitShare, SplitSpec,
    },
    group::{Group, GroupMember, Role},
    settlement::{Settlement, SettlementQuery, SettlementView},
};
use crate::core::money::Money;
use crate::core::split::{compute_equal_split, validate_custom_split};
use crate::infrastructure::blob::{BlobStore, blob_key};
use crate::infrastructure::cache::Cache;
use crate::infrastructure::storage::{BalanceStore, Storage, StorageTx};
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashSet};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

const MAX_TITLE_LENGTH: usize = 255;
const MAX_DESCRIPTION_LENGTH: usize = 1000;
const MAX_NAME_LENGTH: usize = 100;

#[derive(Clone, Debug)]
pub struct ServiceOptions {
    pub balance_cache_ttl: Duration,
    pub max_attachment_bytes: usize,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        ServiceOptions {
            balance_cache_ttl: Duration::from_secs(300),
            max_attachment_bytes: 10 * 1024 * 1024,
        }
    }
}

impl ServiceOptions {
    pub fn from_config(config: &Config) -> Self {
        ServiceOptions {
            balance_cache_ttl: config.balance_cache_ttl(),
            max_attachment_bytes: config.max_attachment_bytes,
        }
    }
}

pub struct TripsplitService<S: Storage, C: Cache, B: BlobStore> {
    storage: S,
    cache: C,
    blobs: B,
    jwt_service: JwtService,
    options: ServiceOptions,
}

fn require_group(tx: &dyn StorageTx, group_id: &str) -> Result<Group, TripsplitError> {
    tx.get_group(group_id)?
        .ok_or_else(|| TripsplitError::GroupNotFound(group_id.to_string()))
}

fn require_member(tx: &dyn StorageTx, group_id: &str, user_id: &str) -> Result<GroupMember, TripsplitError> {
    require_group(tx, group_id)?;
    tx.get_group_member(group_id, user_id)?
        .ok_or_else(|| TripsplitError::NotGroupMember(user_id.to_string()))
}

fn require_expense(tx: &dyn StorageTx, expense_id: &str) -> Result<Expense, TripsplitError> {
    tx.get_expense(expense_id)?
        .ok_or_else(|| TripsplitError::ExpenseNotFound(expense_id.to_string()))
}

fn require_attachment(tx: &dyn StorageTx, expense_id: &str, attachment_id: &str) -> Result<Attachment, TripsplitError> {
    tx.get_attachment(attachment_id)?
        .filter(|a| a.expense_id == expense_id)
        .ok_or_else(|| TripsplitError::AttachmentNotFound(attachment_id.to_string()))
}

/// Per-user shares of `total` for an expense created by `creator_id`.
fn resolve_shares(
    tx: &dyn StorageTx,
    group_id: &str,
    creator_id: &str,
    total: Money,
    split: &SplitSpec,
) -> Result<Vec<SplitShare>, TripsplitError> {
    match split {
        SplitSpec::Equal => {
            let members: Vec<String> = tx
                .list_group_members(group_id)?
                .into_iter()
                .map(|m| m.user_id)
                .collect();
            compute_equal_split(total, &members, creator_id)
        }
        SplitSpec::Custom(shares) => {
            validate_custom_split(total, shares)?;
            for share in shares {
                if tx.get_group_member(group_id, &share.user_id)?.is_none() {
                    return Err(TripsplitError::InvalidSplitUser(share.user_id.clone()));
                }
            }
            Ok(shares.clone())
        }
    }
}

fn split_rows(expense_id: &str, shares: Vec<SplitShare>) -> Vec<ExpenseSplit> {
    shares
        .into_iter()
        .map(|share| ExpenseSplit {
            id: Uuid::new_v4().to_string(),
            expense_id: expense_id.to_string(),
            user_id: share.user_id,
            amount: share.amount,
        })
        .collect()
}

/// Splits that move money in the ledger: everyone but the creator, non-zero.
fn owed_splits<'s>(expense: &'s Expense, splits: &'s [ExpenseSplit]) -> impl Iterator<Item = &'s ExpenseSplit> {
    splits
        .iter()
        .filter(move |s| s.user_id != expense.created_by && s.amount.is_positive())
}

fn apply_expense<St: BalanceStore + ?Sized>(
    ledger: &mut BalanceLedger<'_, St>,
    expense: &Expense,
    splits: &[ExpenseSplit],
) -> Result<(), TripsplitError> {
    for split in owed_splits(expense, splits) {
        ledger.apply_credit(&expense.group_id, &split.user_id, &expense.created_by, split.amount)?;
    }
    Ok(())
}

fn reverse_expense<St: BalanceStore + ?Sized>(
    ledger: &mut BalanceLedger<'_, St>,
    expense: &Expense,
    splits: &[ExpenseSplit],
) -> Result<(), TripsplitError> {
    for split in owed_splits(expense, splits) {
        ledger.reverse_credit(&expense.group_id, &split.user_id, &expense.created_by, split.amount)?;
    }
    Ok(())
}

impl<S: Storage, C: Cache, B: BlobStore> TripsplitService<S, C, B> {
    pub fn new(storage: S, cache: C, blobs: B, jwt_secret: String, options: ServiceOptions) -> Self {
        TripsplitService {
            storage,
            cache,
            blobs,
            jwt_service: JwtService::new(jwt_secret),
            options,
        }
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, TripsplitError> {
        self.jwt_service.validate_token(token)
    }

    pub fn max_attachment_bytes(&self) -> usize {
        self.options.max_attachment_bytes
    }

    fn validate_string_input(&self, field: &str, value: &str, max_length: usize) -> Result<(), TripsplitError> {
        if value.trim().is_empty() {
            return Err(TripsplitError::InvalidInput(
                field.to_string(),
                FieldError {
                    field: field.to_string(),
                    title: format!("Invalid {}", field),
                    description: format!("{} cannot be empty", field),
                },
            ));
        }
        self.validate_optional_text(field, value, max_length)
    }

    fn validate_optional_text(&self, field: &str, value: &str, max_length: usize) -> Result<(), TripsplitError> {
        if value.chars().count() > max_length {
            return Err(TripsplitError::InvalidInput(
                field.to_string(),
                FieldError {
                    field: field.to_string(),
                    title: format!("{} Too Long", field),
                    description: format!("{} cannot exceed {} characters", field, max_length),
                },
            ));
        }
        if value.chars().any(|c| c.is_control() && c != '\n') {
            return Err(TripsplitError::InvalidInput(
                field.to_string(),
                FieldError {
                    field: field.to_string(),
                    title: format!("Invalid {}", field),
                    description: format!("{} contains invalid characters", field),
                },
            ));
        }
        Ok(())
    }

    fn validate_amount_input(&self, field: &str, amount: Money) -> Result<(), TripsplitError> {
        if !amount.is_positive() {
            return Err(TripsplitError::InvalidAmount(format!("{} must be greater than 0", field)));
        }
        if amount.as_decimal() > Decimal::from(1_000_000) {
            return Err(TripsplitError::InvalidInput(
                field.to_string(),
                FieldError {
                    field: field.to_string(),
                    title: "Amount Too Large".to_string(),
                    description: "Amount cannot exceed 1,000,000".to_string(),
                },
            ));
        }
        Ok(())
    }

    fn validate_new_expense(&self, expense: &NewExpense) -> Result<(), TripsplitError> {
        self.validate_string_input("title", &expense.title, MAX_TITLE_LENGTH)?;
        if let Some(description) = &expense.description {
            self.validate_optional_text("description", description, MAX_DESCRIPTION_LENGTH)?;
        }
        self.validate_amount_input("total_amount", expense.total_amount)?;
        if let SplitSpec::Custom(shares) = &expense.split {
            validate_custom_split(expense.total_amount, shares)?;
        }
        Ok(())
    }

    /// Drop cached balances of every user whose ledger rows changed.
    ///
    /// Runs after commit; a failure only leaves entries to expire on their TTL.
    async fn invalidate_balances(&self, touched: BTreeSet<String>) {
        if touched.is_empty() {
            return;
        }
        let user_ids: Vec<String> = touched.into_iter().collect();
        if let Err(e) = self.cache.invalidate_user_balances(&user_ids).await {
            warn!(error = %e, "Failed to invalidate cached balances");
        }
    }

    async fn delete_blob(&self, key: &str) {
        if let Err(e) = self.blobs.delete(key).await {
            warn!(key, error = %e, "Failed to delete attachment payload");
        }
    }

    pub async fn create_group(
        &self,
        name: String,
        created_by: &str,
        member_ids: Vec<String>,
    ) -> Result<Group, TripsplitError> {
        self.validate_string_input("name", &name, MAX_NAME_LENGTH)?;
        self.validate_string_input("created_by", created_by, MAX_NAME_LENGTH)?;
        for member_id in &member_ids {
            self.validate_string_input("member_ids", member_id, MAX_NAME_LENGTH)?;
        }

        let now = Utc::now();
        let group = Group {
            id: Uuid::new_v4().to_string(),
            name,
            created_by: created_by.to_string(),
            created_at: now,
        };

        let mut seen = HashSet::new();
        let members: Vec<GroupMember> = std::iter::once(created_by.to_string())
            .chain(member_ids)
            .filter(|id| seen.insert(id.clone()))
            .map(|user_id| GroupMember {
                group_id: group.id.clone(),
                role: if user_id == created_by { Role::Owner } else { Role::Member },
                user_id,
                joined_at: now,
            })
            .collect();

        let stored = group.clone();
        self.storage
            .write(move |tx| {
                tx.insert_group(&stored)?;
                for member in &members {
                    tx.insert_group_member(member)?;
                }
                Ok(())
            })
            .await?;

        info!(group_id = %group.id, created_by, "Group created");
        Ok(group)
    }

    pub async fn add_member(&self, group_id: &str, user_id: &str, added_by: &str) -> Result<GroupMember, TripsplitError> {
        self.validate_string_input("user_id", user_id, MAX_NAME_LENGTH)?;

        let member = self
            .storage
            .write(|tx| {
                let adder = require_member(&*tx, group_id, added_by)?;
                if !adder.is_owner() {
                    return Err(TripsplitError::NotGroupOwner(added_by.to_string()));
                }
                if tx.get_group_member(group_id, user_id)?.is_some() {
                    return Err(TripsplitError::AlreadyGroupMember(user_id.to_string()));
                }
                let member = GroupMember {
                    group_id: group_id.to_string(),
                    user_id: user_id.to_string(),
                    role: Role::Member,
                    joined_at: Utc::now(),
                };
                tx.insert_group_member(&member)?;
                Ok(member)
            })
            .await?;

        info!(group_id, user_id, added_by, "Member added");
        Ok(member)
    }

    pub async fn list_members(&self, group_id: &str, requested_by: &str) -> Result<Vec<GroupMember>, TripsplitError> {
        self.storage
            .read(|tx| {
                require_member(tx, group_id, requested_by)?;
                tx.list_group_members(group_id)
            })
            .await
    }

    pub async fn create_expense(&self, created_by: &str, new_expense: NewExpense) -> Result<ExpenseDetails, TripsplitError> {
        self.validate_new_expense(&new_expense)?;

        let expense = Expense {
            id: Uuid::new_v4().to_string(),
            group_id: new_expense.group_id.clone(),
            created_by: created_by.to_string(),
            title: new_expense.title.trim().to_string(),
            description: new_expense.description.clone(),
            total_amount: new_expense.total_amount,
            split_kind: new_expense.split.kind(),
            created_at: Utc::now(),
        };

        let stored = expense.clone();
        let (splits, touched) = self
            .storage
            .write(move |tx| {
                require_member(&*tx, &stored.group_id, &stored.created_by)?;
                let shares = resolve_shares(
                    &*tx,
                    &stored.group_id,
                    &stored.created_by,
                    stored.total_amount,
                    &new_expense.split,
                )?;
                let splits = split_rows(&stored.id, shares);

                tx.insert_expense(&stored)?;
                tx.insert_splits(&splits)?;

                let mut ledger = BalanceLedger::new(&mut *tx);
                apply_expense(&mut ledger, &stored, &splits)?;
                Ok((splits, ledger.into_touched_users()))
            })
            .await?;

        self.invalidate_balances(touched).await;
        info!(
            expense_id = %expense.id,
            group_id = %expense.group_id,
            created_by,
            total_amount = %expense.total_amount,
            split_kind = %expense.split_kind,
            "Expense created"
        );

        Ok(ExpenseDetails {
            expense,
            splits,
            attachments: Vec::new(),
            can_edit: true,
        })
    }

    pub async fn get_expense(&self, expense_id: &str, requested_by: &str) -> Result<ExpenseDetails, TripsplitError> {
        self.storage
            .read(|tx| {
                let expense = require_expense(tx, expense_id)?;
                require_member(tx, &expense.group_id, requested_by)?;
                let splits = tx.list_splits(expense_id)?;
                let attachments = tx.list_attachments(expense_id)?;
                let can_edit = expense.created_by == requested_by;
                Ok(ExpenseDetails {
                    expense,
                    splits,
                    attachments,
                    can_edit,
                })
            })
            .await
    }

    pub async fn list_expenses(
        &self,
        group_id: &str,
        requested_by: &str,
        query: ExpenseQuery,
    ) -> Result<Vec<Expense>, TripsplitError> {
        self.storage
            .read(|tx| {
                require_member(tx, group_id, requested_by)?;
                tx.list_expenses(group_id, &query)
            })
            .await
    }

    /// Apply `patch` to an expense. Changing the amount or the split re-folds
    /// the expense into the ledger: the old splits are reversed and the new
    /// ones applied in the same transaction.
    pub async fn update_expense(
        &self,
        expense_id: &str,
        requested_by: &str,
        patch: ExpensePatch,
    ) -> Result<ExpenseDetails, TripsplitError> {
        if let Some(title) = &patch.title {
            self.validate_string_input("title", title, MAX_TITLE_LENGTH)?;
        }
        if let Some(description) = &patch.description {
            self.validate_optional_text("description", description, MAX_DESCRIPTION_LENGTH)?;
        }
        if let Some(total_amount) = patch.total_amount {
            self.validate_amount_input("total_amount", total_amount)?;
        }

        let (details, touched) = self
            .storage
            .write(|tx| {
                let mut expense = require_expense(&*tx, expense_id)?;
                require_member(&*tx, &expense.group_id, requested_by)?;
                if expense.created_by != requested_by {
                    return Err(TripsplitError::Forbidden(
                        "Only the creator can edit this expense".to_string(),
                    ));
                }

                let old_splits = tx.list_splits(expense_id)?;
                let new_total = patch.total_amount.unwrap_or(expense.total_amount);
                let new_split = match &patch.split {
                    _ if !patch.touches_ledger() => None,
                    Some(split) => Some(split.clone()),
                    None if new_total == expense.total_amount => None,
                    None => match expense.split_kind {
                        SplitKind::Equal => Some(SplitSpec::Equal),
                        SplitKind::Custom => {
                            return Err(TripsplitError::SplitMismatch {
                                expected: new_total,
                                actual: old_splits.iter().map(|s| s.amount).sum(),
                            });
                        }
                    },
                };

                let mut touched = BTreeSet::new();
                let splits = match new_split {
                    Some(split) => {
                        let shares = resolve_shares(&*tx, &expense.group_id, &expense.created_by, new_total, &split)?;
                        let new_splits = split_rows(&expense.id, shares);

                        let mut ledger = BalanceLedger::new(&mut *tx);
                        reverse_expense(&mut ledger, &expense, &old_splits)?;
                        apply_expense(&mut ledger, &expense, &new_splits)?;
                        touched = ledger.into_touched_users();

                        tx.delete_splits(&expense.id)?;
                        tx.insert_splits(&new_splits)?;
                        expense.total_amount = new_total;
                        expense.split_kind = split.kind();
                        new_splits
                    }
                    None => old_splits,
                };

                if let Some(title) = &patch.title {
                    expense.title = title.trim().to_string();
                }
                if let Some(description) = &patch.description {
                    expense.description = Some(description.clone());
                }
                tx.update_expense(&expense)?;

                let attachments = tx.list_attachments(&expense.id)?;
                Ok((
                    ExpenseDetails {
                        expense,
                        splits,
                        attachments,
                        can_edit: true,
                    },
                    touched,
                ))
            })
            .await?;

        let refolded = !touched.is_empty();
        self.invalidate_balances(touched).await;
        info!(expense_id, requested_by, refolded, "Expense updated");
        Ok(details)
    }

    /// Delete an expense with its splits and attachments, reversing its
    /// effect on the ledger. Attachment payloads are removed after commit.
    pub async fn delete_expense(&self, group_id: &str, expense_id: &str, requested_by: &str) -> Result<(), TripsplitError> {
        let (attachments, touched) = self
            .storage
            .write(|tx| {
                let expense = require_expense(&*tx, expense_id)?;
                if expense.group_id != group_id {
                    return Err(TripsplitError::ExpenseNotFound(expense_id.to_string()));
                }
                if expense.created_by != requested_by {
                    return Err(TripsplitError::Forbidden(
                        "Only the creator can delete this expense".to_string(),
                    ));
                }

                let splits = tx.list_splits(expense_id)?;
                let mut ledger = BalanceLedger::new(&mut *tx);
                reverse_expense(&mut ledger, &expense, &splits)?;
                let touched = ledger.into_touched_users();

                let attachments = tx.list_attachments(expense_id)?;
                tx.delete_expense_attachments(expense_id)?;
                tx.delete_splits(expense_id)?;
                tx.delete_expense(expense_id)?;
                Ok((attachments, touched))
            })
            .await?;

        for attachment in &attachments {
            self.delete_blob(&attachment.file_url).await;
        }
        self.invalidate_balances(touched).await;
        info!(
            expense_id,
            group_id,
            requested_by,
            attachments = attachments.len(),
            "Expense deleted"
        );
        Ok(())
    }

    pub async fn upload_attachment(
        &self,
        expense_id: &str,
        uploaded_by: &str,
        original_filename: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<Attachment, TripsplitError> {
        self.validate_string_input("filename", original_filename, MAX_TITLE_LENGTH)?;
        self.validate_string_input("content_type", content_type, MAX_NAME_LENGTH)?;
        if bytes.len() > self.options.max_attachment_bytes {
            return Err(TripsplitError::AttachmentTooLarge {
                size: bytes.len(),
                limit: self.options.max_attachment_bytes,
            });
        }

        self.storage
            .read(|tx| {
                let expense = require_expense(tx, expense_id)?;
                require_member(tx, &expense.group_id, uploaded_by)
            })
            .await?;

        let id = Uuid::new_v4().to_string();
        let attachment = Attachment {
            file_url: blob_key(&id, original_filename),
            id,
            expense_id: expense_id.to_string(),
            original_filename: original_filename.to_string(),
            content_type: content_type.to_string(),
            uploaded_by: uploaded_by.to_string(),
            uploaded_at: Utc::now(),
        };
        let size = bytes.len();
        self.blobs.put(&attachment.file_url, bytes, content_type).await?;

        let stored = attachment.clone();
        let inserted = self
            .storage
            .write(move |tx| {
                require_expense(&*tx, &stored.expense_id)?;
                tx.insert_attachment(&stored)
            })
            .await;
        if let Err(e) = inserted {
            self.delete_blob(&attachment.file_url).await;
            return Err(e);
        }

        info!(attachment_id = %attachment.id, expense_id, uploaded_by, size, "Attachment uploaded");
        Ok(attachment)
    }

    pub async fn list_attachments(&self, expense_id: &str, requested_by: &str) -> Result<Vec<Attachment>, TripsplitError> {
        self.storage
            .read(|tx| {
                let expense = require_expense(tx, expense_id)?;
                require_member(tx, &expense.group_id, requested_by)?;
                tx.list_attachments(expense_id)
            })
            .await
    }

    pub async fn get_attachment_content(
        &self,
        expense_id: &str,
        attachment_id: &str,
        requested_by: &str,
    ) -> Result<(Attachment, Vec<u8>), TripsplitError> {
        let attachment = self
            .storage
            .read(|tx| {
                let expense = require_expense(tx, expense_id)?;
                require_member(tx, &expense.group_id, requested_by)?;
                require_attachment(tx, expense_id, attachment_id)
            })
            .await?;

        let bytes = self.blobs.get(&attachment.file_url).await?.ok_or_else(|| {
            TripsplitError::StorageError(format!("Payload of attachment {} is missing", attachment.id))
        })?;
        Ok((attachment, bytes))
    }

    pub async fn delete_attachment(
        &self,
        expense_id: &str,
        attachment_id: &str,
        requested_by: &str,
    ) -> Result<(), TripsplitError> {
        let attachment = self
            .storage
            .write(|tx| {
                let expense = require_expense(&*tx, expense_id)?;
                let attachment = require_attachment(&*tx, expense_id, attachment_id)?;
                if expense.created_by != requested_by {
                    return Err(TripsplitError::Forbidden(
                        "Only the expense creator can delete its attachments".to_string(),
                    ));
                }
                tx.delete_attachment(attachment_id)?;
                Ok(attachment)
            })
            .await?;

        self.delete_blob(&attachment.file_url).await;
        info!(attachment_id, expense_id, requested_by, "Attachment deleted");
        Ok(())
    }

    pub async fn create_settlement(
        &self,
        group_id: &str,
        paid_by: &str,
        paid_to: &str,
        amount: Money,
        note: Option<String>,
    ) -> Result<Settlement, TripsplitError> {
        if paid_by == paid_to {
            return Err(TripsplitError::SelfSettlement);
        }
        self.validate_amount_input("amount", amount)?;
        if let Some(note) = &note {
            self.validate_optional_text("note", note, MAX_TITLE_LENGTH)?;
        }

        let settlement = Settlement {
            id: Uuid::new_v4().to_string(),
            group_id: group_id.to_string(),
            paid_by: paid_by.to_string(),
            paid_to: paid_to.to_string(),
            amount,
            note,
            settled_at: Utc::now(),
        };

        let stored = settlement.clone();
        let touched = self
            .storage
            .write(move |tx| {
                require_member(&*tx, &stored.group_id, &stored.paid_by)?;
                if tx.get_group_member(&stored.group_id, &stored.paid_to)?.is_none() {
                    return Err(TripsplitError::NotGroupMember(stored.paid_to.clone()));
                }

                let mut ledger = BalanceLedger::new(&mut *tx);
                ledger.settle(&stored.group_id, &stored.paid_by, &stored.paid_to, stored.amount)?;
                let touched = ledger.into_touched_users();

                tx.insert_settlement(&stored)?;
                Ok(touched)
            })
            .await?;

        self.invalidate_balances(touched).await;
        info!(
            settlement_id = %settlement.id,
            group_id,
            paid_by,
            paid_to,
            amount = %settlement.amount,
            "Settlement created"
        );
        Ok(settlement)
    }

    /// Delete a settlement, restoring the debt it paid off. Only the payer may
    /// delete it.
    pub async fn delete_settlement(&self, group_id: &str, settlement_id: &str, requested_by: &str) -> Result<(), TripsplitError> {
        let touched = self
            .storage
            .write(|tx| {
                let settlement = tx
                    .get_settlement(settlement_id)?
                    .filter(|s| s.group_id == group_id)
                    .ok_or_else(|| TripsplitError::SettlementNotFound(settlement_id.to_string()))?;
                if settlement.paid_by != requested_by {
                    return Err(TripsplitError::Forbidden(
                        "Only the payer can delete this settlement".to_string(),
                    ));
                }

                let mut ledger = BalanceLedger::new(&mut *tx);
                ledger.unsettle(group_id, &settlement.paid_by, &settlement.paid_to, settlement.amount)?;
                let touched = ledger.into_touched_users();

                tx.delete_settlement(settlement_id)?;
                Ok(touched)
            })
            .await?;

        self.invalidate_balances(touched).await;
        info!(settlement_id, group_id, requested_by, "Settlement deleted");
        Ok(())
    }

    pub async fn get_settlement(
        &self,
        group_id: &str,
        settlement_id: &str,
        requested_by: &str,
    ) -> Result<SettlementView, TripsplitError> {
        self.storage
            .read(|tx| {
                require_member(tx, group_id, requested_by)?;
                let settlement = tx
                    .get_settlement(settlement_id)?
                    .filter(|s| s.group_id == group_id)
                    .ok_or_else(|| TripsplitError::SettlementNotFound(settlement_id.to_string()))?;
                Ok(SettlementView::for_user(settlement, requested_by))
            })
            .await
    }

    pub async fn list_settlements(
        &self,
        group_id: &str,
        requested_by: &str,
        query: SettlementQuery,
    ) -> Result<Vec<SettlementView>, TripsplitError> {
        self.storage
            .read(|tx| {
                require_member(tx, group_id, requested_by)?;
                Ok(tx
                    .list_settlements(group_id, &query)?
                    .into_iter()
                    .map(|s| SettlementView::for_user(s, requested_by))
                    .collect())
            })
            .await
    }

    pub async fn get_group_balances(&self, group_id: &str, user_id: &str) -> Result<Vec<BalanceView>, TripsplitError> {
        let rows = self
            .storage
            .read(|tx| {
                require_member(tx, group_id, user_id)?;
                tx.list_group_balances_for_user(group_id, user_id)
            })
            .await?;
        Ok(project_balances(user_id, &rows))
    }

    /// Balances of `user_id` across every group they belong to, served from
    /// the cache while fresh.
    pub async fn get_all_user_balances(&self, user_id: &str) -> Result<Vec<BalanceView>, TripsplitError> {
        if let Some(balances) = self.cache.get_user_balances(user_id).await? {
            debug!(user_id, "Balances served from cache");
            return Ok(balances);
        }

        // Read before loading so a fill racing an invalidation is discarded.
        let generation = self.cache.balances_generation(user_id).await?;
        let rows = self
            .storage
            .read(|tx| {
                let group_ids: HashSet<String> = tx.list_user_group_ids(user_id)?.into_iter().collect();
                Ok(tx
                    .list_user_balances(user_id)?
                    .into_iter()
                    .filter(|row| group_ids.contains(&row.group_id))
                    .collect::<Vec<_>>())
            })
            .await?;
        let balances = project_balances(user_id, &rows);

        let stored = self
            .cache
            .save_user_balances(user_id, &balances, generation, self.options.balance_cache_ttl)
            .await?;
        if !stored {
            debug!(user_id, "Balances changed during load, not cached");
        }
        Ok(balances)
    }
}
