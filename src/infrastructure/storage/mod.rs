use crate::core::errors::TripsplitError;
use crate::core::models::{
    attachment::Attachment,
    balance::UserBalance,
    expense::{Expense, ExpenseQuery, ExpenseSplit},
    group::{Group, GroupMember},
    settlement::{Settlement, SettlementQuery},
};
use crate::core::money::Money;
use async_trait::async_trait;

/// The ledger's view of persistence: keyed access to `user_balances` rows.
///
/// Reads made through a write transaction see the rows locked for the rest of
/// that transaction.
pub trait BalanceStore {
    fn lock_balance(&self, group_id: &str, debtor_id: &str, creditor_id: &str)
    -> Result<Option<Money>, TripsplitError>;
    fn upsert_balance(&mut self, balance: &UserBalance) -> Result<(), TripsplitError>;
    fn delete_balance(&mut self, group_id: &str, debtor_id: &str, creditor_id: &str) -> Result<(), TripsplitError>;
}

/// Everything a service operation can do inside one database transaction.
pub trait StorageTx: BalanceStore {
    fn insert_group(&mut self, group: &Group) -> Result<(), TripsplitError>;
    fn get_group(&self, group_id: &str) -> Result<Option<Group>, TripsplitError>;
    fn insert_group_member(&mut self, member: &GroupMember) -> Result<(), TripsplitError>;
    fn get_group_member(&self, group_id: &str, user_id: &str) -> Result<Option<GroupMember>, TripsplitError>;
    fn list_group_members(&self, group_id: &str) -> Result<Vec<GroupMember>, TripsplitError>;
    fn list_user_group_ids(&self, user_id: &str) -> Result<Vec<String>, TripsplitError>;

    fn insert_expense(&mut self, expense: &Expense) -> Result<(), TripsplitError>;
    fn update_expense(&mut self, expense: &Expense) -> Result<(), TripsplitError>;
    fn get_expense(&self, expense_id: &str) -> Result<Option<Expense>, TripsplitError>;
    fn list_expenses(&self, group_id: &str, query: &ExpenseQuery) -> Result<Vec<Expense>, TripsplitError>;
    fn delete_expense(&mut self, expense_id: &str) -> Result<(), TripsplitError>;

    fn insert_splits(&mut self, splits: &[ExpenseSplit]) -> Result<(), TripsplitError>;
    fn list_splits(&self, expense_id: &str) -> Result<Vec<ExpenseSplit>, TripsplitError>;
    fn delete_splits(&mut self, expense_id: &str) -> Result<(), TripsplitError>;

    /// Rows of `group_id` where `user_id` is either debtor or creditor.
    fn list_group_balances_for_user(&self, group_id: &str, user_id: &str)
    -> Result<Vec<UserBalance>, TripsplitError>;
    /// Rows of every group where `user_id` is either debtor or creditor.
    fn list_user_balances(&self, user_id: &str) -> Result<Vec<UserBalance>, TripsplitError>;

    fn insert_settlement(&mut self, settlement: &Settlement) -> Result<(), TripsplitError>;
    fn get_settlement(&self, settlement_id: &str) -> Result<Option<Settlement>, TripsplitError>;
    fn list_settlements(&self, group_id: &str, query: &SettlementQuery) -> Result<Vec<Settlement>, TripsplitError>;
    fn delete_settlement(&mut self, settlement_id: &str) -> Result<(), TripsplitError>;

    fn insert_attachment(&mut self, attachment: &Attachment) -> Result<(), TripsplitError>;
    fn get_attachment(&self, attachment_id: &str) -> Result<Option<Attachment>, TripsplitError>;
    fn list_attachments(&self, expense_id: &str) -> Result<Vec<Attachment>, TripsplitError>;
    fn delete_attachment(&mut self, attachment_id: &str) -> Result<(), TripsplitError>;
    fn delete_expense_attachments(&mut self, expense_id: &str) -> Result<(), TripsplitError>;
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// Run `f` against a read-only snapshot.
    async fn read<T, F>(&self, f: F) -> Result<T, TripsplitError>
    where
        T: Send,
        F: FnOnce(&dyn StorageTx) -> Result<T, TripsplitError> + Send;

    /// Run `f` inside one write transaction. The transaction commits only if
    /// `f` returns `Ok`; any error rolls every change back.
    async fn write<T, F>(&self, f: F) -> Result<T, TripsplitError>
    where
        T: Send,
        F: FnOnce(&mut dyn StorageTx) -> Result<T, TripsplitError> + Send;
}

pub mod sqlite;
