//! SQLite backed storage.
//!
//! A single connection sits behind `Arc<Mutex<_>>`. Writes open the transaction
//! with `BEGIN IMMEDIATE`, so the write lock is held from the first read of a
//! balance row until commit and concurrent read-modify-write cycles serialize.
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{
    Connection, OptionalExtension, Row, TransactionBehavior, params, params_from_iter,
    types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Value, ValueRef},
};
use tracing::debug;

use crate::core::errors::TripsplitError;
use crate::core::models::{
    attachment::Attachment,
    balance::UserBalance,
    expense::{Expense, ExpenseQuery, ExpenseSplit, SplitKind},
    group::{Group, GroupMember, Role},
    settlement::{Settlement, SettlementQuery},
};
use crate::core::money::Money;
use crate::infrastructure::storage::{BalanceStore, Storage, StorageTx};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS groups (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    created_by TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS group_members (
    group_id TEXT NOT NULL REFERENCES groups(id),
    user_id TEXT NOT NULL,
    role TEXT NOT NULL CHECK (role IN ('OWNER', 'MEMBER')),
    joined_at TEXT NOT NULL,
    PRIMARY KEY (group_id, user_id)
);

CREATE TABLE IF NOT EXISTS expenses (
    id TEXT PRIMARY KEY,
    group_id TEXT NOT NULL REFERENCES groups(id),
    created_by TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT,
    total_amount_cents INTEGER NOT NULL CHECK (total_amount_cents > 0),
    split_kind TEXT NOT NULL CHECK (split_kind IN ('EQUAL', 'CUSTOM')),
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS expense_splits (
    id TEXT PRIMARY KEY,
    expense_id TEXT NOT NULL REFERENCES expenses(id),
    user_id TEXT NOT NULL,
    amount_cents INTEGER NOT NULL CHECK (amount_cents >= 0),
    UNIQUE (expense_id, user_id)
);

CREATE TABLE IF NOT EXISTS user_balances (
    debtor_id TEXT NOT NULL,
    creditor_id TEXT NOT NULL,
    group_id TEXT NOT NULL REFERENCES groups(id),
    amount_cents INTEGER NOT NULL CHECK (amount_cents > 0),
    PRIMARY KEY (debtor_id, creditor_id, group_id),
    CHECK (debtor_id <> creditor_id)
);

CREATE TABLE IF NOT EXISTS settlements (
    id TEXT PRIMARY KEY,
    group_id TEXT NOT NULL REFERENCES groups(id),
    paid_by TEXT NOT NULL,
    paid_to TEXT NOT NULL,
    amount_cents INTEGER NOT NULL CHECK (amount_cents > 0),
    note TEXT,
    settled_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS attachments (
    id TEXT PRIMARY KEY,
    expense_id TEXT NOT NULL REFERENCES expenses(id),
    original_filename TEXT NOT NULL,
    content_type TEXT NOT NULL,
    file_url TEXT NOT NULL,
    uploaded_by TEXT NOT NULL,
    uploaded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_expenses_group ON expenses(group_id);
CREATE INDEX IF NOT EXISTS idx_settlements_group ON settlements(group_id);
CREATE INDEX IF NOT EXISTS idx_user_balances_creditor ON user_balances(creditor_id, group_id);
";

const EXPENSE_COLUMNS: &str =
    "id, group_id, created_by, title, description, total_amount_cents, split_kind, created_at";
const SETTLEMENT_COLUMNS: &str = "id, group_id, paid_by, paid_to, amount_cents, note, settled_at";
const ATTACHMENT_COLUMNS: &str =
    "id, expense_id, original_filename, content_type, file_url, uploaded_by, uploaded_at";

impl ToSql for Money {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let cents = self.cents().ok_or_else(|| {
            rusqlite::Error::ToSqlConversionFailure(Box::new(TripsplitError::InvalidAmount(format!(
                "{} is out of range",
                self
            ))))
        })?;
        Ok(ToSqlOutput::from(cents))
    }
}

impl FromSql for Money {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        i64::column_result(value).map(Money::from_cents)
    }
}

impl ToSql for Role {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        Role::parse(text).ok_or_else(|| FromSqlError::Other(format!("unknown role {}", text).into()))
    }
}

impl ToSql for SplitKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for SplitKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        SplitKind::parse(text).ok_or_else(|| FromSqlError::Other(format!("unknown split kind {}", text).into()))
    }
}

/// Maps a `rusqlite::Row` onto a model.
trait MapRow: Sized {
    fn map_row(row: &Row) -> rusqlite::Result<Self>;
}

impl MapRow for Group {
    fn map_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Group {
            id: row.get("id")?,
            name: row.get("name")?,
            created_by: row.get("created_by")?,
            created_at: row.get("created_at")?,
        })
    }
}

impl MapRow for GroupMember {
    fn map_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(GroupMember {
            group_id: row.get("group_id")?,
            user_id: row.get("user_id")?,
            role: row.get("role")?,
            joined_at: row.get("joined_at")?,
        })
    }
}

impl MapRow for Expense {
    fn map_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Expense {
            id: row.get("id")?,
            group_id: row.get("group_id")?,
            created_by: row.get("created_by")?,
            title: row.get("title")?,
            description: row.get("description")?,
            total_amount: row.get("total_amount_cents")?,
            split_kind: row.get("split_kind")?,
            created_at: row.get("created_at")?,
        })
    }
}

impl MapRow for ExpenseSplit {
    fn map_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(ExpenseSplit {
            id: row.get("id")?,
            expense_id: row.get("expense_id")?,
            user_id: row.get("user_id")?,
            amount: row.get("amount_cents")?,
        })
    }
}

impl MapRow for UserBalance {
    fn map_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(UserBalance {
            debtor_id: row.get("debtor_id")?,
            creditor_id: row.get("creditor_id")?,
            group_id: row.get("group_id")?,
            amount: row.get("amount_cents")?,
        })
    }
}

impl MapRow for Settlement {
    fn map_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Settlement {
            id: row.get("id")?,
            group_id: row.get("group_id")?,
            paid_by: row.get("paid_by")?,
            paid_to: row.get("paid_to")?,
            amount: row.get("amount_cents")?,
            note: row.get("note")?,
            settled_at: row.get("settled_at")?,
        })
    }
}

impl MapRow for Attachment {
    fn map_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Attachment {
            id: row.get("id")?,
            expense_id: row.get("expense_id")?,
            original_filename: row.get("original_filename")?,
            content_type: row.get("content_type")?,
            file_url: row.get("file_url")?,
            uploaded_by: row.get("uploaded_by")?,
            uploaded_at: row.get("uploaded_at")?,
        })
    }
}

fn cents_value(amount: Money) -> Result<Value, TripsplitError> {
    amount
        .cents()
        .map(Value::Integer)
        .ok_or_else(|| TripsplitError::InvalidAmount(format!("{} is out of range", amount)))
}

/// Appends `LIMIT`/`OFFSET` placeholders. A missing limit means no limit.
fn push_page(sql: &mut String, params: &mut Vec<Value>, skip: u32, limit: Option<u32>) {
    params.push(Value::Integer(limit.map(i64::from).unwrap_or(-1)));
    sql.push_str(&format!(" LIMIT ?{}", params.len()));
    params.push(Value::Integer(i64::from(skip)));
    sql.push_str(&format!(" OFFSET ?{}", params.len()));
}

#[derive(Debug, Clone)]
pub struct SqliteStorage {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    /// Wrap `connection`, enabling foreign keys and creating any missing tables.
    pub fn new(connection: Connection) -> Result<Self, TripsplitError> {
        connection.pragma_update(None, "foreign_keys", "ON")?;
        connection.execute_batch(SCHEMA)?;
        Ok(SqliteStorage {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Open the database at `url`; `:memory:` opens a private in-memory database.
    pub fn open(url: &str) -> Result<Self, TripsplitError> {
        let connection = if url == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(url)?
        };
        debug!(database_url = %url, "Opened SQLite database");
        Self::new(connection)
    }

    pub fn open_in_memory() -> Result<Self, TripsplitError> {
        Self::new(Connection::open_in_memory()?)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, TripsplitError> {
        self.connection
            .lock()
            .map_err(|e| TripsplitError::DatabaseError(format!("Connection lock poisoned: {}", e)))
    }

    fn run_read<T, F>(&self, f: F) -> Result<T, TripsplitError>
    where
        F: FnOnce(&dyn StorageTx) -> Result<T, TripsplitError>,
    {
        let mut connection = self.lock()?;
        let tx = SqliteTx {
            tx: connection.transaction()?,
        };
        // Dropping the transaction rolls it back; nothing was written.
        f(&tx)
    }

    fn run_write<T, F>(&self, f: F) -> Result<T, TripsplitError>
    where
        F: FnOnce(&mut dyn StorageTx) -> Result<T, TripsplitError>,
    {
        let mut connection = self.lock()?;
        let mut tx = SqliteTx {
            tx: connection.transaction_with_behavior(TransactionBehavior::Immediate)?,
        };
        let value = f(&mut tx)?;
        tx.tx.commit()?;
        Ok(value)
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn read<T, F>(&self, f: F) -> Result<T, TripsplitError>
    where
        T: Send,
        F: FnOnce(&dyn StorageTx) -> Result<T, TripsplitError> + Send,
    {
        self.run_read(f)
    }

    async fn write<T, F>(&self, f: F) -> Result<T, TripsplitError>
    where
        T: Send,
        F: FnOnce(&mut dyn StorageTx) -> Result<T, TripsplitError> + Send,
    {
        self.run_write(f)
    }
}

struct SqliteTx<'conn> {
    tx: rusqlite::Transaction<'conn>,
}

impl SqliteTx<'_> {
    fn query_one<T: MapRow>(&self, sql: &str, params: impl rusqlite::Params) -> Result<Option<T>, TripsplitError> {
        Ok(self.tx.prepare(sql)?.query_row(params, T::map_row).optional()?)
    }

    fn query_all<T: MapRow>(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<T>, TripsplitError> {
        let mut stmt = self.tx.prepare(sql)?;
        let rows = stmt
            .query_map(params, T::map_row)?
            .collect::<Result<Vec<T>, rusqlite::Error>>()?;
        Ok(rows)
    }
}

impl BalanceStore for SqliteTx<'_> {
    fn lock_balance(
        &self,
        group_id: &str,
        debtor_id: &str,
        creditor_id: &str,
    ) -> Result<Option<Money>, TripsplitError> {
        Ok(self
            .tx
            .prepare(
                "SELECT amount_cents FROM user_balances
                 WHERE group_id = ?1 AND debtor_id = ?2 AND creditor_id = ?3",
            )?
            .query_row(params![group_id, debtor_id, creditor_id], |row| row.get(0))
            .optional()?)
    }

    fn upsert_balance(&mut self, balance: &UserBalance) -> Result<(), TripsplitError> {
        self.tx.execute(
            "INSERT INTO user_balances (debtor_id, creditor_id, group_id, amount_cents)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (debtor_id, creditor_id, group_id) DO UPDATE SET amount_cents = excluded.amount_cents",
            params![balance.debtor_id, balance.creditor_id, balance.group_id, balance.amount],
        )?;
        Ok(())
    }

    fn delete_balance(&mut self, group_id: &str, debtor_id: &str, creditor_id: &str) -> Result<(), TripsplitError> {
        self.tx.execute(
            "DELETE FROM user_balances WHERE group_id = ?1 AND debtor_id = ?2 AND creditor_id = ?3",
            params![group_id, debtor_id, creditor_id],
        )?;
        Ok(())
    }
}

impl StorageTx for SqliteTx<'_> {
    fn insert_group(&mut self, group: &Group) -> Result<(), TripsplitError> {
        self.tx.execute(
            "INSERT INTO groups (id, name, created_by, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![group.id, group.name, group.created_by, group.created_at],
        )?;
        Ok(())
    }

    fn get_group(&self, group_id: &str) -> Result<Option<Group>, TripsplitError> {
        self.query_one(
            "SELECT id, name, created_by, created_at FROM groups WHERE id = ?1",
            params![group_id],
        )
    }

    fn insert_group_member(&mut self, member: &GroupMember) -> Result<(), TripsplitError> {
        self.tx.execute(
            "INSERT INTO group_members (group_id, user_id, role, joined_at) VALUES (?1, ?2, ?3, ?4)",
            params![member.group_id, member.user_id, member.role, member.joined_at],
        )?;
        Ok(())
    }

    fn get_group_member(&self, group_id: &str, user_id: &str) -> Result<Option<GroupMember>, TripsplitError> {
        self.query_one(
            "SELECT group_id, user_id, role, joined_at FROM group_members WHERE group_id = ?1 AND user_id = ?2",
            params![group_id, user_id],
        )
    }

    fn list_group_members(&self, group_id: &str) -> Result<Vec<GroupMember>, TripsplitError> {
        self.query_all(
            "SELECT group_id, user_id, role, joined_at FROM group_members
             WHERE group_id = ?1 ORDER BY joined_at, user_id",
            params![group_id],
        )
    }

    fn list_user_group_ids(&self, user_id: &str) -> Result<Vec<String>, TripsplitError> {
        let mut stmt = self
            .tx
            .prepare("SELECT group_id FROM group_members WHERE user_id = ?1 ORDER BY joined_at, group_id")?;
        let ids = stmt
            .query_map(params![user_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, rusqlite::Error>>()?;
        Ok(ids)
    }

    fn insert_expense(&mut self, expense: &Expense) -> Result<(), TripsplitError> {
        self.tx.execute(
            &format!("INSERT INTO expenses ({EXPENSE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
            params![
                expense.id,
                expense.group_id,
                expense.created_by,
                expense.title,
                expense.description,
                expense.total_amount,
                expense.split_kind,
                expense.created_at,
            ],
        )?;
        Ok(())
    }

    fn update_expense(&mut self, expense: &Expense) -> Result<(), TripsplitError> {
        let updated = self.tx.execute(
            "UPDATE expenses SET title = ?2, description = ?3, total_amount_cents = ?4, split_kind = ?5
             WHERE id = ?1",
            params![
                expense.id,
                expense.title,
                expense.description,
                expense.total_amount,
                expense.split_kind,
            ],
        )?;
        if updated == 0 {
            return Err(TripsplitError::ExpenseNotFound(expense.id.clone()));
        }
        Ok(())
    }

    fn get_expense(&self, expense_id: &str) -> Result<Option<Expense>, TripsplitError> {
        self.query_one(
            &format!("SELECT {EXPENSE_COLUMNS} FROM expenses WHERE id = ?1"),
            params![expense_id],
        )
    }

    fn list_expenses(&self, group_id: &str, query: &ExpenseQuery) -> Result<Vec<Expense>, TripsplitError> {
        let mut sql = format!("SELECT {EXPENSE_COLUMNS} FROM expenses WHERE group_id = ?1");
        let mut params = vec![Value::Text(group_id.to_string())];

        if let Some(created_by) = &query.created_by {
            params.push(Value::Text(created_by.clone()));
            sql.push_str(&format!(" AND created_by = ?{}", params.len()));
        }
        if let Some(min_amount) = query.min_amount {
            params.push(cents_value(min_amount)?);
            sql.push_str(&format!(" AND total_amount_cents >= ?{}", params.len()));
        }
        if let Some(max_amount) = query.max_amount {
            params.push(cents_value(max_amount)?);
            sql.push_str(&format!(" AND total_amount_cents <= ?{}", params.len()));
        }
        sql.push_str(" ORDER BY created_at DESC, id");
        push_page(&mut sql, &mut params, query.skip, query.limit);

        self.query_all(&sql, params_from_iter(params.iter()))
    }

    fn delete_expense(&mut self, expense_id: &str) -> Result<(), TripsplitError> {
        self.tx
            .execute("DELETE FROM expenses WHERE id = ?1", params![expense_id])?;
        Ok(())
    }

    fn insert_splits(&mut self, splits: &[ExpenseSplit]) -> Result<(), TripsplitError> {
        let mut stmt = self
            .tx
            .prepare("INSERT INTO expense_splits (id, expense_id, user_id, amount_cents) VALUES (?1, ?2, ?3, ?4)")?;
        for split in splits {
            stmt.execute(params![split.id, split.expense_id, split.user_id, split.amount])?;
        }
        Ok(())
    }

    fn list_splits(&self, expense_id: &str) -> Result<Vec<ExpenseSplit>, TripsplitError> {
        self.query_all(
            "SELECT id, expense_id, user_id, amount_cents FROM expense_splits WHERE expense_id = ?1 ORDER BY rowid",
            params![expense_id],
        )
    }

    fn delete_splits(&mut self, expense_id: &str) -> Result<(), TripsplitError> {
        self.tx
            .execute("DELETE FROM expense_splits WHERE expense_id = ?1", params![expense_id])?;
        Ok(())
    }

    fn list_group_balances_for_user(
        &self,
        group_id: &str,
        user_id: &str,
    ) -> Result<Vec<UserBalance>, TripsplitError> {
        self.query_all(
            "SELECT debtor_id, creditor_id, group_id, amount_cents FROM user_balances
             WHERE group_id = ?1 AND (debtor_id = ?2 OR creditor_id = ?2)",
            params![group_id, user_id],
        )
    }

    fn list_user_balances(&self, user_id: &str) -> Result<Vec<UserBalance>, TripsplitError> {
        self.query_all(
            "SELECT debtor_id, creditor_id, group_id, amount_cents FROM user_balances
             WHERE debtor_id = ?1 OR creditor_id = ?1",
            params![user_id],
        )
    }

    fn insert_settlement(&mut self, settlement: &Settlement) -> Result<(), TripsplitError> {
        self.tx.execute(
            &format!("INSERT INTO settlements ({SETTLEMENT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
            params![
                settlement.id,
                settlement.group_id,
                settlement.paid_by,
                settlement.paid_to,
                settlement.amount,
                settlement.note,
                settlement.settled_at,
            ],
        )?;
        Ok(())
    }

    fn get_settlement(&self, settlement_id: &str) -> Result<Option<Settlement>, TripsplitError> {
        self.query_one(
            &format!("SELECT {SETTLEMENT_COLUMNS} FROM settlements WHERE id = ?1"),
            params![settlement_id],
        )
    }

    fn list_settlements(&self, group_id: &str, query: &SettlementQuery) -> Result<Vec<Settlement>, TripsplitError> {
        let mut sql = format!("SELECT {SETTLEMENT_COLUMNS} FROM settlements WHERE group_id = ?1");
        let mut params = vec![Value::Text(group_id.to_string())];

        if let Some(paid_by) = &query.paid_by {
            params.push(Value::Text(paid_by.clone()));
            sql.push_str(&format!(" AND paid_by = ?{}", params.len()));
        }
        if let Some(paid_to) = &query.paid_to {
            params.push(Value::Text(paid_to.clone()));
            sql.push_str(&format!(" AND paid_to = ?{}", params.len()));
        }
        sql.push_str(" ORDER BY settled_at DESC, id");
        push_page(&mut sql, &mut params, query.skip, query.limit);

        self.query_all(&sql, params_from_iter(params.iter()))
    }

    fn delete_settlement(&mut self, settlement_id: &str) -> Result<(), TripsplitError> {
        self.tx
            .execute("DELETE FROM settlements WHERE id = ?1", params![settlement_id])?;
        Ok(())
    }

    fn insert_attachment(&mut self, attachment: &Attachment) -> Result<(), TripsplitError> {
        self.tx.execute(
            &format!("INSERT INTO attachments ({ATTACHMENT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
            params![
                attachment.id,
                attachment.expense_id,
                attachment.original_filename,
                attachment.content_type,
                attachment.file_url,
                attachment.uploaded_by,
                attachment.uploaded_at,
            ],
        )?;
        Ok(())
    }

    fn get_attachment(&self, attachment_id: &str) -> Result<Option<Attachment>, TripsplitError> {
        self.query_one(
            &format!("SELECT {ATTACHMENT_COLUMNS} FROM attachments WHERE id = ?1"),
            params![attachment_id],
        )
    }

    fn list_attachments(&self, expense_id: &str) -> Result<Vec<Attachment>, TripsplitError> {
        self.query_all(
            &format!("SELECT {ATTACHMENT_COLUMNS} FROM attachments WHERE expense_id = ?1 ORDER BY uploaded_at, id"),
            params![expense_id],
        )
    }

    fn delete_attachment(&mut self, attachment_id: &str) -> Result<(), TripsplitError> {
        self.tx
            .execute("DELETE FROM attachments WHERE id = ?1", params![attachment_id])?;
        Ok(())
    }

    fn delete_expense_attachments(&mut self, expense_id: &str) -> Result<(), TripsplitError> {
        self.tx
            .execute("DELETE FROM attachments WHERE expense_id = ?1", params![expense_id])?;
        Ok(())
    }
}
