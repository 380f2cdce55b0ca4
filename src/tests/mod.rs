mod api_tests;

use std::sync::Arc;

use crate::api::handlers::AppService;
use crate::core::models::expense::{NewExpense, SplitShare, SplitSpec};
use crate::core::models::group::Group;
use crate::core::models::balance::UserBalance;
use crate::core::money::Money;
use crate::core::services::{ServiceOptions, TripsplitService};
use crate::infrastructure::blob::in_memory::InMemoryBlobStore;
use crate::infrastructure::blob::local::LocalBlobStore;
use crate::infrastructure::cache::in_memory::InMemoryCache;
use crate::infrastructure::storage::Storage;
use crate::infrastructure::storage::sqlite::SqliteStorage;

pub const TEST_SECRET: &str = "test-secret";

pub type TestService = TripsplitService<SqliteStorage, InMemoryCache, InMemoryBlobStore>;

pub fn create_test_service() -> TestService {
    create_test_service_with_storage().0
}

/// Service plus a second handle on its database, for asserting raw ledger rows.
pub fn create_test_service_with_storage() -> (TestService, SqliteStorage) {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let cache = InMemoryCache::new();
    let blobs = InMemoryBlobStore::new();
    let service = TripsplitService::new(
        storage.clone(),
        cache,
        blobs,
        TEST_SECRET.to_string(),
        ServiceOptions::default(),
    );
    (service, storage)
}

pub fn create_test_app_service(options: ServiceOptions) -> Arc<AppService> {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let blob_dir = std::env::temp_dir().join(format!("tripsplit-test-{}", uuid::Uuid::new_v4()));
    Arc::new(TripsplitService::new(
        storage,
        InMemoryCache::new(),
        LocalBlobStore::new(blob_dir),
        TEST_SECRET.to_string(),
        options,
    ))
}

pub fn money(cents: i64) -> Money {
    Money::from_cents(cents)
}

/// Group of alice (owner), bob and carol.
pub async fn create_trip(service: &TestService) -> Group {
    service
        .create_group(
            "Trip".to_string(),
            "alice",
            vec!["bob".to_string(), "carol".to_string()],
        )
        .await
        .unwrap()
}

pub fn equal_expense(group_id: &str, title: &str, cents: i64) -> NewExpense {
    NewExpense {
        group_id: group_id.to_string(),
        title: title.to_string(),
        description: None,
        total_amount: money(cents),
        split: SplitSpec::Equal,
    }
}

pub fn custom_expense(group_id: &str, title: &str, cents: i64, shares: &[(&str, i64)]) -> NewExpense {
    NewExpense {
        group_id: group_id.to_string(),
        title: title.to_string(),
        description: None,
        total_amount: money(cents),
        split: SplitSpec::Custom(
            shares
                .iter()
                .map(|(user_id, amount)| SplitShare {
                    user_id: user_id.to_string(),
                    amount: money(*amount),
                })
                .collect(),
        ),
    }
}

/// Every ledger row of `group_id`, sorted by (debtor, creditor).
pub async fn ledger_rows(storage: &SqliteStorage, group_id: &str) -> Vec<(String, String, Money)> {
    let group_id = group_id.to_string();
    let mut rows: Vec<UserBalance> = storage
        .read(move |tx| {
            let mut rows = Vec::new();
            for user in ["alice", "bob", "carol", "dave"] {
                for row in tx.list_group_balances_for_user(&group_id, user)? {
                    if row.debtor_id == user {
                        rows.push(row);
                    }
                }
            }
            Ok(rows)
        })
        .await
        .unwrap();
    rows.sort_by(|a, b| (&a.debtor_id, &a.creditor_id).cmp(&(&b.debtor_id, &b.creditor_id)));
    rows.into_iter()
        .map(|r| (r.debtor_id, r.creditor_id, r.amount))
        .collect()
}

pub fn row(debtor: &str, creditor: &str, cents: i64) -> (String, String, Money) {
    (debtor.to_string(), creditor.to_string(), money(cents))
}
