//! Projects raw ledger rows into per-user balance views.

use std::collections::BTreeMap;

use crate::core::models::balance::{BalanceView, Direction, UserBalance};
use crate::core::money::Money;

/// Net `rows` from the point of view of `user_id`.
///
/// Rows that do not involve `user_id` are ignored. Rows are netted per
/// (group, counterparty), so even a pair stored in both directions yields a
/// single view, and pairs netting to zero are dropped. The result is ordered
/// by group and then counterparty.
pub fn project_balances(user_id: &str, rows: &[UserBalance]) -> Vec<BalanceView> {
    // Positive: the counterparty owes `user_id`.
    let mut nets: BTreeMap<(&str, &str), Money> = BTreeMap::new();
    for row in rows {
        if row.creditor_id == user_id && row.debtor_id != user_id {
            *nets.entry((row.group_id.as_str(), row.debtor_id.as_str())).or_insert(Money::ZERO) += row.amount;
        } else if row.debtor_id == user_id && row.creditor_id != user_id {
            *nets.entry((row.group_id.as_str(), row.creditor_id.as_str())).or_insert(Money::ZERO) -= row.amount;
        }
    }

    nets.into_iter()
        .filter(|(_, net)| !net.is_zero())
        .map(|((group_id, other_user_id), net)| BalanceView {
            group_id: group_id.to_string(),
            other_user_id: other_user_id.to_string(),
            net_amount: net.abs(),
            direction: if net.is_positive() {
                Direction::OwesYou
            } else {
                Direction::YouOwe
            },
        })
        .collect()
}
