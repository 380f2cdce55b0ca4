//! The balance ledger: net amounts owed between pairs of users in a group.
//!
//! For every unordered pair of users in a group at most one ordered row
//! `debtor -> creditor` exists, and its amount is strictly positive. Every
//! mutation computes the pair's new net position and rewrites the pair so
//! that this holds again: a positive net lands on one key, a negative net is
//! re-homed onto the opposite key, and a zero net removes both.
//!
//! The ledger works on a [`BalanceStore`] borrowed from an open write
//! transaction and never commits on its own.

use std::collections::BTreeSet;

use tracing::debug;

use crate::core::errors::TripsplitError;
use crate::core::models::balance::UserBalance;
use crate::core::money::Money;
use crate::infrastructure::storage::BalanceStore;

pub struct BalanceLedger<'a, B: BalanceStore + ?Sized> {
    store: &'a mut B,
    touched: BTreeSet<String>,
}

impl<'a, B: BalanceStore + ?Sized> BalanceLedger<'a, B> {
    pub fn new(store: &'a mut B) -> Self {
        BalanceLedger {
            store,
            touched: BTreeSet::new(),
        }
    }

    /// Users whose rows this ledger has written so far.
    pub fn touched_users(&self) -> &BTreeSet<String> {
        &self.touched
    }

    pub fn into_touched_users(self) -> BTreeSet<String> {
        self.touched
    }

    /// Raise what `debtor_id` owes `creditor_id` by `amount`.
    pub fn apply_credit(
        &mut self,
        group_id: &str,
        debtor_id: &str,
        creditor_id: &str,
        amount: Money,
    ) -> Result<(), TripsplitError> {
        check_delta(debtor_id, creditor_id, amount)?;
        let (forward, reverse) = self.read_pair(group_id, debtor_id, creditor_id)?;
        let net = forward.unwrap_or(Money::ZERO) - reverse.unwrap_or(Money::ZERO) + amount;
        debug!(group_id, debtor_id, creditor_id, %amount, %net, "Applying credit");
        self.write_pair(group_id, debtor_id, creditor_id, net, forward.is_some(), reverse.is_some())
    }

    /// Lower what `debtor_id` owes `creditor_id` by `amount`.
    ///
    /// The pair must hold a row in one direction or the other. A reduction
    /// past zero leaves `creditor_id` owing `debtor_id` the difference.
    pub fn reverse_credit(
        &mut self,
        group_id: &str,
        debtor_id: &str,
        creditor_id: &str,
        amount: Money,
    ) -> Result<(), TripsplitError> {
        check_delta(debtor_id, creditor_id, amount)?;
        let (forward, reverse) = self.read_pair(group_id, debtor_id, creditor_id)?;
        if forward.is_none() && reverse.is_none() {
            return Err(TripsplitError::BalanceNotFound {
                group_id: group_id.to_string(),
                debtor_id: debtor_id.to_string(),
                creditor_id: creditor_id.to_string(),
            });
        }
        let net = forward.unwrap_or(Money::ZERO) - reverse.unwrap_or(Money::ZERO) - amount;
        debug!(group_id, debtor_id, creditor_id, %amount, %net, "Reversing credit");
        self.write_pair(group_id, debtor_id, creditor_id, net, forward.is_some(), reverse.is_some())
    }

    /// Record that `payer_id` paid `payee_id` back `amount`.
    ///
    /// Only the exact row `payer_id -> payee_id` can be settled, and never for
    /// more than it holds.
    pub fn settle(
        &mut self,
        group_id: &str,
        payer_id: &str,
        payee_id: &str,
        amount: Money,
    ) -> Result<(), TripsplitError> {
        check_delta(payer_id, payee_id, amount)?;
        let owed = self
            .read_row(group_id, payer_id, payee_id)?
            .ok_or_else(|| TripsplitError::NoBalanceFound {
                payer_id: payer_id.to_string(),
                payee_id: payee_id.to_string(),
            })?;
        if amount > owed {
            return Err(TripsplitError::AmountExceedsDebt { requested: amount, owed });
        }

        let remaining = owed - amount;
        debug!(group_id, payer_id, payee_id, %amount, %remaining, "Settling balance");
        if remaining.is_zero() {
            self.store.delete_balance(group_id, payer_id, payee_id)?;
        } else {
            self.store.upsert_balance(&UserBalance {
                debtor_id: payer_id.to_string(),
                creditor_id: payee_id.to_string(),
                group_id: group_id.to_string(),
                amount: remaining,
            })?;
        }
        self.touch(payer_id, payee_id);
        Ok(())
    }

    /// Undo a [`settle`](Self::settle): the payer owes the payee `amount` again.
    pub fn unsettle(
        &mut self,
        group_id: &str,
        payer_id: &str,
        payee_id: &str,
        amount: Money,
    ) -> Result<(), TripsplitError> {
        self.apply_credit(group_id, payer_id, payee_id, amount)
    }

    fn read_row(&self, group_id: &str, debtor_id: &str, creditor_id: &str) -> Result<Option<Money>, TripsplitError> {
        match self.store.lock_balance(group_id, debtor_id, creditor_id)? {
            Some(amount) if !amount.is_positive() => Err(TripsplitError::InvariantViolation(format!(
                "stored balance {} -> {} in group {} is {}",
                debtor_id, creditor_id, group_id, amount
            ))),
            row => Ok(row),
        }
    }

    fn read_pair(
        &self,
        group_id: &str,
        debtor_id: &str,
        creditor_id: &str,
    ) -> Result<(Option<Money>, Option<Money>), TripsplitError> {
        let forward = self.read_row(group_id, debtor_id, creditor_id)?;
        let reverse = self.read_row(group_id, creditor_id, debtor_id)?;
        Ok((forward, reverse))
    }

    /// Store `net` (what `debtor_id` owes `creditor_id`) as the pair's only row.
    fn write_pair(
        &mut self,
        group_id: &str,
        debtor_id: &str,
        creditor_id: &str,
        net: Money,
        had_forward: bool,
        had_reverse: bool,
    ) -> Result<(), TripsplitError> {
        let (owner, other) = if net.is_negative() {
            ((creditor_id, debtor_id), had_forward)
        } else {
            ((debtor_id, creditor_id), had_reverse)
        };

        if other {
            self.store.delete_balance(group_id, owner.1, owner.0)?;
        }
        if net.is_zero() {
            if had_forward {
                self.store.delete_balance(group_id, debtor_id, creditor_id)?;
            }
        } else {
            self.store.upsert_balance(&UserBalance {
                debtor_id: owner.0.to_string(),
                creditor_id: owner.1.to_string(),
                group_id: group_id.to_string(),
                amount: net.abs(),
            })?;
        }
        self.touch(debtor_id, creditor_id);
        Ok(())
    }

    fn touch(&mut self, a: &str, b: &str) {
        self.touched.insert(a.to_string());
        self.touched.insert(b.to_string());
    }
}

fn check_delta(debtor_id: &str, creditor_id: &str, amount: Money) -> Result<(), TripsplitError> {
    if debtor_id == creditor_id {
        return Err(TripsplitError::InvariantViolation(format!(
            "ledger delta from {} to itself",
            debtor_id
        )));
    }
    if !amount.is_positive() {
        return Err(TripsplitError::InvariantViolation(format!(
            "ledger delta of {} must be positive",
            amount
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MapStore {
        rows: HashMap<(String, String, String), Money>,
    }

    impl MapStore {
        fn get(&self, debtor: &str, creditor: &str) -> Option<Money> {
            self.rows
                .get(&("g".to_string(), debtor.to_string(), creditor.to_string()))
                .copied()
        }
    }

    impl BalanceStore for MapStore {
        fn lock_balance(&self, group_id: &str, debtor_id: &str, creditor_id: &str) -> Result<Option<Money>, TripsplitError> {
            Ok(self
                .rows
                .get(&(group_id.to_string(), debtor_id.to_string(), creditor_id.to_string()))
                .copied())
        }

        fn upsert_balance(&mut self, balance: &UserBalance) -> Result<(), TripsplitError> {
            self.rows.insert(
                (
                    balance.group_id.clone(),
                    balance.debtor_id.clone(),
                    balance.creditor_id.clone(),
                ),
                balance.amount,
            );
            Ok(())
        }

        fn delete_balance(&mut self, group_id: &str, debtor_id: &str, creditor_id: &str) -> Result<(), TripsplitError> {
            self.rows
                .remove(&(group_id.to_string(), debtor_id.to_string(), creditor_id.to_string()));
            Ok(())
        }
    }

    fn m(value: rust_decimal::Decimal) -> Money {
        Money::new(value)
    }

    #[test]
    fn apply_credit_creates_and_accumulates() {
        let mut store = MapStore::default();
        let mut ledger = BalanceLedger::new(&mut store);
        ledger.apply_credit("g", "b", "a", m(dec!(10))).unwrap();
        ledger.apply_credit("g", "b", "a", m(dec!(2.5))).unwrap();
        assert_eq!(store.get("b", "a"), Some(m(dec!(12.5))));
        assert_eq!(store.rows.len(), 1);
    }

    #[test]
    fn apply_credit_nets_against_opposite_row() {
        let mut store = MapStore::default();
        let mut ledger = BalanceLedger::new(&mut store);
        ledger.apply_credit("g", "b", "a", m(dec!(10))).unwrap();
        ledger.apply_credit("g", "a", "b", m(dec!(4))).unwrap();
        assert_eq!(store.get("b", "a"), Some(m(dec!(6))));
        assert_eq!(store.get("a", "b"), None);
    }

    #[test]
    fn apply_credit_rehomes_when_sign_flips() {
        let mut store = MapStore::default();
        let mut ledger = BalanceLedger::new(&mut store);
        ledger.apply_credit("g", "b", "a", m(dec!(6))).unwrap();
        ledger.apply_credit("g", "a", "b", m(dec!(10))).unwrap();
        assert_eq!(store.get("b", "a"), None);
        assert_eq!(store.get("a", "b"), Some(m(dec!(4))));
    }

    #[test]
    fn exact_offset_removes_the_pair() {
        let mut store = MapStore::default();
        let mut ledger = BalanceLedger::new(&mut store);
        ledger.apply_credit("g", "b", "a", m(dec!(5))).unwrap();
        ledger.apply_credit("g", "a", "b", m(dec!(5))).unwrap();
        assert!(store.rows.is_empty());
    }

    #[test]
    fn reverse_credit_requires_a_row() {
        let mut store = MapStore::default();
        let mut ledger = BalanceLedger::new(&mut store);
        let err = ledger.reverse_credit("g", "b", "a", m(dec!(5))).unwrap_err();
        assert!(matches!(err, TripsplitError::BalanceNotFound { .. }));
    }

    #[test]
    fn reverse_credit_undoes_apply_credit() {
        let mut store = MapStore::default();
        let mut ledger = BalanceLedger::new(&mut store);
        ledger.apply_credit("g", "b", "a", m(dec!(7))).unwrap();
        ledger.apply_credit("g", "b", "a", m(dec!(3))).unwrap();
        ledger.reverse_credit("g", "b", "a", m(dec!(3))).unwrap();
        assert_eq!(store.get("b", "a"), Some(m(dec!(7))));
    }

    #[test]
    fn reverse_credit_past_zero_rehomes() {
        let mut store = MapStore::default();
        let mut ledger = BalanceLedger::new(&mut store);
        ledger.apply_credit("g", "b", "a", m(dec!(4))).unwrap();
        ledger.reverse_credit("g", "b", "a", m(dec!(10))).unwrap();
        assert_eq!(store.get("a", "b"), Some(m(dec!(6))));
        assert_eq!(store.get("b", "a"), None);
    }

    #[test]
    fn settle_decrements_and_deletes_at_zero() {
        let mut store = MapStore::default();
        let mut ledger = BalanceLedger::new(&mut store);
        ledger.apply_credit("g", "b", "a", m(dec!(10))).unwrap();
        ledger.settle("g", "b", "a", m(dec!(4))).unwrap();
        ledger.settle("g", "b", "a", m(dec!(6))).unwrap();
        assert!(store.rows.is_empty());
    }

    #[test]
    fn settle_requires_the_exact_direction() {
        let mut store = MapStore::default();
        let mut ledger = BalanceLedger::new(&mut store);
        ledger.apply_credit("g", "b", "a", m(dec!(10))).unwrap();
        let err = ledger.settle("g", "a", "b", m(dec!(5))).unwrap_err();
        assert_eq!(
            err,
            TripsplitError::NoBalanceFound {
                payer_id: "a".to_string(),
                payee_id: "b".to_string(),
            }
        );
    }

    #[test]
    fn settle_cannot_exceed_debt() {
        let mut store = MapStore::default();
        let mut ledger = BalanceLedger::new(&mut store);
        ledger.apply_credit("g", "b", "a", m(dec!(10))).unwrap();
        let err = ledger.settle("g", "b", "a", m(dec!(10.01))).unwrap_err();
        assert_eq!(
            err,
            TripsplitError::AmountExceedsDebt {
                requested: m(dec!(10.01)),
                owed: m(dec!(10)),
            }
        );
        assert_eq!(store.get("b", "a"), Some(m(dec!(10))));
    }

    #[test]
    fn unsettle_restores_settled_row() {
        let mut store = MapStore::default();
        let mut ledger = BalanceLedger::new(&mut store);
        ledger.apply_credit("g", "b", "a", m(dec!(10))).unwrap();
        ledger.settle("g", "b", "a", m(dec!(10))).unwrap();
        ledger.unsettle("g", "b", "a", m(dec!(10))).unwrap();
        assert_eq!(store.get("b", "a"), Some(m(dec!(10))));
    }

    #[test]
    fn rejects_bad_deltas() {
        let mut store = MapStore::default();
        let mut ledger = BalanceLedger::new(&mut store);
        assert!(matches!(
            ledger.apply_credit("g", "a", "a", m(dec!(1))),
            Err(TripsplitError::InvariantViolation(_))
        ));
        assert!(matches!(
            ledger.apply_credit("g", "b", "a", Money::ZERO),
            Err(TripsplitError::InvariantViolation(_))
        ));
    }

    #[test]
    fn non_positive_stored_rows_are_invariant_violations() {
        let mut store = MapStore::default();
        store
            .rows
            .insert(("g".to_string(), "b".to_string(), "a".to_string()), Money::ZERO);
        let mut ledger = BalanceLedger::new(&mut store);
        assert!(matches!(
            ledger.apply_credit("g", "b", "a", m(dec!(1))),
            Err(TripsplitError::InvariantViolation(_))
        ));
    }

    #[test]
    fn tracks_touched_users() {
        let mut store = MapStore::default();
        let mut ledger = BalanceLedger::new(&mut store);
        ledger.apply_credit("g", "b", "a", m(dec!(1))).unwrap();
        ledger.apply_credit("g", "c", "a", m(dec!(1))).unwrap();
        let touched: Vec<&str> = ledger.touched_users().iter().map(String::as_str).collect();
        assert_eq!(touched, vec!["a", "b", "c"]);
    }
}
