//! Turning an expense total into per-user owed amounts.

use std::collections::HashSet;

use crate::core::errors::TripsplitError;
use crate::core::models::expense::SplitShare;
use crate::core::money::Money;

/// Split `total` evenly over `participants`.
///
/// Every participant owes `total / n` truncated to cents, except the
/// `remainder_holder`, who also takes the leftover cents so that the shares
/// always add up to `total` exactly. The holder's share is never below the
/// others'. Participants are deduplicated and
/// keep their first-seen order.
pub fn compute_equal_split(
    total: Money,
    participants: &[String],
    remainder_holder: &str,
) -> Result<Vec<SplitShare>, TripsplitError> {
    let mut seen = HashSet::new();
    let distinct: Vec<&String> = participants.iter().filter(|id| seen.insert(id.as_str())).collect();

    if distinct.len() < 2 {
        return Err(TripsplitError::NotEnoughMembers(distinct.len()));
    }
    if !seen.contains(remainder_holder) {
        return Err(TripsplitError::InvalidSplit(format!(
            "remainder holder {} is not a participant",
            remainder_holder
        )));
    }

    let share = total.share_of(distinct.len());
    let others = share.times(distinct.len() - 1);
    let holder_share = total - others;

    Ok(distinct
        .into_iter()
        .map(|user_id| SplitShare {
            user_id: user_id.clone(),
            amount: if user_id == remainder_holder { holder_share } else { share },
        })
        .collect())
}

/// Check caller-supplied shares against the expense total.
pub fn validate_custom_split(total: Money, splits: &[SplitShare]) -> Result<(), TripsplitError> {
    if splits.is_empty() {
        return Err(TripsplitError::EmptySplit);
    }

    let mut seen = HashSet::new();
    for split in splits {
        if !split.amount.is_positive() {
            return Err(TripsplitError::InvalidAmount(format!(
                "split amount for {} must be greater than 0",
                split.user_id
            )));
        }
        if !seen.insert(split.user_id.as_str()) {
            return Err(TripsplitError::DuplicateSplitUser(split.user_id.clone()));
        }
    }

    let actual: Money = splits.iter().map(|s| s.amount).sum();
    if actual != total {
        return Err(TripsplitError::SplitMismatch { expected: total, actual });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn share(user: &str, amount: Money) -> SplitShare {
        SplitShare {
            user_id: user.to_string(),
            amount,
        }
    }

    #[test]
    fn equal_split_sums_to_total() {
        let total = Money::new(dec!(30));
        let shares = compute_equal_split(total, &ids(&["a", "b", "c"]), "a").unwrap();
        assert_eq!(shares.len(), 3);
        assert!(shares.iter().all(|s| s.amount == Money::new(dec!(10))));
        assert_eq!(shares.iter().map(|s| s.amount).sum::<Money>(), total);
    }

    #[test]
    fn remainder_goes_to_holder() {
        let total = Money::new(dec!(10));
        let shares = compute_equal_split(total, &ids(&["a", "b", "c"]), "b").unwrap();
        let holder = shares.iter().find(|s| s.user_id == "b").unwrap();
        assert_eq!(holder.amount, Money::new(dec!(3.34)));
        assert!(shares.iter().filter(|s| s.user_id != "b").all(|s| s.amount == Money::new(dec!(3.33))));
        assert_eq!(shares.iter().map(|s| s.amount).sum::<Money>(), total);
    }

    #[test]
    fn holder_takes_leftover_cents() {
        // 20.00 / 3 is 6.66 each with 0.02 left over.
        let total = Money::new(dec!(20));
        let shares = compute_equal_split(total, &ids(&["a", "b", "c"]), "a").unwrap();
        assert_eq!(shares[0].amount, Money::new(dec!(6.68)));
        assert!(shares[1..].iter().all(|s| s.amount == Money::new(dec!(6.66))));
        assert_eq!(shares.iter().map(|s| s.amount).sum::<Money>(), total);
    }

    #[test]
    fn duplicate_participants_count_once() {
        let shares = compute_equal_split(Money::new(dec!(20)), &ids(&["a", "b", "a"]), "a").unwrap();
        assert_eq!(shares.len(), 2);
    }

    #[test]
    fn needs_two_participants() {
        let err = compute_equal_split(Money::new(dec!(20)), &ids(&["a", "a"]), "a").unwrap_err();
        assert_eq!(err, TripsplitError::NotEnoughMembers(1));
    }

    #[test]
    fn small_totals_over_many_members_still_split() {
        let members: Vec<String> = (0..30).map(|i| format!("u{}", i)).collect();
        let total = Money::new(dec!(4.05));
        let shares = compute_equal_split(total, &members, "u0").unwrap();
        assert_eq!(shares.len(), 30);
        assert!(shares.iter().all(|s| !s.amount.is_negative()));
        assert_eq!(shares[0].amount, Money::new(dec!(0.28)));
        assert_eq!(shares[1].amount, Money::new(dec!(0.13)));
        assert_eq!(shares.iter().map(|s| s.amount).sum::<Money>(), total);

        let members: Vec<String> = (0..10).map(|i| format!("u{}", i)).collect();
        let total = Money::new(dec!(0.05));
        let shares = compute_equal_split(total, &members, "u3").unwrap();
        assert_eq!(shares[3].amount, total);
        assert!(shares.iter().filter(|s| s.user_id != "u3").all(|s| s.amount.is_zero()));
    }

    #[test]
    fn custom_split_must_match_total() {
        let total = Money::new(dec!(50));
        let splits = vec![share("a", Money::new(dec!(25))), share("b", Money::new(dec!(24.99)))];
        assert_eq!(
            validate_custom_split(total, &splits),
            Err(TripsplitError::SplitMismatch {
                expected: total,
                actual: Money::new(dec!(49.99)),
            })
        );
    }

    #[test]
    fn custom_split_rejects_empty_and_duplicates() {
        let total = Money::new(dec!(10));
        assert_eq!(validate_custom_split(total, &[]), Err(TripsplitError::EmptySplit));

        let splits = vec![share("a", Money::new(dec!(5))), share("a", Money::new(dec!(5)))];
        assert_eq!(
            validate_custom_split(total, &splits),
            Err(TripsplitError::DuplicateSplitUser("a".to_string()))
        );
    }

    #[test]
    fn custom_split_rejects_non_positive_amounts() {
        let total = Money::new(dec!(10));
        let splits = vec![share("a", Money::new(dec!(10))), share("b", Money::ZERO)];
        assert!(matches!(
            validate_custom_split(total, &splits),
            Err(TripsplitError::InvalidAmount(_))
        ));
    }

    #[test]
    fn custom_split_compares_on_cents() {
        let total = Money::new(dec!(10));
        let splits = vec![share("a", Money::new(dec!(3.333))), share("b", Money::new(dec!(6.667)))];
        assert_eq!(validate_custom_split(total, &splits), Ok(()));
    }
}
