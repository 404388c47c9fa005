//! Division of an expense amount into per-member shares.
//!
//! Shares are always expressed in currency minor units (two fraction digits)
//! and always reconcile exactly to the expense total: whatever rounding leaves
//! over is handed to a single, deterministically chosen member.

use std::collections::HashSet;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schemas::UserNick;

/// Fraction digits of the currency minor unit.
pub const CURRENCY_SCALE: u32 = 2;

/// Largest amount a single expense or share may carry: ten digits, two of
/// them fractional.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(1_410_065_407, 2, 0, false, 2);

/// Allowed distance of a percentage total from 100.
const PERCENTAGE_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);
const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SplitError {
    #[error("there are no members to split the expense among")]
    InvalidPolicy,

    #[error("exact shares add up to {declared}, but the expense is {amount}")]
    AmountMismatch { declared: Decimal, amount: Decimal },

    #[error("percentages add up to {declared}, expected 100")]
    PercentageMismatch { declared: Decimal },

    #[error("amount must be positive, at most 99999999.99 and have at most two decimal places, got {0}")]
    InvalidAmount(Decimal),

    #[error("percentage must be between 0 and 100 with at most two decimal places, got {0}")]
    InvalidPercentage(Decimal),

    #[error("{0} is not a member of the group")]
    UnknownMember(UserNick),

    #[error("{0} appears more than once in the split")]
    DuplicateMember(UserNick),

    #[error("share of {0} cannot be negative")]
    NegativeShare(UserNick),
}

/// A caller-supplied value for one member: an amount for `Exact`, a
/// percentage for `Percentage`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct MemberShare {
    pub member: UserNick,
    pub value: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", content = "shares", rename_all = "snake_case")]
pub enum SplitPolicy {
    Equal,
    Exact(Vec<MemberShare>),
    Percentage(Vec<MemberShare>),
}

/// One member's computed portion of an expense.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Share {
    pub member: UserNick,
    pub amount: Decimal,
    pub percentage: Option<Decimal>,
}

impl SplitPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            SplitPolicy::Equal => "equal",
            SplitPolicy::Exact(_) => "exact",
            SplitPolicy::Percentage(_) => "percentage",
        }
    }
}

/// Checks that `amount` is a positive value expressible in minor units and
/// no larger than [`MAX_AMOUNT`].
pub fn validate_amount(amount: Decimal) -> Result<(), SplitError> {
    if amount <= Decimal::ZERO || amount > MAX_AMOUNT || !has_currency_scale(amount) {
        return Err(SplitError::InvalidAmount(amount));
    }
    Ok(())
}

/// Splits `amount` among `members` under `policy`.
///
/// `members` is the group roster in join order; it is the population for
/// `Equal` and the set of names `Exact`/`Percentage` entries may refer to.
/// Members whose share comes out as zero are left out of the result.
pub fn compute_splits(
    amount: Decimal,
    members: &[UserNick],
    policy: &SplitPolicy,
) -> Result<Vec<Share>, SplitError> {
    validate_amount(amount)?;
    let shares = match policy {
        SplitPolicy::Equal => split_equally(amount, members)?,
        SplitPolicy::Exact(entries) => {
            check_entries(entries, members)?;
            split_exactly(amount, entries)?
        }
        SplitPolicy::Percentage(entries) => {
            check_entries(entries, members)?;
            split_by_percentage(amount, entries)?
        }
    };
    Ok(shares
        .into_iter()
        .filter(|share| !share.amount.is_zero())
        .collect())
}

fn has_currency_scale(value: Decimal) -> bool {
    value.round_dp(CURRENCY_SCALE) == value
}

fn truncate(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::ToZero)
}

fn split_equally(amount: Decimal, members: &[UserNick]) -> Result<Vec<Share>, SplitError> {
    if members.is_empty() {
        return Err(SplitError::InvalidPolicy);
    }
    let count = Decimal::from(members.len());
    let base = truncate(amount / count);
    let residual = amount - base * count;

    Ok(members
        .iter()
        .enumerate()
        .map(|(index, member)| Share {
            member: member.clone(),
            amount: if index == 0 { base + residual } else { base },
            percentage: None,
        })
        .collect())
}

fn split_exactly(amount: Decimal, entries: &[MemberShare]) -> Result<Vec<Share>, SplitError> {
    for entry in entries {
        if entry.value > MAX_AMOUNT || !has_currency_scale(entry.value) {
            return Err(SplitError::InvalidAmount(entry.value));
        }
    }
    let declared: Decimal = entries.iter().map(|entry| entry.value).sum();
    if declared != amount {
        return Err(SplitError::AmountMismatch { declared, amount });
    }
    Ok(entries
        .iter()
        .map(|entry| Share {
            member: entry.member.clone(),
            amount: entry.value,
            percentage: None,
        })
        .collect())
}

fn split_by_percentage(
    amount: Decimal,
    entries: &[MemberShare],
) -> Result<Vec<Share>, SplitError> {
    for entry in entries {
        if entry.value > HUNDRED || !has_currency_scale(entry.value) {
            return Err(SplitError::InvalidPercentage(entry.value));
        }
    }
    let declared: Decimal = entries.iter().map(|entry| entry.value).sum();
    if (declared - HUNDRED).abs() > PERCENTAGE_TOLERANCE {
        return Err(SplitError::PercentageMismatch { declared });
    }

    let mut shares: Vec<Share> = entries
        .iter()
        .map(|entry| Share {
            member: entry.member.clone(),
            amount: truncate(amount * entry.value / HUNDRED),
            percentage: Some(entry.value),
        })
        .collect();

    let residual = amount - shares.iter().map(|share| share.amount).sum::<Decimal>();
    absorb_residual(&mut shares, residual);
    Ok(shares)
}

/// Folds the rounding residual back into the shares so they sum to the total.
///
/// A surplus goes to the first member with a non-zero percentage. A deficit
/// (percentages summing slightly above 100) is taken from the shares in order,
/// never pushing any of them below zero.
fn absorb_residual(shares: &mut [Share], residual: Decimal) {
    if residual >= Decimal::ZERO {
        if let Some(first) = shares
            .iter_mut()
            .find(|share| share.percentage.is_some_and(|p| !p.is_zero()))
        {
            first.amount += residual;
        }
        return;
    }
    let mut owed = -residual;
    for share in shares.iter_mut() {
        if owed.is_zero() {
            break;
        }
        let taken = owed.min(share.amount);
        share.amount -= taken;
        owed -= taken;
    }
}

fn check_entries(entries: &[MemberShare], members: &[UserNick]) -> Result<(), SplitError> {
    if entries.is_empty() {
        return Err(SplitError::InvalidPolicy);
    }
    let mut seen = HashSet::new();
    for entry in entries {
        if !members.contains(&entry.member) {
            return Err(SplitError::UnknownMember(entry.member.clone()));
        }
        if !seen.insert(entry.member.as_str()) {
            return Err(SplitError::DuplicateMember(entry.member.clone()));
        }
        if entry.value < Decimal::ZERO {
            return Err(SplitError::NegativeShare(entry.member.clone()));
        }
    }
    Ok(())
}
