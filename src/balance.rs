use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::schemas::{Group, UserNick};

/// Signed balance per member: positive means the member is owed money.
pub type Balance = BTreeMap<UserNick, Decimal>;

pub fn compute_balance_from_group(group: &Group) -> Balance {
    let mut balance: Balance = group
        .members
        .iter()
        .map(|member| (member.nick.clone(), Decimal::ZERO))
        .collect();
    for expense in &group.expenses {
        // The payer's own share is owed to themselves and never moves money
        for split in expense
            .splits
            .iter()
            .filter(|split| !split.settled && split.member != expense.payer)
        {
            *balance.entry(expense.payer.clone()).or_default() += split.amount;
            *balance.entry(split.member.clone()).or_default() -= split.amount;
        }
    }
    balance
}
