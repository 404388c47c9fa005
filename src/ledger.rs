//! Request-level operations over groups and expenses.
//!
//! Every group mutation follows the same shape: load the group, apply the
//! change in memory, then write it back conditioned on the version that was
//! read. The write carries the whole group document, so an expense and its
//! splits are created (or amended, or removed) together or not at all.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::balance::{compute_balance_from_group, Balance};
use crate::error::LedgerError;
use crate::schemas::{Expense, Group, Member, Split};
use crate::split::{compute_splits, validate_amount, SplitPolicy};
use crate::store::ExpenseStore;

const MAX_WRITE_ATTEMPTS: usize = 3;

#[derive(Clone, Debug, Deserialize)]
pub struct NewGroup {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Payload for creating or amending a shared expense.
#[derive(Clone, Debug, Deserialize)]
pub struct NewSharedExpense {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub amount: Decimal,
    pub date: Option<NaiveDate>,
    pub category: Option<String>,
    pub policy: SplitPolicy,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewPersonalExpense {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub amount: Decimal,
    pub date: Option<NaiveDate>,
    pub category: Option<String>,
}

pub struct Ledger {
    store: Arc<dyn ExpenseStore>,
}

impl Ledger {
    pub fn new(store: Arc<dyn ExpenseStore>) -> Self {
        Ledger { store }
    }

    pub async fn create_group(
        &self,
        actor: &str,
        id: String,
        new_group: NewGroup,
    ) -> Result<Group, LedgerError> {
        let group = Group::new(id, new_group.name, new_group.description, actor.to_string());
        self.store.insert_group(&group).await?;
        info!(group = %group.id, creator = actor, "group created");
        Ok(group)
    }

    pub async fn group(&self, actor: &str, id: &str) -> Result<Group, LedgerError> {
        let group = self.load_group(id).await?;
        require_member(&group, actor)?;
        Ok(group)
    }

    pub async fn balances(&self, actor: &str, id: &str) -> Result<Balance, LedgerError> {
        let group = self.group(actor, id).await?;
        Ok(compute_balance_from_group(&group))
    }

    pub async fn join_group(&self, actor: &str, id: &str) -> Result<Group, LedgerError> {
        self.mutate_group(id, |group| {
            add_member(group, actor)?;
            Ok(group.clone())
        })
        .await
    }

    pub async fn add_member(
        &self,
        actor: &str,
        id: &str,
        nick: &str,
    ) -> Result<Group, LedgerError> {
        self.mutate_group(id, |group| {
            require_admin(group, actor, "add members")?;
            add_member(group, nick)?;
            Ok(group.clone())
        })
        .await
    }

    pub async fn leave_group(&self, actor: &str, id: &str) -> Result<(), LedgerError> {
        self.mutate_group(id, |group| remove_member(group, actor))
            .await
    }

    pub async fn remove_member(
        &self,
        actor: &str,
        id: &str,
        nick: &str,
    ) -> Result<(), LedgerError> {
        self.mutate_group(id, |group| {
            require_admin(group, actor, "remove members")?;
            remove_member(group, nick)
        })
        .await
    }

    /// Records an expense paid by `actor` and splits it among the current
    /// members. The payer's own share is settled from the start.
    pub async fn add_shared_expense(
        &self,
        actor: &str,
        group_id: &str,
        new_expense: NewSharedExpense,
    ) -> Result<Expense, LedgerError> {
        let expense = self
            .mutate_group(group_id, |group| {
                require_member(group, actor)?;
                let now = Utc::now();
                let splits = build_splits(group, actor, &new_expense)?;
                let expense = Expense {
                    id: Uuid::new_v4().to_string(),
                    title: new_expense.title.clone(),
                    description: new_expense.description.clone(),
                    amount: new_expense.amount,
                    payer: actor.to_string(),
                    date: new_expense.date.unwrap_or_else(|| now.date_naive()),
                    category: new_expense.category.clone(),
                    group: Some(group.id.clone()),
                    policy: Some(new_expense.policy.clone()),
                    splits,
                    created_at: now,
                    updated_at: now,
                };
                group.expenses.push(expense.clone());
                Ok(expense)
            })
            .await?;
        info!(
            group = group_id,
            expense = %expense.id,
            amount = %expense.amount,
            policy = expense.policy.as_ref().map(SplitPolicy::name),
            "shared expense added"
        );
        Ok(expense)
    }

    /// Replaces the details and splits of an expense nobody has settled yet.
    pub async fn update_shared_expense(
        &self,
        actor: &str,
        group_id: &str,
        expense_id: &str,
        changes: NewSharedExpense,
    ) -> Result<Expense, LedgerError> {
        self.mutate_group(group_id, |group| {
            let payer = editable_expense(group, actor, expense_id)?.payer.clone();
            let splits = build_splits(group, &payer, &changes)?;
            let expense = group
                .expense_mut(expense_id)
                .ok_or_else(|| LedgerError::ExpenseNotFound(expense_id.to_string()))?;
            expense.title = changes.title.clone();
            expense.description = changes.description.clone();
            expense.amount = changes.amount;
            if let Some(date) = changes.date {
                expense.date = date;
            }
            expense.category = changes.category.clone();
            expense.policy = Some(changes.policy.clone());
            expense.splits = splits;
            expense.updated_at = Utc::now();
            Ok(expense.clone())
        })
        .await
    }

    pub async fn delete_shared_expense(
        &self,
        actor: &str,
        group_id: &str,
        expense_id: &str,
    ) -> Result<(), LedgerError> {
        self.mutate_group(group_id, |group| {
            editable_expense(group, actor, expense_id)?;
            group.expenses.retain(|expense| expense.id != expense_id);
            Ok(())
        })
        .await?;
        info!(group = group_id, expense = expense_id, "shared expense deleted");
        Ok(())
    }

    /// Marks the actor's split on an expense as paid.
    pub async fn settle_split(
        &self,
        actor: &str,
        group_id: &str,
        expense_id: &str,
    ) -> Result<Split, LedgerError> {
        let split = self
            .mutate_group(group_id, |group| {
                require_member(group, actor)?;
                let expense = group
                    .expense_mut(expense_id)
                    .ok_or_else(|| LedgerError::ExpenseNotFound(expense_id.to_string()))?;
                let split = expense
                    .splits
                    .iter_mut()
                    .find(|split| split.member == actor)
                    .ok_or_else(|| LedgerError::NoSplit {
                        expense: expense_id.to_string(),
                        member: actor.to_string(),
                    })?;
                if split.settled {
                    return Err(LedgerError::AlreadySettled {
                        expense: expense_id.to_string(),
                        member: actor.to_string(),
                    });
                }
                split.settled = true;
                split.settled_at = Some(Utc::now());
                Ok(split.clone())
            })
            .await?;
        info!(group = group_id, expense = expense_id, member = actor, "split settled");
        Ok(split)
    }

    pub async fn record_personal_expense(
        &self,
        actor: &str,
        new_expense: NewPersonalExpense,
    ) -> Result<Expense, LedgerError> {
        validate_amount(new_expense.amount)?;
        let now = Utc::now();
        let expense = Expense {
            id: Uuid::new_v4().to_string(),
            title: new_expense.title,
            description: new_expense.description,
            amount: new_expense.amount,
            payer: actor.to_string(),
            date: new_expense.date.unwrap_or_else(|| now.date_naive()),
            category: new_expense.category,
            group: None,
            policy: None,
            splits: vec![],
            created_at: now,
            updated_at: now,
        };
        self.store.insert_personal_expense(&expense).await?;
        Ok(expense)
    }

    pub async fn personal_expenses(&self, actor: &str) -> Result<Vec<Expense>, LedgerError> {
        Ok(self.store.personal_expenses(actor).await?)
    }

    async fn load_group(&self, id: &str) -> Result<Group, LedgerError> {
        self.store
            .find_group(id)
            .await?
            .ok_or_else(|| LedgerError::GroupNotFound(id.to_string()))
    }

    /// Applies `change` to the latest stored version of a group and writes it
    /// back, retrying when a concurrent writer bumped the version first.
    async fn mutate_group<T>(
        &self,
        id: &str,
        mut change: impl FnMut(&mut Group) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let mut group = self.load_group(id).await?;
            let expected_version = group.version;
            let outcome = change(&mut group)?;
            group.version += 1;
            group.updated_at = Utc::now();
            if self.store.replace_group(&group, expected_version).await? {
                return Ok(outcome);
            }
            warn!(group = id, attempt, "group changed concurrently, retrying");
        }
        Err(LedgerError::Conflict(id.to_string()))
    }
}

fn require_member(group: &Group, nick: &str) -> Result<(), LedgerError> {
    if group.is_member(nick) {
        Ok(())
    } else {
        Err(LedgerError::NotMember {
            group: group.id.clone(),
            member: nick.to_string(),
        })
    }
}

fn require_admin(group: &Group, nick: &str, action: &'static str) -> Result<(), LedgerError> {
    require_member(group, nick)?;
    if group.is_admin(nick) {
        Ok(())
    } else {
        Err(LedgerError::NotAdmin(action))
    }
}

fn add_member(group: &mut Group, nick: &str) -> Result<(), LedgerError> {
    if group.is_member(nick) {
        return Err(LedgerError::AlreadyMember {
            group: group.id.clone(),
            member: nick.to_string(),
        });
    }
    group.members.push(Member {
        nick: nick.to_string(),
        is_admin: false,
        joined_at: Utc::now(),
    });
    Ok(())
}

fn remove_member(group: &mut Group, nick: &str) -> Result<(), LedgerError> {
    require_member(group, nick)?;
    if group.has_unsettled_splits(nick) {
        return Err(LedgerError::UnsettledSplits {
            group: group.id.clone(),
            member: nick.to_string(),
        });
    }
    group.members.retain(|member| member.nick != nick);
    Ok(())
}

/// Looks up an expense the actor may still change.
fn editable_expense<'a>(
    group: &'a Group,
    actor: &str,
    expense_id: &str,
) -> Result<&'a Expense, LedgerError> {
    require_member(group, actor)?;
    let expense = group
        .expense(expense_id)
        .ok_or_else(|| LedgerError::ExpenseNotFound(expense_id.to_string()))?;
    if expense.payer != actor && !group.is_admin(actor) {
        return Err(LedgerError::NotPayer(expense_id.to_string()));
    }
    if expense.is_locked() {
        return Err(LedgerError::ExpenseLocked(expense_id.to_string()));
    }
    Ok(expense)
}

fn build_splits(
    group: &Group,
    payer: &str,
    new_expense: &NewSharedExpense,
) -> Result<Vec<Split>, LedgerError> {
    let now = Utc::now();
    let shares = compute_splits(new_expense.amount, &group.member_nicks(), &new_expense.policy)?;
    Ok(shares
        .into_iter()
        .map(|share| {
            let own_share = share.member == payer;
            Split {
                member: share.member,
                amount: share.amount,
                percentage: share.percentage,
                settled: own_share,
                settled_at: own_share.then_some(now),
            }
        })
        .collect())
}
