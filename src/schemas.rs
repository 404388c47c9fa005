use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::split::SplitPolicy;

pub type UserNick = String;

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub created_by: UserNick,
    pub members: Vec<Member>,
    pub expenses: Vec<Expense>,
    /// Bumped on every write, used as the compare-and-swap key.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Member {
    pub nick: UserNick,
    pub is_admin: bool,
    pub joined_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Expense {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub amount: Decimal,
    pub payer: UserNick,
    pub date: NaiveDate,
    pub category: Option<String>,
    /// `None` for personal expenses.
    pub group: Option<String>,
    pub policy: Option<SplitPolicy>,
    #[serde(default)]
    pub splits: Vec<Split>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Split {
    pub member: UserNick,
    pub amount: Decimal,
    pub percentage: Option<Decimal>,
    pub settled: bool,
    pub settled_at: Option<DateTime<Utc>>,
}

impl Group {
    pub fn new(id: String, name: String, description: String, creator: UserNick) -> Self {
        let now = Utc::now();
        Group {
            id,
            name,
            description,
            created_by: creator.clone(),
            members: vec![Member {
                nick: creator,
                is_admin: true,
                joined_at: now,
            }],
            expenses: vec![],
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn member(&self, nick: &str) -> Option<&Member> {
        self.members.iter().find(|member| member.nick == nick)
    }

    pub fn is_member(&self, nick: &str) -> bool {
        self.member(nick).is_some()
    }

    pub fn is_admin(&self, nick: &str) -> bool {
        self.member(nick).is_some_and(|member| member.is_admin)
    }

    pub fn member_nicks(&self) -> Vec<UserNick> {
        self.members.iter().map(|member| member.nick.clone()).collect()
    }

    pub fn has_unsettled_splits(&self, nick: &str) -> bool {
        self.expenses
            .iter()
            .flat_map(|expense| expense.splits.iter())
            .any(|split| split.member == nick && !split.settled)
    }

    pub fn expense(&self, id: &str) -> Option<&Expense> {
        self.expenses.iter().find(|expense| expense.id == id)
    }

    pub fn expense_mut(&mut self, id: &str) -> Option<&mut Expense> {
        self.expenses.iter_mut().find(|expense| expense.id == id)
    }
}

impl Expense {
    /// An expense is frozen once any member other than the payer has settled.
    pub fn is_locked(&self) -> bool {
        self.splits
            .iter()
            .any(|split| split.settled && split.member != self.payer)
    }
}
