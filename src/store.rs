//! Persistence port for groups and personal expenses.
//!
//! A group document embeds its shared expenses and their splits, so every
//! group-level change (an expense together with all of its splits included)
//! lands in a single atomic write.

#[cfg(test)]
use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
#[cfg(test)]
use tokio::sync::Mutex;

use crate::schemas::{Expense, Group};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("group {0} already exists")]
    DuplicateGroup(String),

    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),
}

#[async_trait]
pub trait ExpenseStore: Send + Sync {
    async fn insert_group(&self, group: &Group) -> Result<(), StoreError>;

    async fn find_group(&self, id: &str) -> Result<Option<Group>, StoreError>;

    /// Replaces the stored group only if its version is still `expected_version`.
    /// Returns `false` when another writer got there first.
    async fn replace_group(&self, group: &Group, expected_version: i64)
        -> Result<bool, StoreError>;

    async fn insert_personal_expense(&self, expense: &Expense) -> Result<(), StoreError>;

    async fn personal_expenses(&self, payer: &str) -> Result<Vec<Expense>, StoreError>;
}

/// Process-local store backing the ledger and handler tests.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryStore {
    groups: Mutex<HashMap<String, Group>>,
    expenses: Mutex<Vec<Expense>>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
#[async_trait]
impl ExpenseStore for MemoryStore {
    async fn insert_group(&self, group: &Group) -> Result<(), StoreError> {
        let mut groups = self.groups.lock().await;
        if groups.contains_key(&group.id) {
            return Err(StoreError::DuplicateGroup(group.id.clone()));
        }
        groups.insert(group.id.clone(), group.clone());
        Ok(())
    }

    async fn find_group(&self, id: &str) -> Result<Option<Group>, StoreError> {
        Ok(self.groups.lock().await.get(id).cloned())
    }

    async fn replace_group(
        &self,
        group: &Group,
        expected_version: i64,
    ) -> Result<bool, StoreError> {
        let mut groups = self.groups.lock().await;
        match groups.get_mut(&group.id) {
            Some(stored) if stored.version == expected_version => {
                *stored = group.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_personal_expense(&self, expense: &Expense) -> Result<(), StoreError> {
        self.expenses.lock().await.push(expense.clone());
        Ok(())
    }

    async fn personal_expenses(&self, payer: &str) -> Result<Vec<Expense>, StoreError> {
        let mut found: Vec<Expense> = self
            .expenses
            .lock()
            .await
            .iter()
            .filter(|expense| expense.payer == payer)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.date.cmp(&a.date).then(b.created_at.cmp(&a.created_at)));
        Ok(found)
    }
}
