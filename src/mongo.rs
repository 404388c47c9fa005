use async_trait::async_trait;
use bson::doc;
use futures::TryStreamExt;
use mongodb::{
    error::{ErrorKind, WriteFailure},
    options::{FindOptions, IndexOptions},
    Client, Collection, IndexModel,
};
use tracing::info;

use crate::schemas::{Expense, Group};
use crate::store::{ExpenseStore, StoreError};

const DUPLICATE_KEY: i32 = 11000;

pub struct MongoStore {
    groups: Collection<Group>,
    expenses: Collection<Expense>,
}

impl MongoStore {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(uri).await?;
        let database = client.database(database);
        let store = MongoStore {
            groups: database.collection("Groups"),
            expenses: database.collection("Expenses"),
        };
        store.ensure_indexes().await?;
        info!(database = %database.name(), "connected to MongoDB");
        Ok(store)
    }

    async fn ensure_indexes(&self) -> Result<(), StoreError> {
        let unique_id = IndexModel::builder()
            .keys(doc! { "id": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.groups.create_index(unique_id, None).await?;

        let by_payer = IndexModel::builder()
            .keys(doc! { "payer": 1, "date": -1 })
            .build();
        self.expenses.create_index(by_payer, None).await?;
        Ok(())
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error)) if write_error.code == DUPLICATE_KEY
    )
}

#[async_trait]
impl ExpenseStore for MongoStore {
    async fn insert_group(&self, group: &Group) -> Result<(), StoreError> {
        match self.groups.insert_one(group, None).await {
            Ok(_) => Ok(()),
            Err(err) if is_duplicate_key(&err) => Err(StoreError::DuplicateGroup(group.id.clone())),
            Err(err) => Err(err.into()),
        }
    }

    async fn find_group(&self, id: &str) -> Result<Option<Group>, StoreError> {
        Ok(self.groups.find_one(doc! { "id": id }, None).await?)
    }

    async fn replace_group(
        &self,
        group: &Group,
        expected_version: i64,
    ) -> Result<bool, StoreError> {
        let result = self
            .groups
            .replace_one(
                doc! { "id": group.id.as_str(), "version": expected_version },
                group,
                None,
            )
            .await?;
        Ok(result.matched_count == 1)
    }

    async fn insert_personal_expense(&self, expense: &Expense) -> Result<(), StoreError> {
        self.expenses.insert_one(expense, None).await?;
        Ok(())
    }

    async fn personal_expenses(&self, payer: &str) -> Result<Vec<Expense>, StoreError> {
        let options = FindOptions::builder()
            .sort(doc! { "date": -1, "created_at": -1 })
            .build();
        let cursor = self.expenses.find(doc! { "payer": payer }, options).await?;
        let expenses: Vec<Expense> = cursor.try_collect().await?;
        Ok(expenses)
    }
}
