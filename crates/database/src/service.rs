use app_error::{AppError, AppResult};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{future::Future, marker::PhantomData, sync::Arc};

use crate::Database;

lazy_static! {
    // SurrealDB identifier rules; anything else is never interpolated into SQL
    static ref IDENTIFIER_REGEX: Regex = Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("identifier regex is valid");
}

#[derive(Debug, Deserialize)]
struct CountRow {
    total: u64,
}

/// Typed access to one table.
pub struct DbService<T> {
    db: Arc<Database>,
    table_name: String,
    _phantom: PhantomData<T>,
}

impl<T> Clone for DbService<T> {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            table_name: self.table_name.clone(),
            _phantom: PhantomData,
        }
    }
}

impl<T> DbService<T>
where
    T: Serialize + for<'de> Deserialize<'de> + Send + Sync + 'static,
{
    pub fn new(db: Arc<Database>, table_name: impl Into<String>) -> Self {
        Self {
            db,
            table_name: table_name.into(),
            _phantom: PhantomData,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    // Generic DB operation wrapper with consistent error handling and logging
    async fn execute_db_operation<F, R>(&self, operation: &str, execute: F) -> AppResult<R>
    where
        F: Future<Output = AppResult<R>>,
    {
        execute.await.map_err(|e| {
            if let AppError::DatabaseError(err) = e {
                tracing::error!(table = %self.table_name, operation, error = %err, "Database operation failed");
                AppError::DatabaseError(anyhow::anyhow!(
                    "Failed to {} {} record: {}",
                    operation,
                    self.table_name,
                    err
                ))
            } else {
                e
            }
        })
    }

    pub async fn create_record(&self, record_id: &str, item: T) -> AppResult<Option<T>> {
        self.execute_db_operation("create", async {
            self.db.create(&self.table_name, record_id, item).await
        })
        .await
    }

    pub async fn update_record(&self, record_id: &str, updated_data: T) -> AppResult<Option<T>> {
        self.execute_db_operation("update", async {
            self.db
                .update(&self.table_name, record_id, updated_data)
                .await
        })
        .await
    }

    /// Merges `patch` into one record, leaving fields it does not name alone.
    ///
    /// With a `guard`, the write only happens while `field` still holds the
    /// expected value, checked and written in one statement. `Ok(None)` means
    /// no record matched.
    pub async fn merge_record(
        &self,
        record_id: &str,
        patch: serde_json::Value,
        guard: Option<(&str, serde_json::Value)>,
    ) -> AppResult<Option<T>> {
        self.validate_identifier(&self.table_name)?;
        let mut sql = String::from("UPDATE type::thing($table, $id) MERGE $patch");
        let expected = match guard {
            Some((field, value)) => {
                self.validate_identifier(field)?;
                sql.push_str(&format!(" WHERE {} = $expected", field));
                Some(value)
            }
            None => None,
        };
        sql.push_str(" RETURN AFTER");

        self.execute_db_operation("merge", async {
            let mut query = self
                .db
                .query(sql)
                .bind(("table", self.table_name.clone()))
                .bind(("id", record_id.to_string()))
                .bind(("patch", patch));
            if let Some(expected) = expected {
                query = query.bind(("expected", expected));
            }
            let records: Vec<T> = query.execute().await?.take(0)?;
            Ok(records.into_iter().next())
        })
        .await
    }

    pub async fn delete_record(&self, record_id: &str) -> AppResult<Option<T>> {
        self.execute_db_operation("delete", async {
            self.db.delete(&self.table_name, record_id).await
        })
        .await
    }

    pub async fn get_record_by_id(&self, record_id: &str) -> AppResult<Option<T>> {
        self.execute_db_operation("fetch", async {
            self.db.select(&self.table_name, record_id).await
        })
        .await
    }

    // Validate identifier for SQL injection prevention
    fn validate_identifier(&self, identifier: &str) -> AppResult<()> {
        if !IDENTIFIER_REGEX.is_match(identifier) {
            return Err(AppError::ValidationError(format!(
                "Invalid identifier '{}': must start with a letter or underscore and contain only alphanumeric characters and underscores",
                identifier
            )));
        }

        Ok(())
    }

    fn bind_value<V: Serialize>(&self, field: &str, value: V) -> AppResult<serde_json::Value> {
        self.validate_identifier(field)?;
        self.validate_identifier(&self.table_name)?;

        serde_json::to_value(value).map_err(|e| {
            AppError::ValidationError(format!(
                "Failed to serialize value for field '{}': {}",
                field, e
            ))
        })
    }

    pub async fn get_records_by_field<V>(&self, field: &str, value: V) -> AppResult<Vec<T>>
    where
        V: Serialize,
    {
        let value_json = self.bind_value(field, value)?;
        let sql = format!("SELECT * FROM {} WHERE {} = $value", self.table_name, field);

        self.execute_db_operation("query", async {
            let response = self.db.query(sql).bind(("value", value_json)).execute().await?;
            response.take(0)
        })
        .await
    }

    pub async fn count_by_field<V>(&self, field: &str, value: V) -> AppResult<u64>
    where
        V: Serialize,
    {
        let value_json = self.bind_value(field, value)?;
        let sql = format!(
            "SELECT count() AS total FROM {} WHERE {} = $value GROUP ALL",
            self.table_name, field
        );

        self.execute_db_operation("count", async {
            let response = self.db.query(sql).bind(("value", value_json)).execute().await?;
            let rows: Vec<CountRow> = response.take(0)?;
            Ok(rows.first().map(|row| row.total).unwrap_or(0))
        })
        .await
    }
}
