pub mod db_connect;
pub mod service;
pub mod store;

use anyhow::Context;
use app_config::SurrealDbConfig;
use app_error::{AppError, AppErrorExt, AppResult};
use serde::{Deserialize, Serialize};
use surrealdb::{
    Surreal,
    engine::any::{self, Any},
    opt::auth::Root,
    sql::{Id, Thing},
};

pub use service::DbService;
pub use store::{RoleStore, SurrealRoleStore, SurrealUserStore, UserStore};

/// Shared SurrealDB client. Cloning is cheap and every clone talks to the
/// same datastore, so one `Database` serves the whole process.
#[derive(Clone)]
pub struct Database {
    client: Surreal<Any>,
}

impl Database {
    pub async fn initialize(config: &SurrealDbConfig) -> AppResult<Self> {
        if config.namespace.trim().is_empty() {
            return Err(AppError::ValidationError(
                "Database namespace cannot be empty".into(),
            ));
        }

        if config.database.trim().is_empty() {
            return Err(AppError::ValidationError(
                "Database name cannot be empty".into(),
            ));
        }

        let client = any::connect(config.endpoint.as_str())
            .await
            .with_context(|| format!("Failed to connect to {}", config.endpoint))
            .db_err()?;

        if !is_memory_endpoint(&config.endpoint) {
            client
                .signin(Root {
                    username: &config.username,
                    password: &config.password,
                })
                .await
                .context("Failed to authenticate with database")
                .db_err()?;
        }

        client
            .use_ns(&config.namespace)
            .use_db(&config.database)
            .await
            .context("Failed to select namespace and database")
            .db_err()?;

        Ok(Self { client })
    }

    /// Fresh, isolated in-memory datastore.
    pub async fn initialize_memory_db(namespace: &str, database: &str) -> AppResult<Self> {
        let config = SurrealDbConfig {
            endpoint: "mem://".to_string(),
            username: String::new(),
            password: String::new(),
            namespace: namespace.to_string(),
            database: database.to_string(),
        };
        Self::initialize(&config).await
    }

    pub async fn create<T>(&self, table: &str, key: &str, data: T) -> AppResult<Option<T>>
    where
        T: Serialize + for<'de> Deserialize<'de> + 'static,
    {
        self.client
            .create((table.to_string(), key.to_string()))
            .content(data)
            .await
            .map_err(|e| write_error(e, "Failed to create record"))
    }

    pub async fn update<T>(&self, table: &str, key: &str, data: T) -> AppResult<Option<T>>
    where
        T: Serialize + for<'de> Deserialize<'de> + 'static,
    {
        self.client
            .update((table.to_string(), key.to_string()))
            .content(data)
            .await
            .map_err(|e| write_error(e, "Failed to update record"))
    }

    pub async fn delete<T>(&self, table: &str, key: &str) -> AppResult<Option<T>>
    where
        T: for<'de> Deserialize<'de>,
    {
        self.client
            .delete((table.to_string(), key.to_string()))
            .await
            .context("Failed to delete record")
            .db_err()
    }

    pub async fn select<T>(&self, table: &str, key: &str) -> AppResult<Option<T>>
    where
        T: for<'de> Deserialize<'de>,
    {
        self.client
            .select((table.to_string(), key.to_string()))
            .await
            .context("Failed to select record")
            .db_err()
    }

    pub fn query(&self, sql: impl Into<String>) -> QueryBuilder<'_> {
        QueryBuilder {
            client: &self.client,
            sql: sql.into(),
            bindings: Vec::new(),
        }
    }

    /// Round trip used by `/db-status`.
    pub async fn health_check(&self) -> AppResult<()> {
        self.client
            .health()
            .await
            .context("Database health check failed")
            .db_err()?;
        self.query("INFO FOR DB").execute().await?;
        Ok(())
    }
}

pub struct QueryBuilder<'a> {
    client: &'a Surreal<Any>,
    sql: String,
    bindings: Vec<(String, serde_json::Value)>,
}

impl QueryBuilder<'_> {
    pub fn bind(mut self, binding: (impl Into<String>, impl Into<serde_json::Value>)) -> Self {
        self.bindings.push((binding.0.into(), binding.1.into()));
        self
    }

    pub async fn execute(self) -> AppResult<QueryResponse> {
        let mut query = self.client.query(self.sql);

        for binding in self.bindings {
            query = query.bind(binding);
        }

        let response = query
            .await
            .map_err(|e| write_error(e, "Failed to execute query"))?
            .check()
            .map_err(|e| write_error(e, "Query returned an error"))?;
        Ok(QueryResponse(response))
    }
}

pub struct QueryResponse(surrealdb::Response);

impl QueryResponse {
    pub fn take<T>(mut self, index: usize) -> AppResult<Vec<T>>
    where
        T: for<'de> Deserialize<'de>,
    {
        self.0
            .take(index)
            .context("Failed to extract query results")
            .db_err()
    }
}

/// Unique index violations become `ResourceExistsError`, everything else
/// is a `DatabaseError`.
fn write_error(error: surrealdb::Error, context: &str) -> AppError {
    let message = error.to_string();
    match violated_index(&message) {
        Some(index) => {
            let field = index.split_once('_').map_or(index, |(_, field)| field);
            AppError::ResourceExistsError(format!(
                "A record with this {} already exists.",
                field
            ))
        }
        None => AppError::DatabaseError(anyhow::anyhow!("{}: {}", context, message)),
    }
}

// "Database index `users_username` already contains 'alice', with record `users:…`"
fn violated_index(message: &str) -> Option<&str> {
    if !message.contains("already contains") {
        return None;
    }
    let start = message.find("index `")? + "index `".len();
    let end = start + message[start..].find('`')?;
    Some(&message[start..end])
}

fn is_memory_endpoint(endpoint: &str) -> bool {
    endpoint.starts_with("mem://") || endpoint == "memory"
}

/// Key part of a record id as plain text (`users:⟨abc⟩` -> `abc`).
pub fn record_key(thing: &Thing) -> String {
    match &thing.id {
        Id::String(key) => key.clone(),
        other => other.to_string(),
    }
}
