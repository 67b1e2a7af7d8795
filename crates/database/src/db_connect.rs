use app_config::SurrealDbConfig;
use app_error::AppResult;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    Database,
    store::{ROLE_TABLE, USER_TABLE},
};

fn log_transport(db_config: &SurrealDbConfig) {
    debug!("Connecting to SurrealDB: {}", db_config.endpoint);

    if db_config.endpoint.starts_with("wss://") {
        info!("Using secure TLS connection to database");
    } else if db_config.endpoint.starts_with("mem://") || db_config.endpoint == "memory" {
        info!("Using in-memory database; data is lost on shutdown");
    } else {
        warn!("Using non-secure database connection");
    }
}

/// Unique indexes backing the username/email/role-name invariants.
async fn define_schema(db: &Database) -> AppResult<()> {
    let statements = format!(
        "DEFINE INDEX IF NOT EXISTS {users}_username ON TABLE {users} COLUMNS username UNIQUE;
         DEFINE INDEX IF NOT EXISTS {users}_email ON TABLE {users} COLUMNS email UNIQUE;
         DEFINE INDEX IF NOT EXISTS {users}_role ON TABLE {users} COLUMNS role_id;
         DEFINE INDEX IF NOT EXISTS {roles}_name ON TABLE {roles} COLUMNS name UNIQUE;",
        users = USER_TABLE,
        roles = ROLE_TABLE,
    );
    db.query(statements).execute().await?;
    Ok(())
}

pub async fn initialize_user_db(db_config: &SurrealDbConfig) -> AppResult<Arc<Database>> {
    log_transport(db_config);

    let db = Database::initialize(db_config).await?;
    define_schema(&db).await?;

    info!(
        namespace = %db_config.namespace,
        database = %db_config.database,
        "Successfully connected to user database"
    );

    Ok(Arc::new(db))
}

pub async fn initialize_memory_db() -> AppResult<Arc<Database>> {
    let db = Database::initialize_memory_db("auth", "users").await?;
    define_schema(&db).await?;

    debug!("Successfully connected to in-memory SurrealDB");

    Ok(Arc::new(db))
}
