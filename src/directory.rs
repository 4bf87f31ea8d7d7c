use async_trait::async_trait;
use sqlx::PgPool;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{error::DirectoryError, models::UserRecord};

/// UserDirectory Trait
///
/// The external mapping from identity to role/profile. Implementations report
/// "no record" as `Ok(None)` and only use `Err` when the directory itself
/// could not be consulted.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn lookup_user_record(&self, identity: Uuid) -> Result<Option<UserRecord>, DirectoryError>;
}

/// DirectoryState
///
/// Shared handle to the directory, pulled out of `AppState` via FromRef.
pub type DirectoryState = Arc<dyn UserDirectory>;

/// PostgresDirectory
///
/// Directory backed by the `users` table.
pub struct PostgresDirectory {
    pool: PgPool,
}

impl PostgresDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PostgresDirectory {
    async fn lookup_user_record(&self, identity: Uuid) -> Result<Option<UserRecord>, DirectoryError> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT id, email, display_name, role FROM users WHERE id = $1",
        )
        .bind(identity)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }
}

/// MemoryDirectory
///
/// In-process directory for local development and tests.
#[derive(Default)]
pub struct MemoryDirectory {
    records: RwLock<HashMap<Uuid, UserRecord>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = UserRecord>) -> Self {
        Self {
            records: RwLock::new(records.into_iter().map(|r| (r.id, r)).collect()),
        }
    }

    /// Demo authors matching `MemoryRepository::seeded`: one admin, one user.
    pub fn seeded() -> Self {
        Self::with_records([
            UserRecord {
                id: Uuid::from_u128(101),
                email: Some("alice@blog.dev".to_string()),
                display_name: Some("Alice Johnson".to_string()),
                role: Some("admin".to_string()),
            },
            UserRecord {
                id: Uuid::from_u128(102),
                email: Some("bob@blog.dev".to_string()),
                display_name: Some("Bob Williams".to_string()),
                role: Some("user".to_string()),
            },
        ])
    }

    /// Inserts or replaces a record, e.g. to grant or revoke a role.
    pub async fn upsert(&self, record: UserRecord) {
        self.records.write().await.insert(record.id, record);
    }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn lookup_user_record(&self, identity: Uuid) -> Result<Option<UserRecord>, DirectoryError> {
        Ok(self.records.read().await.get(&identity).cloned())
    }
}
