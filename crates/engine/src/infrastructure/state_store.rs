//! SQLite-backed adventure state storage.
//!
//! States are stored as one JSON blob per adventure, indexed by user
//! id and the client's resumption key. The blob is deliberately
//! schema-less on the database side; reconstruction handles whatever
//! shape comes back out.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

use taleweaver_domain::{AdventureId, UserId};

use crate::infrastructure::ports::{ClockPort, StateStorePort, StoreError, StoredAdventure};

/// SQLite implementation of the adventure state store.
pub struct SqliteStateStore {
    pool: SqlitePool,
    clock: Arc<dyn ClockPort>,
}

impl SqliteStateStore {
    pub async fn new(db_path: &str, clock: Arc<dyn ClockPort>) -> Result<Self, StoreError> {
        let pool = SqlitePool::connect(&format!("sqlite:{}?mode=rwc", db_path))
            .await
            .map_err(|e| StoreError::database("state_store", e))?;
        Self::with_pool(pool, clock).await
    }

    pub async fn with_pool(
        pool: SqlitePool,
        clock: Arc<dyn ClockPort>,
    ) -> Result<Self, StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS adventure_states (
                id TEXT PRIMARY KEY,
                user_id TEXT,
                client_key TEXT,
                state_json TEXT NOT NULL,
                is_complete INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| StoreError::database("state_store", e))?;

        Ok(Self { pool, clock })
    }

    async fn find_latest_incomplete(
        &self,
        column: &str,
        value: String,
    ) -> Result<Option<StoredAdventure>, StoreError> {
        // `column` is one of two fixed identifiers, never user input.
        let query = format!(
            "SELECT id, state_json FROM adventure_states \
             WHERE {column} = ? AND is_complete = 0 \
             ORDER BY updated_at DESC LIMIT 1"
        );

        let row = sqlx::query(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::database("state_store", e))?;

        match row {
            Some(row) => {
                let id_text: String = row.get("id");
                let id = id_text
                    .parse::<AdventureId>()
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                let json: String = row.get("state_json");
                let state = serde_json::from_str(&json)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                Ok(Some(StoredAdventure { id, state }))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl StateStorePort for SqliteStateStore {
    async fn store_state(
        &self,
        id: AdventureId,
        state: serde_json::Value,
        user_id: Option<UserId>,
        client_key: Option<String>,
    ) -> Result<(), StoreError> {
        let json =
            serde_json::to_string(&state).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let now = self.clock.now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO adventure_states (id, user_id, client_key, state_json, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                user_id = excluded.user_id,
                client_key = excluded.client_key,
                state_json = excluded.state_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(id.to_string())
        .bind(user_id.map(|u| u.to_string()))
        .bind(client_key)
        .bind(json)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::database("state_store", e))?;

        Ok(())
    }

    async fn get_state(&self, id: AdventureId) -> Result<Option<serde_json::Value>, StoreError> {
        let row = sqlx::query("SELECT state_json FROM adventure_states WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::database("state_store", e))?;

        match row {
            Some(row) => {
                let json: String = row.get("state_json");
                let state = serde_json::from_str(&json)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    async fn find_for_user(&self, user_id: UserId) -> Result<Option<StoredAdventure>, StoreError> {
        self.find_latest_incomplete("user_id", user_id.to_string())
            .await
    }

    async fn find_by_client_key(
        &self,
        key: String,
    ) -> Result<Option<StoredAdventure>, StoreError> {
        self.find_latest_incomplete("client_key", key).await
    }

    async fn mark_complete(&self, id: AdventureId) -> Result<(), StoreError> {
        sqlx::query("UPDATE adventure_states SET is_complete = 1, updated_at = ? WHERE id = ?")
            .bind(self.clock.now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::database("state_store", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::SystemClock;
    use serde_json::json;

    // A file-backed store per test: an in-memory pool would hand each
    // pooled connection its own empty database.
    async fn temp_store() -> (SqliteStateStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("adventures.db");
        let store = SqliteStateStore::new(
            path.to_str().expect("utf-8 path"),
            Arc::new(SystemClock::new()),
        )
        .await
        .expect("schema");
        (store, dir)
    }

    #[tokio::test]
    async fn store_and_get_round_trip() {
        let (store, _dir) = temp_store().await;
        let id = AdventureId::new();
        let state = json!({"story_length": 10, "chapters": []});

        store
            .store_state(id, state.clone(), None, None)
            .await
            .expect("stores");

        let loaded = store.get_state(id).await.expect("loads");
        assert_eq!(loaded, Some(state));
    }

    #[tokio::test]
    async fn lookup_by_user_skips_completed_adventures() {
        let (store, _dir) = temp_store().await;
        let user = UserId::new();

        let finished = AdventureId::new();
        store
            .store_state(finished, json!({"n": 1}), Some(user), None)
            .await
            .expect("stores");
        store.mark_complete(finished).await.expect("completes");

        let active = AdventureId::new();
        store
            .store_state(active, json!({"n": 2}), Some(user), None)
            .await
            .expect("stores");

        let found = store.find_for_user(user).await.expect("query");
        let found = found.expect("active adventure is found");
        assert_eq!(found.id, active);
    }

    #[tokio::test]
    async fn lookup_by_client_key() {
        let (store, _dir) = temp_store().await;
        let id = AdventureId::new();
        store
            .store_state(id, json!({"n": 3}), None, Some("client-abc".into()))
            .await
            .expect("stores");

        let found = store
            .find_by_client_key("client-abc".into())
            .await
            .expect("query");
        assert_eq!(found.expect("found").id, id);

        let missing = store
            .find_by_client_key("other".into())
            .await
            .expect("query");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn upsert_replaces_the_blob() {
        let (store, _dir) = temp_store().await;
        let id = AdventureId::new();
        store
            .store_state(id, json!({"v": 1}), None, None)
            .await
            .expect("stores");
        store
            .store_state(id, json!({"v": 2}), None, None)
            .await
            .expect("updates");

        let loaded = store.get_state(id).await.expect("loads");
        assert_eq!(loaded, Some(json!({"v": 2})));
    }
}
