use std::path::Path;
use std::str::FromStr;

use chrono::Utc;
use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode},
};

use crate::error::StoreError;
use crate::store::ParameterStore;

pub struct SqliteParameterStore {
    pool: SqlitePool,
}

impl SqliteParameterStore {
    /// Open (or create) a SQLite database at `path` and run migrations.
    pub async fn open(path: &Path) -> Result<Self, Report<StoreError>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .change_context(StoreError::Open)
                .attach_with(|| format!("cannot create data directory: {}", parent.display()))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .change_context(StoreError::Open)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(opts)
            .await
            .change_context(StoreError::Open)
            .attach_with(|| format!("database path: {}", path.display()))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .change_context(StoreError::Open)?;

        Ok(Self { pool })
    }
}

impl ParameterStore for SqliteParameterStore {
    fn get_raw(&self, key: &str) -> BoxFuture<'_, Result<Option<String>, Report<StoreError>>> {
        let key = key.to_owned();
        Box::pin(async move {
            let row: Option<(String,)> =
                sqlx::query_as("SELECT value FROM settings WHERE key = ?")
                    .bind(&key)
                    .fetch_optional(&self.pool)
                    .await
                    .change_context(StoreError::Read)?;
            Ok(row.map(|(value,)| value))
        })
    }

    fn set_raw(&self, key: &str, value: String) -> BoxFuture<'_, Result<(), Report<StoreError>>> {
        let key = key.to_owned();
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, \
                 updated_at = excluded.updated_at",
            )
            .bind(&key)
            .bind(&value)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .change_context(StoreError::Write)?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn in_memory_store() -> SqliteParameterStore {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")
            .unwrap()
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(opts).await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        SqliteParameterStore { pool }
    }

    #[tokio::test]
    async fn set_and_get_round_trip() {
        let store = in_memory_store().await;
        store.set_i64("stoch_period", 9).await.unwrap();
        store.set_f64("stoch_upper_level", 80.0).await.unwrap();

        assert_eq!(store.get_i64("stoch_period").await.unwrap(), Some(9));
        assert_eq!(
            store.get_f64("stoch_upper_level").await.unwrap(),
            Some(80.0)
        );
    }

    #[tokio::test]
    async fn missing_key_reads_as_none() {
        let store = in_memory_store().await;
        assert_eq!(store.get_string("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn upsert_replaces_value() {
        let store = in_memory_store().await;
        store.set_string("active_indicator", "rsi").await.unwrap();
        store
            .set_string("active_indicator", "stochastic")
            .await
            .unwrap();
        assert_eq!(
            store.get_string("active_indicator").await.unwrap().as_deref(),
            Some("stochastic")
        );
    }
}
