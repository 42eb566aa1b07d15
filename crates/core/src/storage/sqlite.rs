use crate::storage::KeyValueStore;
use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

pub async fn migrate(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}

/// Key-value storage backed by a single SQLite table.
#[derive(Debug, Clone)]
pub struct SqliteKvStore {
    pool: SqlitePool,
}

impl SqliteKvStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid sqlite url: {database_url}"))?
            .create_if_missing(true);
        // One connection: `sqlite::memory:` databases are per-connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("connect DATABASE_URL failed")?;
        migrate(&pool).await?;
        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl KeyValueStore for SqliteKvStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM client_kv WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("select client_kv failed (key={key})"))?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let t0 = std::time::Instant::now();
        sqlx::query(
            "INSERT INTO client_kv (key, value, updated_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT (key) DO UPDATE \
             SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .with_context(|| format!("upsert client_kv failed (key={key})"))?;

        tracing::debug!(
            %key,
            bytes = value.len(),
            elapsed_ms = t0.elapsed().as_millis(),
            "client_kv upsert"
        );
        Ok(())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM client_kv WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await
            .with_context(|| format!("delete client_kv failed (key={key})"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upserts_and_deletes() {
        let store = SqliteKvStore::connect("sqlite::memory:").await.unwrap();
        assert_eq!(store.get("tamio_rules_u1").await.unwrap(), None);

        store.set("tamio_rules_u1", "{\"version\":1}").await.unwrap();
        store.set("tamio_rules_u1", "{\"version\":2}").await.unwrap();
        assert_eq!(
            store.get("tamio_rules_u1").await.unwrap().as_deref(),
            Some("{\"version\":2}")
        );

        store.remove("tamio_rules_u1").await.unwrap();
        assert_eq!(store.get("tamio_rules_u1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn keys_do_not_collide() {
        let store = SqliteKvStore::connect("sqlite::memory:").await.unwrap();
        store.set("tamio_dashboard_u1", "a").await.unwrap();
        store.set("tamio_dashboard_u2", "b").await.unwrap();
        assert_eq!(store.get("tamio_dashboard_u1").await.unwrap().as_deref(), Some("a"));
        assert_eq!(store.get("tamio_dashboard_u2").await.unwrap().as_deref(), Some("b"));
    }
}
