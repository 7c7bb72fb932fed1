use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use procman_types::{JobDescriptor, JobType};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Row, SqlitePool,
};

use crate::{JobRecord, JobStore, StoreError, StoreResult};

/// SQLite-backed job catalogue. One database file per daemon instance.
#[derive(Debug, Clone)]
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    /// Opens (creating if missing) the catalogue at `path`.
    pub async fn connect(path: &Path) -> StoreResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        Ok(Self { pool })
    }

    /// In-memory catalogue. Capped to a single connection so every query
    /// sees the same database.
    pub async fn connect_in_memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Ok(Self { pool })
    }

    /// Applies the schema. Idempotent; runs at every boot.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                name       TEXT NOT NULL UNIQUE,
                command    TEXT NOT NULL,
                job_type   TEXT NOT NULL,
                schedule   TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> StoreResult<JobRecord> {
    let type_text: String = row.try_get("job_type")?;
    let job_type = JobType::parse(&type_text)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown job type `{type_text}`")))?;

    Ok(JobRecord {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        command: row.try_get("command")?,
        job_type,
        schedule: row.try_get("schedule")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

const SELECT_COLUMNS: &str = "id, name, command, job_type, schedule, created_at, updated_at";

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn list(&self) -> StoreResult<Vec<JobRecord>> {
        let rows = sqlx::query(&format!("SELECT {SELECT_COLUMNS} FROM jobs ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn find_by_name(&self, name: &str) -> StoreResult<JobRecord> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM jobs WHERE name = ?1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => record_from_row(&row),
            None => Err(StoreError::NotFound(name.to_owned())),
        }
    }

    async fn create(&self, descriptor: &JobDescriptor) -> StoreResult<JobRecord> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO jobs (name, command, job_type, schedule, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&descriptor.name)
        .bind(&descriptor.command)
        .bind(descriptor.job_type.as_str())
        .bind(&descriptor.schedule)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => self.find_by_name(&descriptor.name).await,
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::Duplicate(descriptor.name.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn update(&self, name: &str, descriptor: &JobDescriptor) -> StoreResult<JobRecord> {
        let done = sqlx::query(
            r#"
            UPDATE jobs
            SET command = ?1, job_type = ?2, schedule = ?3, updated_at = ?4
            WHERE name = ?5
            "#,
        )
        .bind(&descriptor.command)
        .bind(descriptor.job_type.as_str())
        .bind(&descriptor.schedule)
        .bind(Utc::now())
        .bind(name)
        .execute(&self.pool)
        .await?;

        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound(name.to_owned()));
        }
        self.find_by_name(name).await
    }

    async fn delete(&self, name: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM jobs WHERE name = ?1")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str) -> JobDescriptor {
        JobDescriptor {
            name: name.to_owned(),
            command: "/bin/echo hi".to_owned(),
            job_type: JobType::OneTime,
            schedule: String::new(),
        }
    }

    async fn store() -> SqliteJobStore {
        let store = SqliteJobStore::connect_in_memory().await.unwrap();
        store.migrate().await.unwrap();
        store
    }

    #[tokio::test]
    async fn create_then_find() {
        let store = store().await;
        let created = store.create(&descriptor("echo")).await.unwrap();
        assert_eq!(created.name, "echo");
        assert_eq!(created.job_type, JobType::OneTime);

        let found = store.find_by_name("echo").await.unwrap();
        assert_eq!(found.descriptor(), descriptor("echo"));
        assert_eq!(found.id, created.id);
    }

    #[tokio::test]
    async fn migrate_is_idempotent() {
        let store = store().await;
        store.migrate().await.unwrap();
        store.create(&descriptor("echo")).await.unwrap();
        store.migrate().await.unwrap();
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_name_rejected() {
        let store = store().await;
        store.create(&descriptor("echo")).await.unwrap();
        let err = store.create(&descriptor("echo")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(name) if name == "echo"));
    }

    #[tokio::test]
    async fn find_missing_is_not_found() {
        let store = store().await;
        let err = store.find_by_name("ghost").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(name) if name == "ghost"));
    }

    #[tokio::test]
    async fn update_replaces_fields_but_not_name() {
        let store = store().await;
        let created = store.create(&descriptor("echo")).await.unwrap();

        let replacement = JobDescriptor {
            name: "echo".to_owned(),
            command: "/bin/echo bye".to_owned(),
            job_type: JobType::Continuous,
            schedule: "reboot".to_owned(),
        };
        let updated = store.update("echo", &replacement).await.unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.name, "echo");
        assert_eq!(updated.command, "/bin/echo bye");
        assert_eq!(updated.job_type, JobType::Continuous);
        assert!(updated.updated_at >= created.updated_at);
    }

    #[tokio::test]
    async fn update_missing_is_not_found() {
        let store = store().await;
        let err = store.update("ghost", &descriptor("ghost")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_is_silent_for_missing() {
        let store = store().await;
        store.create(&descriptor("echo")).await.unwrap();
        store.delete("echo").await.unwrap();
        store.delete("echo").await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_orders_by_insertion() {
        let store = store().await;
        store.create(&descriptor("a")).await.unwrap();
        store.create(&descriptor("b")).await.unwrap();
        let names: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
