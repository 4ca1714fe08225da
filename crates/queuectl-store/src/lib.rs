//! SQLite implementation of queuectl's `JobStore`.
//!
//! Grounded on the teacher's `seesaw-job-postgres` crate, re-targeted from a
//! client/server Postgres connection pool to a single embedded SQLite file
//! (spec.md §6: "a single embedded store file located under a user-scoped
//! data directory"). The claim keeps the teacher's shape — pick the
//! highest-priority due candidate, flip its state, let a loser see zero
//! rows affected — as one `UPDATE ... WHERE id = (SELECT ...) RETURNING id`
//! statement rather than a `FOR UPDATE SKIP LOCKED` query (SQLite has no
//! row-level locking): a single statement acquires SQLite's write lock
//! before reading, so it doesn't pay the `BEGIN` + `SELECT` + `UPDATE`
//! pattern's `SQLITE_BUSY_SNAPSHOT` cost under WAL with concurrent
//! claimers.
//!
//! # Schema
//!
//! See `migrations/0001_init.sql`. Three tables: `jobs`, `dlq`, `config`,
//! with a `(state, next_run_at)` index on `jobs` and a `lease_expires_at`
//! column used only for the crash-recovery reaper (SPEC_FULL.md §9).

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use queuectl_core::{DlqEntry, Job, JobState, JobStore, NewJob, StoreError};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tracing::debug;

fn to_text(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn from_text(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Io(anyhow::anyhow!("malformed timestamp '{raw}': {e}")))
}

fn job_state_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<JobState, StoreError> {
    let raw: String = row.try_get("state").map_err(db_err)?;
    raw.parse()
        .map_err(|e: String| StoreError::Io(anyhow::anyhow!(e)))
}

fn job_from_row(row: sqlx::sqlite::SqliteRow) -> Result<Job, StoreError> {
    let state = job_state_from_row(&row)?;
    Ok(Job {
        id: row.try_get("id").map_err(db_err)?,
        command: row.try_get("command").map_err(db_err)?,
        state,
        attempts: row.try_get("attempts").map_err(db_err)?,
        max_retries: row.try_get("max_retries").map_err(db_err)?,
        created_at: from_text(&row.try_get::<String, _>("created_at").map_err(db_err)?)?,
        updated_at: from_text(&row.try_get::<String, _>("updated_at").map_err(db_err)?)?,
        next_run_at: from_text(&row.try_get::<String, _>("next_run_at").map_err(db_err)?)?,
        priority: row.try_get("priority").map_err(db_err)?,
    })
}

fn dlq_from_row(row: sqlx::sqlite::SqliteRow) -> Result<DlqEntry, StoreError> {
    Ok(DlqEntry {
        id: row.try_get("id").map_err(db_err)?,
        command: row.try_get("command").map_err(db_err)?,
        reason: row.try_get::<Option<String>, _>("reason").map_err(db_err)?.unwrap_or_default(),
        created_at: from_text(&row.try_get::<String, _>("created_at").map_err(db_err)?)?,
    })
}

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Io(anyhow::Error::from(e))
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// A SQLite-backed [`JobStore`].
///
/// One `SqlitePool` is opened per process and held for the worker's
/// lifetime (Design Notes: "an injected store handle ... avoid per-call
/// reconnect cost").
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if absent) the queue database at `path`, running
    /// embedded migrations and seeding default config rows.
    pub async fn connect(path: &Path) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        debug!(path = %path.display(), "opened queue store");
        Ok(Self { pool })
    }

    /// Borrow the underlying pool, e.g. for an adapter that needs direct
    /// read-only access (listing jobs for a dashboard, etc.).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl JobStore for SqliteStore {
    async fn insert_job(&self, job: NewJob) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO jobs(id, command, state, attempts, max_retries, created_at, updated_at, next_run_at, priority)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.command)
        .bind(job.state.as_str())
        .bind(job.attempts)
        .bind(job.max_retries)
        .bind(to_text(job.created_at))
        .bind(to_text(job.updated_at))
        .bind(to_text(job.next_run_at))
        .bind(job.priority)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StoreError::Duplicate(job.id)),
            Err(e) => Err(db_err(e)),
        }
    }

    async fn claim_one(
        &self,
        now: DateTime<Utc>,
        lease_expires_at: DateTime<Utc>,
    ) -> Result<Option<String>, StoreError> {
        let now_text = to_text(now);

        // A single `UPDATE ... WHERE id = (SELECT ...) RETURNING id` rather
        // than a `BEGIN` + `SELECT` + conditional `UPDATE` transaction: under
        // WAL, a deferred transaction's `SELECT` takes a read snapshot before
        // the `UPDATE` tries to acquire the write lock, so two concurrent
        // claimers can both pick the same row and the loser's `UPDATE` fails
        // with `SQLITE_BUSY_SNAPSHOT` instead of the plain "zero rows
        // affected" the claim contract expects. One statement acquires the
        // write lock up front, so losers simply match zero rows.
        sqlx::query_scalar(
            r#"
            UPDATE jobs
            SET state = 'processing', updated_at = ?, lease_expires_at = ?
            WHERE id = (
                SELECT id FROM jobs
                WHERE state = 'pending' AND next_run_at <= ?
                ORDER BY priority DESC, created_at ASC
                LIMIT 1
            )
            RETURNING id
            "#,
        )
        .bind(&now_text)
        .bind(to_text(lease_expires_at))
        .bind(&now_text)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn get_job(&self, id: &str) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(job_from_row).transpose()
    }

    async fn mark_completed(&self, id: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE jobs SET state = 'completed', updated_at = ? WHERE id = ?")
            .bind(to_text(now))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn mark_retry(
        &self,
        id: &str,
        attempts: i64,
        next_run_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'pending', attempts = ?, next_run_at = ?, updated_at = ?, lease_expires_at = NULL
            WHERE id = ?
            "#,
        )
        .bind(attempts)
        .bind(to_text(next_run_at))
        .bind(to_text(now))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn move_to_dlq(
        &self,
        id: &str,
        command: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            r#"
            INSERT INTO dlq(id, command, reason, created_at) VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET command = excluded.command, reason = excluded.reason, created_at = excluded.created_at
            "#,
        )
        .bind(id)
        .bind(command)
        .bind(reason)
        .bind(to_text(now))
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn get_dlq(&self, id: &str) -> Result<Option<DlqEntry>, StoreError> {
        let row = sqlx::query("SELECT * FROM dlq WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(dlq_from_row).transpose()
    }

    async fn restore_from_dlq(
        &self,
        id: &str,
        command: &str,
        max_retries: i64,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let now_text = to_text(now);

        sqlx::query(
            r#"
            INSERT INTO jobs(id, command, state, attempts, max_retries, created_at, updated_at, next_run_at, priority)
            VALUES (?, ?, 'pending', 0, ?, ?, ?, ?, 0)
            ON CONFLICT(id) DO UPDATE SET
                command = excluded.command,
                state = 'pending',
                attempts = 0,
                max_retries = excluded.max_retries,
                updated_at = excluded.updated_at,
                next_run_at = excluded.next_run_at,
                priority = 0,
                lease_expires_at = NULL
            "#,
        )
        .bind(id)
        .bind(command)
        .bind(max_retries)
        .bind(&now_text)
        .bind(&now_text)
        .bind(&now_text)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        sqlx::query("DELETE FROM dlq WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn list_jobs(&self, state: Option<JobState>) -> Result<Vec<Job>, StoreError> {
        let rows = match state {
            Some(s) => sqlx::query("SELECT * FROM jobs WHERE state = ? ORDER BY priority DESC, created_at ASC")
                .bind(s.as_str())
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?,
            None => sqlx::query("SELECT * FROM jobs ORDER BY priority DESC, created_at ASC")
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?,
        };
        rows.into_iter().map(job_from_row).collect()
    }

    async fn list_dlq(&self) -> Result<Vec<DlqEntry>, StoreError> {
        let rows = sqlx::query("SELECT * FROM dlq ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.into_iter().map(dlq_from_row).collect()
    }

    async fn count_by_state(&self) -> Result<BTreeMap<String, i64>, StoreError> {
        let rows = sqlx::query("SELECT state, COUNT(*) as cnt FROM jobs GROUP BY state")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let state: String = row.try_get("state").map_err(db_err)?;
            let cnt: i64 = row.try_get("cnt").map_err(db_err)?;
            counts.insert(state, cnt);
        }
        Ok(counts)
    }

    async fn config_get(&self, key: &str) -> Result<Option<String>, StoreError> {
        sqlx::query_scalar("SELECT value FROM config WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn config_set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO config(key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn reap_expired_leases(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'pending', updated_at = ?, lease_expires_at = NULL
            WHERE state = 'processing' AND lease_expires_at IS NOT NULL AND lease_expires_at <= ?
            "#,
        )
        .bind(to_text(now))
        .bind(to_text(now))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected())
    }
}
