//! `PostgreSQL` store backed by `sqlx`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    Connection, PgPool, Row,
};
use std::time::Duration;
use tracing::{info_span, Instrument};
use uuid::Uuid;

use super::{CreateUserOutcome, Store};
use crate::auth::{
    session::NewSession,
    user::{User, UserUpdate},
};

const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

const USER_COLUMNS: &str = "uid, username, display_name, pass_hash, last_login, created_at";

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool.
    ///
    /// # Errors
    /// Returns an error if the database is unreachable.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .max_lifetime(Duration::from_secs(60 * 2))
            .acquire_timeout(Duration::from_secs(5))
            .test_before_acquire(true)
            .connect(dsn)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create tables and indexes if they do not exist yet.
    ///
    /// # Errors
    /// Returns an error if any schema statement fails.
    pub async fn migrate(&self) -> Result<()> {
        for (index, statement) in split_sql_statements(SCHEMA_SQL).iter().enumerate() {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .with_context(|| format!("failed to execute schema statement {}", index + 1))?;
        }
        Ok(())
    }
}

fn db_span(operation: &'static str, statement: &str) -> tracing::Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn user_from_row(row: &PgRow) -> Result<User> {
    Ok(User {
        uid: row.try_get("uid")?,
        username: row.try_get("username")?,
        display_name: row.try_get("display_name")?,
        pass_hash: row.try_get("pass_hash")?,
        last_login: row.try_get("last_login")?,
        created: row.try_get("created_at")?,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();

    for line in sql.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("--") {
            continue;
        }
        current.push_str(line);
        current.push('\n');

        if trimmed.ends_with(';') {
            let statement = current.trim();
            if !statement.is_empty() {
                statements.push(statement.to_string());
            }
            current.clear();
        }
    }

    let leftover = current.trim();
    if !leftover.is_empty() {
        statements.push(leftover.to_string());
    }

    statements
}

#[async_trait]
impl Store for PgStore {
    async fn create_user(&self, user: &User) -> Result<CreateUserOutcome> {
        let query = r"
            INSERT INTO users
                (uid, username, display_name, pass_hash, last_login, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
        ";
        let result = sqlx::query(query)
            .bind(user.uid)
            .bind(&user.username)
            .bind(&user.display_name)
            .bind(&user.pass_hash)
            .bind(user.last_login)
            .bind(user.created)
            .execute(&self.pool)
            .instrument(db_span("INSERT", query))
            .await;

        match result {
            Ok(_) => Ok(CreateUserOutcome::Created),
            Err(err) if is_unique_violation(&err) => Ok(CreateUserOutcome::Conflict),
            Err(err) => Err(err).context("failed to insert user"),
        }
    }

    async fn get_user(&self, uid: Option<Uuid>, username: &str) -> Result<Option<User>> {
        let query =
            format!("SELECT {USER_COLUMNS} FROM users WHERE uid = $1 OR username = $2 LIMIT 1");
        let row = sqlx::query(&query)
            .bind(uid)
            .bind(username)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await
            .context("failed to lookup user")?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn update_user(&self, update: &UserUpdate, touch_last_login: bool) -> Result<bool> {
        let query = r"
            UPDATE users SET
                display_name = COALESCE(NULLIF($2, ''), display_name),
                pass_hash = COALESCE(NULLIF($3, ''), pass_hash),
                last_login = CASE WHEN $4 THEN NOW() ELSE last_login END
            WHERE uid = $1
        ";
        let result = sqlx::query(query)
            .bind(update.uid)
            .bind(update.display_name.as_deref())
            .bind(update.pass_hash.as_deref())
            .bind(touch_last_login)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to update user")?;

        Ok(result.rows_affected() > 0)
    }

    async fn create_or_replace_session(&self, session: &NewSession) -> Result<()> {
        let query = r"
            INSERT INTO sessions
                (key_hash, user_id, expires_at, created_at, remote_addr)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (key_hash) DO UPDATE SET
                user_id = EXCLUDED.user_id,
                expires_at = EXCLUDED.expires_at,
                created_at = EXCLUDED.created_at,
                remote_addr = EXCLUDED.remote_addr
        ";
        sqlx::query(query)
            .bind(&session.key_hash)
            .bind(session.user_id)
            .bind(session.expires_at)
            .bind(session.created_at)
            .bind(&session.remote_addr)
            .execute(&self.pool)
            .instrument(db_span("INSERT", query))
            .await
            .context("failed to insert session")?;

        Ok(())
    }

    async fn get_session_owner(
        &self,
        key_hash: &[u8],
        _remote_addr: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>> {
        let query = r"
            SELECT u.uid, u.username, u.display_name, u.pass_hash, u.last_login, u.created_at
            FROM sessions s
            JOIN users u ON u.uid = s.user_id
            WHERE s.key_hash = $1 AND s.expires_at > $2
        ";
        let row = sqlx::query(query)
            .bind(key_hash)
            .bind(now)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lookup session")?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn delete_session(&self, key_hash: &[u8]) -> Result<()> {
        let query = "DELETE FROM sessions WHERE key_hash = $1";
        sqlx::query(query)
            .bind(key_hash)
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await
            .context("failed to delete session")?;

        Ok(())
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        let query = "DELETE FROM sessions WHERE expires_at <= $1";
        let result = sqlx::query(query)
            .bind(now)
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await
            .context("failed to delete expired sessions")?;

        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<()> {
        let acquire_span = info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self
            .pool
            .acquire()
            .instrument(acquire_span)
            .await
            .context("Failed to acquire database connection")?;

        let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping()
            .instrument(ping_span)
            .await
            .context("Failed to ping database")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_sql_statements_skips_comments_and_blank_lines() {
        let sql = "-- header\nCREATE TABLE a (id INT);\n\nCREATE INDEX b\n    ON a (id);\n";
        let statements = split_sql_statements(sql);
        assert_eq!(
            statements,
            vec![
                "CREATE TABLE a (id INT);".to_string(),
                "CREATE INDEX b\n    ON a (id);".to_string(),
            ]
        );
    }

    #[test]
    fn schema_defines_users_and_sessions() {
        let statements = split_sql_statements(SCHEMA_SQL);
        assert!(statements
            .iter()
            .any(|s| s.contains("CREATE TABLE IF NOT EXISTS users")));
        assert!(statements
            .iter()
            .any(|s| s.contains("CREATE TABLE IF NOT EXISTS sessions")));
        assert!(statements.iter().all(|s| s.ends_with(';')));
    }

    #[test]
    fn unique_violation_only_matches_database_errors() {
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }
}
