//! # Token Repository
//!
//! Persists the JWTs the local server hands out, so a restart does not force
//! a fresh login and every call re-reads the current token.
//!
//! ## Active Token
//! Several rows may exist at once. The active one is the newest row with
//! `expired = 0`; everything else is history waiting for the retention
//! sweep.

use bridge_core::Token;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;

const TOKEN_COLUMNS: &str = "id, token, expired, created_at";

/// Repository for `bridge_tokens`.
#[derive(Debug, Clone)]
pub struct TokenRepository {
    pool: SqlitePool,
}

impl TokenRepository {
    /// Creates a new TokenRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TokenRepository { pool }
    }

    /// Returns the newest non-expired token, if any.
    pub async fn get_active(&self) -> DbResult<Option<Token>> {
        let token = sqlx::query_as::<_, Token>(&format!(
            r#"
            SELECT {TOKEN_COLUMNS}
            FROM bridge_tokens
            WHERE expired = 0
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#
        ))
        .fetch_optional(&self.pool)
        .await?;

        Ok(token)
    }

    /// Stores a freshly issued token and returns it.
    pub async fn create(&self, value: &str) -> DbResult<Token> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO bridge_tokens (token, expired, created_at)
            VALUES (?1, 0, ?2)
            "#,
        )
        .bind(value)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!(token_id = id, "Stored new token");

        Ok(Token {
            id,
            value: value.to_string(),
            expired: false,
            created_at: now,
        })
    }

    /// Flags every token as expired (soft invalidation).
    ///
    /// ## Returns
    /// Number of tokens that were active before the call.
    pub async fn invalidate_all(&self) -> DbResult<u64> {
        let result = sqlx::query("UPDATE bridge_tokens SET expired = 1 WHERE expired = 0")
            .execute(&self.pool)
            .await?;

        debug!(invalidated = result.rows_affected(), "Invalidated tokens");
        Ok(result.rows_affected())
    }

    /// Deletes every token (hard purge).
    pub async fn purge_all(&self) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM bridge_tokens")
            .execute(&self.pool)
            .await?;

        debug!(purged = result.rows_affected(), "Purged all tokens");
        Ok(result.rows_affected())
    }

    /// Deletes expired tokens only.
    pub async fn delete_expired(&self) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM bridge_tokens WHERE expired = 1")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Total number of stored tokens, expired or not.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bridge_tokens")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
