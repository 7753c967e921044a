//! SQLite-backed [`Store`] implementation.
//!
//! Wraps a [`SqlitePool`] and maps every `Store` method onto the schema
//! created by [`crate::migrate`]. Exchange timestamps are stored as Unix
//! milliseconds.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::models::{ChatExchange, FaqEntry, NewExchange, NewFaq, Role, User};
use crate::{db, migrate};

use super::Store;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database, creating the schema if needed.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn faq_from_row(row: &SqliteRow) -> FaqEntry {
    FaqEntry {
        id: row.get("id"),
        category: row.get("category"),
        question: row.get("question"),
        answer: row.get("answer"),
        keywords: row.get("keywords"),
    }
}

fn exchange_from_row(row: &SqliteRow) -> ChatExchange {
    let created_at: i64 = row.get("created_at");
    ChatExchange {
        id: row.get("id"),
        session_id: row.get("session_id"),
        message: row.get("message"),
        response: row.get("response"),
        timestamp: DateTime::from_timestamp_millis(created_at).unwrap_or_default(),
    }
}

fn user_from_row(row: &SqliteRow) -> User {
    User {
        id: row.get("id"),
        username: row.get("username"),
        password_hash: row.get("password_hash"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn list_faqs(&self) -> Result<Vec<FaqEntry>> {
        let rows = sqlx::query(
            "SELECT id, category, question, answer, keywords FROM faqs ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(faq_from_row).collect())
    }

    async fn get_faq(&self, id: i64) -> Result<Option<FaqEntry>> {
        let row = sqlx::query(
            "SELECT id, category, question, answer, keywords FROM faqs WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(faq_from_row))
    }

    async fn create_faq(&self, faq: &NewFaq) -> Result<FaqEntry> {
        let result = sqlx::query(
            "INSERT INTO faqs (category, question, answer, keywords) VALUES (?, ?, ?, ?)",
        )
        .bind(&faq.category)
        .bind(&faq.question)
        .bind(&faq.answer)
        .bind(&faq.keywords)
        .execute(&self.pool)
        .await?;

        Ok(FaqEntry {
            id: result.last_insert_rowid(),
            category: faq.category.clone(),
            question: faq.question.clone(),
            answer: faq.answer.clone(),
            keywords: faq.keywords.clone(),
        })
    }

    async fn update_faq(&self, id: i64, faq: &NewFaq) -> Result<Option<FaqEntry>> {
        let result = sqlx::query(
            "UPDATE faqs SET category = ?, question = ?, answer = ?, keywords = ? WHERE id = ?",
        )
        .bind(&faq.category)
        .bind(&faq.question)
        .bind(&faq.answer)
        .bind(&faq.keywords)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_faq(id).await
    }

    async fn delete_faq(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM faqs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn append_exchange(&self, exchange: &NewExchange) -> Result<ChatExchange> {
        let created_at = exchange.timestamp.timestamp_millis();
        let result = sqlx::query(
            "INSERT INTO chat_exchanges (session_id, message, response, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&exchange.session_id)
        .bind(&exchange.message)
        .bind(&exchange.response)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(ChatExchange {
            id: result.last_insert_rowid(),
            session_id: exchange.session_id.clone(),
            message: exchange.message.clone(),
            response: exchange.response.clone(),
            timestamp: DateTime::from_timestamp_millis(created_at).unwrap_or_else(Utc::now),
        })
    }

    async fn list_exchanges(&self) -> Result<Vec<ChatExchange>> {
        let rows = sqlx::query(
            r#"
            SELECT id, session_id, message, response, created_at
            FROM chat_exchanges
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(exchange_from_row).collect())
    }

    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User> {
        let created_at = Utc::now().timestamp();
        let result = sqlx::query(
            "INSERT INTO users (username, password_hash, created_at) VALUES (?, ?, ?)",
        )
        .bind(username)
        .bind(password_hash)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to create user '{}' (username already exists?)", username))?;

        Ok(User {
            id: result.last_insert_rowid(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            created_at,
        })
    }

    async fn find_user(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, username, password_hash, created_at FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, username, password_hash, created_at FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn set_role(&self, user_id: i64, role: Role) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_roles (user_id, role) VALUES (?, ?)
            ON CONFLICT(user_id) DO UPDATE SET role = excluded.role
            "#,
        )
        .bind(user_id)
        .bind(role.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_role(&self, user_id: i64) -> Result<Option<Role>> {
        let role: Option<String> = sqlx::query_scalar("SELECT role FROM user_roles WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        role.map(|r| r.parse()).transpose()
    }
}
