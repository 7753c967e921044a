//! Storage abstraction for Campus Assist.
//!
//! The [`Store`] trait covers the three tables the service owns: the FAQ
//! knowledge base, the append-only exchange log, and user accounts with
//! their roles. [`SqliteStore`] is the production backend;
//! [`InMemoryStore`] backs unit tests and embedding in other binaries.
//!
//! Implementations must be `Send + Sync` to be shared across axum handlers.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{ChatExchange, FaqEntry, NewExchange, NewFaq, Role, User};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Abstract storage backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`list_faqs`](Store::list_faqs) | All FAQ entries in store order (ascending id) |
/// | [`create_faq`](Store::create_faq) | Insert an entry |
/// | [`update_faq`](Store::update_faq) | Replace an entry, `None` if absent |
/// | [`delete_faq`](Store::delete_faq) | Remove an entry, `false` if absent |
/// | [`append_exchange`](Store::append_exchange) | Log one chat exchange |
/// | [`list_exchanges`](Store::list_exchanges) | Full log, most recent first |
/// | [`create_user`](Store::create_user) | Insert an account (no role yet) |
/// | [`set_role`](Store::set_role) | Provision or change the account's role |
#[async_trait]
pub trait Store: Send + Sync {
    async fn list_faqs(&self) -> Result<Vec<FaqEntry>>;

    async fn get_faq(&self, id: i64) -> Result<Option<FaqEntry>>;

    async fn create_faq(&self, faq: &NewFaq) -> Result<FaqEntry>;

    async fn update_faq(&self, id: i64, faq: &NewFaq) -> Result<Option<FaqEntry>>;

    async fn delete_faq(&self, id: i64) -> Result<bool>;

    async fn append_exchange(&self, exchange: &NewExchange) -> Result<ChatExchange>;

    /// Every logged exchange, most recent first (ties broken by insertion order).
    async fn list_exchanges(&self) -> Result<Vec<ChatExchange>>;

    /// Insert a new account. Fails if the username is taken.
    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User>;

    async fn find_user(&self, username: &str) -> Result<Option<User>>;

    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>>;

    async fn set_role(&self, user_id: i64, role: Role) -> Result<()>;

    /// The account's role, or `None` if no role record was provisioned.
    async fn get_role(&self, user_id: i64) -> Result<Option<Role>>;
}
