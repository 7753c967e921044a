//! In-memory [`Store`] implementation for tests.
//!
//! Uses `Vec` and `HashMap` behind `std::sync::RwLock`. Ids are assigned
//! from per-table counters so ordering matches the SQLite backend.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::{ChatExchange, FaqEntry, NewExchange, NewFaq, Role, User};

use super::Store;

#[derive(Default)]
struct Tables {
    faqs: Vec<FaqEntry>,
    next_faq_id: i64,
    exchanges: Vec<ChatExchange>,
    next_exchange_id: i64,
    users: Vec<User>,
    next_user_id: i64,
    roles: HashMap<i64, Role>,
}

/// In-memory store for tests and ephemeral runs.
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }

    /// Build a store pre-populated with the given FAQ entries, in order.
    pub fn with_faqs(faqs: &[NewFaq]) -> Self {
        let store = Self::new();
        {
            let mut t = store.tables.write().unwrap();
            for f in faqs {
                t.next_faq_id += 1;
                let id = t.next_faq_id;
                t.faqs.push(to_entry(id, f));
            }
        }
        store
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn to_entry(id: i64, faq: &NewFaq) -> FaqEntry {
    FaqEntry {
        id,
        category: faq.category.clone(),
        question: faq.question.clone(),
        answer: faq.answer.clone(),
        keywords: faq.keywords.clone(),
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn list_faqs(&self) -> Result<Vec<FaqEntry>> {
        Ok(self.tables.read().unwrap().faqs.clone())
    }

    async fn get_faq(&self, id: i64) -> Result<Option<FaqEntry>> {
        let t = self.tables.read().unwrap();
        Ok(t.faqs.iter().find(|f| f.id == id).cloned())
    }

    async fn create_faq(&self, faq: &NewFaq) -> Result<FaqEntry> {
        let mut t = self.tables.write().unwrap();
        t.next_faq_id += 1;
        let entry = to_entry(t.next_faq_id, faq);
        t.faqs.push(entry.clone());
        Ok(entry)
    }

    async fn update_faq(&self, id: i64, faq: &NewFaq) -> Result<Option<FaqEntry>> {
        let mut t = self.tables.write().unwrap();
        match t.faqs.iter_mut().find(|f| f.id == id) {
            Some(slot) => {
                *slot = to_entry(id, faq);
                Ok(Some(slot.clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete_faq(&self, id: i64) -> Result<bool> {
        let mut t = self.tables.write().unwrap();
        let before = t.faqs.len();
        t.faqs.retain(|f| f.id != id);
        Ok(t.faqs.len() != before)
    }

    async fn append_exchange(&self, exchange: &NewExchange) -> Result<ChatExchange> {
        let mut t = self.tables.write().unwrap();
        t.next_exchange_id += 1;
        let stored = ChatExchange {
            id: t.next_exchange_id,
            session_id: exchange.session_id.clone(),
            message: exchange.message.clone(),
            response: exchange.response.clone(),
            timestamp: exchange.timestamp,
        };
        t.exchanges.push(stored.clone());
        Ok(stored)
    }

    async fn list_exchanges(&self) -> Result<Vec<ChatExchange>> {
        let mut all = self.tables.read().unwrap().exchanges.clone();
        all.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        Ok(all)
    }

    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User> {
        let mut t = self.tables.write().unwrap();
        if t.users.iter().any(|u| u.username == username) {
            bail!("username already exists: {}", username);
        }
        t.next_user_id += 1;
        let user = User {
            id: t.next_user_id,
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            created_at: chrono::Utc::now().timestamp(),
        };
        t.users.push(user.clone());
        Ok(user)
    }

    async fn find_user(&self, username: &str) -> Result<Option<User>> {
        let t = self.tables.read().unwrap();
        Ok(t.users.iter().find(|u| u.username == username).cloned())
    }

    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>> {
        let t = self.tables.read().unwrap();
        Ok(t.users.iter().find(|u| u.id == id).cloned())
    }

    async fn set_role(&self, user_id: i64, role: Role) -> Result<()> {
        let mut t = self.tables.write().unwrap();
        if !t.users.iter().any(|u| u.id == user_id) {
            bail!("user not found: {}", user_id);
        }
        t.roles.insert(user_id, role);
        Ok(())
    }

    async fn get_role(&self, user_id: i64) -> Result<Option<Role>> {
        Ok(self.tables.read().unwrap().roles.get(&user_id).copied())
    }
}
