//! Core data models used throughout Campus Assist.
//!
//! These types represent the knowledge base, the chat exchange log, and the
//! accounts that gate administrative operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// A knowledge-base entry as stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaqEntry {
    pub id: i64,
    pub category: String,
    pub question: String,
    pub answer: String,
    /// Raw comma-separated keyword list, as entered by an administrator.
    pub keywords: String,
}

impl FaqEntry {
    /// Normalized keyword set: lowercase, trimmed, empty fragments dropped.
    pub fn keyword_set(&self) -> HashSet<String> {
        parse_keywords(&self.keywords)
    }
}

/// Split a comma-separated keyword field into a normalized set.
///
/// Malformed input (stray commas, blank entries) never errors; it just
/// contributes fewer keywords.
pub fn parse_keywords(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}

/// Fields accepted when creating or replacing an FAQ entry.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct NewFaq {
    pub category: String,
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub keywords: String,
}

impl NewFaq {
    /// Returns the name of the first required field that is blank.
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.category.trim().is_empty() {
            Some("category")
        } else if self.question.trim().is_empty() {
            Some("question")
        } else if self.answer.trim().is_empty() {
            Some("answer")
        } else {
            None
        }
    }
}

/// One logged message/response pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatExchange {
    pub id: i64,
    pub session_id: String,
    pub message: String,
    pub response: String,
    pub timestamp: DateTime<Utc>,
}

/// An exchange about to be appended to the log.
#[derive(Debug, Clone)]
pub struct NewExchange {
    pub session_id: String,
    pub message: String,
    pub response: String,
    pub timestamp: DateTime<Utc>,
}

/// A registered account.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    Student,
    Staff,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Student => "student",
            Role::Staff => "staff",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "student" => Ok(Role::Student),
            "staff" => Ok(Role::Staff),
            other => anyhow::bail!("invalid role '{}': expected admin, student or staff", other),
        }
    }
}

/// A prior conversation turn supplied by the client.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct HistoryTurn {
    pub role: String,
    pub content: String,
}
