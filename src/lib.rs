//! # Campus Assist
//!
//! Backend for a university FAQ assistant. Each incoming message is matched
//! against a keyword-tagged knowledge base; strong matches are answered
//! directly, everything else goes to an OpenAI-compatible language model
//! with the most relevant entries as context. Every exchange is logged and
//! summarized for staff.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────┐
//! │   HTTP   │──▶│  ChatService │──▶│   matcher    │
//! │  (axum)  │   └──────┬───────┘   └──────────────┘
//! └────┬─────┘          │ no strong match
//!      │                ▼
//!      │         ┌──────────────┐
//!      │         │ LanguageModel│
//!      │         └──────────────┘
//!      ▼
//! ┌──────────┐   ┌──────────────┐
//! │  Store   │──▶│  analytics   │
//! │ (SQLite) │   └──────────────┘
//! └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! assist init                           # create database
//! assist faq import faqs.toml           # load the knowledge base
//! assist user add admin --password pw --role admin
//! assist ask "how do I apply for admission"
//! assist serve                          # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`store`] | Storage trait with SQLite and in-memory backends |
//! | [`matcher`] | Keyword overlap scoring |
//! | [`llm`] | Language-model client abstraction |
//! | [`chat`] | Message handling pipeline |
//! | [`analytics`] | Exchange-log summaries |
//! | [`auth`] | Accounts, roles and bearer tokens |
//! | [`rate_limit`] | Per-client fixed-window limiter |
//! | [`server`] | HTTP API server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod analytics;
pub mod auth;
pub mod chat;
pub mod config;
pub mod db;
pub mod faqs;
pub mod llm;
pub mod logging;
pub mod matcher;
pub mod migrate;
pub mod models;
pub mod rate_limit;
pub mod server;
pub mod stats;
pub mod store;
