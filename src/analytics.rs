//! Post-hoc summary of the chat exchange log.
//!
//! Topic attribution is recomputed on every call by scoring each logged
//! message against the current knowledge base, with a looser threshold
//! than live matching (one shared keyword is enough). That is
//! O(exchanges × FAQs); keyword sets are parsed once per report via
//! [`KeywordIndex`].

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use crate::matcher::{tokenize, KeywordIndex, RELEVANT_MATCH_THRESHOLD};
use crate::models::{ChatExchange, FaqEntry};

/// Sessions listed in `messages_per_session`.
pub const TOP_SESSIONS: usize = 10;

/// Characters of a session id kept for display.
pub const SESSION_LABEL_CHARS: usize = 12;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsReport {
    pub summary: Summary,
    pub messages_over_time: Vec<DailyCount>,
    pub topics: Vec<TopicCount>,
    pub messages_per_session: Vec<SessionCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total_messages: usize,
    pub total_sessions: usize,
    pub unmatched_queries: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyCount {
    /// Calendar date (UTC), `YYYY-MM-DD`.
    pub date: String,
    pub messages: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicCount {
    pub topic: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionCount {
    /// Session id, shortened for display.
    pub session: String,
    pub messages: usize,
}

pub fn compute_analytics(exchanges: &[ChatExchange], faqs: &[FaqEntry]) -> AnalyticsReport {
    let (topics, unmatched) = topic_counts(exchanges, faqs);
    let sessions: HashSet<&str> = exchanges.iter().map(|e| e.session_id.as_str()).collect();

    AnalyticsReport {
        summary: Summary {
            total_messages: exchanges.len(),
            total_sessions: sessions.len(),
            unmatched_queries: unmatched,
        },
        messages_over_time: messages_over_time(exchanges),
        topics,
        messages_per_session: messages_per_session(exchanges),
    }
}

fn messages_over_time(exchanges: &[ChatExchange]) -> Vec<DailyCount> {
    let mut by_date: BTreeMap<chrono::NaiveDate, usize> = BTreeMap::new();
    for e in exchanges {
        *by_date.entry(e.timestamp.date_naive()).or_insert(0) += 1;
    }
    by_date
        .into_iter()
        .map(|(date, messages)| DailyCount {
            date: date.format("%Y-%m-%d").to_string(),
            messages,
        })
        .collect()
}

/// Per-category tallies (descending) and the number of unattributed exchanges.
fn topic_counts(exchanges: &[ChatExchange], faqs: &[FaqEntry]) -> (Vec<TopicCount>, usize) {
    let index = KeywordIndex::new(faqs);
    let mut counts: Vec<TopicCount> = Vec::new();
    let mut unmatched = 0;

    for e in exchanges {
        match index.best(&tokenize(&e.message), RELEVANT_MATCH_THRESHOLD) {
            Some(faq) => match counts.iter_mut().find(|t| t.topic == faq.category) {
                Some(t) => t.count += 1,
                None => counts.push(TopicCount {
                    topic: faq.category.clone(),
                    count: 1,
                }),
            },
            None => unmatched += 1,
        }
    }

    // Stable: equal counts keep first-seen order
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    (counts, unmatched)
}

fn messages_per_session(exchanges: &[ChatExchange]) -> Vec<SessionCount> {
    let mut order: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for e in exchanges {
        let slot = counts.entry(e.session_id.as_str()).or_insert_with(|| {
            order.push(e.session_id.as_str());
            0
        });
        *slot += 1;
    }

    let mut ranked: Vec<(&str, usize)> = order.into_iter().map(|s| (s, counts[s])).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked
        .into_iter()
        .take(TOP_SESSIONS)
        .map(|(session, messages)| SessionCount {
            session: session_label(session),
            messages,
        })
        .collect()
}

/// First 12 characters of the id, with `...` appended when it was cut.
pub fn session_label(session_id: &str) -> String {
    if session_id.chars().count() > SESSION_LABEL_CHARS {
        let head: String = session_id.chars().take(SESSION_LABEL_CHARS).collect();
        format!("{}...", head)
    } else {
        session_id.to_string()
    }
}
