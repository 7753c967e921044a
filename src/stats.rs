//! Usage overview for operators.
//!
//! Prints the same report the analytics endpoint serves, plus database and
//! knowledge-base size. Used by `assist stats`.

use anyhow::Result;

use crate::analytics::{compute_analytics, AnalyticsReport};
use crate::config::Config;
use crate::store::{SqliteStore, Store};

/// Run the stats command: load the log and knowledge base, print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let store = SqliteStore::open(config).await?;

    let exchanges = store.list_exchanges().await?;
    let faqs = store.list_faqs().await?;
    let report = compute_analytics(&exchanges, &faqs);

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Campus Assist — Usage Stats");
    println!("===========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  FAQ entries: {}", faqs.len());
    println!();
    print_report(&report);

    if let Some(last) = exchanges.first() {
        println!();
        println!(
            "  Last message: {}",
            last.timestamp.format("%Y-%m-%d %H:%M UTC")
        );
    }

    println!();

    store.pool().close().await;
    Ok(())
}

fn print_report(report: &AnalyticsReport) {
    let s = &report.summary;
    println!("  Messages:    {}", s.total_messages);
    println!("  Sessions:    {}", s.total_sessions);
    println!(
        "  Unmatched:   {} ({}%)",
        s.unmatched_queries,
        percent(s.unmatched_queries, s.total_messages)
    );

    if !report.topics.is_empty() {
        println!();
        println!("  By topic:");
        println!("  {:<28} {:>8}", "TOPIC", "MESSAGES");
        println!("  {}", "-".repeat(37));
        for t in &report.topics {
            println!("  {:<28} {:>8}", t.topic, t.count);
        }
    }

    if !report.messages_over_time.is_empty() {
        println!();
        println!("  By day:");
        for d in &report.messages_over_time {
            println!("  {:<12} {:>6}", d.date, d.messages);
        }
    }

    if !report.messages_per_session.is_empty() {
        println!();
        println!("  Busiest sessions:");
        for sc in &report.messages_per_session {
            println!("  {:<16} {:>6}", sc.session, sc.messages);
        }
    }
}

fn percent(part: usize, whole: usize) -> usize {
    if whole > 0 {
        part * 100 / whole
    } else {
        0
    }
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
