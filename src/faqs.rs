//! Knowledge-base commands: `assist faq list` and `assist faq import`.
//!
//! Import files are TOML with one `[[faq]]` table per entry:
//!
//! ```toml
//! [[faq]]
//! category = "Admissions"
//! question = "How do I apply?"
//! answer = "Apply online through the admissions portal."
//! keywords = "apply, admission, application"
//! ```
//!
//! Entries are appended in file order; existing entries are left alone.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::config::Config;
use crate::models::NewFaq;
use crate::store::{SqliteStore, Store};

#[derive(Debug, Deserialize)]
struct FaqFile {
    #[serde(default)]
    faq: Vec<NewFaq>,
}

/// Parse an import file, rejecting entries with blank required fields.
pub fn load_faq_file(path: &Path) -> Result<Vec<NewFaq>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read FAQ file: {}", path.display()))?;
    parse_faq_file(&content).with_context(|| format!("Invalid FAQ file: {}", path.display()))
}

fn parse_faq_file(content: &str) -> Result<Vec<NewFaq>> {
    let file: FaqFile = toml::from_str(content)?;
    for (i, faq) in file.faq.iter().enumerate() {
        if let Some(field) = faq.missing_field() {
            anyhow::bail!("entry {}: {} must not be empty", i + 1, field);
        }
    }
    Ok(file.faq)
}

/// Insert every entry from `path`. Returns the number imported.
pub async fn import(store: &dyn Store, path: &Path) -> Result<usize> {
    let entries = load_faq_file(path)?;
    for faq in &entries {
        store.create_faq(faq).await?;
    }
    Ok(entries.len())
}

pub async fn run_import(config: &Config, path: &Path) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let count = import(&store, path).await?;
    println!("imported faqs: {}", count);
    store.pool().close().await;
    Ok(())
}

pub async fn run_list(config: &Config) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let faqs = store.list_faqs().await?;

    if faqs.is_empty() {
        println!("No FAQ entries.");
    } else {
        println!("{:>4}  {:<20} {:<44} KEYWORDS", "ID", "CATEGORY", "QUESTION");
        println!("{}", "-".repeat(90));
        for f in &faqs {
            println!(
                "{:>4}  {:<20} {:<44} {}",
                f.id,
                truncate(&f.category, 20),
                truncate(&f.question, 44),
                f.keywords
            );
        }
    }

    store.pool().close().await;
    Ok(())
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let head: String = s.chars().take(width.saturating_sub(1)).collect();
        format!("{}…", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    const SAMPLE: &str = r#"
[[faq]]
category = "Admissions"
question = "How do I apply?"
answer = "Apply online."
keywords = "apply, admission"

[[faq]]
category = "Library"
question = "When is the library open?"
answer = "8am to 10pm."
"#;

    #[test]
    fn test_parse_keeps_order_and_defaults_keywords() {
        let faqs = parse_faq_file(SAMPLE).unwrap();
        assert_eq!(faqs.len(), 2);
        assert_eq!(faqs[0].category, "Admissions");
        assert_eq!(faqs[1].keywords, "");
    }

    #[test]
    fn test_blank_field_rejected() {
        let err = parse_faq_file("[[faq]]\ncategory = \"X\"\nquestion = \" \"\nanswer = \"a\"")
            .unwrap_err();
        assert!(err.to_string().contains("question"));
    }

    #[test]
    fn test_empty_file_imports_nothing() {
        assert!(parse_faq_file("").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_import_appends_to_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("faqs.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let store = InMemoryStore::new();
        assert_eq!(import(&store, &path).await.unwrap(), 2);
        let faqs = store.list_faqs().await.unwrap();
        assert_eq!(faqs[0].question, "How do I apply?");
        assert_eq!(faqs[1].id, faqs[0].id + 1);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 5), "abcd…");
    }
}
