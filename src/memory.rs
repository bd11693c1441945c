//! Reflexion memory: a keyword-indexed store of past mistakes, shared by
//! identity — one handle, all mutation routed through it, with an
//! explicit stop.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::Utc;

use crate::error::{Error, Result};
use crate::reflection::ReflectionContext;
use crate::similarity::jaccard_similarity;
use crate::types::{CritiqueResult, ReflexionMemoryEntry};

const STOP_WORDS: &[&str] = &["what", "is", "the", "of", "a", "an", "to", "for", "in", "on", "at"];

fn extract_keywords(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut keywords = Vec::new();
    for word in text.split_whitespace() {
        let cleaned: String = word
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        if cleaned.is_empty() || STOP_WORDS.contains(&cleaned.as_str()) {
            continue;
        }
        if seen.insert(cleaned.clone()) {
            keywords.push(cleaned);
        }
    }
    keywords
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// Shared table backed by a process-wide key-value map.
    Ets,
    /// Private to this handle.
    InProcess,
}

#[derive(Debug, Clone, Copy)]
pub struct ReflexionMemoryConfig {
    pub max_entries: usize,
    pub similarity_threshold: f64,
    pub mode: StorageMode,
}

impl Default for ReflexionMemoryConfig {
    fn default() -> Self {
        Self {
            max_entries: 100,
            similarity_threshold: 0.3,
            mode: StorageMode::InProcess,
        }
    }
}

impl ReflexionMemoryConfig {
    fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(Error::InvalidNumCandidates(0));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(Error::InvalidScore(self.similarity_threshold));
        }
        Ok(())
    }
}

struct Table {
    entries: Vec<ReflexionMemoryEntry>,
    stopped: bool,
}

/// One process-wide `ets`-style table per `table_name`, so handles created
/// against the same name observe each other's writes.
static SHARED_TABLES: Mutex<Option<std::collections::HashMap<String, Arc<Mutex<Table>>>>> = Mutex::new(None);

fn shared_table(name: &str) -> Arc<Mutex<Table>> {
    let mut tables = SHARED_TABLES.lock().expect("shared memory tables lock poisoned");
    let map = tables.get_or_insert_with(std::collections::HashMap::new);
    map.entry(name.to_string())
        .or_insert_with(|| {
            Arc::new(Mutex::new(Table {
                entries: Vec::new(),
                stopped: false,
            }))
        })
        .clone()
}

/// Episodic store of past mistakes, keyword-indexed for retrieval.
pub struct ReflexionMemory {
    config: ReflexionMemoryConfig,
    table_name: String,
    table: Arc<Mutex<Table>>,
}

impl ReflexionMemory {
    pub fn new(config: ReflexionMemoryConfig, table_name: impl Into<String>) -> Result<Self> {
        config.validate()?;
        let table_name = table_name.into();
        let table = match config.mode {
            StorageMode::Ets => shared_table(&table_name),
            StorageMode::InProcess => Arc::new(Mutex::new(Table {
                entries: Vec::new(),
                stopped: false,
            })),
        };
        Ok(Self {
            config,
            table_name,
            table,
        })
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Stores `{prompt, mistake, correction}`, evicting the oldest entry by
    /// timestamp when this push would exceed `max_entries`.
    pub fn store(&self, prompt: impl Into<String>, mistake: impl Into<String>, correction: impl Into<String>, severity: f64) -> Result<()> {
        let prompt = prompt.into();
        let mistake = mistake.into();
        let correction = correction.into();
        let keywords = extract_keywords(&format!("{prompt} {mistake}"));

        let entry = ReflexionMemoryEntry {
            prompt,
            mistake,
            correction,
            severity: severity.clamp(0.0, 1.0),
            keywords,
            timestamp: Utc::now(),
        };

        let mut table = self.table.lock().expect("reflexion memory table lock poisoned");
        if table.stopped {
            return Err(Error::Internal("reflexion memory handle has been stopped".to_string()));
        }
        table.entries.push(entry);
        while table.entries.len() > self.config.max_entries {
            let oldest_index = table
                .entries
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| e.timestamp)
                .map(|(i, _)| i)
                .unwrap_or(0);
            table.entries.remove(oldest_index);
        }
        Ok(())
    }

    /// Convenience used by the reflection loop: derives `mistake` from the
    /// critique's feedback/issues and `correction` from its suggestions.
    pub fn store_from_critique(&self, prompt: &str, critique: &CritiqueResult) -> Result<()> {
        let mistake = critique
            .feedback
            .clone()
            .unwrap_or_else(|| critique.issues.join("; "));
        let correction = critique.suggestions.join("; ");
        self.store(prompt, mistake, correction, critique.severity)
    }

    /// Top `max_results` (default 5) entries by Jaccard keyword overlap with
    /// `query`, above `similarity_threshold`, most-similar first.
    pub fn retrieve_similar(&self, query: &str, max_results: Option<usize>) -> Result<Vec<ReflexionMemoryEntry>> {
        let table = self.table.lock().expect("reflexion memory table lock poisoned");
        if table.stopped {
            return Err(Error::Internal("reflexion memory handle has been stopped".to_string()));
        }
        let query_keywords = extract_keywords(query).join(" ");
        let mut scored: Vec<(f64, ReflexionMemoryEntry)> = table
            .entries
            .iter()
            .map(|e| (jaccard_similarity(&query_keywords, &e.keywords.join(" ")), e.clone()))
            .filter(|(score, _)| *score >= self.config.similarity_threshold)
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        let limit = max_results.unwrap_or(5);
        Ok(scored.into_iter().take(limit).map(|(_, e)| e).collect())
    }

    /// Renders retrieved entries as a prompt fragment, beginning with
    /// `"Past mistakes to learn from"`.
    pub fn format_for_prompt(entries: &[ReflexionMemoryEntry]) -> String {
        if entries.is_empty() {
            return String::new();
        }
        let mut out = String::from("Past mistakes to learn from:\n");
        for entry in entries {
            out.push_str(&format!("- Mistake: {}\n  Correction: {}\n", entry.mistake, entry.correction));
        }
        out
    }

    pub fn clear(&self) -> Result<()> {
        let mut table = self.table.lock().expect("reflexion memory table lock poisoned");
        table.entries.clear();
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.table.lock().expect("reflexion memory table lock poisoned").entries.len()
    }

    pub fn list_entries(&self) -> Vec<ReflexionMemoryEntry> {
        self.table.lock().expect("reflexion memory table lock poisoned").entries.clone()
    }

    /// Idempotent: marks the handle stopped, rejecting further
    /// stores/retrievals.
    pub fn stop(&self) {
        let mut table = self.table.lock().expect("reflexion memory table lock poisoned");
        table.stopped = true;
    }
}

/// Allows `ReflectionLoop` prompts to reference the current iteration when
/// deciding what context to prime `retrieve_similar` with.
pub fn prime_query(context: &ReflectionContext) -> String {
    format!("{} (iteration {})", context.prompt, context.iteration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_and_retrieve_by_keyword_overlap() {
        let memory = ReflexionMemory::new(ReflexionMemoryConfig::default(), "t1").unwrap();
        memory.store("What is the capital of France?", "said Berlin", "should be Paris", 0.6).unwrap();
        memory.store("Explain photosynthesis", "wrong gas cited", "plants absorb CO2", 0.4).unwrap();
        let results = memory.retrieve_similar("capital of Germany", None).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].mistake.contains("Berlin"));
    }

    #[test]
    fn eviction_keeps_entry_count_at_max() {
        let config = ReflexionMemoryConfig {
            max_entries: 2,
            ..ReflexionMemoryConfig::default()
        };
        let memory = ReflexionMemory::new(config, "t2").unwrap();
        memory.store("p1", "m1", "c1", 0.5).unwrap();
        memory.store("p2", "m2", "c2", 0.5).unwrap();
        memory.store("p3", "m3", "c3", 0.5).unwrap();
        assert_eq!(memory.count(), 2);
        let entries = memory.list_entries();
        assert!(entries.iter().all(|e| e.prompt != "p1"));
    }

    #[test]
    fn stop_is_idempotent_and_rejects_further_stores() {
        let memory = ReflexionMemory::new(ReflexionMemoryConfig::default(), "t3").unwrap();
        memory.stop();
        memory.stop();
        assert!(memory.store("p", "m", "c", 0.1).is_err());
    }

    #[test]
    fn format_for_prompt_begins_with_expected_header() {
        let entries = vec![ReflexionMemoryEntry {
            prompt: "p".into(),
            mistake: "m".into(),
            correction: "c".into(),
            severity: 0.5,
            keywords: vec![],
            timestamp: Utc::now(),
        }];
        let text = ReflexionMemory::format_for_prompt(&entries);
        assert!(text.starts_with("Past mistakes to learn from"));
    }

    #[test]
    fn ets_mode_shares_state_across_handles_with_same_table_name() {
        let config = ReflexionMemoryConfig {
            mode: StorageMode::Ets,
            ..ReflexionMemoryConfig::default()
        };
        let a = ReflexionMemory::new(config, "shared-table").unwrap();
        let b = ReflexionMemory::new(config, "shared-table").unwrap();
        a.store("p", "m", "c", 0.5).unwrap();
        assert_eq!(b.count(), 1);
    }

    #[test]
    fn extract_keywords_drops_stop_words() {
        let keywords = extract_keywords("What is the capital of France");
        assert!(!keywords.contains(&"what".to_string()));
        assert!(!keywords.contains(&"the".to_string()));
        assert!(keywords.contains(&"capital".to_string()));
        assert!(keywords.contains(&"france".to_string()));
    }
}
