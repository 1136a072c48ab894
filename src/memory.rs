//! Memory Index: cross-session keyword recall with recency decay.
//!
//! A lightweight long-term memory distinct from the Session Store: entries
//! are short, explicitly recorded facts ("the user prefers metric units"),
//! not full transcripts. Recall scores each entry by keyword overlap with the
//! query, discounted by an exponential half-life on age, and returns the
//! strongest matches - this stays a simple heuristic on purpose, not an
//! embedding index, matching the runtime's other "good enough" choices (see
//! `context.rs`'s token estimator).

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::Mutex;

use crate::error::Result;

/// Half-life, in days, of a memory entry's recency weight.
const RECENCY_HALF_LIFE_DAYS: f64 = 14.0;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is",
    "it", "its", "of", "on", "that", "the", "to", "was", "were", "will", "with", "i", "you",
    "this", "but", "or", "not", "do", "did", "does", "what", "how", "why", "my", "me",
];

/// A single recorded memory entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub text: String,
    pub keywords: Vec<String>,
    pub recorded_at_millis: i64,
}

/// A scored recall result.
#[derive(Debug, Clone)]
pub struct RecallHit {
    pub entry: MemoryEntry,
    pub score: f64,
}

/// Tokenize free text into lowercase, stopword-stripped keywords.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
        .filter(|w| !w.is_empty() && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

fn overlap(query_tokens: &HashSet<&str>, entry_keywords: &[String]) -> f64 {
    entry_keywords
        .iter()
        .filter(|k| query_tokens.contains(k.as_str()))
        .count() as f64
}

fn recency_weight(now_millis: i64, recorded_at_millis: i64, half_life_days: f64) -> f64 {
    let age_days = (now_millis - recorded_at_millis).max(0) as f64 / 86_400_000.0;
    (-age_days * std::f64::consts::LN_2 / half_life_days).exp()
}

/// Append-only, per-session memory index.
pub struct MemoryIndex {
    root: PathBuf,
    lock: Mutex<()>,
}

impl MemoryIndex {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock: Mutex::new(()),
        }
    }

    fn path_for(&self, session_key: &str) -> PathBuf {
        self.root.join("memory").join(format!("{session_key}.jsonl"))
    }

    /// Record a new fact for a session.
    pub async fn record(&self, session_key: &str, text: &str, now_millis: i64) -> Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.path_for(session_key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let entry = MemoryEntry {
            text: text.to_string(),
            keywords: tokenize(text),
            recorded_at_millis: now_millis,
        };

        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "{}", serde_json::to_string(&entry)?)?;
        file.sync_all()?;
        Ok(())
    }

    /// Recall the `limit` strongest matches for `query` within a session,
    /// scored by keyword overlap weighted by recency, tolerating a corrupt
    /// tail line the same way the Session Store does.
    pub async fn recall(&self, session_key: &str, query: &str, limit: usize, now_millis: i64) -> Result<Vec<RecallHit>> {
        let path = self.path_for(session_key);
        let contents = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let query_tokens = tokenize(query);
        let query_set: HashSet<&str> = query_tokens.iter().map(|s| s.as_str()).collect();

        let mut hits: Vec<RecallHit> = contents
            .lines()
            .filter_map(|line| serde_json::from_str::<MemoryEntry>(line).ok())
            .filter_map(|entry| {
                let overlap_score = overlap(&query_set, &entry.keywords);
                if overlap_score <= 0.0 {
                    return None;
                }
                let weight = recency_weight(now_millis, entry.recorded_at_millis, RECENCY_HALF_LIFE_DAYS);
                Some(RecallHit {
                    score: overlap_score * weight,
                    entry,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }
}
