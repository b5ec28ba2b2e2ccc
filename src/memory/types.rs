//! Memory record and snapshot types

use crate::types::Turn;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Entry in the append-only long-term store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongTermRecord {
    pub id: String,
    /// Session that produced the record
    pub session_id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    /// Recency timestamp used for decay
    pub timestamp: DateTime<Utc>,
}

/// Backend query hit, before recency decay
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub record: LongTermRecord,
    pub similarity: f64,
}

/// Long-term record ranked for a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedRecord {
    pub record: LongTermRecord,
    pub similarity: f64,
    /// `similarity * decay(age)`
    pub score: f64,
}

/// Context handed to the router and agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub session_id: String,
    pub query: String,
    /// Recent turns, oldest first
    pub short_term: Vec<Turn>,
    /// Long-term records, best first
    pub long_term: Vec<RankedRecord>,
    /// Long-term store was unavailable; only short-term context is present
    pub degraded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<String>,
}

impl MemorySnapshot {
    /// Snapshot with no context at all
    pub fn empty(session_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            query: query.into(),
            short_term: Vec::new(),
            long_term: Vec::new(),
            degraded: false,
            degraded_reason: None,
        }
    }

    /// All context text: short-term turns then long-term records
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.short_term
            .iter()
            .map(|turn| turn.content.as_str())
            .chain(self.long_term.iter().map(|r| r.record.text.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.short_term.is_empty() && self.long_term.is_empty()
    }
}
