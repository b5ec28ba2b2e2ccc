//! Hierarchical memory manager
//!
//! Combines per-session short-term buffers with the shared long-term backend.
//! Long-term failures never fail a retrieval: the snapshot falls back to
//! short-term context and is marked degraded.

use crate::config::MemoryConfig;
use crate::errors::{Result, WorkflowError};
use crate::memory::backend::MemoryBackend;
use crate::memory::decay::RecencyDecay;
use crate::memory::short_term::ShortTermMemory;
use crate::memory::types::{LongTermRecord, MemorySnapshot, RankedRecord};
use crate::types::Turn;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// Handle on a background long-term indexing job
#[derive(Debug)]
pub struct IndexTicket {
    handle: Option<JoinHandle<Result<()>>>,
}

impl IndexTicket {
    /// Ticket for a turn that was not indexed
    pub fn none() -> Self {
        Self { handle: None }
    }

    /// Whether the turn was scheduled for long-term indexing
    pub fn is_scheduled(&self) -> bool {
        self.handle.is_some()
    }

    /// Wait for indexing to finish
    pub async fn wait(self) -> Result<()> {
        match self.handle {
            None => Ok(()),
            Some(handle) => handle.await.map_err(|e| {
                WorkflowError::MemoryBackend(format!("indexing task failed: {}", e))
            })?,
        }
    }
}

/// Hierarchical memory manager
pub struct HierarchicalMemory {
    config: MemoryConfig,
    backend: Arc<dyn MemoryBackend>,
    decay: RecencyDecay,
    /// Short-term buffers, one per session
    short_term: RwLock<HashMap<String, ShortTermMemory>>,
    /// Serialises long-term writes per session
    write_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl HierarchicalMemory {
    pub fn new(config: MemoryConfig, backend: Arc<dyn MemoryBackend>) -> Self {
        Self {
            decay: RecencyDecay::new(Duration::from_secs(config.decay_half_life_secs)),
            config,
            backend,
            short_term: RwLock::new(HashMap::new()),
            write_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Snapshot for `query` in `session_id` with up to `k` long-term records
    pub async fn retrieve(&self, query: &str, session_id: &str, k: usize) -> MemorySnapshot {
        self.retrieve_at(query, session_id, k, Utc::now()).await
    }

    /// `retrieve` with an explicit clock for decay
    pub async fn retrieve_at(
        &self,
        query: &str,
        session_id: &str,
        k: usize,
        now: DateTime<Utc>,
    ) -> MemorySnapshot {
        let mut snapshot = MemorySnapshot::empty(session_id, query);
        snapshot.short_term = self.short_term_turns(session_id);

        if k == 0 {
            return snapshot;
        }

        let candidates = k.saturating_mul(self.config.oversample.max(1));
        let lookup = async {
            let vector = self.backend.embed(query).await?;
            self.backend.query(&vector, candidates).await
        };

        match tokio::time::timeout(self.config.backend_timeout(), lookup).await {
            Ok(Ok(hits)) => {
                let mut ranked: Vec<RankedRecord> = hits
                    .into_iter()
                    .map(|hit| RankedRecord {
                        score: self.decay.score(hit.similarity, hit.record.timestamp, now),
                        similarity: hit.similarity,
                        record: hit.record,
                    })
                    .collect();

                ranked.sort_by(|a, b| {
                    b.score
                        .partial_cmp(&a.score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| b.record.timestamp.cmp(&a.record.timestamp))
                });
                ranked.truncate(k);

                debug!(session = session_id, hits = ranked.len(), "long-term retrieval");
                snapshot.long_term = ranked;
            }
            Ok(Err(e)) => {
                warn!(session = session_id, error = %e, "long-term memory unavailable, degrading");
                snapshot.degraded = true;
                snapshot.degraded_reason = Some(e.to_string());
            }
            Err(_) => {
                warn!(
                    session = session_id,
                    timeout_ms = self.config.backend_timeout_ms,
                    "long-term memory timed out, degrading"
                );
                snapshot.degraded = true;
                snapshot.degraded_reason = Some(format!(
                    "long-term store timed out after {}ms",
                    self.config.backend_timeout_ms
                ));
            }
        }

        snapshot
    }

    /// Append a turn to short-term memory and, when durable, index it
    ///
    /// Indexing runs in the background; the returned ticket can be awaited.
    /// Must be called from within a tokio runtime when `turn.durable` is set.
    pub fn store(&self, session_id: &str, turn: Turn) -> IndexTicket {
        {
            let mut buffers = self
                .short_term
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let window = self.config.short_term_window;
            buffers
                .entry(session_id.to_string())
                .or_insert_with(|| ShortTermMemory::with_capacity(window))
                .add(turn.clone());
        }

        if !turn.durable || turn.content.trim().is_empty() {
            return IndexTicket::none();
        }

        let backend = Arc::clone(&self.backend);
        let lock = self.write_lock(session_id);
        let timeout = self.config.backend_timeout();
        let session = session_id.to_string();

        let handle = tokio::spawn(async move {
            let _guard = lock.lock().await;

            let index = async {
                let embedding = backend.embed(&turn.content).await?;
                backend
                    .append(LongTermRecord {
                        id: Uuid::new_v4().to_string(),
                        session_id: session.clone(),
                        text: turn.content,
                        embedding,
                        timestamp: turn.timestamp,
                    })
                    .await
            };

            let result = match tokio::time::timeout(timeout, index).await {
                Ok(result) => result,
                Err(_) => Err(WorkflowError::MemoryBackend(format!(
                    "indexing timed out after {}ms",
                    timeout.as_millis()
                ))),
            };

            if let Err(e) = &result {
                warn!(session = %session, error = %e, "long-term indexing failed");
            }
            result
        });

        IndexTicket {
            handle: Some(handle),
        }
    }

    /// Recent turns for a session, oldest first
    pub fn short_term_turns(&self, session_id: &str) -> Vec<Turn> {
        self.short_term
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(session_id)
            .map(ShortTermMemory::to_vec)
            .unwrap_or_default()
    }

    /// Number of sessions holding a short-term buffer
    pub fn session_count(&self) -> usize {
        self.short_term
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Drop the short-term buffer and write lock of a finished session
    ///
    /// Long-term records stay; in-flight indexing jobs keep their own lock.
    pub fn forget_session(&self, session_id: &str) -> bool {
        let removed = self
            .short_term
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(session_id)
            .is_some();
        self.write_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(session_id);
        removed
    }

    fn write_lock(&self, session_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .write_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // locks no indexing job holds any more
        locks.retain(|session, lock| session == session_id || Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(session_id.to_string()).or_default())
    }

    #[cfg(test)]
    fn write_lock_count(&self) -> usize {
        self.write_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}
