//! Hierarchical memory
//!
//! Components:
//! - Short-term memory: bounded FIFO window of recent turns per session
//! - Long-term memory: append-only similarity store behind `MemoryBackend`
//! - Recency decay: down-weights old long-term records
//! - Manager: merges both into a `MemorySnapshot`, degrading on backend failure

pub mod types;
pub mod short_term;
pub mod decay;
pub mod backend;
pub mod manager;

pub use types::{LongTermRecord, MemorySnapshot, RankedRecord, ScoredRecord};
pub use short_term::ShortTermMemory;
pub use decay::RecencyDecay;
pub use backend::{HashingEmbedder, InMemoryVectorStore, MemoryBackend};
pub use manager::{HierarchicalMemory, IndexTicket};
