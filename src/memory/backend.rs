//! Long-term memory backend contract and the bundled in-process store

use crate::errors::Result;
use crate::memory::types::{LongTermRecord, ScoredRecord};
use async_trait::async_trait;
use tokio::sync::RwLock;

/// Default embedding width of `HashingEmbedder`
pub const DEFAULT_EMBEDDING_DIM: usize = 256;

/// External vector store
///
/// The store is append-only: records are never updated or removed.
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// Embed text into the store's vector space
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Up to `k` records ranked by similarity to `vector`, best first
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredRecord>>;

    async fn append(&self, record: LongTermRecord) -> Result<()>;
}

/// Lowercase alphanumeric tokens of `text`
pub fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_lowercase())
        .collect()
}

/// Feature-hashed bag-of-words embedding, L2 normalised
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        for token in tokens(text) {
            let hash = fnv1a(token.as_bytes());
            let slot = (hash % self.dimensions as u64) as usize;
            // sign bit spreads collisions around zero
            let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
            vector[slot] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vector.iter_mut() {
                *v /= norm;
            }
        }

        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIM)
    }
}

/// 64-bit FNV-1a; stable across processes and toolchains
pub(crate) fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Cosine similarity; zero when either vector is zero or lengths differ
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f64 = a.iter().zip(b).map(|(x, y)| (*x as f64) * (*y as f64)).sum();
    let norm_a = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Append-only in-process vector store
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    embedder: HashingEmbedder,
    records: RwLock<Vec<LongTermRecord>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_embedder(embedder: HashingEmbedder) -> Self {
        Self {
            embedder,
            records: RwLock::new(Vec::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Copy of every stored record, in append order
    pub async fn records(&self) -> Vec<LongTermRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl MemoryBackend for InMemoryVectorStore {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embedder.embed(text))
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredRecord>> {
        let records = self.records.read().await;

        let mut scored: Vec<ScoredRecord> = records
            .iter()
            .map(|record| ScoredRecord {
                similarity: cosine_similarity(vector, &record.embedding),
                record: record.clone(),
            })
            .collect();

        // stable: equal similarity keeps append order
        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);

        Ok(scored)
    }

    async fn append(&self, record: LongTermRecord) -> Result<()> {
        self.records.write().await.push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(store_embedder: &HashingEmbedder, id: &str, text: &str) -> LongTermRecord {
        LongTermRecord {
            id: id.to_string(),
            session_id: "s".to_string(),
            text: text.to_string(),
            embedding: store_embedder.embed(text),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_tokens() {
        assert_eq!(
            tokens("Summarize sales, for Q1!"),
            vec!["summarize", "sales", "for", "q1"]
        );
        assert!(tokens("  ,;  ").is_empty());
    }

    #[test]
    fn test_embedding_is_normalised_and_stable() {
        let embedder = HashingEmbedder::new(64);
        let a = embedder.embed("quarterly sales report");
        let b = embedder.embed("quarterly sales report");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);

        assert!(embedder.embed("").iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-9);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_store_query_ranks_by_similarity() {
        let embedder = HashingEmbedder::default();
        let store = InMemoryVectorStore::with_embedder(embedder);

        store.append(record(&embedder, "1", "weather forecast for tomorrow")).await.unwrap();
        store.append(record(&embedder, "2", "sales report for Q1")).await.unwrap();
        store.append(record(&embedder, "3", "Q1 sales were strong")).await.unwrap();
        assert_eq!(store.len().await, 3);

        let query = store.embed("Q1 sales report").await.unwrap();
        let hits = store.query(&query, 2).await.unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].record.id, "2");
        assert!(hits[0].similarity >= hits[1].similarity);
        assert!(hits.iter().all(|h| h.record.id != "1"));
    }

    #[tokio::test]
    async fn test_query_empty_store() {
        let store = InMemoryVectorStore::new();
        let query = store.embed("anything").await.unwrap();
        assert!(store.query(&query, 5).await.unwrap().is_empty());
        assert!(store.is_empty().await);
    }
}
