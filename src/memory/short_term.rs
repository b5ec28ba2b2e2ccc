//! Bounded short-term conversation memory
//!
//! Fixed-size buffer of recent turns for one session:
//! - Capacity set by `memory.short_term_window`
//! - FIFO eviction when full (insertion order, not access order)
//! - O(1) insert and eviction

use crate::types::Turn;
use std::collections::VecDeque;

/// Short-term memory for one session
#[derive(Debug, Clone)]
pub struct ShortTermMemory {
    /// Buffer of recent turns, oldest first
    entries: VecDeque<Turn>,

    /// Maximum allowed entries
    max_entries: usize,
}

impl ShortTermMemory {
    /// Create short-term memory holding at most `max_entries` turns
    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_entries),
            max_entries,
        }
    }

    /// Add a turn, returning the evicted oldest turn if the window was full
    pub fn add(&mut self, turn: Turn) -> Option<Turn> {
        if self.max_entries == 0 {
            return Some(turn);
        }

        let evicted = if self.entries.len() >= self.max_entries {
            self.entries.pop_front()
        } else {
            None
        };

        self.entries.push_back(turn);
        evicted
    }

    /// Get reference to all entries
    pub fn entries(&self) -> &VecDeque<Turn> {
        &self.entries
    }

    /// Get the last N entries, oldest first
    pub fn last_n(&self, n: usize) -> Vec<&Turn> {
        let start = self.entries.len().saturating_sub(n);
        self.entries.range(start..).collect()
    }

    /// Get the most recent entry
    pub fn last(&self) -> Option<&Turn> {
        self.entries.back()
    }

    pub fn capacity(&self) -> usize {
        self.max_entries
    }

    /// Count total entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if memory is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clear all entries
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Get entries as a vector, oldest first
    pub fn to_vec(&self) -> Vec<Turn> {
        self.entries.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_add_within_capacity() {
        let mut memory = ShortTermMemory::with_capacity(3);
        assert!(memory.add(Turn::user("a")).is_none());
        assert!(memory.add(Turn::user("b")).is_none());
        assert_eq!(memory.len(), 2);
        assert_eq!(memory.last().unwrap().content, "b");
    }

    #[test]
    fn test_evicts_oldest() {
        let mut memory = ShortTermMemory::with_capacity(2);
        memory.add(Turn::user("a"));
        memory.add(Turn::assistant("b"));

        let evicted = memory.add(Turn::user("c")).unwrap();
        assert_eq!(evicted.content, "a");

        let contents: Vec<_> = memory.entries().iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["b", "c"]);
    }

    #[test]
    fn test_last_n() {
        let mut memory = ShortTermMemory::with_capacity(10);
        for i in 0..5 {
            memory.add(Turn::user(format!("turn {}", i)));
        }

        let last = memory.last_n(2);
        assert_eq!(last.len(), 2);
        assert_eq!(last[0].content, "turn 3");
        assert_eq!(memory.last_n(50).len(), 5);
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let mut memory = ShortTermMemory::with_capacity(0);
        assert_eq!(memory.add(Turn::user("a")).unwrap().content, "a");
        assert!(memory.is_empty());
    }

    #[quickcheck]
    fn prop_fifo_eviction(capacity: u8, inserts: u8) -> bool {
        let capacity = (capacity % 16) as usize + 1;
        let inserts = inserts as usize;
        let mut memory = ShortTermMemory::with_capacity(capacity);

        for i in 0..inserts {
            let before: Vec<String> = memory.entries().iter().map(|t| t.content.clone()).collect();
            let evicted = memory.add(Turn::user(i.to_string()));

            if memory.len() > capacity {
                return false;
            }

            // Overflow evicts exactly the oldest turn
            match evicted {
                Some(turn) => {
                    if before.len() != capacity || turn.content != before[0] {
                        return false;
                    }
                }
                None => {
                    if before.len() == capacity {
                        return false;
                    }
                }
            }
        }

        let expected: Vec<String> = (inserts.saturating_sub(capacity)..inserts)
            .map(|i| i.to_string())
            .collect();
        let actual: Vec<String> = memory.entries().iter().map(|t| t.content.clone()).collect();
        actual == expected
    }
}
