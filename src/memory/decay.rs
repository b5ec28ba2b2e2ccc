//! Recency decay for long-term records
//!
//! `score = similarity * decay(age)` with `decay(age) = 0.5^(age / half_life)`:
//! a fresh record keeps its similarity, a record one half-life old keeps half
//! of it. Decay is monotonically non-increasing in age.

use chrono::{DateTime, Utc};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecencyDecay {
    half_life: Duration,
}

impl RecencyDecay {
    pub fn new(half_life: Duration) -> Self {
        Self { half_life }
    }

    /// Decay factor in (0, 1] for a record of the given age
    ///
    /// Negative ages (clock skew) count as fresh. A zero half-life disables decay.
    pub fn factor(&self, age: chrono::Duration) -> f64 {
        let age_secs = age.num_milliseconds() as f64 / 1000.0;
        let half_life_secs = self.half_life.as_secs_f64();

        if age_secs <= 0.0 || half_life_secs == 0.0 {
            return 1.0;
        }

        0.5f64.powf(age_secs / half_life_secs)
    }

    /// Decay factor for a record stamped `timestamp`, seen at `now`
    pub fn factor_at(&self, timestamp: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        self.factor(now.signed_duration_since(timestamp))
    }

    /// Decayed score; negative similarity counts as unrelated
    pub fn score(&self, similarity: f64, timestamp: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        similarity.max(0.0) * self.factor_at(timestamp, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    const DAY: u64 = 24 * 3600;

    #[test]
    fn test_half_life() {
        let decay = RecencyDecay::new(Duration::from_secs(7 * DAY));
        assert_eq!(decay.factor(chrono::Duration::zero()), 1.0);
        assert!((decay.factor(chrono::Duration::days(7)) - 0.5).abs() < 1e-9);
        assert!((decay.factor(chrono::Duration::days(14)) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_negative_age_is_fresh() {
        let decay = RecencyDecay::new(Duration::from_secs(DAY));
        assert_eq!(decay.factor(chrono::Duration::hours(-3)), 1.0);
    }

    #[test]
    fn test_similar_old_record_can_outrank_fresh_weak_one() {
        let decay = RecencyDecay::new(Duration::from_secs(7 * DAY));
        let now = Utc::now();
        let old_strong = decay.score(0.95, now - chrono::Duration::days(3), now);
        let fresh_weak = decay.score(0.4, now, now);
        assert!(old_strong > fresh_weak);
    }

    #[test]
    fn test_negative_similarity_does_not_favour_old_records() {
        let decay = RecencyDecay::new(Duration::from_secs(DAY));
        let now = Utc::now();
        let old = decay.score(-0.6, now - chrono::Duration::days(5), now);
        let fresh = decay.score(-0.6, now, now);
        assert_eq!(old, 0.0);
        assert_eq!(fresh, 0.0);
        assert!(old <= fresh);
    }

    #[quickcheck]
    fn prop_score_never_rises_with_age(similarity: i8, a: u32, b: u32) -> bool {
        let decay = RecencyDecay::new(Duration::from_secs(DAY));
        let now = Utc::now();
        let similarity = similarity as f64 / 128.0;
        let (younger, older) = if a <= b { (a, b) } else { (b, a) };
        let s_young = decay.score(similarity, now - chrono::Duration::seconds(younger as i64), now);
        let s_old = decay.score(similarity, now - chrono::Duration::seconds(older as i64), now);
        s_old <= s_young && s_old >= 0.0
    }

    #[quickcheck]
    fn prop_decay_monotonic(a: u32, b: u32, half_life_hours: u16) -> bool {
        let decay = RecencyDecay::new(Duration::from_secs((half_life_hours as u64 + 1) * 3600));
        let (younger, older) = if a <= b { (a, b) } else { (b, a) };
        let f_young = decay.factor(chrono::Duration::seconds(younger as i64));
        let f_old = decay.factor(chrono::Duration::seconds(older as i64));
        f_old <= f_young && f_old >= 0.0 && f_young <= 1.0
    }
}
