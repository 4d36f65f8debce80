//! Time/importance decay scoring (spec.md §4.8).
//!
//! Pure function of an entry's fields and the current time — no
//! mutation. The same formula backs both [`crate::scorer::SearchEngine`]
//! and `compact()`'s archive-candidate pass.

use chrono::{DateTime, Utc};
use mnemo_core::types::{MemoryEntry, MemoryType};

/// Effective half-life in days for a given memory type, given the
/// workspace's base half-life (spec.md §4.7 multipliers: episodic=1,
/// fact=1, preference=3, procedure=3, mistake=10).
pub fn half_life_effective(half_life_days: f64, memory_type: MemoryType) -> f64 {
    half_life_days * memory_type.half_life_multiplier()
}

/// `decay(d) = 2 ^ (-age_days(d) / half_life_effective(d))`.
///
/// `age(e) = 0 => decay(e) = 1`; `age(e) = half_life_effective(e) =>
/// decay(e) = 0.5` (spec.md §8, invariant 2).
pub fn decay(entry: &MemoryEntry, now: DateTime<Utc>, half_life_days: f64) -> f64 {
    let age = entry.age_days(now).max(0.0);
    let hl = half_life_effective(half_life_days, entry.memory_type);
    2f64.powf(-age / hl)
}

/// True if `entry`'s decay falls below `threshold` — a candidate for
/// `compact()` to propose archiving, not remove outright (spec.md §4.8).
pub fn is_archive_candidate(entry: &MemoryEntry, now: DateTime<Utc>, half_life_days: f64, threshold: f64) -> bool {
    decay(entry, now, half_life_days) < threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemo_core::types::Category;

    fn entry_aged(memory_type: MemoryType, created: DateTime<Utc>) -> MemoryEntry {
        MemoryEntry::new(
            "this content is long enough for a valid entry".into(),
            "test".into(),
            Category::default(),
            memory_type,
            created,
        )
        .unwrap()
    }

    #[test]
    fn zero_age_decay_is_one() {
        let now = Utc::now();
        let e = entry_aged(MemoryType::Fact, now);
        let d = decay(&e, now, 7.0);
        assert!((d - 1.0).abs() < 1e-9);
    }

    #[test]
    fn decay_at_half_life_is_half() {
        let now = Utc::now();
        let created = now - chrono::Duration::days(7);
        let e = entry_aged(MemoryType::Fact, created);
        let d = decay(&e, now, 7.0);
        assert!((d - 0.5).abs() < 1e-9);
    }

    #[test]
    fn mistake_multiplier_extends_half_life() {
        let now = Utc::now();
        let created = now - chrono::Duration::days(7);
        let fact = entry_aged(MemoryType::Fact, created);
        let mistake = entry_aged(MemoryType::Mistake, created);
        assert!(decay(&mistake, now, 7.0) > decay(&fact, now, 7.0));
    }

    #[test]
    fn decay_monotonically_decreases_with_age() {
        let now = Utc::now();
        let recent = entry_aged(MemoryType::Fact, now - chrono::Duration::days(1));
        let old = entry_aged(MemoryType::Fact, now - chrono::Duration::days(30));
        assert!(decay(&recent, now, 7.0) > decay(&old, now, 7.0));
    }

    #[test]
    fn archive_candidate_threshold() {
        let now = Utc::now();
        let very_old = entry_aged(MemoryType::Fact, now - chrono::Duration::days(365));
        assert!(is_archive_candidate(&very_old, now, 7.0, 0.05));
        let recent = entry_aged(MemoryType::Fact, now);
        assert!(!is_archive_candidate(&recent, now, 7.0, 0.05));
    }

    use proptest::prelude::*;

    proptest! {
        /// For any non-negative half-life and any two ages, the older
        /// entry never decays to a higher value than the younger one
        /// (spec.md §8, invariant 2's monotonicity half).
        #[test]
        fn decay_never_increases_with_age(
            half_life_days in 0.1_f64..365.0,
            younger_days in 0.0_f64..1000.0,
            extra_days in 0.0_f64..1000.0,
        ) {
            let now = Utc::now();
            let older_days = younger_days + extra_days;
            let younger = entry_aged(MemoryType::Fact, now - chrono::Duration::milliseconds((younger_days * 86_400_000.0) as i64));
            let older = entry_aged(MemoryType::Fact, now - chrono::Duration::milliseconds((older_days * 86_400_000.0) as i64));
            let d_younger = decay(&younger, now, half_life_days);
            let d_older = decay(&older, now, half_life_days);
            prop_assert!(d_older <= d_younger + 1e-9);
            prop_assert!((0.0..=1.0).contains(&d_younger));
            prop_assert!((0.0..=1.0).contains(&d_older));
        }

        /// Exactly one effective half-life of age always halves decay,
        /// for any base half-life and any memory type multiplier.
        #[test]
        fn decay_at_half_life_is_always_half(half_life_days in 0.1_f64..365.0) {
            let now = Utc::now();
            for memory_type in [
                MemoryType::Episodic,
                MemoryType::Fact,
                MemoryType::Preference,
                MemoryType::Procedure,
                MemoryType::Mistake,
            ] {
                let hl = half_life_effective(half_life_days, memory_type);
                let created = now - chrono::Duration::milliseconds((hl * 86_400_000.0) as i64);
                let e = entry_aged(memory_type, created);
                let d = decay(&e, now, half_life_days);
                prop_assert!((d - 0.5).abs() < 1e-6);
            }
        }
    }
}
