//! Pluggable randomness for source selection and human-like pacing.
//!
//! The scheduler never touches `rand` directly; it asks a [`RandomSource`]
//! so tests can script exact rolls and assert exact transitions.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

use crate::config::DelayRange;

pub trait RandomSource {
    /// Uniform integer in `[0, bound)`. Callers never pass `0`.
    fn below(&mut self, bound: u64) -> u64;
}

/// OS-seeded generator used in production.
#[derive(Debug)]
pub struct OsRandom(StdRng);

impl OsRandom {
    pub fn new() -> Self {
        Self(StdRng::from_os_rng())
    }
}

impl Default for OsRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for OsRandom {
    fn below(&mut self, bound: u64) -> u64 {
        self.0.random_range(0..bound)
    }
}

/// Uniform integer in the inclusive range `[min, max]`.
pub fn between<R: RandomSource + ?Sized>(rng: &mut R, min: u64, max: u64) -> u64 {
    if max <= min {
        return min;
    }
    min + rng.below(max - min + 1)
}

/// Uniform pause drawn from a configured range, millisecond granularity.
pub fn jittered_delay<R: RandomSource + ?Sized>(rng: &mut R, range: DelayRange) -> Duration {
    let (min, max) = range.millis();
    Duration::from_millis(between(rng, min, max))
}

/// Uniform pause in `[0, max)`.
pub fn jitter_up_to<R: RandomSource + ?Sized>(rng: &mut R, max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rng.below(max_ms))
}

/// Weighted pick: each item is chosen with probability `weight / total`.
///
/// Returns `None` when the slice is empty or every weight is zero.
pub fn pick_weighted<'a, T, R, F>(rng: &mut R, items: &'a [T], weight: F) -> Option<&'a T>
where
    R: RandomSource + ?Sized,
    F: Fn(&T) -> u32,
{
    let total: u64 = items.iter().map(|i| u64::from(weight(i))).sum();
    if total == 0 {
        return None;
    }
    let mut roll = rng.below(total);
    for item in items {
        let w = u64::from(weight(item));
        if roll < w {
            return Some(item);
        }
        roll -= w;
    }
    None
}

#[cfg(test)]
pub mod testing {
    use super::RandomSource;
    use std::collections::VecDeque;

    /// Replays a fixed sequence of rolls (each reduced modulo the bound),
    /// then yields zeros.
    #[derive(Debug, Default)]
    pub struct ScriptedRandom {
        rolls: VecDeque<u64>,
        pub bounds_seen: Vec<u64>,
    }

    impl ScriptedRandom {
        pub fn new<I: IntoIterator<Item = u64>>(rolls: I) -> Self {
            Self {
                rolls: rolls.into_iter().collect(),
                bounds_seen: Vec::new(),
            }
        }
    }

    impl RandomSource for ScriptedRandom {
        fn below(&mut self, bound: u64) -> u64 {
            self.bounds_seen.push(bound);
            self.rolls.pop_front().unwrap_or(0) % bound
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedRandom;
    use super::*;

    #[test]
    fn test_between_is_inclusive() {
        let mut rng = ScriptedRandom::new([0, 10, 11]);
        assert_eq!(between(&mut rng, 5, 15), 5);
        assert_eq!(between(&mut rng, 5, 15), 15);
        // 11 % 11 wraps back to the minimum
        assert_eq!(between(&mut rng, 5, 15), 5);
        assert_eq!(rng.bounds_seen, vec![11, 11, 11]);
    }

    #[test]
    fn test_between_degenerate_range() {
        let mut rng = ScriptedRandom::new([]);
        assert_eq!(between(&mut rng, 7, 7), 7);
        assert!(rng.bounds_seen.is_empty());
    }

    #[test]
    fn test_jittered_delay_within_range() {
        let mut rng = OsRandom::new();
        let range = DelayRange::new(30, 180);
        for _ in 0..200 {
            let d = jittered_delay(&mut rng, range);
            assert!(d >= Duration::from_secs(30) && d <= Duration::from_secs(180));
        }
    }

    #[test]
    fn test_pick_weighted_follows_cumulative_weights() {
        let items = [("a", 2u32), ("b", 1), ("c", 3)];
        // total 6: rolls 0-1 -> a, 2 -> b, 3-5 -> c
        let mut rng = ScriptedRandom::new([0, 1, 2, 3, 5]);
        let picks: Vec<&str> = (0..5)
            .map(|_| pick_weighted(&mut rng, &items, |i| i.1).unwrap().0)
            .collect();
        assert_eq!(picks, vec!["a", "a", "b", "c", "c"]);
    }

    #[test]
    fn test_pick_weighted_skips_zero_weights() {
        let items = [("never", 0u32), ("always", 4)];
        let mut rng = ScriptedRandom::new([0, 3]);
        assert_eq!(pick_weighted(&mut rng, &items, |i| i.1).unwrap().0, "always");
        assert_eq!(pick_weighted(&mut rng, &items, |i| i.1).unwrap().0, "always");
        let empty: [(&str, u32); 0] = [];
        assert!(pick_weighted(&mut rng, &empty, |i| i.1).is_none());
    }

    #[test]
    fn test_pick_weighted_frequency_tracks_weight() {
        let items = [("light", 1u32), ("heavy", 3)];
        let mut rng = OsRandom::new();
        let heavy = (0..4000)
            .filter(|_| pick_weighted(&mut rng, &items, |i| i.1).unwrap().0 == "heavy")
            .count();
        assert!((2700..3300).contains(&heavy), "heavy picked {heavy} times");
    }
}
