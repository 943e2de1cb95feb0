//! Partition tracker: ultrasonic edge detection and rotation speed.
//!
//! A partition wall is "present" while the measured distance sits inside
//! `partition_distance ± tolerance`. The latch flips on the first in-band
//! sample (rising edge) and releases on the first out-of-band sample
//! (falling edge). There is no debounce: a single noisy in-band sample is a
//! crossing.
//!
//! Every rising edge advances the partition index by exactly one. From the
//! second crossing on, the interval between the two most recent crossings
//! feeds the speed estimate and its bounded history.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::config::defaults::{PARTITION_COUNT, SECONDS_PER_MINUTE};
use crate::config::TrackerConfig;
use crate::types::{PartitionIndex, SpeedSample};

/// Absorbs float error at the band edges (e.g. 0.06 + 0.04).
const BAND_EPSILON: f64 = 1e-9;

/// A confirmed partition-wall crossing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crossing {
    /// Partition now under the sensors.
    pub index: PartitionIndex,
    /// Monotonic crossing count, including this one.
    pub count: u64,
    pub at: Instant,
    /// Time since the previous crossing. `None` for the first one.
    pub interval: Option<Duration>,
    pub speed: Option<f64>,
}

/// Result of feeding one distance sample to the tracker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EdgeEvent {
    Rising(Crossing),
    Falling,
    Steady,
}

#[derive(Debug, Clone)]
pub struct PartitionTracker {
    threshold: f64,
    tolerance: f64,
    window: usize,
    capacity: usize,

    distance: Option<f64>,
    present: bool,
    crossings: u64,
    last_crossing: Option<Instant>,
    previous_crossing: Option<Instant>,
    time_between: Option<Duration>,
    speed: Option<f64>,
    average_speed: Option<f64>,
    history: VecDeque<SpeedSample>,
}

impl PartitionTracker {
    pub fn new(config: &TrackerConfig) -> Self {
        let window = config.speed_samples.max(1);
        let capacity = config.history_capacity().max(window);
        Self {
            threshold: config.partition_distance_m,
            tolerance: config.tolerance_m,
            window,
            capacity,
            distance: None,
            present: false,
            crossings: 0,
            last_crossing: None,
            previous_crossing: None,
            time_between: None,
            speed: None,
            average_speed: None,
            history: VecDeque::with_capacity(capacity),
        }
    }

    /// Feed one distance reading (metres) taken at `now`.
    ///
    /// Non-finite readings are dropped like a failed read: the latch and the
    /// index are left untouched.
    pub fn sample(&mut self, distance: f64, now: Instant) -> EdgeEvent {
        if !distance.is_finite() {
            tracing::debug!(distance, "[Tracker] Dropping non-finite distance sample");
            return EdgeEvent::Steady;
        }
        self.distance = Some(distance);

        let in_band = (distance - self.threshold).abs() <= self.tolerance + BAND_EPSILON;
        match (self.present, in_band) {
            (false, true) => {
                self.present = true;
                EdgeEvent::Rising(self.record_crossing(now))
            }
            (true, false) => {
                self.present = false;
                EdgeEvent::Falling
            }
            _ => EdgeEvent::Steady,
        }
    }

    fn record_crossing(&mut self, now: Instant) -> Crossing {
        self.crossings += 1;
        self.previous_crossing = self.last_crossing;
        self.last_crossing = Some(now);

        let interval = self
            .previous_crossing
            .map(|prev| now.saturating_duration_since(prev));
        if let Some(interval) = interval {
            self.time_between = Some(interval);
            self.push_speed(interval, now);
        }

        Crossing {
            index: self.current_index(),
            count: self.crossings,
            at: now,
            interval,
            speed: interval.and(self.speed),
        }
    }

    fn push_speed(&mut self, interval: Duration, now: Instant) {
        // Kept exactly as the deployed rig computes it; see DESIGN.md.
        let speed = (interval.as_secs_f64() * PARTITION_COUNT as f64) / SECONDS_PER_MINUTE;
        self.speed = Some(speed);

        self.history.push_back(SpeedSample { speed, at: now });
        while self.history.len() > self.capacity {
            self.history.pop_front();
        }

        let recent = self.history.len().min(self.window);
        let sum: f64 = self.history.iter().rev().take(recent).map(|s| s.speed).sum();
        self.average_speed = Some(sum / recent as f64);
    }

    /// Partition currently under the sensors.
    pub fn current_index(&self) -> PartitionIndex {
        PartitionIndex::new((self.crossings % PARTITION_COUNT as u64) as usize)
    }

    pub fn crossings(&self) -> u64 {
        self.crossings
    }

    /// Whether a wall is latched in front of the sensor.
    pub fn is_present(&self) -> bool {
        self.present
    }

    pub fn last_distance(&self) -> Option<f64> {
        self.distance
    }

    /// Speed derived from the most recent interval.
    pub fn rotation_speed(&self) -> Option<f64> {
        self.speed
    }

    /// Mean of the last `min(count, speed_samples)` speed values.
    pub fn average_speed(&self) -> Option<f64> {
        self.average_speed
    }

    pub fn time_between_crossings(&self) -> Option<Duration> {
        self.time_between
    }

    pub fn time_since_last_crossing(&self, now: Instant) -> Option<Duration> {
        self.last_crossing
            .map(|last| now.saturating_duration_since(last))
    }

    /// Bounded speed history, oldest first.
    pub fn speed_history(&self) -> impl ExactSizeIterator<Item = &SpeedSample> {
        self.history.iter()
    }

    pub fn history_capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WALL: f64 = 0.06;
    const CLEAR: f64 = 0.30;

    fn tracker() -> PartitionTracker {
        PartitionTracker::new(&TrackerConfig::default())
    }

    fn tracker_with(samples: usize, history: usize) -> PartitionTracker {
        PartitionTracker::new(&TrackerConfig {
            speed_samples: samples,
            history_length: history,
            ..TrackerConfig::default()
        })
    }

    /// One full wall pass: in-band at `at`, clear a millisecond later.
    fn pass(t: &mut PartitionTracker, at: Instant) {
        t.sample(WALL, at);
        t.sample(CLEAR, at + Duration::from_millis(1));
    }

    #[test]
    fn starts_at_partition_zero_without_speed() {
        let t = tracker();
        assert_eq!(t.current_index(), PartitionIndex::ZERO);
        assert_eq!(t.crossings(), 0);
        assert!(t.rotation_speed().is_none());
        assert!(t.average_speed().is_none());
        assert!(t.time_since_last_crossing(Instant::now()).is_none());
    }

    #[test]
    fn rising_edge_advances_index_once() {
        let mut t = tracker();
        let now = Instant::now();
        let event = t.sample(WALL, now);
        assert!(matches!(event, EdgeEvent::Rising(c) if c.index.get() == 1 && c.count == 1));

        // held in band: latched, no further advance
        for i in 1..10 {
            assert_eq!(t.sample(0.07, now + Duration::from_millis(i)), EdgeEvent::Steady);
        }
        assert_eq!(t.current_index().get(), 1);
    }

    #[test]
    fn falling_edge_releases_latch_without_advancing() {
        let mut t = tracker();
        let now = Instant::now();
        t.sample(WALL, now);
        assert_eq!(t.sample(CLEAR, now), EdgeEvent::Falling);
        assert!(!t.is_present());
        assert_eq!(t.current_index().get(), 1);
    }

    #[test]
    fn band_edges_are_inclusive() {
        let mut t = tracker();
        let now = Instant::now();
        assert!(matches!(t.sample(0.10, now), EdgeEvent::Rising(_)));
        assert_eq!(t.sample(0.1001, now), EdgeEvent::Falling);
        assert!(matches!(t.sample(0.02, now), EdgeEvent::Rising(_)));
    }

    #[test]
    fn too_close_is_outside_the_band() {
        let mut t = tracker();
        assert_eq!(t.sample(0.01, Instant::now()), EdgeEvent::Steady);
        assert_eq!(t.crossings(), 0);
    }

    #[test]
    fn index_wraps_after_six_crossings() {
        let mut t = tracker();
        let start = Instant::now();
        for i in 0..7 {
            pass(&mut t, start + Duration::from_secs(i));
        }
        assert_eq!(t.crossings(), 7);
        assert_eq!(t.current_index().get(), 1);
    }

    #[test]
    fn non_finite_sample_keeps_state() {
        let mut t = tracker();
        let now = Instant::now();
        t.sample(WALL, now);
        assert_eq!(t.sample(f64::NAN, now), EdgeEvent::Steady);
        assert!(t.is_present());
        assert_eq!(t.last_distance(), Some(WALL));
    }

    #[test]
    fn speed_uses_interval_formula() {
        let mut t = tracker();
        let start = Instant::now();
        pass(&mut t, start);
        assert!(t.rotation_speed().is_none());

        pass(&mut t, start + Duration::from_secs(10));
        // (10 s * 6) / 60
        assert!((t.rotation_speed().unwrap() - 1.0).abs() < 1e-9);
        assert_eq!(t.time_between_crossings(), Some(Duration::from_secs(10)));
        assert!((t.average_speed().unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn moving_average_uses_most_recent_window() {
        let mut t = tracker_with(2, 3);
        let start = Instant::now();
        let mut at = start;
        // intervals: 10 s, 20 s, 30 s -> speeds 1, 2, 3
        pass(&mut t, at);
        for secs in [10, 20, 30] {
            at += Duration::from_secs(secs);
            pass(&mut t, at);
        }
        assert!((t.average_speed().unwrap() - 2.5).abs() < 1e-9);
    }

    #[test]
    fn average_before_window_fills_uses_available_samples() {
        let mut t = tracker_with(5, 3);
        let start = Instant::now();
        pass(&mut t, start);
        pass(&mut t, start + Duration::from_secs(10));
        pass(&mut t, start + Duration::from_secs(40));
        // speeds 1 and 3
        assert!((t.average_speed().unwrap() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn history_is_trimmed_to_capacity() {
        let mut t = tracker_with(2, 3);
        assert_eq!(t.history_capacity(), 6);
        let start = Instant::now();
        for i in 0..20 {
            pass(&mut t, start + Duration::from_secs(i));
        }
        assert_eq!(t.speed_history().len(), 6);
        let newest = t.speed_history().last().unwrap();
        assert_eq!(newest.at, start + Duration::from_secs(19));
    }

    #[test]
    fn time_since_last_crossing_tracks_latest_wall() {
        let mut t = tracker();
        let start = Instant::now();
        pass(&mut t, start);
        assert_eq!(
            t.time_since_last_crossing(start + Duration::from_millis(750)),
            Some(Duration::from_millis(750))
        );
    }
}
