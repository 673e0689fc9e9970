use serde::{Deserialize, Serialize};

use crate::interval::Interval;

/// Sorted, pairwise non-overlapping occupancy of one resource identity.
///
/// Neighbouring intervals may touch (`prev.end == next.start`), which allows
/// back-to-back bookings such as an aircraft turnaround.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSchedule {
    intervals: Vec<Interval>,
}

impl ResourceSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false iff a reserved interval overlaps `candidate`.
    ///
    /// Binary search finds the insertion point after every interval ordered
    /// at or before `candidate`; only the two neighbours of that point can
    /// overlap it.
    pub fn is_available(&self, candidate: &Interval) -> bool {
        let idx = self.insertion_point(candidate);
        if idx > 0 && self.intervals[idx - 1].end > candidate.start {
            return false;
        }
        if let Some(next) = self.intervals.get(idx)
            && next.start < candidate.end
        {
            return false;
        }
        true
    }

    /// Inserts `interval` keeping sort order.
    ///
    /// The caller must have confirmed availability; use [`try_reserve`] for a
    /// combined check-and-insert.
    ///
    /// [`try_reserve`]: ResourceSchedule::try_reserve
    pub fn reserve(&mut self, interval: Interval) {
        let idx = self.insertion_point(&interval);
        self.intervals.insert(idx, interval);
    }

    /// Reserves `interval` if it is available. Returns whether it was reserved.
    pub fn try_reserve(&mut self, interval: Interval) -> bool {
        if !self.is_available(&interval) {
            return false;
        }
        self.reserve(interval);
        true
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Checks the ordering and non-overlap invariant.
    pub fn is_consistent(&self) -> bool {
        self.intervals
            .windows(2)
            .all(|pair| pair[0] <= pair[1] && pair[0].end <= pair[1].start)
    }

    fn insertion_point(&self, interval: &Interval) -> usize {
        self.intervals.partition_point(|existing| existing <= interval)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};

    use super::*;

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|date| date.and_hms_opt(hour, 0, 0))
            .expect("valid timestamp")
    }

    fn window(start: u32, end: u32) -> Interval {
        Interval::new(at(start), at(end)).expect("interval")
    }

    #[test]
    fn empty_schedule_is_always_available() {
        let schedule = ResourceSchedule::new();
        assert!(schedule.is_available(&window(0, 23)));
    }

    #[test]
    fn reserve_inserts_in_order() {
        let mut schedule = ResourceSchedule::new();
        schedule.reserve(window(12, 14));
        schedule.reserve(window(2, 4));
        schedule.reserve(window(6, 8));
        let starts: Vec<_> = schedule.intervals().iter().map(|iv| iv.start).collect();
        assert_eq!(starts, vec![at(2), at(6), at(12)]);
        assert!(schedule.is_consistent());
    }

    #[test]
    fn duplicate_interval_is_rejected() {
        let mut schedule = ResourceSchedule::new();
        assert!(schedule.try_reserve(window(5, 7)));
        assert!(!schedule.try_reserve(window(5, 7)));
        assert_eq!(schedule.len(), 1);
    }

    #[test]
    fn containing_window_is_rejected() {
        let mut schedule = ResourceSchedule::new();
        schedule.reserve(window(9, 10));
        assert!(!schedule.is_available(&window(8, 12)));
        assert!(!schedule.is_available(&window(9, 12)));
    }

    #[test]
    fn zero_length_interval_occupies_no_time() {
        let mut schedule = ResourceSchedule::new();
        let instant = window(10, 10);
        assert!(instant.is_empty());
        assert!(schedule.try_reserve(instant));

        assert!(!schedule.is_available(&window(9, 11)));
        assert!(schedule.is_available(&window(8, 10)));
        assert!(schedule.is_available(&window(10, 12)));
        assert!(schedule.try_reserve(window(10, 12)));
        assert!(schedule.try_reserve(window(8, 10)));
        assert_eq!(schedule.len(), 3);
        assert!(schedule.is_consistent());
    }
}
