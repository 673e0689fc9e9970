use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use airsynth_core::{Interval, ResourceKind, ResourceSchedule, ScheduleBook};

fn epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .expect("valid epoch")
}

fn minutes(start: i64, end: i64) -> Interval {
    Interval::new(
        epoch() + TimeDelta::minutes(start),
        epoch() + TimeDelta::minutes(end),
    )
    .expect("interval")
}

#[test]
fn random_reservations_keep_schedule_sorted_and_disjoint() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let mut schedule = ResourceSchedule::new();

    for _ in 0..2_000 {
        let start = rng.random_range(0..10_000);
        let length = rng.random_range(1..240);
        let candidate = minutes(start, start + length);
        if schedule.is_available(&candidate) {
            schedule.reserve(candidate);
        }
        assert!(schedule.is_consistent());
    }

    assert!(!schedule.is_empty());
}

#[test]
fn availability_matches_brute_force_overlap() {
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let mut schedule = ResourceSchedule::new();
    let mut reserved: Vec<Interval> = Vec::new();

    for _ in 0..500 {
        let start = rng.random_range(0..5_000);
        let candidate = minutes(start, start + rng.random_range(1..120));
        let expected = reserved.iter().all(|existing| !existing.overlaps(&candidate));
        assert_eq!(schedule.is_available(&candidate), expected);
        if expected {
            schedule.reserve(candidate);
            reserved.push(candidate);
        }
    }
}

#[test]
fn adjacent_windows_are_available_on_both_sides() {
    let mut schedule = ResourceSchedule::new();
    schedule.reserve(minutes(120, 300));

    assert!(schedule.is_available(&minutes(60, 120)));
    assert!(schedule.is_available(&minutes(300, 330)));
    assert!(!schedule.is_available(&minutes(119, 121)));
    assert!(!schedule.is_available(&minutes(299, 301)));
    assert!(!schedule.is_available(&minutes(150, 160)));
}

#[test]
fn reserved_window_is_no_longer_available() {
    let mut schedule = ResourceSchedule::new();
    let block = minutes(600, 780);
    assert!(schedule.try_reserve(block));
    assert!(!schedule.is_available(&block));
    assert!(!schedule.try_reserve(block));
}

#[test]
fn concurrent_reservations_never_double_book() {
    let book = ScheduleBook::with_range(ResourceKind::Pilot, 4).expect("book");
    let granted = AtomicUsize::new(0);

    thread::scope(|scope| {
        for worker in 0..8_u64 {
            let book = &book;
            let granted = &granted;
            scope.spawn(move || {
                let mut rng = ChaCha8Rng::seed_from_u64(worker);
                for _ in 0..400 {
                    let id = rng.random_range(1..=4);
                    let start = rng.random_range(0..2_000);
                    let block = minutes(start, start + 90);
                    if book.try_reserve(id, block).expect("known pilot") {
                        granted.fetch_add(1, Ordering::Relaxed);
                    }
                }
            });
        }
    });

    let mut total = 0;
    for id in book.ids() {
        let schedule = book.snapshot(*id).expect("schedule");
        assert!(schedule.is_consistent(), "pilot {id} was double-booked");
        total += schedule.len();
    }
    assert_eq!(total, granted.load(Ordering::Relaxed));
    assert_eq!(book.reservations(), total);
}
