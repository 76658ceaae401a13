// tests/window_generation.rs
use chrono::{Duration, TimeZone, Utc};
use rand::Rng;
use seismic_ingest::ingest::window::generate;
use seismic_ingest::Error;

#[test]
fn windows_cover_range_exactly_for_random_inputs() {
    let mut rng = rand::rng();
    let base = Utc.with_ymd_and_hms(2010, 1, 1, 0, 0, 0).unwrap();

    for _ in 0..200 {
        let start = base + Duration::minutes(rng.random_range(0..100_000));
        let end = start + Duration::minutes(rng.random_range(1..20_000));
        let step = rng.random_range(1..=48u32);

        let ws: Vec<_> = generate(start, end, step).unwrap().collect();
        assert!(!ws.is_empty());
        assert_eq!(ws.first().unwrap().start, start);
        assert_eq!(ws.last().unwrap().end, end);

        for pair in ws.windows(2) {
            assert!(pair[0].start < pair[1].start, "starts not increasing");
            assert_eq!(pair[0].end, pair[1].start, "gap or overlap");
        }
        for w in &ws[..ws.len() - 1] {
            assert_eq!(w.end - w.start, Duration::hours(i64::from(step)));
        }
        let last = ws.last().unwrap();
        assert!(last.end - last.start <= Duration::hours(i64::from(step)));
        assert!(last.end > last.start);
    }
}

#[test]
fn twelve_hours_in_six_hour_steps() {
    let start = Utc.with_ymd_and_hms(2010, 1, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2010, 1, 1, 12, 0, 0).unwrap();
    let names: Vec<_> = generate(start, end, 6).unwrap().map(|w| w.file_name()).collect();
    assert_eq!(
        names,
        vec!["2010-01-01T00:00:00.csv", "2010-01-01T06:00:00.csv"]
    );
}

#[test]
fn range_shorter_than_one_step_gives_one_window() {
    let start = Utc.with_ymd_and_hms(2010, 1, 1, 0, 0, 0).unwrap();
    let end = start + Duration::minutes(90);
    let ws: Vec<_> = generate(start, end, 6).unwrap().collect();
    assert_eq!(ws.len(), 1);
    assert_eq!(ws[0].end, end);
    assert_eq!(ws[0].to_string(), "[2010-01-01T00:00:00, 2010-01-01T01:30:00)");
}

#[test]
fn empty_range_is_rejected() {
    let t = Utc.with_ymd_and_hms(2010, 1, 1, 0, 0, 0).unwrap();
    let err = generate(t, t, 6).unwrap_err();
    assert!(matches!(err, Error::Config { ref key, .. } if key.as_deref() == Some("end_date")));
    assert!(err.is_fatal());
}
