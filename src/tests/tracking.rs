//! Scenario tests for the tracking filter and localizer.

use rstest::rstest;

use crate::{
    prelude::{
        Config, Confidence, Coordinate, PairwiseData, Prn, RelativeLocalizer,
        RelativeTrackingFilter,
    },
    tests::{base_position, init_logger, receiver_epoch, rover_position, scenario_epoch},
};

fn expected_baseline(epoch: i64) -> Coordinate {
    let base = base_position();
    let rover = rover_position(epoch);
    Coordinate::from_ecef(rover.x - base.x, rover.y - base.y, rover.z - base.z)
}

fn assert_close(actual: &Coordinate, expected: &Coordinate, tolerance: f64) {
    assert!(
        (actual.x - expected.x).abs() < tolerance
            && (actual.y - expected.y).abs() < tolerance
            && (actual.z - expected.z).abs() < tolerance,
        "({}, {}, {}) != ({}, {}, {})",
        actual.x,
        actual.y,
        actual.z,
        expected.x,
        expected.y,
        expected.z,
    );
}

#[test]
fn reacquires_then_tracks() {
    init_logger();
    let localizer = RelativeLocalizer::new(Config::default());

    // first contact: no track yet, so the filter falls back to the
    // standalone position difference
    let (base0, rover0) = scenario_epoch(100, 6);
    let pair = PairwiseData::new(100, base0.clone(), rover0.clone(), None, None).unwrap();
    let fix = localizer.localize(&pair);
    assert_eq!(fix.confidence, Confidence::Bad);
    assert_close(&fix.baseline, &expected_baseline(100), 1E-9);

    // consecutive epoch: carrier-derived update, ambiguities cancel
    let (base1, rover1) = scenario_epoch(101, 6);
    let pair = PairwiseData::new(101, base1.clone(), rover1.clone(), Some(base0), Some(rover0))
        .unwrap();
    let fix = localizer.localize(&pair);
    assert_eq!(fix.peer, "rover");
    assert_eq!(fix.epoch, 101);
    assert_eq!(fix.confidence, Confidence::Good);
    assert_close(&fix.baseline, &expected_baseline(101), 1E-3);

    let (base2, rover2) = scenario_epoch(102, 6);
    let pair = PairwiseData::new(102, base2, rover2, Some(base1), Some(rover1)).unwrap();
    let fix = localizer.localize(&pair);
    assert_eq!(fix.confidence, Confidence::Good);
    assert_close(&fix.baseline, &expected_baseline(102), 1E-3);
}

#[rstest]
#[case(4, Confidence::Fair)]
#[case(5, Confidence::Good)]
#[case(6, Confidence::Good)]
fn confidence_tracks_satellite_count(#[case] satellites: usize, #[case] expected: Confidence) {
    init_logger();
    let localizer = RelativeLocalizer::new(Config::default());

    let (base0, rover0) = scenario_epoch(100, satellites);
    let pair = PairwiseData::new(100, base0.clone(), rover0.clone(), None, None).unwrap();
    localizer.localize(&pair);

    let (base1, rover1) = scenario_epoch(101, satellites);
    let pair = PairwiseData::new(101, base1, rover1, Some(base0), Some(rover0)).unwrap();
    let fix = localizer.localize(&pair);
    assert_eq!(fix.confidence, expected);
    assert_close(&fix.baseline, &expected_baseline(101), 1E-3);
}

#[test]
fn starved_solve_coasts_on_velocity() {
    init_logger();
    let mut filter = RelativeTrackingFilter::new(Config::default());
    let mut ignored = Vec::new();

    let (base0, rover0) = scenario_epoch(100, 6);
    let pair = PairwiseData::new(100, base0.clone(), rover0.clone(), None, None).unwrap();
    filter.track(&pair, &mut ignored);

    let (base1, rover1) = scenario_epoch(101, 6);
    let pair = PairwiseData::new(101, base1.clone(), rover1.clone(), Some(base0), Some(rover0))
        .unwrap();
    let (_, confidence) = filter.track(&pair, &mut ignored);
    assert_eq!(confidence, Confidence::Good);

    // three shared satellites cannot support a solve; the filter keeps
    // integrating its last velocity instead
    let (base2, rover2) = scenario_epoch(102, 3);
    let pair = PairwiseData::new(102, base2, rover2, Some(base1), Some(rover1)).unwrap();
    let (_, confidence) = filter.track(&pair, &mut ignored);
    assert_eq!(confidence, Confidence::Extrapolated(1));
}

#[test]
fn short_gap_is_extrapolated() {
    init_logger();
    let localizer = RelativeLocalizer::new(Config::default());

    let (base0, rover0) = scenario_epoch(100, 6);
    let pair = PairwiseData::new(100, base0.clone(), rover0.clone(), None, None).unwrap();
    localizer.localize(&pair);
    let (base1, rover1) = scenario_epoch(101, 6);
    let pair = PairwiseData::new(101, base1, rover1, Some(base0), Some(rover0)).unwrap();
    localizer.localize(&pair);

    // epochs 102 and 103 lost; 104 arrives without previous data
    let (base4, rover4) = scenario_epoch(104, 6);
    let pair = PairwiseData::new(104, base4, rover4, None, None).unwrap();
    let fix = localizer.localize(&pair);
    assert_eq!(fix.confidence, Confidence::Extrapolated(3));
}

#[test]
fn long_outage_restarts_from_absolute_positions() {
    init_logger();
    let localizer = RelativeLocalizer::new(Config::default());

    let (base0, rover0) = scenario_epoch(100, 6);
    let pair = PairwiseData::new(100, base0.clone(), rover0.clone(), None, None).unwrap();
    localizer.localize(&pair);
    let (base1, rover1) = scenario_epoch(101, 6);
    let pair = PairwiseData::new(101, base1, rover1, Some(base0), Some(rover0)).unwrap();
    assert!(localizer.localize(&pair).confidence.is_solved());

    // nine seconds of silence exceeds the five second outage limit
    let (base9, rover9) = scenario_epoch(110, 6);
    let pair = PairwiseData::new(110, base9, rover9, None, None).unwrap();
    let fix = localizer.localize(&pair);
    assert_eq!(fix.confidence, Confidence::Bad);
    assert_close(&fix.baseline, &expected_baseline(110), 1E-9);
}

#[test]
fn implausible_baseline_is_rejected() {
    init_logger();
    let localizer = RelativeLocalizer::new(Config::default());

    // a rover 200 km out is beyond the working range
    let base = base_position();
    let far = Coordinate::from_ecef(base.x + 200_000.0, base.y, base.z);
    let base0 = receiver_epoch("base", 100, &base, 3.0, 6);
    let rover0 = receiver_epoch("rover", 100, &far, 5.0, 6);
    let pair = PairwiseData::new(100, base0, rover0, None, None).unwrap();

    let fix = localizer.localize(&pair);
    assert_eq!(fix.confidence, Confidence::Bad);

    // the track was abandoned, so the next epoch restarts instead of
    // attempting a carrier update
    let base1 = receiver_epoch("base", 101, &base, 3.0, 6);
    let rover1 = receiver_epoch("rover", 101, &far, 5.0, 6);
    let pair = PairwiseData::new(101, base1, rover1, None, None).unwrap();
    assert_eq!(localizer.localize(&pair).confidence, Confidence::Bad);
}

#[test]
fn corrupted_satellite_is_ignored() {
    init_logger();
    let mut filter = RelativeTrackingFilter::new(Config::default());
    let mut ignored = Vec::new();

    let (base0, rover0) = scenario_epoch(100, 6);
    let pair = PairwiseData::new(100, base0.clone(), rover0.clone(), None, None).unwrap();
    filter.track(&pair, &mut ignored);

    // half a meter of carrier error on one channel, this epoch only
    let corrupted = Prn::new(23).unwrap();
    let (base1, mut rover1) = scenario_epoch(101, 6);
    rover1.observations.get_mut(corrupted).unwrap().carrier_range += 0.5;

    let pair = PairwiseData::new(101, base1, rover1, Some(base0), Some(rover0)).unwrap();
    let (baseline, confidence) = filter.track(&pair, &mut ignored);

    assert_eq!(confidence, Confidence::Good);
    assert!(ignored.contains(&corrupted));
    assert_close(&baseline, &expected_baseline(101), 1E-3);
}
