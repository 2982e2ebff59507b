//! Aggregator-to-localizer chain over the synthetic scenario.

use crate::{
    prelude::{Config, Confidence, EpochAggregator, RelativeLocalizer},
    tests::{init_logger, scenario_epoch},
};

#[test]
fn remote_stream_tracks_through_the_chain() {
    init_logger();
    let cfg = Config::default();
    let aggregator = EpochAggregator::new("base", cfg.tracking_outage_secs);
    let localizer = RelativeLocalizer::new(cfg);

    for epoch in 100..104 {
        let (base, _) = scenario_epoch(epoch, 6);
        aggregator.push_local(base);
    }

    let mut grades = Vec::new();
    for epoch in 100..104 {
        let (_, rover) = scenario_epoch(epoch, 6);
        let pair = aggregator.match_remote(rover).unwrap();
        assert_eq!(pair.receive_epoch, epoch);
        // the aggregator supplies both previous epochs from its buffers
        assert_eq!(pair.has_previous(), epoch > 100);
        grades.push(localizer.localize(&pair).confidence);
    }

    assert_eq!(
        grades,
        vec![
            Confidence::Bad,
            Confidence::Good,
            Confidence::Good,
            Confidence::Good,
        ]
    );
}

#[test]
fn two_rovers_are_tracked_independently() {
    init_logger();
    let cfg = Config::default();
    let aggregator = EpochAggregator::new("base", cfg.tracking_outage_secs);
    let localizer = RelativeLocalizer::new(cfg);

    for epoch in 100..102 {
        let (base, _) = scenario_epoch(epoch, 6);
        aggregator.push_local(base);
    }

    for epoch in 100..102 {
        let (_, rover) = scenario_epoch(epoch, 6);
        let mut other = rover.clone();
        other.id = "other".into();

        let fix = localizer.localize(&aggregator.match_remote(rover).unwrap());
        let other_fix = localizer.localize(&aggregator.match_remote(other).unwrap());
        assert_eq!(fix.confidence, other_fix.confidence);
        assert_eq!(fix.peer, "rover");
        assert_eq!(other_fix.peer, "other");
    }
}
