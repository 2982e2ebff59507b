//! Epoch alignment across receivers.
//!
//! Local and remote [ProcessedData] streams arrive asynchronously; the
//! aggregator buffers a handful of recent epochs per receiver and, for
//! every remote epoch, pairs it with the local epoch of the same
//! integer second (plus both previous epochs for temporal
//! differencing).

use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
    thread,
    time::Duration,
};

use log::debug;

use crate::{error::Error, observation::ProcessedData, pairwise::PairwiseData};

/// Epochs buffered per receiver. Enough to ride out network jitter,
/// small enough that a stale remote never matches ancient local data.
const BUFFER_DEPTH: usize = 5;

#[derive(Default)]
struct Buffers {
    local: VecDeque<ProcessedData>,
    remote: HashMap<String, VecDeque<ProcessedData>>,
}

fn push_bounded(queue: &mut VecDeque<ProcessedData>, data: ProcessedData) {
    if queue.len() == BUFFER_DEPTH {
        queue.pop_front();
    }
    queue.push_back(data);
}

/// Pairs one receiver's local stream with any number of remote
/// streams, epoch by epoch.
pub struct EpochAggregator {
    receiver: String,
    /// How many seconds ahead of the newest local epoch a remote epoch
    /// may run before we stop waiting for the local stream.
    outage_secs: u32,
    buffers: Mutex<Buffers>,
}

impl EpochAggregator {
    pub fn new(receiver: impl Into<String>, outage_secs: u32) -> Self {
        Self {
            receiver: receiver.into(),
            outage_secs,
            buffers: Mutex::new(Buffers::default()),
        }
    }

    pub fn receiver(&self) -> &str {
        &self.receiver
    }

    /// Buffers one local epoch, evicting the oldest when full.
    pub fn push_local(&self, data: ProcessedData) {
        let mut buffers = self.buffers.lock().unwrap_or_else(|e| e.into_inner());
        push_bounded(&mut buffers.local, data);
    }

    /// Matches one remote epoch against the local buffer. Remote data
    /// older than anything buffered locally is dropped; remote data
    /// slightly ahead of the local stream is waited for (millisecond
    /// polls, bounded by the outage window); anything further ahead is
    /// unmatched. The remote epoch is buffered for the next temporal
    /// difference either way.
    pub fn match_remote(&self, remote: ProcessedData) -> Option<PairwiseData> {
        let mut local_match: Option<ProcessedData> = None;
        let mut previous_local: Option<ProcessedData> = None;

        // one poll per millisecond across the whole outage window
        let mut polls_left = u64::from(self.outage_secs) * 1000;
        loop {
            let mut newest_diff = 0;
            {
                let buffers = self.buffers.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(oldest) = buffers.local.front() {
                    if remote.receive_epoch < oldest.receive_epoch {
                        debug!(
                            "{}: dropped stale epoch {} from {}",
                            self.receiver, remote.receive_epoch, remote.id
                        );
                        return None;
                    }
                }
                for datum in &buffers.local {
                    newest_diff = remote.receive_epoch - datum.receive_epoch;
                    if newest_diff == 0 {
                        local_match = Some(datum.clone());
                    } else if newest_diff == 1 {
                        previous_local = Some(datum.clone());
                    }
                }
            }

            let should_wait = newest_diff > 0
                && newest_diff <= i64::from(self.outage_secs)
                && polls_left > 0;
            if !should_wait {
                break;
            }
            polls_left -= 1;
            thread::sleep(Duration::from_millis(1));
        }

        let mut buffers = self.buffers.lock().unwrap_or_else(|e| e.into_inner());
        let queue = buffers.remote.entry(remote.id.clone()).or_default();
        let previous_remote = queue
            .iter()
            .find(|datum| remote.receive_epoch - datum.receive_epoch == 1)
            .cloned();
        push_bounded(queue, remote.clone());
        drop(buffers);

        let local_match = local_match?;
        let epoch = local_match.receive_epoch;
        match PairwiseData::new(epoch, local_match, remote, previous_local, previous_remote) {
            Ok(pairwise) => Some(pairwise),
            Err(error) => {
                debug!("{}: epoch {epoch} unusable: {error}", self.receiver);
                debug_assert_eq!(error, Error::NoCommonSatellites);
                None
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        coordinate::Coordinate,
        ephemeris::EphemerisDatum,
        observation::SatelliteObservation,
        prn::Prn,
    };

    fn epoch_data(id: &str, epoch: i64) -> ProcessedData {
        let mut data = ProcessedData::new(id, epoch, Coordinate::from_ecef(1.0, 2.0, 3.0));
        for number in [4_u8, 8, 16] {
            let prn = Prn::new(number).unwrap();
            data.observations.insert(
                prn,
                SatelliteObservation {
                    ephemeris: EphemerisDatum::new(prn),
                    pseudorange: 2.0E7,
                    carrier_range: 2.0E7 + f64::from(number),
                    doppler_shift: 0.0,
                    signal_strength: 45.0,
                    half_cycle_ambiguity: false,
                    cycle_slip: false,
                },
            );
        }
        data
    }

    #[test]
    fn same_epoch_matches() {
        let aggregator = EpochAggregator::new("local", 5);
        aggregator.push_local(epoch_data("local", 100));

        let pair = aggregator.match_remote(epoch_data("remote", 100)).unwrap();
        assert_eq!(pair.receive_epoch, 100);
        assert!(!pair.has_previous());
    }

    #[test]
    fn consecutive_epochs_carry_previous_data() {
        let aggregator = EpochAggregator::new("local", 5);
        aggregator.push_local(epoch_data("local", 100));
        aggregator.push_local(epoch_data("local", 101));

        assert!(aggregator.match_remote(epoch_data("remote", 100)).is_some());
        let pair = aggregator.match_remote(epoch_data("remote", 101)).unwrap();
        assert!(pair.has_previous());
    }

    #[test]
    fn stale_remote_is_dropped() {
        let aggregator = EpochAggregator::new("local", 5);
        for epoch in 100..105 {
            aggregator.push_local(epoch_data("local", epoch));
        }
        assert!(aggregator.match_remote(epoch_data("remote", 99)).is_none());
    }

    #[test]
    fn buffer_keeps_only_recent_epochs() {
        let aggregator = EpochAggregator::new("local", 5);
        for epoch in 100..107 {
            aggregator.push_local(epoch_data("local", epoch));
        }
        // 100 and 101 were evicted; 102 still matches
        assert!(aggregator.match_remote(epoch_data("remote", 102)).is_some());
    }

    #[test]
    fn far_future_remote_does_not_block() {
        let aggregator = EpochAggregator::new("local", 5);
        aggregator.push_local(epoch_data("local", 100));
        // 100 epochs ahead is beyond the outage window: no wait, no match
        assert!(aggregator.match_remote(epoch_data("remote", 200)).is_none());
    }
}
