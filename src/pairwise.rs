//! Carrier-range differencing across a receiver pair.
//!
//! Single differences cancel the satellite clock, double differences
//! against a reference satellite cancel both receiver clocks, and the
//! temporal difference against the previous epoch additionally cancels
//! the integer ambiguities while no cycle slip intervenes.

use std::collections::BTreeMap;

use itertools::Itertools;

use crate::{
    coordinate::Coordinate,
    error::Error,
    observation::ProcessedData,
    prn::Prn,
};

/// Differenced carrier ranges for one satellite.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ManipulatedData {
    /// Remote minus local carrier range, meters.
    pub single_difference: f64,
    /// Single difference minus the reference satellite's, meters.
    pub double_difference: f64,
    /// This epoch's single difference minus the previous epoch's,
    /// meters. Only meaningful when `temporally_valid` holds.
    pub temporal_double_difference: f64,
    /// The temporal difference spans two epochs with continuous lock
    /// and an unchanged half-cycle situation.
    pub temporally_valid: bool,
    /// Either receiver flagged a cycle slip this epoch.
    pub cycle_slip: bool,
    /// Either receiver (or the reference satellite) may carry a
    /// half-cycle ambiguity.
    pub half_cycle_required: bool,
}

/// Both receivers' processed epochs aligned in time, with every shared
/// satellite differenced. Satellites are kept in PRN order so solver
/// matrix rows are deterministic.
#[derive(Debug, Clone)]
pub struct PairwiseData {
    pub receive_epoch: i64,
    pub local: ProcessedData,
    pub remote: ProcessedData,
    pub previous_local: Option<ProcessedData>,
    pub previous_remote: Option<ProcessedData>,
    /// Local standalone position, the linearization point.
    pub reference_position: Coordinate,
    /// Satellite all double differences are taken against.
    pub reference_satellite: Prn,
    pub manipulated: BTreeMap<Prn, ManipulatedData>,
}

impl PairwiseData {
    /// Differences every satellite seen by both receivers. The
    /// reference satellite is the highest-elevation vehicle free of
    /// half-cycle ambiguity, falling back to the highest overall when
    /// every shared vehicle is ambiguous.
    pub fn new(
        receive_epoch: i64,
        local: ProcessedData,
        remote: ProcessedData,
        previous_local: Option<ProcessedData>,
        previous_remote: Option<ProcessedData>,
    ) -> Result<Self, Error> {
        let has_previous = previous_local.is_some() && previous_remote.is_some();
        let mut manipulated: BTreeMap<Prn, ManipulatedData> = BTreeMap::new();

        let mut highest_elevation = -1.0;
        let mut highest_any_elevation = -1.0;
        let mut reference: Option<Prn> = None;
        let mut reference_any: Option<Prn> = None;

        // PRN order, so an equal-elevation tie always elects the same
        // reference
        for (prn, local_obs) in local
            .observations
            .iter()
            .sorted_unstable_by_key(|(prn, _)| *prn)
        {
            let Some(remote_obs) = remote.observations.get(prn) else {
                continue;
            };

            let mut datum = ManipulatedData {
                half_cycle_required: local_obs.half_cycle_ambiguity
                    || remote_obs.half_cycle_ambiguity,
                cycle_slip: local_obs.cycle_slip || remote_obs.cycle_slip,
                single_difference: remote_obs.carrier_range - local_obs.carrier_range,
                ..Default::default()
            };

            let elevation = local_obs.ephemeris.elevation;
            if !datum.half_cycle_required && elevation > highest_elevation {
                highest_elevation = elevation;
                reference = Some(prn);
            }
            if elevation > highest_any_elevation {
                highest_any_elevation = elevation;
                reference_any = Some(prn);
            }

            if has_previous && !datum.cycle_slip {
                let previous_local_obs = previous_local
                    .as_ref()
                    .and_then(|data| data.observations.get(prn));
                let previous_remote_obs = previous_remote
                    .as_ref()
                    .and_then(|data| data.observations.get(prn));
                if let (Some(prev_local), Some(prev_remote)) =
                    (previous_local_obs, previous_remote_obs)
                {
                    let previous_half_cycle =
                        prev_local.half_cycle_ambiguity || prev_remote.half_cycle_ambiguity;
                    if datum.half_cycle_required == previous_half_cycle {
                        datum.temporally_valid = true;
                        datum.temporal_double_difference = datum.single_difference
                            - prev_remote.carrier_range
                            + prev_local.carrier_range;
                    }
                }
            }

            manipulated.insert(prn, datum);
        }

        let reference_satellite = reference
            .or(reference_any)
            .ok_or(Error::NoCommonSatellites)?;

        // difference everything against the elected reference; the
        // reference differenced with itself is exactly zero
        let reference_datum = manipulated[&reference_satellite].clone();
        for datum in manipulated.values_mut() {
            datum.double_difference =
                datum.single_difference - reference_datum.single_difference;
            datum.half_cycle_required |= reference_datum.half_cycle_required;
        }

        let reference_position = local.absolute_location;
        Ok(Self {
            receive_epoch,
            local,
            remote,
            previous_local,
            previous_remote,
            reference_position,
            reference_satellite,
            manipulated,
        })
    }

    pub fn has_previous(&self) -> bool {
        self.previous_local.is_some() && self.previous_remote.is_some()
    }
}
