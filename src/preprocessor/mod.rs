//! Per-receiver measurement preprocessing.
//!
//! One [Preprocessor] per receiver stream. Ephemeris updates and epoch
//! processing mutate shared per-PRN state, so both paths serialize on
//! one non-fair lock; calls for the same receiver never interleave.

pub mod algorithms;

use std::{
    collections::HashMap,
    sync::Mutex,
};

use log::{debug, warn};

use crate::{
    cfg::Config,
    constants::LAMBDA_L1_M,
    coordinate::Coordinate,
    ephemeris::EphemerisDatum,
    observation::{ProcessedData, RawClockData, RawNavData, RawObservations, SatelliteObservation},
    prn::Prn,
};

#[derive(Default)]
struct State {
    ephemerides: HashMap<Prn, EphemerisDatum>,
    previous: Option<ProcessedData>,
    previous_clock_bias: f64,
    previous_epoch: f64,
}

/// Turns one receiver's raw epoch records into [ProcessedData]:
/// filtered observations with satellite clocks removed, positions and
/// geometry computed, the receiver clock estimated, slips flagged, and
/// everything extrapolated onto the integer-second grid.
pub struct Preprocessor {
    cfg: Config,
    receiver: String,
    state: Mutex<State>,
}

impl Preprocessor {
    pub fn new(receiver: impl Into<String>, cfg: Config) -> Self {
        Self {
            cfg,
            receiver: receiver.into(),
            state: Mutex::new(State::default()),
        }
    }

    pub fn receiver(&self) -> &str {
        &self.receiver
    }

    /// Installs a newly completed broadcast for its PRN, replacing any
    /// older one. Incomplete broadcasts are dropped.
    pub fn update_ephemeris(&self, datum: EphemerisDatum) {
        if !datum.is_valid() {
            debug!("{}: dropped incomplete ephemeris for {}", self.receiver, datum.prn);
            return;
        }
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.ephemerides.insert(datum.prn, datum);
    }

    /// Processes one epoch. Returns None when the receiver has no
    /// standalone fix yet; everything else degrades gracefully by
    /// dropping satellites.
    pub fn process(
        &self,
        raw: &RawObservations,
        clock: &RawClockData,
        nav: &RawNavData,
    ) -> Option<ProcessedData> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        self.process_locked(&mut state, raw, clock, nav)
    }

    fn process_locked(
        &self,
        state: &mut State,
        raw: &RawObservations,
        clock: &RawClockData,
        nav: &RawNavData,
    ) -> Option<ProcessedData> {
        // the receiver must have settled on a standalone solution
        if nav.position.x == 0.0 || nav.position.y == 0.0 || nav.position.z == 0.0 {
            debug!("{}: no standalone fix yet, epoch skipped", self.receiver);
            return None;
        }

        let receive_time = raw.receive_time;
        let epoch = (receive_time.millis as f64 * 0.001).round() as i64;
        let mut data = ProcessedData::new(
            self.receiver.clone(),
            epoch,
            Coordinate::from_ecef(nav.position.x, nav.position.y, nav.position.z),
        );
        data.receiver_clock_bias = (receive_time.total_millis()
            - nav.receive_time.total_millis())
            * 0.001;
        data.receiver_clock_drift = clock.clock_drift;
        data.pdop = nav.pdop;
        data.position_accuracy = nav.position_accuracy;
        let time_diff = data.receive_epoch as f64 - state.previous_epoch;

        // keep only healthy, accurate, well-received channels with a
        // complete ephemeris
        for observation in &raw.observations {
            let Some(ephemeris) = state.ephemerides.get(&observation.prn) else {
                continue;
            };
            if ephemeris.sv_health > 0
                || !ephemeris.is_valid()
                || ephemeris.sv_accuracy >= self.cfg.max_sv_accuracy
                || observation.signal_strength < self.cfg.min_signal_strength
            {
                continue;
            }

            data.observations.insert(
                observation.prn,
                SatelliteObservation {
                    ephemeris: ephemeris.clone(),
                    pseudorange: observation.pseudorange,
                    carrier_range: observation.carrier_phase * LAMBDA_L1_M,
                    doppler_shift: observation.doppler_shift,
                    signal_strength: observation.signal_strength,
                    half_cycle_ambiguity: observation.loss_of_lock & 0x02 > 0,
                    cycle_slip: false,
                },
            );
        }

        // satellite clocks out, then geometry at the transmit times
        let mut transmit_times = algorithms::correct_satellite_clock_biases(&mut data, receive_time);
        {
            let absolute = data.absolute_location;
            let min_elevation = self.cfg.min_elevation;
            data.observations.retain(|prn, obs| {
                let transmit = transmit_times[prn];
                algorithms::satellite_position(receive_time, transmit, &mut obs.ephemeris);
                algorithms::elevation_azimuth(&absolute, &mut obs.ephemeris);
                if obs.ephemeris.elevation < min_elevation {
                    debug!(
                        "{prn} below the elevation mask ({:.1}°)",
                        obs.ephemeris.elevation.to_degrees()
                    );
                    return false;
                }
                true
            });
        }

        // refine the receiver clock bias: each new estimate shifts the
        // assumed receive time, which moves the satellites, which in
        // turn perturbs the estimate, so iterate to a fixed point
        let mut corrected_receive = receive_time;
        let mut clock_bias_est = 0.0;
        let mut ignored = Vec::new();
        let mut passes = 0;
        while (data.receiver_clock_bias - clock_bias_est).abs() > 1E-12 && passes < 10 {
            corrected_receive = receive_time.add_millis(-data.receiver_clock_bias * 1000.0);
            clock_bias_est = data.receiver_clock_bias;
            let prns: Vec<Prn> = data.observations.prns().collect();
            for prn in prns {
                if let (Some(obs), Some(transmit)) =
                    (data.observations.get_mut(prn), transmit_times.get(&prn))
                {
                    algorithms::satellite_position(corrected_receive, *transmit, &mut obs.ephemeris);
                }
            }

            ignored.clear();
            let absolute = data.absolute_location;
            if let Err(error) = algorithms::estimate_clock_bias(
                &mut data,
                &mut ignored,
                &absolute,
                self.cfg.max_clock_bias_residual_m,
            ) {
                // fall back to the previous bias propagated by drift,
                // unless there is no trustworthy history
                warn!("{}: clock bias estimation failed: {error}", self.receiver);
                let history_usable = state.previous_clock_bias.abs() >= 1E-9
                    && (state.previous_clock_bias - clock_bias_est).abs() <= 1E-6;
                if history_usable {
                    data.receiver_clock_bias =
                        state.previous_clock_bias + time_diff * data.receiver_clock_drift;
                }
                corrected_receive = receive_time.add_millis(-data.receiver_clock_bias * 1000.0);
                break;
            }

            for prn in &ignored {
                data.observations.remove(*prn);
            }
            passes += 1;
        }
        state.previous_clock_bias = data.receiver_clock_bias;
        state.previous_epoch = data.receive_epoch as f64;

        algorithms::check_cycle_slips(&mut data, state.previous.as_ref());
        algorithms::extrapolate_to_epoch(corrected_receive, &mut transmit_times, &mut data);

        state.previous = Some(data.clone());
        Some(data)
    }
}
