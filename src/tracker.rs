//! Recursive baseline tracking.
//!
//! The filter integrates one baseline *change* per epoch, solved from
//! temporal double differences by weighted least squares, on top of a
//! constant-acceleration extrapolation model. One filter instance per
//! remote receiver, serialized under a fair lock: a solve can outlast
//! an epoch, and epochs applied out of order would corrupt the
//! integrated state.

use std::{
    collections::HashMap,
    ops::{Deref, DerefMut},
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
};

use log::{debug, info, warn};

use crate::{
    cfg::Config,
    constants::{LAMBDA_L1_M, SPEED_OF_LIGHT_M_S},
    coordinate::Coordinate,
    error::Error,
    pairwise::PairwiseData,
    prn::Prn,
    solutions::{BaselineResult, Confidence},
};

/// Divisor mapping dB-Hz above the tracking floor onto [0, 1].
const SNR_NORMALIZATION: f64 = 44.0;

#[derive(Default)]
struct Tickets {
    next: u64,
    serving: u64,
}

/// Mutex granting the lock in strict request order. The standard
/// library mutex makes no fairness promise, and an unfair lock here
/// would let a fast epoch overtake a slow one into the filter.
pub struct FairMutex<T> {
    tickets: Mutex<Tickets>,
    turn: Condvar,
    data: Mutex<T>,
}

impl<T> FairMutex<T> {
    pub fn new(value: T) -> Self {
        Self {
            tickets: Mutex::new(Tickets::default()),
            turn: Condvar::new(),
            data: Mutex::new(value),
        }
    }

    /// Blocks until every earlier requester has held and released the
    /// lock.
    pub fn lock(&self) -> FairGuard<'_, T> {
        let mut tickets = self.tickets.lock().unwrap_or_else(PoisonError::into_inner);
        let ticket = tickets.next;
        tickets.next += 1;
        while tickets.serving != ticket {
            tickets = self
                .turn
                .wait(tickets)
                .unwrap_or_else(PoisonError::into_inner);
        }
        drop(tickets);

        FairGuard {
            owner: self,
            guard: self.data.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }
}

pub struct FairGuard<'a, T> {
    owner: &'a FairMutex<T>,
    guard: MutexGuard<'a, T>,
}

impl<T> Deref for FairGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for FairGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for FairGuard<'_, T> {
    fn drop(&mut self) {
        let mut tickets = self
            .owner
            .tickets
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        tickets.serving += 1;
        self.owner.turn.notify_all();
    }
}

/// Tracks the baseline to one remote receiver across epochs.
pub struct RelativeTrackingFilter {
    cfg: Config,
    baseline: Coordinate,
    velocity: Coordinate,
    acceleration: Coordinate,
    previous_epoch: i64,
}

impl RelativeTrackingFilter {
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            baseline: Coordinate::default(),
            velocity: Coordinate::default(),
            acceleration: Coordinate::default(),
            previous_epoch: 0,
        }
    }

    /// Replaces the tracked baseline, e.g. with an externally computed
    /// estimate, without touching the dynamics.
    pub fn update_baseline(&mut self, baseline: &Coordinate) {
        self.baseline.set_ecef(baseline.x, baseline.y, baseline.z);
    }

    /// Advances the filter by one pairwise epoch and returns the new
    /// baseline with its confidence grade.
    pub fn track(
        &mut self,
        observation: &PairwiseData,
        ignored: &mut Vec<Prn>,
    ) -> (Coordinate, Confidence) {
        let gap = observation.receive_epoch - self.previous_epoch;
        let mut confidence = Confidence::Bad;

        if gap == 1 {
            // standard update: integrate one solved baseline change
            ignored.clear();
            match self.solve_temporal_dd(observation, ignored) {
                Ok(drift_estimated) => {
                    confidence = if drift_estimated {
                        Confidence::Good
                    } else {
                        Confidence::Fair
                    };
                },
                Err(error) => {
                    debug!("epoch {}: solve failed ({error}), coasting", observation.receive_epoch);
                    self.velocity.x += self.acceleration.x;
                    self.velocity.y += self.acceleration.y;
                    self.velocity.z += self.acceleration.z;
                    confidence = Confidence::Extrapolated(1);
                },
            }
            self.baseline.x += self.velocity.x;
            self.baseline.y += self.velocity.y;
            self.baseline.z += self.velocity.z;
        } else if gap > i64::from(self.cfg.tracking_outage_secs) {
            // all locks lost for too long: restart from the standalone
            // position difference
            info!(
                "epoch {}: outage of {gap} s, reacquiring from absolute positions",
                observation.receive_epoch
            );
            self.baseline.set_ecef(
                observation.remote.absolute_location.x - observation.local.absolute_location.x,
                observation.remote.absolute_location.y - observation.local.absolute_location.y,
                observation.remote.absolute_location.z - observation.local.absolute_location.z,
            );
            self.velocity.set_ecef(0.0, 0.0, 0.0);
            self.acceleration.set_ecef(0.0, 0.0, 0.0);
        } else {
            // short gap: coast the dynamics through the missing epochs
            let mut coasted = 0;
            while observation.receive_epoch > self.previous_epoch {
                self.velocity.x += self.acceleration.x;
                self.velocity.y += self.acceleration.y;
                self.velocity.z += self.acceleration.z;
                self.baseline.x += self.velocity.x;
                self.baseline.y += self.velocity.y;
                self.baseline.z += self.velocity.z;
                self.previous_epoch += 1;
                coasted += 1;
            }
            confidence = Confidence::Extrapolated(coasted);
        }

        // a baseline beyond the working range means the filter has
        // diverged; forget the track entirely
        if self.baseline.norm() <= self.cfg.max_baseline_length_m {
            self.previous_epoch = observation.receive_epoch;
        } else {
            warn!(
                "epoch {}: baseline {:.0} m exceeds the working range, track abandoned",
                observation.receive_epoch,
                self.baseline.norm()
            );
            self.previous_epoch = 0;
            confidence = Confidence::Bad;
        }

        (self.baseline, confidence)
    }

    /// Solves the epoch-to-epoch baseline change from the temporal
    /// double differences. Returns whether the clock-drift single
    /// difference was estimated alongside (five or more satellites).
    fn solve_temporal_dd(
        &mut self,
        observation: &PairwiseData,
        ignored: &mut Vec<Prn>,
    ) -> Result<bool, Error> {
        let (Some(previous_local), Some(previous_remote)) =
            (&observation.previous_local, &observation.previous_remote)
        else {
            return Err(Error::NotEnoughSatellites);
        };

        let mut num_valid = observation
            .manipulated
            .values()
            .filter(|datum| datum.temporally_valid)
            .count();

        let reference = &observation.reference_position;
        let calc_clock_drift_sd = (observation.remote.receiver_clock_drift
            - observation.local.receiver_clock_drift)
            * SPEED_OF_LIGHT_M_S;

        let mut delta = Coordinate::default();
        let mut estimate_drift;
        let mut current_drift_error = 0.0;
        let mut previous_drift_error = f64::MAX;
        let mut last_ignored: Option<Prn> = None;
        let mut last_almost_ignored: Option<Prn> = None;

        // distance helper against the linearization point
        let range_from = |x: f64, y: f64, z: f64, offset: &Coordinate| {
            let dx = x - reference.x - offset.x;
            let dy = y - reference.y - offset.y;
            let dz = z - reference.z - offset.z;
            (dx * dx + dy * dy + dz * dz).sqrt()
        };
        let zero = Coordinate::default();

        // predicted temporal double difference for one satellite given
        // the current baseline-change estimate
        let predict_tdd = |prn: Prn, delta: &Coordinate, drift_sd: f64| -> Option<f64> {
            let local = observation.local.observations.get(prn)?;
            let remote = observation.remote.observations.get(prn)?;
            let prev_local = previous_local.observations.get(prn)?;
            let prev_remote = previous_remote.observations.get(prn)?;

            let moved = Coordinate::from_ecef(
                self.baseline.x + delta.x,
                self.baseline.y + delta.y,
                self.baseline.z + delta.z,
            );
            let est = range_from(
                remote.ephemeris.position.x,
                remote.ephemeris.position.y,
                remote.ephemeris.position.z,
                &moved,
            ) - range_from(
                local.ephemeris.position.x,
                local.ephemeris.position.y,
                local.ephemeris.position.z,
                &zero,
            ) - range_from(
                prev_remote.ephemeris.position.x,
                prev_remote.ephemeris.position.y,
                prev_remote.ephemeris.position.z,
                &self.baseline,
            ) + range_from(
                prev_local.ephemeris.position.x,
                prev_local.ephemeris.position.y,
                prev_local.ephemeris.position.z,
                &zero,
            ) + drift_sd;
            Some(est)
        };

        loop {
            if num_valid < 4 {
                return Err(Error::NotEnoughSatellites);
            }
            estimate_drift = num_valid > 4;
            let columns = if estimate_drift { 4 } else { 3 };

            delta.set_ecef(0.0, 0.0, 0.0);
            let mut est_clock_drift_sd = calc_clock_drift_sd;
            let mut geometry = crate::matrix::Matrix::new(num_valid, columns);
            let mut residuals = crate::matrix::Matrix::new(num_valid, 1);
            let mut step = crate::matrix::Matrix::new(columns, 1);
            let mut iterations = 0;

            loop {
                let mut index = 0;
                for (prn, datum) in &observation.manipulated {
                    if !datum.temporally_valid || ignored.contains(prn) {
                        continue;
                    }
                    let (Some(local), Some(remote)) = (
                        observation.local.observations.get(*prn),
                        observation.remote.observations.get(*prn),
                    ) else {
                        continue;
                    };

                    let weight = (local.signal_strength - self.cfg.min_signal_strength)
                        / SNR_NORMALIZATION
                        + (remote.signal_strength - self.cfg.min_signal_strength)
                            / SNR_NORMALIZATION;

                    let moved = Coordinate::from_ecef(
                        self.baseline.x + delta.x,
                        self.baseline.y + delta.y,
                        self.baseline.z + delta.z,
                    );
                    let est_range = range_from(
                        remote.ephemeris.position.x,
                        remote.ephemeris.position.y,
                        remote.ephemeris.position.z,
                        &moved,
                    );
                    let est_tdd = predict_tdd(*prn, &delta, est_clock_drift_sd)
                        .ok_or(Error::NotEnoughSatellites)?;

                    geometry[(index, 0)] = (remote.ephemeris.position.x
                        - reference.x
                        - moved.x)
                        / est_range
                        * weight;
                    geometry[(index, 1)] = (remote.ephemeris.position.y
                        - reference.y
                        - moved.y)
                        / est_range
                        * weight;
                    geometry[(index, 2)] = (remote.ephemeris.position.z
                        - reference.z
                        - moved.z)
                        / est_range
                        * weight;
                    if estimate_drift {
                        geometry[(index, 3)] = -weight;
                    }
                    residuals[(index, 0)] =
                        (est_tdd - datum.temporal_double_difference) * weight;
                    index += 1;
                }

                geometry.least_squares_qr_pivot_into(&mut step, &residuals)?;

                // the drift step on the linearization point exposes a
                // contaminated measurement set
                if iterations == 0 {
                    current_drift_error = if estimate_drift {
                        step[(3, 0)].abs()
                    } else {
                        f64::MIN
                    };
                }

                delta.x += step[(0, 0)];
                delta.y += step[(1, 0)];
                delta.z += step[(2, 0)];
                if estimate_drift {
                    est_clock_drift_sd += step[(3, 0)];
                }

                let step_norm = (step[(0, 0)] * step[(0, 0)]
                    + step[(1, 0)] * step[(1, 0)]
                    + step[(2, 0)] * step[(2, 0)])
                    .sqrt();
                iterations += 1;
                if step_norm <= 0.001 || iterations > 10 {
                    break;
                }
            }

            // unweighted residuals of the converged solution
            let mut max_residual = f64::MIN;
            let mut second_max_residual = f64::MIN;
            let mut worst: Option<Prn> = None;
            let mut second_worst: Option<Prn> = None;
            for (prn, datum) in &observation.manipulated {
                if !datum.temporally_valid || ignored.contains(prn) {
                    continue;
                }
                let Some(est_tdd) = predict_tdd(*prn, &delta, est_clock_drift_sd) else {
                    continue;
                };
                let residual = (est_tdd - datum.temporal_double_difference).abs();
                if residual > max_residual {
                    second_max_residual = max_residual;
                    second_worst = worst;
                    max_residual = residual;
                    worst = Some(*prn);
                } else if residual > second_max_residual {
                    second_max_residual = residual;
                    second_worst = Some(*prn);
                }
            }

            if !estimate_drift && max_residual < LAMBDA_L1_M * 0.5 {
                break;
            } else if max_residual < LAMBDA_L1_M * 0.2 && current_drift_error < 1.5 {
                break;
            } else if current_drift_error > previous_drift_error {
                // ignoring the last satellite made matters worse: put
                // it back and ignore the runner-up from that pass
                if let Some(reinstated) = last_ignored {
                    ignored.retain(|prn| *prn != reinstated);
                }
                if let Some(suspect) = last_almost_ignored {
                    debug!("swapping ignored satellite for {suspect}");
                    ignored.push(suspect);
                }
                last_ignored = last_almost_ignored;
                last_almost_ignored = worst;
                previous_drift_error = current_drift_error;
            } else {
                let Some(worst) = worst else {
                    return Err(Error::NotEnoughSatellites);
                };
                debug!("{worst} ignored: {max_residual:.3} m temporal residual");
                ignored.push(worst);
                last_ignored = Some(worst);
                last_almost_ignored = second_worst;
                previous_drift_error = current_drift_error;
                num_valid -= 1;
            }
        }

        // an implausible single-epoch jump means the solution latched
        // onto a wrong minimum
        let delta_norm = (delta.x * delta.x + delta.y * delta.y + delta.z * delta.z).sqrt();
        if delta_norm > self.cfg.max_baseline_step_m {
            return Err(Error::ClockBiasDiverged);
        }

        self.acceleration.set_ecef(
            delta.x - self.velocity.x,
            delta.y - self.velocity.y,
            delta.z - self.velocity.z,
        );
        self.velocity.set_ecef(delta.x, delta.y, delta.z);

        Ok(estimate_drift)
    }
}

/// Routes pairwise epochs to per-peer tracking filters and publishes
/// their solutions.
pub struct RelativeLocalizer {
    cfg: Config,
    filters: Mutex<HashMap<String, Arc<FairMutex<RelativeTrackingFilter>>>>,
}

impl RelativeLocalizer {
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            filters: Mutex::new(HashMap::new()),
        }
    }

    /// Runs the remote receiver's filter over one pairwise epoch.
    pub fn localize(&self, observation: &PairwiseData) -> BaselineResult {
        let filter = {
            let mut filters = self.filters.lock().unwrap_or_else(|e| e.into_inner());
            filters
                .entry(observation.remote.id.clone())
                .or_insert_with(|| {
                    Arc::new(FairMutex::new(RelativeTrackingFilter::new(self.cfg.clone())))
                })
                .clone()
        };

        let mut ignored = Vec::new();
        let mut guard = filter.lock();
        let (baseline, confidence) = guard.track(observation, &mut ignored);

        BaselineResult {
            peer: observation.remote.id.clone(),
            epoch: observation.receive_epoch,
            baseline,
            confidence,
        }
    }
}
