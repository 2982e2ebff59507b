//! Per-epoch measurement corrections: satellite orbits and clocks,
//! geometry, cycle-slip screening, receiver clock estimation, and
//! extrapolation onto the shared integer-second grid.

use std::collections::HashMap;

use itertools::Itertools;
use log::debug;

use crate::{
    constants::{
        EARTH_ANGULAR_VEL_RAD_S, EARTH_GRAVITATION_MU_M3_S2, FREQ_L1_HZ, LAMBDA_L1_M,
        MILLIS_IN_DAY, RELATIVISTIC_CLOCK_FACTOR, SPEED_OF_LIGHT_M_S,
    },
    coordinate::Coordinate,
    ephemeris::{EphemerisDatum, KeplerianSet, OrbitalModel},
    error::Error,
    matrix::Matrix,
    observation::ProcessedData,
    prn::Prn,
    time::GpsTime,
};

/// Iteratively solves Kepler's equation `E = M + e·sin(E)`.
fn eccentric_anomaly(mean_anomaly: f64, eccentricity: f64) -> f64 {
    let mut e_anom = mean_anomaly;
    let mut e_old = 0.0;
    let mut iter = 0;
    while (e_anom - e_old).abs() > 1E-15 && iter < 11 {
        e_old = e_anom;
        e_anom = mean_anomaly + eccentricity * e_old.sin();
        iter += 1;
    }
    e_anom
}

/// Mean anomaly at time `tk` seconds past the ephemeris reference.
fn mean_anomaly_at(set: &KeplerianSet, tk: f64) -> f64 {
    let a = set.semi_major_axis;
    set.mean_anomaly + ((EARTH_GRAVITATION_MU_M3_S2 / (a * a * a)).sqrt() + set.delta_n) * tk
}

/// Seconds separating an SBAS transmit time from the daily reference
/// time, folded into one day.
fn sbas_reference_offset(transmit_time_of_day_ms: f64, toe_ms: f64) -> f64 {
    let mut dt = (transmit_time_of_day_ms - toe_ms) * 0.001;
    if dt < 0.0 {
        dt += 86_400.0;
    } else if dt > 86_400.0 {
        dt -= 86_400.0;
    }
    dt
}

/// ECEF satellite position at `transmit_time`, rotated for the signal
/// travel time (Sagnac correction), written into the datum.
pub fn satellite_position(
    receive_time: GpsTime,
    transmit_time: GpsTime,
    ephemeris: &mut EphemerisDatum,
) {
    let travel_time = receive_time.diff_seconds(&transmit_time);

    match &ephemeris.model {
        OrbitalModel::Keplerian(set) => {
            let tk = transmit_time.diff_seconds(&ephemeris.toe);
            let m = mean_anomaly_at(set, tk);
            let e_anom = eccentric_anomaly(m, set.eccentricity);
            let (sin_e, cos_e) = e_anom.sin_cos();

            let mut u = ((1.0 - set.eccentricity * set.eccentricity).sqrt() * sin_e)
                .atan2(cos_e - set.eccentricity)
                + set.arg_perigee;
            let (sin_2u, cos_2u) = (2.0 * u).sin_cos();
            u += set.cus * sin_2u + set.cuc * cos_2u;
            let r = set.semi_major_axis * (1.0 - set.eccentricity * cos_e)
                + set.crs * sin_2u
                + set.crc * cos_2u;
            let i = set.inclination + set.inclination_rate * tk + set.cis * sin_2u + set.cic * cos_2u;
            let node = set.raan + (set.raan_rate - EARTH_ANGULAR_VEL_RAD_S) * tk
                - EARTH_ANGULAR_VEL_RAD_S * (set.toe_ms * 0.001 + travel_time);

            let x = r * u.cos();
            let y = r * u.sin();
            let (sin_node, cos_node) = node.sin_cos();
            let cos_i = i.cos();

            ephemeris.position.set_ecef(
                x * cos_node - y * cos_i * sin_node,
                x * sin_node + y * cos_i * cos_node,
                y * i.sin(),
            );
        },
        OrbitalModel::SbasPolynomial(set) => {
            let transmit_tod =
                (transmit_time.millis % MILLIS_IN_DAY) as f64 + transmit_time.frac_millis;
            let dt = sbas_reference_offset(transmit_tod, set.toe_ms);

            let mut xyz = [0.0_f64; 3];
            for (axis, value) in xyz.iter_mut().enumerate() {
                *value = set.position[axis]
                    + set.velocity[axis] * dt
                    + 0.5 * set.acceleration[axis] * dt * dt;
            }

            // rotate the frame by the Earth spin over the travel time
            let rotation = EARTH_ANGULAR_VEL_RAD_S * travel_time;
            let (sin_rot, cos_rot) = rotation.sin_cos();
            ephemeris.position.set_ecef(
                cos_rot * xyz[0] + sin_rot * xyz[1],
                -sin_rot * xyz[0] + cos_rot * xyz[1],
                xyz[2],
            );
        },
    }

    ephemeris.position_variance = ephemeris.sv_accuracy * ephemeris.sv_accuracy;
}

/// Elevation and azimuth of the satellite as seen from the receiver's
/// standalone position, written into the datum.
pub fn elevation_azimuth(absolute_position: &Coordinate, ephemeris: &mut EphemerisDatum) {
    let p = (absolute_position.x * absolute_position.x
        + absolute_position.y * absolute_position.y)
        .sqrt();
    let radius = (p * p + absolute_position.z * absolute_position.z).sqrt();
    let p_inv = 1.0 / p;
    let r_inv = 1.0 / radius;

    let dx = ephemeris.position.x - absolute_position.x;
    let dy = ephemeris.position.y - absolute_position.y;
    let dz = ephemeris.position.z - absolute_position.z;
    let range = (dx * dx + dy * dy + dz * dz).sqrt();
    let unit = [dx / range, dy / range, dz / range];

    let east = [-absolute_position.y * p_inv, absolute_position.x * p_inv, 0.0];
    let north = [
        -absolute_position.x * absolute_position.z * p_inv * r_inv,
        -absolute_position.y * absolute_position.z * p_inv * r_inv,
        p * r_inv,
    ];
    let up = [
        absolute_position.x * r_inv,
        absolute_position.y * r_inv,
        absolute_position.z * r_inv,
    ];

    let east_component = unit[0] * east[0] + unit[1] * east[1] + unit[2] * east[2];
    let north_component = unit[0] * north[0] + unit[1] * north[1] + unit[2] * north[2];

    ephemeris.elevation = (unit[0] * up[0] + unit[1] * up[1] + unit[2] * up[2])
        .asin()
        .abs();
    ephemeris.azimuth = (east_component / north_component).atan();
    if north_component < 0.0 {
        ephemeris.azimuth += std::f64::consts::PI;
    } else if north_component > 0.0 && east_component < 0.0 {
        ephemeris.azimuth += 2.0 * std::f64::consts::PI;
    }
}

/// Removes the broadcast satellite clock error (polynomial plus
/// relativistic term minus group delay) from every observable, and
/// returns each vehicle's clock-corrected transmit time.
pub fn correct_satellite_clock_biases(
    data: &mut ProcessedData,
    receive_time: GpsTime,
) -> HashMap<Prn, GpsTime> {
    let mut transmit_times = HashMap::new();

    for (prn, obs) in data.observations.iter_mut() {
        let travel_ms = obs.pseudorange * 1000.0 / SPEED_OF_LIGHT_M_S;

        match &obs.ephemeris.model {
            OrbitalModel::Keplerian(set) => {
                // transmit time by the satellite clock
                let est_send_time = GpsTime::from_total_millis(
                    receive_time.millis as f64 + receive_time.frac_millis - travel_ms,
                );
                let tk = est_send_time.diff_seconds(&obs.ephemeris.toe);
                let tc = est_send_time.diff_seconds(&obs.ephemeris.toc);
                let m = mean_anomaly_at(set, tk);
                let e_anom = eccentric_anomaly(m, set.eccentricity);
                let relativistic = RELATIVISTIC_CLOCK_FACTOR
                    * set.eccentricity
                    * set.sqrt_semi_major_axis
                    * e_anom.sin();

                obs.ephemeris.clock_bias = obs.ephemeris.af0
                    + tc * (obs.ephemeris.af1 + tc * obs.ephemeris.af2)
                    + relativistic
                    - obs.ephemeris.tgd;
                let clock_drift = obs.ephemeris.af1 + 2.0 * obs.ephemeris.af2 * tc;

                transmit_times.insert(
                    prn,
                    est_send_time.add_millis(-obs.ephemeris.clock_bias * 1000.0),
                );

                obs.pseudorange += obs.ephemeris.clock_bias * SPEED_OF_LIGHT_M_S;
                obs.carrier_range += obs.ephemeris.clock_bias * SPEED_OF_LIGHT_M_S;
                obs.doppler_shift -= clock_drift * FREQ_L1_HZ;
            },
            OrbitalModel::SbasPolynomial(set) => {
                let receive_tod = (receive_time.millis % MILLIS_IN_DAY) as f64;
                let dt = sbas_reference_offset(receive_tod - travel_ms, set.toe_ms);

                obs.ephemeris.clock_bias = obs.ephemeris.af0 + obs.ephemeris.af1 * dt;
                transmit_times.insert(
                    prn,
                    GpsTime::from_total_millis(
                        receive_time.millis as f64 + receive_time.frac_millis
                            - travel_ms
                            - obs.ephemeris.clock_bias * 1000.0,
                    ),
                );

                obs.pseudorange += obs.ephemeris.clock_bias * SPEED_OF_LIGHT_M_S;
                obs.carrier_range += obs.ephemeris.clock_bias * SPEED_OF_LIGHT_M_S;
                obs.doppler_shift -= obs.ephemeris.af1 * FREQ_L1_HZ;
            },
        }
    }

    transmit_times
}

/// Moves the estimated receiver clock error out of the observables and
/// zeroes the receiver clock state. Differencing cancels the receiver
/// clock anyway, so the tracking pipeline never calls this; it exists
/// for consumers that want clock-free absolute observables.
pub fn correct_receiver_clock_biases(data: &mut ProcessedData) {
    for (_, obs) in data.observations.iter_mut() {
        obs.pseudorange -= data.receiver_clock_bias * SPEED_OF_LIGHT_M_S;
        obs.carrier_range -= data.receiver_clock_bias * SPEED_OF_LIGHT_M_S;
        obs.doppler_shift += data.receiver_clock_drift * FREQ_L1_HZ;
    }
    data.receiver_clock_bias = 0.0;
    data.receiver_clock_drift = 0.0;
}

/// Flags a cycle slip wherever the carrier range moved further from
/// its Doppler-predicted value than five wavelengths, or where no
/// previous-epoch measurement exists to predict from.
pub fn check_cycle_slips(data: &mut ProcessedData, previous: Option<&ProcessedData>) {
    let Some(previous) = previous else {
        for (_, obs) in data.observations.iter_mut() {
            obs.cycle_slip = true;
        }
        return;
    };

    for (prn, obs) in data.observations.iter_mut() {
        let Some(previous_obs) = previous.observations.get(prn) else {
            obs.cycle_slip = true;
            continue;
        };

        let predicted = previous_obs.carrier_range
            + (obs.doppler_shift + previous_obs.doppler_shift) * 0.5 * -LAMBDA_L1_M;
        if (obs.carrier_range - predicted).abs() > 5.0 * LAMBDA_L1_M {
            obs.cycle_slip = true;
        }
    }
}

/// Single-point position and clock solve by iterated least squares on
/// the pseudoranges. Satellites whose first-iteration residual exceeds
/// `max_residual_m` are appended to `ignored` and the solve restarts
/// without them. On success the receiver clock bias in `data` is
/// replaced by the estimate.
pub fn estimate_clock_bias(
    data: &mut ProcessedData,
    ignored: &mut Vec<Prn>,
    absolute_location: &Coordinate,
    max_residual_m: f64,
) -> Result<(), Error> {
    let mut clock_bias;

    'restart: loop {
        // stable row order regardless of map iteration order
        let prns: Vec<Prn> = data
            .observations
            .prns()
            .filter(|prn| !ignored.contains(prn))
            .sorted_unstable()
            .collect();
        let num_valid = prns.len();
        if num_valid < 4 {
            return Err(Error::NotEnoughSatellites);
        }

        let mut position = *absolute_location;
        clock_bias = data.receiver_clock_bias * SPEED_OF_LIGHT_M_S;

        let mut geometry = Matrix::new(num_valid, 4);
        let mut residuals = Matrix::new(num_valid, 1);
        let mut step = Matrix::new(4, 1);
        let mut iterations = 0;

        loop {
            for (index, prn) in prns.iter().enumerate() {
                let obs = data
                    .observations
                    .get(*prn)
                    .ok_or(Error::NotEnoughSatellites)?;
                let dx = obs.ephemeris.position.x - position.x;
                let dy = obs.ephemeris.position.y - position.y;
                let dz = obs.ephemeris.position.z - position.z;
                let estimated_range = (dx * dx + dy * dy + dz * dz).sqrt();

                geometry[(index, 0)] = dx / estimated_range;
                geometry[(index, 1)] = dy / estimated_range;
                geometry[(index, 2)] = dz / estimated_range;
                geometry[(index, 3)] = -1.0;
                residuals[(index, 0)] = estimated_range + clock_bias - obs.pseudorange;
            }

            geometry.least_squares_qr_pivot_into(&mut step, &residuals)?;

            position.x += step[(0, 0)];
            position.y += step[(1, 0)];
            position.z += step[(2, 0)];
            clock_bias += step[(3, 0)];

            // screen for gross outliers once, on the linearization point
            if iterations == 0 {
                let mut found_outlier = false;
                for (index, prn) in prns.iter().enumerate() {
                    if residuals[(index, 0)].abs() > max_residual_m {
                        debug!("{} rejected: {:.1} m pseudorange residual", prn, residuals[(index, 0)]);
                        ignored.push(*prn);
                        found_outlier = true;
                    }
                }
                if found_outlier {
                    continue 'restart;
                }
            }

            let position_step = (step[(0, 0)] * step[(0, 0)]
                + step[(1, 0)] * step[(1, 0)]
                + step[(2, 0)] * step[(2, 0)])
                .sqrt();
            iterations += 1;
            if position_step <= 1E-5 || iterations > 10 {
                break;
            }
        }

        break;
    }

    if (clock_bias - data.receiver_clock_bias * SPEED_OF_LIGHT_M_S).abs() < max_residual_m {
        data.receiver_clock_bias = clock_bias / SPEED_OF_LIGHT_M_S;
        Ok(())
    } else {
        Err(Error::ClockBiasDiverged)
    }
}

/// Slides every observable from the actual receive time onto the
/// nearest integer second using its Doppler rate, then recomputes the
/// satellite positions for the extrapolated geometry.
pub fn extrapolate_to_epoch(
    receive_time: GpsTime,
    transmit_times: &mut HashMap<Prn, GpsTime>,
    data: &mut ProcessedData,
) {
    // subtract in the split representation; a week-scale total_millis()
    // has already lost the sub-millisecond part
    let time_diff = ((data.receive_epoch * 1000 - receive_time.millis) as f64
        - receive_time.frac_millis)
        * 0.001;
    data.receiver_clock_bias += data.receiver_clock_drift * time_diff;

    let epoch_time = GpsTime {
        millis: data.receive_epoch * 1000,
        frac_millis: 0.0,
    };
    let extrapolated_receive = epoch_time.add_millis(data.receiver_clock_bias * 1000.0);

    for (prn, obs) in data.observations.iter_mut() {
        let delta_range_per_second = obs.doppler_shift * -LAMBDA_L1_M;
        let delta_range = delta_range_per_second * time_diff;

        obs.pseudorange += delta_range;
        obs.carrier_range += delta_range;

        let transmit = extrapolated_receive
            .add_millis(-obs.pseudorange * 1000.0 / SPEED_OF_LIGHT_M_S);
        transmit_times.insert(prn, transmit);
        satellite_position(epoch_time, transmit, &mut obs.ephemeris);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ephemeris::SbasSet,
        observation::SatelliteObservation,
    };

    fn gps_ephemeris(prn: Prn, toe: GpsTime) -> EphemerisDatum {
        let mut datum = EphemerisDatum::new(prn);
        datum.toe = toe;
        datum.toc = toe;
        // circular orbit at the GPS semi-major axis
        let a: f64 = 26_560_000.0;
        datum.model = OrbitalModel::Keplerian(KeplerianSet {
            semi_major_axis: a,
            sqrt_semi_major_axis: a.sqrt(),
            eccentricity: 0.0,
            inclination: 0.96,
            mean_anomaly: 0.3,
            toe_ms: toe.millis_of_week(),
            ..Default::default()
        });
        datum
    }

    #[test]
    fn keplerian_position_lands_on_orbit_radius() {
        let toe = GpsTime::from_week_and_millis(2200, 100_000.0);
        let mut datum = gps_ephemeris(Prn::new(3).unwrap(), toe);
        let transmit = toe.add_millis(30_000.0);
        let receive = transmit.add_millis(70.0);

        satellite_position(receive, transmit, &mut datum);
        let radius = datum.position.norm();
        assert!((radius - 26_560_000.0).abs() < 1.0, "radius {radius}");
    }

    #[test]
    fn sbas_position_follows_polynomial() {
        let mut datum = EphemerisDatum::new(Prn::new(35).unwrap());
        datum.model = OrbitalModel::SbasPolynomial(SbasSet {
            position: [4.2E7, 0.0, 0.0],
            velocity: [0.0, 1.0, 0.0],
            acceleration: [0.0, 0.0, 0.0],
            toe_ms: 0.0,
        });

        // transmit 10 s into the day, zero travel time: no rotation
        let transmit = GpsTime::from_total_millis(10_000.0);
        satellite_position(transmit, transmit, &mut datum);
        assert!((datum.position.x - 4.2E7).abs() < 1E-6);
        assert!((datum.position.y - 10.0).abs() < 1E-6);
    }

    #[test]
    fn elevation_of_overhead_satellite() {
        let receiver = Coordinate::from_geodetic(0.0, 0.0, 0.0);
        let mut datum = EphemerisDatum::new(Prn::new(3).unwrap());
        // straight up from the equator on the prime meridian
        datum.position = Coordinate::from_ecef(2.65E7, 0.0, 0.0);
        elevation_azimuth(&receiver, &mut datum);
        assert!((datum.elevation - std::f64::consts::FRAC_PI_2).abs() < 1E-6);
    }

    #[test]
    fn azimuth_of_northern_satellite() {
        let receiver = Coordinate::from_geodetic(0.0, 0.0, 0.0);
        let mut datum = EphemerisDatum::new(Prn::new(3).unwrap());
        // north and slightly up
        datum.position = Coordinate::from_ecef(receiver.x + 1.0E6, 0.0, 2.0E7);
        elevation_azimuth(&receiver, &mut datum);
        assert!(datum.azimuth.abs() < 1E-6, "azimuth {}", datum.azimuth);
    }

    #[test]
    fn cycle_slip_on_unpredicted_jump() {
        let prn = Prn::new(7).unwrap();
        let base = |cr: f64, doppler: f64| SatelliteObservation {
            ephemeris: EphemerisDatum::new(prn),
            pseudorange: cr,
            carrier_range: cr,
            doppler_shift: doppler,
            signal_strength: 45.0,
            half_cycle_ambiguity: false,
            cycle_slip: false,
        };

        let mut previous = ProcessedData::new("rx", 99, Coordinate::default());
        previous.observations.insert(prn, base(1000.0, 0.0));

        // smooth continuation stays clean
        let mut current = ProcessedData::new("rx", 100, Coordinate::default());
        current.observations.insert(prn, base(1000.0, 0.0));
        check_cycle_slips(&mut current, Some(&previous));
        assert!(!current.observations.get(prn).unwrap().cycle_slip);

        // a ten-wavelength jump is a slip
        let mut jumped = ProcessedData::new("rx", 100, Coordinate::default());
        jumped
            .observations
            .insert(prn, base(1000.0 + 10.0 * LAMBDA_L1_M, 0.0));
        check_cycle_slips(&mut jumped, Some(&previous));
        assert!(jumped.observations.get(prn).unwrap().cycle_slip);

        // no history at all flags everything
        let mut fresh = ProcessedData::new("rx", 100, Coordinate::default());
        fresh.observations.insert(prn, base(1000.0, 0.0));
        check_cycle_slips(&mut fresh, None);
        assert!(fresh.observations.get(prn).unwrap().cycle_slip);
    }

    /// Synthetic fix: four satellites at known positions, pseudoranges
    /// built from a known receiver position and clock bias.
    fn synthetic_fix(clock_bias_m: f64, corrupt_prn: Option<u8>) -> (ProcessedData, Coordinate) {
        let truth = Coordinate::from_geodetic(36.0, -86.8, 200.0);
        let sats: [(u8, [f64; 3]); 5] = [
            (2, [2.0E7, 1.0E7, 1.2E7]),
            (5, [-1.5E7, 1.8E7, 1.0E7]),
            (9, [1.0E7, -2.0E7, 1.4E7]),
            (12, [5.0E6, 5.0E6, 2.5E7]),
            (25, [2.2E7, -4.0E6, 9.0E6]),
        ];

        let mut data = ProcessedData::new("rx", 100, truth);
        for (number, position) in sats {
            let prn = Prn::new(number).unwrap();
            let mut ephemeris = EphemerisDatum::new(prn);
            ephemeris.position = Coordinate::from_ecef(position[0], position[1], position[2]);
            let dx = position[0] - truth.x;
            let dy = position[1] - truth.y;
            let dz = position[2] - truth.z;
            let mut pseudorange = (dx * dx + dy * dy + dz * dz).sqrt() + clock_bias_m;
            if corrupt_prn == Some(number) {
                pseudorange += 5_000.0;
            }
            data.observations.insert(
                prn,
                SatelliteObservation {
                    ephemeris,
                    pseudorange,
                    carrier_range: pseudorange,
                    doppler_shift: 0.0,
                    signal_strength: 45.0,
                    half_cycle_ambiguity: false,
                    cycle_slip: false,
                },
            );
        }
        (data, truth)
    }

    #[test]
    fn clock_bias_recovered_from_clean_fix() {
        let (mut data, truth) = synthetic_fix(30.0, None);
        let mut ignored = Vec::new();
        estimate_clock_bias(&mut data, &mut ignored, &truth, 100.0).unwrap();
        assert!(ignored.is_empty());
        let estimated_m = data.receiver_clock_bias * SPEED_OF_LIGHT_M_S;
        assert!((estimated_m - 30.0).abs() < 1E-3, "estimated {estimated_m}");
    }

    #[test]
    fn gross_outlier_is_ignored_and_solve_recovers() {
        let (mut data, truth) = synthetic_fix(30.0, Some(9));
        let mut ignored = Vec::new();
        estimate_clock_bias(&mut data, &mut ignored, &truth, 100.0).unwrap();
        assert_eq!(ignored, vec![Prn::new(9).unwrap()]);
        let estimated_m = data.receiver_clock_bias * SPEED_OF_LIGHT_M_S;
        assert!((estimated_m - 30.0).abs() < 1E-3);
    }

    #[test]
    fn too_few_satellites_refuses() {
        let (mut data, truth) = synthetic_fix(0.0, None);
        let keep: Vec<Prn> = data.observations.prns().take(3).collect();
        data.observations.retain(|prn, _| keep.contains(prn));
        let mut ignored = Vec::new();
        assert_eq!(
            estimate_clock_bias(&mut data, &mut ignored, &truth, 100.0).unwrap_err(),
            Error::NotEnoughSatellites
        );
    }

    #[test]
    fn extrapolation_moves_ranges_by_doppler() {
        let prn = Prn::new(3).unwrap();
        let toe = GpsTime::from_week_and_millis(2200, 100_000.0);
        let receive_time = toe.add_millis(29_600.0);

        let mut data = ProcessedData::new("rx", receive_time.nearest_epoch(), Coordinate::default());
        data.observations.insert(
            prn,
            SatelliteObservation {
                ephemeris: gps_ephemeris(prn, toe),
                pseudorange: 2.0E7,
                carrier_range: 2.0E7,
                doppler_shift: 1000.0,
                signal_strength: 45.0,
                half_cycle_ambiguity: false,
                cycle_slip: false,
            },
        );

        let mut transmit_times = HashMap::new();
        extrapolate_to_epoch(receive_time, &mut transmit_times, &mut data);

        let obs = data.observations.get(prn).unwrap();
        // 0.4 s forward at -1000 Hz · λ ≈ -76.1 m/s
        let expected = 2.0E7 + 0.4 * 1000.0 * -LAMBDA_L1_M;
        assert!((obs.pseudorange - expected).abs() < 1E-6);
        assert!(transmit_times.contains_key(&prn));
    }
}
