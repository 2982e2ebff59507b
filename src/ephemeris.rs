//! Broadcast ephemeris storage.
//!
//! A GPS vehicle broadcasts its orbit over three subframes; the set is
//! usable only when all three belong to the same issue. [FrameState]
//! tracks that progression and refuses out-of-order subframes, so a
//! datum can never go valid from a torn broadcast.

use crate::{coordinate::Coordinate, prn::Prn, time::GpsTime};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Subframe-completion state machine.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FrameState {
    /// No usable subframe yet.
    #[default]
    None,
    /// Subframe 1 received.
    Frame1,
    /// Subframes 1 and 2 received, in order.
    Frame1And2,
    /// All three subframes received, in order.
    Complete,
}

impl FrameState {
    /// Feeds one received subframe number. Subframe 1 always restarts
    /// the collection (a new issue may have begun); 2 and 3 only count
    /// on top of their predecessors; 0 clears everything.
    pub fn advance(&mut self, subframe: u8) {
        *self = match (subframe, *self) {
            (1, _) => FrameState::Frame1,
            (2, FrameState::Frame1) => FrameState::Frame1And2,
            (3, FrameState::Frame1And2) => FrameState::Complete,
            (0, _) => FrameState::None,
            (_, state) => state,
        };
    }

    pub fn is_complete(&self) -> bool {
        *self == FrameState::Complete
    }
}

/// GPS Keplerian broadcast orbit parameters (subframes 2 and 3).
#[derive(Debug, Default, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct KeplerianSet {
    /// Semi-major axis, meters.
    pub semi_major_axis: f64,
    /// Square root of the semi-major axis as broadcast, m^0.5.
    pub sqrt_semi_major_axis: f64,
    /// Orbit eccentricity.
    pub eccentricity: f64,
    /// Inclination at reference time, radians.
    pub inclination: f64,
    /// Inclination rate, rad/s.
    pub inclination_rate: f64,
    /// Argument of perigee, radians.
    pub arg_perigee: f64,
    /// Longitude of ascending node at weekly epoch, radians.
    pub raan: f64,
    /// Rate of right ascension, rad/s.
    pub raan_rate: f64,
    /// Mean anomaly at reference time, radians.
    pub mean_anomaly: f64,
    /// Mean motion correction, rad/s.
    pub delta_n: f64,
    /// Harmonic correction terms (orbit radius, argument of latitude,
    /// inclination), meters / radians.
    pub crc: f64,
    pub crs: f64,
    pub cuc: f64,
    pub cus: f64,
    pub cic: f64,
    pub cis: f64,
    /// Time of ephemeris as millisecond of week.
    pub toe_ms: f64,
}

/// SBAS polynomial state: position, velocity and acceleration valid at
/// a daily reference time.
#[derive(Debug, Default, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SbasSet {
    /// ECEF position at reference time, meters.
    pub position: [f64; 3],
    /// ECEF velocity, m/s.
    pub velocity: [f64; 3],
    /// ECEF acceleration, m/s².
    pub acceleration: [f64; 3],
    /// Reference time as millisecond of day.
    pub toe_ms: f64,
}

/// The broadcast model, by constellation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OrbitalModel {
    Keplerian(KeplerianSet),
    SbasPolynomial(SbasSet),
}

impl Default for OrbitalModel {
    fn default() -> Self {
        Self::Keplerian(KeplerianSet::default())
    }
}

/// One vehicle's broadcast ephemeris plus the per-epoch satellite
/// state computed from it. Owned per PRN; a newly completed broadcast
/// replaces the whole record.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EphemerisDatum {
    pub prn: Prn,
    /// GPS week of the broadcast.
    pub week: u32,
    /// Broadcast user range accuracy, meters.
    pub sv_accuracy: f64,
    /// Broadcast health word; non-zero means unusable.
    pub sv_health: u32,
    /// Issue of data, ephemeris / clock.
    pub iode: u32,
    pub iodc: u32,
    /// Time of ephemeris and time of clock.
    pub toe: GpsTime,
    pub toc: GpsTime,
    /// Clock polynomial: bias (s), drift (s/s), drift rate (s/s²).
    pub af0: f64,
    pub af1: f64,
    pub af2: f64,
    /// Group delay, seconds.
    pub tgd: f64,
    /// Subframe collection progress.
    pub frames: FrameState,
    pub model: OrbitalModel,

    // satellite state refreshed each epoch by the preprocessor
    /// Last computed ECEF position.
    pub position: Coordinate,
    /// Elevation above the receiver horizon, radians.
    pub elevation: f64,
    /// Azimuth from the receiver, radians in [0, 2π).
    pub azimuth: f64,
    /// Satellite clock bias, seconds.
    pub clock_bias: f64,
    /// Variance of the position estimate, m².
    pub position_variance: f64,
}

impl EphemerisDatum {
    pub fn new(prn: Prn) -> Self {
        Self {
            prn,
            week: 0,
            sv_accuracy: 0.0,
            sv_health: 0,
            iode: 0,
            iodc: 0,
            toe: GpsTime::default(),
            toc: GpsTime::default(),
            af0: 0.0,
            af1: 0.0,
            af2: 0.0,
            tgd: 0.0,
            frames: FrameState::default(),
            model: OrbitalModel::default(),
            position: Coordinate::default(),
            // overhead until computed, so an unrefreshed datum never
            // trips the elevation mask
            elevation: 1.0,
            azimuth: 0.0,
            clock_bias: 0.0,
            position_variance: 0.0,
        }
    }

    /// Usable for positioning: complete frame set and healthy vehicle.
    pub fn is_valid(&self) -> bool {
        self.frames.is_complete()
    }

    pub fn is_sbas(&self) -> bool {
        matches!(self.model, OrbitalModel::SbasPolynomial(_))
    }

    pub fn keplerian(&self) -> Option<&KeplerianSet> {
        match &self.model {
            OrbitalModel::Keplerian(set) => Some(set),
            OrbitalModel::SbasPolynomial(_) => None,
        }
    }
}
