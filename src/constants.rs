//! Physical constants shared across the crate.

/// Speed of light in m.s⁻¹
pub const SPEED_OF_LIGHT_M_S: f64 = 299_792_458.0;

/// GPS L1 carrier frequency (Hz)
pub const FREQ_L1_HZ: f64 = 1.57542E9;

/// GPS L1 carrier wavelength (meters)
pub const LAMBDA_L1_M: f64 = 0.19029367279836488;

/// Relativistic clock correction factor F = -2 sqrt(mu) / c² (s / sqrt(m))
pub const RELATIVISTIC_CLOCK_FACTOR: f64 = -4.442807633E-10;

/// Earth gravitational constant (m³ s⁻²)
pub const EARTH_GRAVITATION_MU_M3_S2: f64 = 3.986005E14;

/// Earth angular velocity, in WGS84 frame (rad/s)
pub const EARTH_ANGULAR_VEL_RAD_S: f64 = 7.2921151467E-5;

/// WGS84 Earth Frame Ellipsoid semi-major axis (meters)
pub const EARTH_SEMI_MAJOR_AXIS_WGS84: f64 = 6_378_137.0_f64;

/// WGS84 first eccentricity squared
pub const EARTH_ECCENTRICITY_SQ: f64 = 0.006694379990141317;

/// Milliseconds in half a GPS week, for end-of-week crossovers
pub const MILLIS_IN_HALF_WEEK: f64 = 302_400_000.0;

/// Milliseconds in a full GPS week
pub const MILLIS_IN_WEEK: i64 = 604_800_000;

/// Milliseconds in one day, for SBAS time-of-day arithmetic
pub const MILLIS_IN_DAY: i64 = 86_400_000;
