//! Tracking configuration.

#[cfg(feature = "serde")]
use serde::Deserialize;

fn default_min_signal_strength() -> f64 {
    28.0
}

fn default_min_elevation() -> f64 {
    15.0_f64.to_radians()
}

fn default_outage() -> u32 {
    5
}

fn default_max_clock_bias_residual() -> f64 {
    100.0
}

fn default_max_baseline_length() -> f64 {
    100_000.0
}

fn default_max_baseline_step() -> f64 {
    100.0
}

fn default_max_sv_accuracy() -> f64 {
    5.0
}

/// Solver and preprocessing configuration. [Config::default] matches
/// the field-tested values; loosen them only with care, every one of
/// them protects the filter from feeding on bad measurements.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
pub struct Config {
    /// Carrier-to-noise density below which an observation is
    /// discarded, in dB-Hz.
    #[cfg_attr(feature = "serde", serde(default = "default_min_signal_strength"))]
    pub min_signal_strength: f64,

    /// Elevation mask in radians. Low vehicles suffer most from
    /// multipath and tropospheric delay.
    #[cfg_attr(feature = "serde", serde(default = "default_min_elevation"))]
    pub min_elevation: f64,

    /// Longest tolerated gap between solved epochs, in seconds. A
    /// longer gap abandons the tracked baseline and restarts from the
    /// absolute position difference.
    #[cfg_attr(feature = "serde", serde(default = "default_outage"))]
    pub tracking_outage_secs: u32,

    /// Largest post-fit residual tolerated by the receiver clock bias
    /// estimator before a satellite is dropped as an outlier, meters.
    #[cfg_attr(
        feature = "serde",
        serde(default = "default_max_clock_bias_residual")
    )]
    pub max_clock_bias_residual_m: f64,

    /// Baselines longer than this are considered divergence and reset
    /// the filter, meters.
    #[cfg_attr(feature = "serde", serde(default = "default_max_baseline_length"))]
    pub max_baseline_length_m: f64,

    /// Largest believable single-epoch baseline change, meters.
    #[cfg_attr(feature = "serde", serde(default = "default_max_baseline_step"))]
    pub max_baseline_step_m: f64,

    /// Broadcast user-range-accuracy ceiling; vehicles reporting worse
    /// are not used, meters.
    #[cfg_attr(feature = "serde", serde(default = "default_max_sv_accuracy"))]
    pub max_sv_accuracy: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_signal_strength: default_min_signal_strength(),
            min_elevation: default_min_elevation(),
            tracking_outage_secs: default_outage(),
            max_clock_bias_residual_m: default_max_clock_bias_residual(),
            max_baseline_length_m: default_max_baseline_length(),
            max_baseline_step_m: default_max_baseline_step(),
            max_sv_accuracy: default_max_sv_accuracy(),
        }
    }
}
