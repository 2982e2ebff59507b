//! GPS time arithmetic.

use crate::constants::{MILLIS_IN_HALF_WEEK, MILLIS_IN_WEEK};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Instant on the GPS time scale: whole milliseconds elapsed since the
/// GPS reference epoch (1980-01-06T00:00:00), plus a sub-millisecond
/// fraction. Kept split so that week-scale magnitudes never erode
/// sub-millisecond precision.
#[derive(Debug, Default, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GpsTime {
    /// Whole milliseconds since the GPS reference epoch
    pub millis: i64,
    /// Fraction of a millisecond, in [0, 1)
    pub frac_millis: f64,
}

impl GpsTime {
    /// Builds a [GpsTime] from a possibly fractional millisecond count.
    pub fn from_total_millis(total_millis: f64) -> Self {
        let millis = total_millis.floor() as i64;
        Self {
            millis,
            frac_millis: total_millis - millis as f64,
        }
    }

    /// Builds a [GpsTime] from a GPS week number and the (fractional)
    /// millisecond of that week.
    pub fn from_week_and_millis(week: u32, millis_of_week: f64) -> Self {
        let whole = millis_of_week as i64;
        Self {
            millis: MILLIS_IN_WEEK * week as i64 + whole,
            frac_millis: millis_of_week - whole as f64,
        }
    }

    /// Total milliseconds since the GPS reference epoch, as f64.
    /// Loses sub-millisecond precision at week-scale magnitudes, only
    /// use where that is acceptable.
    pub fn total_millis(&self) -> f64 {
        self.millis as f64 + self.frac_millis
    }

    /// Returns this instant shifted by (possibly fractional, possibly
    /// negative) `millis`.
    pub fn add_millis(&self, millis: f64) -> Self {
        let mut t = *self;
        t.add_millis_mut(millis);
        t
    }

    /// In-place counterpart of [Self::add_millis].
    pub fn add_millis_mut(&mut self, millis: f64) {
        self.frac_millis += millis;
        let whole = self.frac_millis.floor();
        self.millis += whole as i64;
        self.frac_millis -= whole;
    }

    /// Difference `self - rhs` in seconds, folded into
    /// [-half_week, +half_week] to survive end-of-week crossovers in
    /// broadcast time stamps.
    pub fn diff_seconds(&self, rhs: &Self) -> f64 {
        let mut diff_ms =
            (self.millis - rhs.millis) as f64 + self.frac_millis - rhs.frac_millis;
        if diff_ms > MILLIS_IN_HALF_WEEK {
            diff_ms -= 2.0 * MILLIS_IN_HALF_WEEK;
        } else if diff_ms < -MILLIS_IN_HALF_WEEK {
            diff_ms += 2.0 * MILLIS_IN_HALF_WEEK;
        }
        diff_ms * 0.001
    }

    /// GPS week number and (fractional) millisecond of that week.
    pub fn week_and_millis(&self) -> (u32, f64) {
        let week = self.millis / MILLIS_IN_WEEK;
        (
            week as u32,
            (self.millis - week * MILLIS_IN_WEEK) as f64 + self.frac_millis,
        )
    }

    /// Millisecond of the current GPS week.
    pub fn millis_of_week(&self) -> f64 {
        self.week_and_millis().1
    }

    /// The integer-second epoch nearest to this instant.
    pub fn nearest_epoch(&self) -> i64 {
        (self.total_millis() * 0.001).round() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_self_difference() {
        let t = GpsTime::from_week_and_millis(2100, 123_456.789);
        assert_eq!(t.diff_seconds(&t), 0.0);
    }

    #[test]
    fn sub_millisecond_split() {
        let t = GpsTime::from_total_millis(1234.25);
        assert_eq!(t.millis, 1234);
        assert!((t.frac_millis - 0.25).abs() < 1E-12);

        let t = t.add_millis(0.9);
        assert_eq!(t.millis, 1235);
        assert!((t.frac_millis - 0.15).abs() < 1E-9);

        let t = t.add_millis(-1.15);
        assert_eq!(t.millis, 1234);
        assert!(t.frac_millis.abs() < 1E-9);
    }

    #[test]
    fn week_crossover_wraparound() {
        let end_of_week = GpsTime::from_week_and_millis(2100, 604_799_000.0);
        let start_of_next = GpsTime::from_week_and_millis(2101, 1_000.0);

        // 2 seconds apart, whichever side the subtraction runs
        assert!((start_of_next.diff_seconds(&end_of_week) - 2.0).abs() < 1E-9);
        assert!((end_of_week.diff_seconds(&start_of_next) + 2.0).abs() < 1E-9);

        // a (mis-stamped) full-week offset folds back below half a week
        let late = GpsTime::from_week_and_millis(2101, 604_000_000.0);
        let d = late.diff_seconds(&end_of_week);
        assert!(d.abs() <= 302_400.0);
    }

    #[test]
    fn nearest_epoch_rounds() {
        assert_eq!(GpsTime::from_total_millis(99_600.0).nearest_epoch(), 100);
        assert_eq!(GpsTime::from_total_millis(100_400.0).nearest_epoch(), 100);
    }
}
