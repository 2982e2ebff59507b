#![doc = include_str!("../README.md")]
#![cfg_attr(docrs, feature(doc_cfg))]

// private modules
mod aggregator;
mod cfg;
mod constants;
mod coordinate;
mod ephemeris;
mod error;
mod matrix;
mod observation;
mod pairwise;
mod preprocessor;
mod prn;
mod solutions;
mod time;
mod tracker;

// prelude
pub mod prelude {
    pub use crate::aggregator::EpochAggregator;
    pub use crate::cfg::Config;
    pub use crate::coordinate::Coordinate;
    pub use crate::ephemeris::{
        EphemerisDatum, FrameState, KeplerianSet, OrbitalModel, SbasSet,
    };
    pub use crate::matrix::{Matrix, SymmetricEigen};
    pub use crate::observation::{
        ObservationSet, ProcessedData, RawClockData, RawNavData, RawObservation,
        RawObservations, SatelliteObservation,
    };
    pub use crate::pairwise::{ManipulatedData, PairwiseData};
    pub use crate::preprocessor::{algorithms, Preprocessor};
    pub use crate::prn::Prn;
    pub use crate::solutions::{BaselineResult, Confidence};
    pub use crate::time::GpsTime;
    pub use crate::tracker::{FairMutex, RelativeLocalizer, RelativeTrackingFilter};
}

// pub export
pub use error::Error;

#[cfg(test)]
mod tests;
