//! Domain types for marketwatch

pub mod instrument;
pub mod interval;
pub mod observation;
pub mod range;

pub use instrument::{AssetCategory, Instrument, InstrumentId};
pub use interval::{Interval, IntervalError};
pub use observation::{Candle, Observation, ObservationFields};
pub use range::MissingRange;

/// Symbol type alias
pub type Symbol = String;
