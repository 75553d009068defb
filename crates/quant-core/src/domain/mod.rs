//! Domain models consumed by the analytics engines
//!
//! All constructors validate their invariants, so engines can assume
//! well-formed inputs once they hold one of these types.

pub mod fundamentals;
pub mod returns;
pub mod symbol;
pub mod timeseries;

pub use fundamentals::{CashFlowSeries, Fundamentals};
pub use returns::ReturnsMatrix;
pub use symbol::Symbol;
pub use timeseries::{PricePoint, TimeSeries};
