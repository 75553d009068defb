//! Market data providers

pub mod memory;
pub mod provider;

pub use memory::{InMemoryProvider, MarketFixture};
pub use provider::MarketDataProvider;
