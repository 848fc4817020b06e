//! # Market
//!
//! $$
//! R_{t,i} = \frac{P_{t,i}}{P_{t-1,i}} - 1
//! $$
//!
//! Assets, investment universes and the returns matrices handed to the allocators.

pub mod asset;
pub mod data;
pub mod source;
pub mod universe;

pub use asset::Asset;
pub use asset::AssetClass;
pub use asset::Cash;
pub use asset::Holding;
pub use data::PriceTable;
pub use data::ReturnKind;
pub use data::ReturnsMatrix;
pub use source::DateRange;
pub use source::MarketDataSource;
pub use source::MarketIndex;
pub use source::PriceColumn;
pub use source::StaticSource;
pub use universe::InvestmentUniverse;
pub use universe::UniverseSettings;
