pub mod candle_store;
pub mod inducement;
pub mod liquidity;
pub mod narrative;
pub mod poi;
pub mod risk;
pub mod sessions;
pub mod structure;
pub mod swings;
