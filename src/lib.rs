pub mod config;
pub mod core;
pub mod driver;
pub mod engine;
pub mod models;
pub mod observer;
pub mod strategies;
#[cfg(test)]
pub mod test_helpers;
