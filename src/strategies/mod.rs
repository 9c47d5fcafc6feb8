pub mod generator;
pub mod signals;

pub use generator::{LossMemory, SignalContext, SignalGenerator};
pub use signals::Signal;
