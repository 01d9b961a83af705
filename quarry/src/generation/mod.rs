mod events;
mod generator;

pub use events::{Confidence, ConfidenceLevel, StreamEvent, StreamStage};
pub use generator::{Answer, Generator};
