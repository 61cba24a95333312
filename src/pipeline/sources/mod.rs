//! Built-in data sources.

mod frame_sequence;
mod static_source;

pub use frame_sequence::{FrameGenerator, FrameSequenceSource};
pub use static_source::StaticSource;
