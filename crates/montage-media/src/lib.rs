//! Montage Media - The decoder boundary and video frame buffering
//!
//! - `VideoFifo`: slot ring of decoded frames, searched by timecode
//! - `MediaReader`: the swappable decoder backend trait
//! - `SyntheticReader`: generated source for tests and offline use

pub mod reader;
pub mod synthetic;
pub mod video_fifo;

pub use reader::{MediaReader, ReadResult};
pub use synthetic::SyntheticReader;
pub use video_fifo::VideoFifo;
