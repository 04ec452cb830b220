//! Montage Audio - Realtime audio buffering
//!
//! Architecture:
//! - `AudioFifo`: position-addressed SPSC fifo between a decode thread and
//!   the audio callback
//! - `SampleBuffer`: planar audio block flowing between fifos and mixers

pub mod buffer;
pub mod fifo;

pub use buffer::SampleBuffer;
pub use fifo::AudioFifo;
