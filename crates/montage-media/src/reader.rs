//! The decoder backend boundary.
//!
//! Concrete demuxing/codec work lives behind [`MediaReader`]; the engine
//! only ever drives this trait from a background job and reads the fifos
//! it fills.

use crate::video_fifo::VideoFifo;
use montage_audio::AudioFifo;
use montage_core::{AudioStreamSettings, Image, VideoStreamSettings};

/// Outcome of one producer step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadResult {
    /// Data was pushed into at least one fifo.
    Progressed,
    /// Both fifos lack space; try again once the consumer caught up.
    NoSpace,
    /// The source is exhausted.
    EndOfStream,
}

/// A swappable decoder backend feeding one clip's fifos.
///
/// Positions are expressed in output samples; the reader is responsible for
/// any resampling and format conversion behind this boundary.
pub trait MediaReader: Send {
    /// Open the underlying source. Returns false on failure — the clip
    /// then simply contributes nothing.
    fn open_from_source(&mut self) -> bool;

    /// Whether the source opened successfully.
    fn is_open(&self) -> bool;

    /// One producer step: decode ahead and push into whichever fifo has
    /// space. Called from a background job, never from the audio thread.
    fn read_new_data(&mut self, video: &mut VideoFifo, audio: &AudioFifo) -> ReadResult;

    /// Seek to an absolute output-sample position.
    fn set_position(&mut self, sample: i64);

    /// Change the output sample rate; subsequent positions and lengths are
    /// expressed at this rate.
    fn set_output_sample_rate(&mut self, rate: i64);

    /// Total stream length in output samples.
    fn total_length(&self) -> i64;

    /// Capability queries.
    fn has_video(&self) -> bool;
    fn has_audio(&self) -> bool;
    fn has_subtitle(&self) -> bool {
        false
    }

    /// Video stream format, if the source has video.
    fn video_settings(&self) -> Option<VideoStreamSettings>;

    /// Audio stream format, if the source has audio.
    fn audio_settings(&self) -> Option<AudioStreamSettings>;

    /// Out-of-band still extraction for thumbnails; independent of the
    /// streaming position.
    fn still_image(&mut self, seconds: f64, size: (u32, u32)) -> Option<Image>;
}
