//! Procedural media source: color bars plus a sine tone.
//!
//! Serves as the in-tree backend for tests and offline runs, standing in
//! where a demuxing backend would plug into [`MediaReader`]. Frames carry
//! correct stream timecodes and the audio path honors fifo backpressure,
//! so scheduling behaves exactly as with a real decoder.

use crate::reader::{MediaReader, ReadResult};
use crate::video_fifo::VideoFifo;
use montage_audio::{AudioFifo, SampleBuffer};
use montage_core::{AudioStreamSettings, Image, VideoStreamSettings};
use std::sync::Arc;
use tracing::debug;

/// Samples produced per audio push.
const AUDIO_CHUNK: usize = 512;
/// Upper bound of pushes per producer step, so one step stays a short
/// cooperative time slice.
const MAX_CHUNKS_PER_STEP: usize = 4;
const MAX_FRAMES_PER_STEP: usize = 2;

/// A generated source of known content and length.
pub struct SyntheticReader {
    duration_seconds: f64,
    video: Option<VideoStreamSettings>,
    audio: Option<AudioStreamSettings>,
    tone_hz: f64,
    sample_rate: i64,
    open: bool,
    pattern: Option<Arc<Image>>,
    next_frame: i64,
    next_sample: i64,
}

impl SyntheticReader {
    /// A source with both default streams.
    pub fn new(duration_seconds: f64) -> Self {
        Self {
            duration_seconds,
            video: Some(VideoStreamSettings::default()),
            audio: Some(AudioStreamSettings::default()),
            tone_hz: 440.0,
            sample_rate: AudioStreamSettings::default().timebase,
            open: false,
            pattern: None,
            next_frame: 0,
            next_sample: 0,
        }
    }

    /// A source carrying only audio.
    pub fn audio_only(duration_seconds: f64) -> Self {
        Self {
            video: None,
            ..Self::new(duration_seconds)
        }
    }

    /// A source carrying only video.
    pub fn video_only(duration_seconds: f64) -> Self {
        Self {
            audio: None,
            ..Self::new(duration_seconds)
        }
    }

    /// Override the video stream format.
    pub fn with_video_settings(mut self, settings: VideoStreamSettings) -> Self {
        self.video = Some(settings);
        self
    }

    /// Override the tone frequency.
    pub fn with_tone_hz(mut self, hz: f64) -> Self {
        self.tone_hz = hz;
        self
    }

    fn frame_count(&self) -> i64 {
        match self.video {
            Some(v) => (self.duration_seconds * v.frames_per_second()).round() as i64,
            None => 0,
        }
    }

    fn fill_tone(&self, buffer: &mut SampleBuffer, start_sample: i64) {
        let rate = self.sample_rate as f64;
        for i in 0..buffer.num_samples() {
            let t = (start_sample + i as i64) as f64 / rate;
            let s = (t * self.tone_hz * std::f64::consts::TAU).sin() as f32 * 0.5;
            for ch in 0..buffer.num_channels() {
                buffer.channel_mut(ch)[i] = s;
            }
        }
    }
}

impl MediaReader for SyntheticReader {
    fn open_from_source(&mut self) -> bool {
        if let Some(v) = self.video {
            self.pattern = Some(Arc::new(Image::test_pattern(v.width, v.height)));
        }
        self.open = true;
        debug!(
            duration = self.duration_seconds,
            has_video = self.video.is_some(),
            has_audio = self.audio.is_some(),
            "opened synthetic source"
        );
        true
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn read_new_data(&mut self, video: &mut VideoFifo, audio: &AudioFifo) -> ReadResult {
        if !self.open {
            return ReadResult::EndOfStream;
        }

        let total_samples = self.total_length();
        let frame_count = self.frame_count();
        let mut progressed = false;

        if let Some(settings) = self.audio {
            let mut pushes = 0;
            while pushes < MAX_CHUNKS_PER_STEP && self.next_sample < total_samples {
                let remaining = (total_samples - self.next_sample) as usize;
                let count = AUDIO_CHUNK.min(remaining);
                if audio.free_space() < count {
                    break;
                }
                let mut block = SampleBuffer::new(settings.num_channels, count);
                self.fill_tone(&mut block, self.next_sample);
                audio.push_samples(&block);
                self.next_sample += count as i64;
                pushes += 1;
                progressed = true;
            }
        }

        if let Some(settings) = self.video {
            let pattern = self.pattern.clone().unwrap_or_else(|| {
                Arc::new(Image::test_pattern(settings.width, settings.height))
            });
            let mut pushes = 0;
            while pushes < MAX_FRAMES_PER_STEP
                && self.next_frame < frame_count
                && video.has_free_slot()
            {
                let slot = video.writing_frame();
                slot.image = Arc::clone(&pattern);
                slot.timecode = settings.tick_for_frame(self.next_frame);
                video.finish_writing();
                self.next_frame += 1;
                progressed = true;
            }
        }

        if progressed {
            return ReadResult::Progressed;
        }

        let audio_done = self.audio.is_none() || self.next_sample >= total_samples;
        let video_done = self.video.is_none() || self.next_frame >= frame_count;
        if audio_done && video_done {
            ReadResult::EndOfStream
        } else {
            ReadResult::NoSpace
        }
    }

    fn set_position(&mut self, sample: i64) {
        let sample = sample.clamp(0, self.total_length());
        self.next_sample = sample;
        if let Some(v) = self.video {
            let seconds = sample as f64 / self.sample_rate as f64;
            self.next_frame = v.frame_index_for_tick(v.tick_for_seconds(seconds));
        }
        debug!(sample, "synthetic source repositioned");
    }

    fn set_output_sample_rate(&mut self, rate: i64) {
        self.sample_rate = rate;
        if let Some(a) = &mut self.audio {
            a.timebase = rate;
        }
    }

    fn total_length(&self) -> i64 {
        (self.duration_seconds * self.sample_rate as f64).round() as i64
    }

    fn has_video(&self) -> bool {
        self.video.is_some()
    }

    fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    fn video_settings(&self) -> Option<VideoStreamSettings> {
        self.video
    }

    fn audio_settings(&self) -> Option<AudioStreamSettings> {
        self.audio
    }

    fn still_image(&mut self, _seconds: f64, size: (u32, u32)) -> Option<Image> {
        if self.video.is_none() {
            return None;
        }
        Some(Image::test_pattern(size.0, size.1))
    }
}
