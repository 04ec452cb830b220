//! Placement of one source clip on a composed timeline.

use crate::controllers::{AudioProcessorController, ClipParameterController, VideoProcessorController};
use crate::processors::{AudioClipProcessor, VideoClipProcessor};
use crate::source::TimelineSource;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Placement of a clip in timeline seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Placement {
    /// Timeline time the clip starts at.
    start: f64,
    /// How long the clip plays.
    length: f64,
    /// Offset into the source at which playback begins.
    offset: f64,
}

/// One clip placed on the timeline: where it sits, how it sounds and looks,
/// and the automation driving both.
///
/// Placement is kept in seconds and mirrored into sample counts whenever the
/// seconds or the sample rate change; the audio thread reads only the
/// mirrored atomics. A descriptor is created by its compositor and must not
/// outlive it.
pub struct ClipDescriptor {
    id: Uuid,
    clip: Arc<dyn TimelineSource>,
    description: Mutex<String>,
    placement: Mutex<Placement>,
    start_samples: AtomicI64,
    length_samples: AtomicI64,
    offset_samples: AtomicI64,
    sample_rate: AtomicI64,
    visible: AtomicBool,
    audio_enabled: AtomicBool,
    audio_processors: Mutex<Vec<AudioProcessorController>>,
    video_processors: Mutex<Vec<VideoProcessorController>>,
    clip_parameters: ClipParameterController,
}

impl ClipDescriptor {
    /// Place a clip. Times are timeline seconds; sample counts are derived
    /// once a rate is known.
    pub fn new(clip: Arc<dyn TimelineSource>, start: f64, length: f64, offset: f64) -> Self {
        let descriptor = Self {
            id: Uuid::new_v4(),
            description: Mutex::new(clip.name()),
            clip,
            placement: Mutex::new(Placement {
                start,
                length,
                offset,
            }),
            start_samples: AtomicI64::new(0),
            length_samples: AtomicI64::new(0),
            offset_samples: AtomicI64::new(0),
            sample_rate: AtomicI64::new(0),
            visible: AtomicBool::new(true),
            audio_enabled: AtomicBool::new(true),
            audio_processors: Mutex::new(Vec::new()),
            video_processors: Mutex::new(Vec::new()),
            clip_parameters: ClipParameterController::new(),
        };
        descriptor.update_sample_counts(descriptor.clip.sample_rate());
        descriptor
    }

    /// Unique id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The wrapped source.
    pub fn clip(&self) -> &Arc<dyn TimelineSource> {
        &self.clip
    }

    /// User-facing description.
    pub fn description(&self) -> String {
        self.description.lock().clone()
    }

    /// Set the user-facing description.
    pub fn set_description(&self, description: impl Into<String>) {
        *self.description.lock() = description.into();
    }

    /// Automation of the clip's built-in parameters.
    pub fn clip_parameters(&self) -> &ClipParameterController {
        &self.clip_parameters
    }

    // ── Placement ───────────────────────────────────────────────

    /// Timeline start in seconds.
    pub fn start(&self) -> f64 {
        self.placement.lock().start
    }

    /// Length in seconds.
    pub fn length(&self) -> f64 {
        self.placement.lock().length
    }

    /// Source offset in seconds.
    pub fn offset(&self) -> f64 {
        self.placement.lock().offset
    }

    /// Move the clip on the timeline.
    pub fn set_start(&self, start: f64) {
        self.placement.lock().start = start;
        self.update_sample_counts(self.sample_rate.load(Ordering::Acquire));
    }

    /// Change the clip's play length.
    pub fn set_length(&self, length: f64) {
        self.placement.lock().length = length;
        self.update_sample_counts(self.sample_rate.load(Ordering::Acquire));
    }

    /// Change where playback begins inside the source.
    pub fn set_offset(&self, offset: f64) {
        self.placement.lock().offset = offset;
        self.update_sample_counts(self.sample_rate.load(Ordering::Acquire));
    }

    /// Recompute the sample-denominated placement from seconds. The single
    /// derivation point: called on every placement change and whenever the
    /// output sample rate changes (prepare-to-play).
    pub fn update_sample_counts(&self, sample_rate: i64) {
        let placement = self.placement.lock();
        let rate = sample_rate as f64;
        self.start_samples
            .store((placement.start * rate).round() as i64, Ordering::Release);
        self.length_samples
            .store((placement.length * rate).round() as i64, Ordering::Release);
        self.offset_samples
            .store((placement.offset * rate).round() as i64, Ordering::Release);
        self.sample_rate.store(sample_rate, Ordering::Release);
    }

    /// Timeline start in samples.
    pub fn start_samples(&self) -> i64 {
        self.start_samples.load(Ordering::Acquire)
    }

    /// Length in samples.
    pub fn length_samples(&self) -> i64 {
        self.length_samples.load(Ordering::Acquire)
    }

    /// Source offset in samples.
    pub fn offset_samples(&self) -> i64 {
        self.offset_samples.load(Ordering::Acquire)
    }

    /// Map composite-timeline seconds into the wrapped clip's local time.
    /// Every read from the wrapped clip goes through this mapping.
    pub fn clip_time_in_descriptor_time(&self, global_seconds: f64) -> f64 {
        let placement = self.placement.lock();
        global_seconds + placement.offset - placement.start
    }

    /// Sample-domain version of
    /// [`clip_time_in_descriptor_time`](Self::clip_time_in_descriptor_time).
    pub fn clip_sample_in_descriptor_sample(&self, global_sample: i64) -> i64 {
        global_sample + self.offset_samples() - self.start_samples()
    }

    /// Whether the clip's `[start, start + length)` window contains the
    /// given timeline sample.
    pub fn is_active_at(&self, sample: i64) -> bool {
        let start = self.start_samples();
        sample >= start && sample < start + self.length_samples()
    }

    // ── Flags ───────────────────────────────────────────────────

    /// Whether the clip renders video.
    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::Acquire)
    }

    /// Show or hide the clip.
    pub fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::Release);
    }

    /// Whether the clip contributes audio.
    pub fn is_audio_enabled(&self) -> bool {
        self.audio_enabled.load(Ordering::Acquire)
    }

    /// Mute or unmute the clip.
    pub fn set_audio_enabled(&self, enabled: bool) {
        self.audio_enabled.store(enabled, Ordering::Release);
    }

    // ── Processor chains ────────────────────────────────────────
    //
    // Chain mutation and the mixer's iteration share each chain's mutex, so
    // a processor cannot be dropped while a block or frame is inside it.

    /// Append an audio processor. Returns its controller id.
    pub fn add_audio_processor(&self, processor: Box<dyn AudioClipProcessor>) -> Uuid {
        let controller = AudioProcessorController::from_audio(processor);
        let id = controller.id();
        self.audio_processors.lock().push(controller);
        id
    }

    /// Append a video processor. Returns its controller id.
    pub fn add_video_processor(&self, processor: Box<dyn VideoClipProcessor>) -> Uuid {
        let controller = VideoProcessorController::from_video(processor);
        let id = controller.id();
        self.video_processors.lock().push(controller);
        id
    }

    /// Remove an audio processor by controller id.
    pub fn remove_audio_processor(&self, id: Uuid) -> bool {
        let mut chain = self.audio_processors.lock();
        let before = chain.len();
        chain.retain(|c| c.id() != id);
        chain.len() != before
    }

    /// Remove a video processor by controller id.
    pub fn remove_video_processor(&self, id: Uuid) -> bool {
        let mut chain = self.video_processors.lock();
        let before = chain.len();
        chain.retain(|c| c.id() != id);
        chain.len() != before
    }

    /// Run a closure over the audio chain under the chain lock.
    pub fn with_audio_processors<R>(&self, f: impl FnOnce(&[AudioProcessorController]) -> R) -> R {
        f(&self.audio_processors.lock())
    }

    /// Run a closure over the video chain under the chain lock.
    pub fn with_video_processors<R>(&self, f: impl FnOnce(&[VideoProcessorController]) -> R) -> R {
        f(&self.video_processors.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::GainProcessor;
    use crate::source::ImageClip;
    use montage_core::Image;

    fn descriptor(start: f64, length: f64, offset: f64) -> ClipDescriptor {
        let clip = ImageClip::new("test.png", Image::test_pattern(16, 9));
        ClipDescriptor::new(clip, start, length, offset)
    }

    #[test]
    fn test_time_mapping() {
        let desc = descriptor(2.0, 5.0, 1.0);
        assert!((desc.clip_time_in_descriptor_time(3.0) - 2.0).abs() < 1e-9);
        assert!((desc.clip_time_in_descriptor_time(2.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_sample_counts_follow_rate() {
        let desc = descriptor(2.0, 5.0, 1.0);
        desc.update_sample_counts(48_000);
        assert_eq!(desc.start_samples(), 96_000);
        assert_eq!(desc.length_samples(), 240_000);
        assert_eq!(desc.offset_samples(), 48_000);

        desc.update_sample_counts(44_100);
        assert_eq!(desc.start_samples(), 88_200);
    }

    #[test]
    fn test_placement_change_rederives_samples() {
        let desc = descriptor(0.0, 1.0, 0.0);
        desc.update_sample_counts(48_000);
        desc.set_start(1.5);
        assert_eq!(desc.start_samples(), 72_000);
        assert!((desc.start() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_activation_window() {
        let desc = descriptor(2.0, 3.0, 0.0);
        desc.update_sample_counts(48_000);
        assert!(!desc.is_active_at(95_999));
        assert!(desc.is_active_at(96_000));
        assert!(desc.is_active_at(239_999));
        assert!(!desc.is_active_at(240_000));
    }

    #[test]
    fn test_sample_mapping() {
        let desc = descriptor(2.0, 5.0, 1.0);
        desc.update_sample_counts(48_000);
        assert_eq!(desc.clip_sample_in_descriptor_sample(144_000), 96_000);
    }

    #[test]
    fn test_processor_chain_mutation() {
        let desc = descriptor(0.0, 1.0, 0.0);
        let id = desc.add_audio_processor(Box::new(GainProcessor::new()));
        desc.with_audio_processors(|chain| {
            assert_eq!(chain.len(), 1);
            assert_eq!(chain[0].identifier(), "gain");
        });
        assert!(desc.remove_audio_processor(id));
        assert!(!desc.remove_audio_processor(id));
        desc.with_audio_processors(|chain| assert!(chain.is_empty()));
    }

    #[test]
    fn test_flags_default_on() {
        let desc = descriptor(0.0, 1.0, 0.0);
        assert!(desc.is_visible());
        assert!(desc.is_audio_enabled());
        desc.set_visible(false);
        desc.set_audio_enabled(false);
        assert!(!desc.is_visible());
        assert!(!desc.is_audio_enabled());
    }
}
