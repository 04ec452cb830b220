//! The timeline compositor: mixes and renders all placed clips into one
//! output audio stream and one output frame stream.

use crate::descriptor::ClipDescriptor;
use crate::mixers::{AudioMixer, DefaultAudioMixer, DefaultVideoMixer, VideoMixer};
use crate::source::TimelineSource;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use montage_audio::SampleBuffer;
use montage_core::{
    AudioStreamSettings, Image, PixelFormat, Timecode, VideoFrame, VideoStreamSettings,
};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};
use uuid::Uuid;

/// Capacity of each subscriber's event channel. Events are sent with
/// `try_send`; a full channel drops the event, which together with the
/// changed-frame check coalesces notifications for slow observers.
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Where sources are handed for background decoding and lifetime
/// management. Implemented by the playback engine; compositors hold only a
/// weak handle so tearing the engine down first is safe.
pub trait JobScheduler: Send + Sync {
    /// Take shared ownership of a source and schedule its decode job, if
    /// it has one.
    fn manage(&self, source: Arc<dyn TimelineSource>);
}

/// Asynchronous notifications to timeline observers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimelineEvent {
    /// The displayed frame changed.
    TimecodeChanged {
        /// Playback position in the output video stream's ticks.
        timecode: Timecode,
        /// Index of the frame now on display.
        frame_index: i64,
    },
}

/// A timeline of placed clips that plays back as one clip.
///
/// Three execution contexts share a `ComposedClip`: the audio callback
/// ([`get_next_audio_block`](Self::get_next_audio_block)), a render thread
/// ([`render_frame`](Self::render_frame)), and control threads mutating the
/// clip list and seeking. The descriptor list lock is held only long enough
/// to copy the active set, never across mixing.
pub struct ComposedClip {
    name: String,
    audio_settings: AudioStreamSettings,
    video_settings: VideoStreamSettings,
    descriptors: Mutex<Vec<Arc<ClipDescriptor>>>,
    position: AtomicI64,
    last_shown_frame: AtomicI64,
    audio_mixer: Box<dyn AudioMixer>,
    video_mixer: Box<dyn VideoMixer>,
    scheduler: Mutex<Option<Weak<dyn JobScheduler>>>,
    subscribers: Mutex<Vec<Sender<TimelineEvent>>>,
    prepared: AtomicBool,
}

impl ComposedClip {
    /// Create a composition with the default mixers.
    pub fn new(
        name: impl Into<String>,
        audio_settings: AudioStreamSettings,
        video_settings: VideoStreamSettings,
    ) -> Arc<Self> {
        Self::with_mixers(
            name,
            audio_settings,
            video_settings,
            Box::new(DefaultAudioMixer::new()),
            Box::new(DefaultVideoMixer::new()),
        )
    }

    /// Create a composition with explicit mixer strategies.
    pub fn with_mixers(
        name: impl Into<String>,
        audio_settings: AudioStreamSettings,
        video_settings: VideoStreamSettings,
        audio_mixer: Box<dyn AudioMixer>,
        video_mixer: Box<dyn VideoMixer>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            audio_settings,
            video_settings,
            descriptors: Mutex::new(Vec::new()),
            position: AtomicI64::new(0),
            last_shown_frame: AtomicI64::new(-1),
            audio_mixer,
            video_mixer,
            scheduler: Mutex::new(None),
            subscribers: Mutex::new(Vec::new()),
            prepared: AtomicBool::new(false),
        })
    }

    /// Output audio format.
    pub fn audio_settings(&self) -> AudioStreamSettings {
        self.audio_settings
    }

    /// Output video format.
    pub fn video_settings(&self) -> VideoStreamSettings {
        self.video_settings
    }

    /// Attach the engine that will own clip lifetimes and decode jobs.
    pub fn connect_scheduler(&self, scheduler: Weak<dyn JobScheduler>) {
        *self.scheduler.lock() = Some(scheduler);
    }

    /// Subscribe to timeline events. The receiver is drained on the
    /// observer's own thread; the timeline never blocks on it.
    pub fn subscribe(&self) -> Receiver<TimelineEvent> {
        let (sender, receiver) = bounded(EVENT_CHANNEL_CAPACITY);
        self.subscribers.lock().push(sender);
        receiver
    }

    // ── Clip list ───────────────────────────────────────────────

    /// Place a source on the timeline. Times are timeline seconds.
    pub fn add_clip(
        &self,
        source: Arc<dyn TimelineSource>,
        start: f64,
        length: f64,
        offset: f64,
    ) -> Arc<ClipDescriptor> {
        if let Some(scheduler) = self.scheduler.lock().as_ref().and_then(Weak::upgrade) {
            scheduler.manage(Arc::clone(&source));
        } else {
            debug!(clip = %source.name(), "no engine attached, clip will not decode in background");
        }

        let descriptor = Arc::new(ClipDescriptor::new(source, start, length, offset));
        descriptor.update_sample_counts(self.audio_settings.timebase);
        if self.prepared.load(Ordering::Acquire) {
            descriptor.clip().prepare_to_play(
                self.audio_settings.timebase,
                self.audio_settings.default_num_samples,
            );
        }

        self.descriptors.lock().push(Arc::clone(&descriptor));
        debug!(clip = %descriptor.description(), start, length, offset, "clip added");
        descriptor
    }

    /// Remove a clip by descriptor id. Synchronous under the same lock the
    /// mix/render pass takes, so the descriptor is never mid-render when it
    /// goes away.
    pub fn remove_clip(&self, id: Uuid) -> bool {
        let mut descriptors = self.descriptors.lock();
        let before = descriptors.len();
        descriptors.retain(|d| d.id() != id);
        descriptors.len() != before
    }

    /// Snapshot of the descriptor list in z-order.
    pub fn descriptors(&self) -> Vec<Arc<ClipDescriptor>> {
        self.descriptors.lock().clone()
    }

    // ── Playback ────────────────────────────────────────────────

    /// Current playback position in samples.
    pub fn position(&self) -> i64 {
        self.position.load(Ordering::Acquire)
    }

    /// A composition never loops; callers handle wrap-around themselves.
    pub fn is_looping(&self) -> bool {
        false
    }

    /// Mix the next audio block into `dest` and advance the cursor.
    /// Realtime path: the descriptor lock is held only for the active-set
    /// copy below.
    pub fn get_next_audio_block(&self, dest: &mut SampleBuffer) {
        dest.clear();
        if !self.prepared.load(Ordering::Acquire) {
            return;
        }

        let position = self.position.load(Ordering::Acquire);
        let block = dest.num_samples() as i64;
        let seconds = self.audio_settings.seconds_for_sample(position);

        let active = self.active_audio_descriptors(position, block);
        self.audio_mixer.mix_audio(dest, position, seconds, &active);

        let new_position = position + block;
        self.position.store(new_position, Ordering::Release);
        self.notify_if_frame_changed(new_position);
    }

    /// Composite the frame at the current position into `target`.
    ///
    /// Clip selection is independent of the audio path: visibility and
    /// muting are independent per-clip flags.
    pub fn render_frame(&self, target: &mut Image) {
        let position = self.position.load(Ordering::Acquire);
        self.render_frame_at_sample(position, target);
    }

    fn render_frame_at_sample(&self, position: i64, target: &mut Image) {
        let seconds = self.audio_settings.seconds_for_sample(position);
        let tick = self.video_settings.tick_for_seconds(seconds);
        let frame_index = self.video_settings.frame_index_for_tick(tick);

        let active = self.active_video_descriptors(position);
        target.clear();
        self.video_mixer
            .compose(target, &self.video_settings, frame_index, seconds, &active);
    }

    /// Relocate the playback cursor. Synchronous: every clip's decode job
    /// is suspended, every child repositioned to its mapped local time, and
    /// jobs resumed before this returns — the next block or frame observes
    /// a consistent (possibly still silent) state, never a torn one.
    pub fn seek(&self, position: i64) {
        debug!(clip = %self.name, position, "seek");
        let descriptors = self.descriptors();

        for descriptor in &descriptors {
            if let Some(job) = descriptor.clip().background_job() {
                job.set_suspended(true);
            }
        }
        for descriptor in &descriptors {
            let local = descriptor.clip_sample_in_descriptor_sample(position).max(0);
            descriptor.clip().set_next_read_position(local);
        }
        for descriptor in &descriptors {
            if let Some(job) = descriptor.clip().background_job() {
                job.set_suspended(false);
            }
        }

        self.position.store(position, Ordering::Release);
        // Force a notification on the next block
        self.last_shown_frame.store(-1, Ordering::Release);
    }

    // ── Active-clip selection ───────────────────────────────────

    /// Copy-then-release: collect the audio-enabled clips whose window
    /// overlaps the block, then sort by (start, insertion order) so
    /// summation is deterministic.
    fn active_audio_descriptors(
        &self,
        position: i64,
        block: i64,
    ) -> SmallVec<[Arc<ClipDescriptor>; 8]> {
        let mut active: SmallVec<[Arc<ClipDescriptor>; 8]> = {
            let descriptors = self.descriptors.lock();
            descriptors
                .iter()
                .filter(|d| {
                    d.is_audio_enabled()
                        && d.start_samples() < position + block
                        && position < d.start_samples() + d.length_samples()
                })
                .cloned()
                .collect()
        };
        active.sort_by_key(|d| d.start_samples());
        active
    }

    /// Visible clips active at the given instant, in z-order (list order).
    fn active_video_descriptors(&self, position: i64) -> SmallVec<[Arc<ClipDescriptor>; 8]> {
        let descriptors = self.descriptors.lock();
        descriptors
            .iter()
            .filter(|d| d.is_visible() && d.is_active_at(position))
            .cloned()
            .collect()
    }

    fn notify_if_frame_changed(&self, position: i64) {
        let seconds = self.audio_settings.seconds_for_sample(position);
        let tick = self.video_settings.tick_for_seconds(seconds);
        let frame_index = self.video_settings.frame_index_for_tick(tick);

        if self.last_shown_frame.swap(frame_index, Ordering::AcqRel) == frame_index {
            return;
        }

        let event = TimelineEvent::TimecodeChanged {
            timecode: Timecode::new(tick, self.video_settings.timebase as f64),
            frame_index,
        };
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|sender| {
            // Full channels drop the event (observer will catch up on the
            // next change); only disconnected observers are removed.
            !matches!(sender.try_send(event), Err(TrySendError::Disconnected(_)))
        });
    }

    // ── Copying ─────────────────────────────────────────────────

    /// Deep-copy the placement and automation tree onto a new composition.
    /// Sources are shared by reference unless their own `create_copy`
    /// chooses value semantics.
    pub fn duplicate(&self) -> Arc<ComposedClip> {
        let state = crate::persist::snapshot(self);
        let sources = self.descriptors();
        let scheduler = self.scheduler.lock().clone();
        let resolver = move |name: &str| {
            sources
                .iter()
                .find(|d| d.clip().name() == name)
                .map(|d| d.clip().create_copy().unwrap_or_else(|| Arc::clone(d.clip())))
        };
        match crate::persist::restore(&state, scheduler, resolver) {
            Ok(copy) => copy,
            Err(err) => {
                // Snapshot and restore share one schema; a failure here is a
                // bug, but an empty copy beats poisoning the caller.
                warn!(error = %err, "duplicate failed to restore state");
                ComposedClip::new(self.name.clone(), self.audio_settings, self.video_settings)
            }
        }
    }
}

impl TimelineSource for ComposedClip {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn prepare_to_play(&self, sample_rate: i64, _block_size: usize) {
        if sample_rate != self.audio_settings.timebase {
            warn!(
                requested = sample_rate,
                output = self.audio_settings.timebase,
                "composition prepared at its own output rate"
            );
        }
        for descriptor in self.descriptors().iter() {
            descriptor.update_sample_counts(self.audio_settings.timebase);
            descriptor.clip().prepare_to_play(
                self.audio_settings.timebase,
                self.audio_settings.default_num_samples,
            );
        }
        self.prepared.store(true, Ordering::Release);
    }

    fn release_resources(&self) {
        for descriptor in self.descriptors().iter() {
            descriptor.clip().release_resources();
        }
        self.prepared.store(false, Ordering::Release);
    }

    fn read_audio_block(&self, dest: &mut SampleBuffer) {
        self.get_next_audio_block(dest);
    }

    fn set_next_read_position(&self, sample: i64) {
        self.seek(sample);
    }

    fn next_read_position(&self) -> i64 {
        self.position()
    }

    fn total_length(&self) -> i64 {
        self.descriptors
            .lock()
            .iter()
            .map(|d| d.start_samples() + d.length_samples())
            .max()
            .unwrap_or(0)
    }

    fn sample_rate(&self) -> i64 {
        self.audio_settings.timebase
    }

    fn frame_at(&self, seconds: f64) -> Option<VideoFrame> {
        let sample = self.audio_settings.sample_for_seconds(seconds);
        let mut target = Image::new(
            self.video_settings.width,
            self.video_settings.height,
            PixelFormat::Rgba8,
        );
        self.render_frame_at_sample(sample, &mut target);
        Some(VideoFrame::new(
            Arc::new(target),
            self.video_settings.tick_for_seconds(seconds),
        ))
    }

    fn frame_available(&self, seconds: f64) -> bool {
        let sample = self.audio_settings.sample_for_seconds(seconds);
        self.active_video_descriptors(sample).iter().all(|d| {
            d.clip()
                .frame_available(d.clip_time_in_descriptor_time(seconds))
        })
    }

    fn has_video(&self) -> bool {
        true
    }

    fn has_audio(&self) -> bool {
        true
    }

    fn video_settings(&self) -> Option<VideoStreamSettings> {
        Some(self.video_settings)
    }

    fn create_copy(&self) -> Option<Arc<dyn TimelineSource>> {
        Some(self.duplicate() as Arc<dyn TimelineSource>)
    }
}
