//! Media sources placed on a timeline.
//!
//! `TimelineSource` is the one interface every source kind shares; the
//! capability queries replace a type hierarchy. Format-specific behavior
//! stays behind the `MediaReader` boundary, not in the source types.

use crate::job::{BackgroundJob, JobOutcome};
use montage_audio::{AudioFifo, SampleBuffer};
use montage_core::{Image, VideoFrame, VideoStreamSettings};
use montage_media::{MediaReader, ReadResult, VideoFifo};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Samples buffered ahead per channel for a movie source (~2.7 s at 48 kHz).
const AUDIO_FIFO_CAPACITY: usize = 1 << 17;
/// Frame slots buffered ahead for a movie source.
const VIDEO_FIFO_SLOTS: usize = 32;
/// Nominal length of a still source; stills last as long as their
/// descriptor says, so this only needs to be effectively unbounded.
const STILL_LENGTH: i64 = i64::MAX / 2;

/// A playable media source: movie file, still image, live feed, or a
/// nested composition.
///
/// All methods take `&self`; implementations use interior mutability so the
/// audio thread, render thread and control thread can share one `Arc`.
pub trait TimelineSource: Send + Sync {
    /// Identity of the underlying source (path, URL, or composition name).
    fn name(&self) -> String;

    /// Configure for playback at the given output rate and block size.
    fn prepare_to_play(&self, sample_rate: i64, block_size: usize);

    /// Drop playback state; the source may be prepared again later.
    fn release_resources(&self);

    /// Fill `dest` with the next block at the current read position and
    /// advance it. Realtime-safe: never blocks, never allocates.
    fn read_audio_block(&self, dest: &mut SampleBuffer);

    /// Seek. Synchronous: when this returns the next audio block and frame
    /// queries observe the new position.
    fn set_next_read_position(&self, sample: i64);

    /// Position the next `read_audio_block` will read from.
    fn next_read_position(&self) -> i64;

    /// Total length in samples at the prepared output rate.
    fn total_length(&self) -> i64;

    /// The prepared output sample rate.
    fn sample_rate(&self) -> i64;

    /// The frame covering `seconds` of clip-local time, if one is decoded.
    fn frame_at(&self, seconds: f64) -> Option<VideoFrame>;

    /// Whether a frame covering `seconds` is already decoded.
    fn frame_available(&self, seconds: f64) -> bool;

    /// Capability queries.
    fn has_video(&self) -> bool;
    fn has_audio(&self) -> bool;
    fn has_subtitle(&self) -> bool {
        false
    }

    /// Live sources cannot seek; consumers read their latest frame only.
    fn is_live(&self) -> bool {
        false
    }

    /// Video stream format, if the source has video.
    fn video_settings(&self) -> Option<VideoStreamSettings>;

    /// The decode task to run on a background worker, if this source
    /// needs one.
    fn background_job(&self) -> Option<Arc<dyn BackgroundJob>> {
        None
    }

    /// Value-semantics copy. `None` means the source is shared by
    /// reference when its owner is copied.
    fn create_copy(&self) -> Option<Arc<dyn TimelineSource>> {
        None
    }
}

// ── Movie clip ──────────────────────────────────────────────────

struct MovieState {
    reader: Mutex<Box<dyn MediaReader>>,
    audio_fifo: AudioFifo,
    video_fifo: Mutex<VideoFifo>,
    /// Next clip-local sample the audio path will deliver.
    position: AtomicI64,
    sample_rate: AtomicI64,
    total_length: AtomicI64,
    has_video: bool,
    has_audio: bool,
    has_subtitle: bool,
    video_settings: Option<VideoStreamSettings>,
}

/// Decode task for one movie source.
struct MovieDecodeJob {
    state: Arc<MovieState>,
    suspended: AtomicBool,
}

impl BackgroundJob for MovieDecodeJob {
    fn step(&self) -> JobOutcome {
        if self.suspended.load(Ordering::Acquire) {
            return JobOutcome::Idle;
        }
        let mut reader = self.state.reader.lock();
        let mut video = self.state.video_fifo.lock();
        match reader.read_new_data(&mut video, &self.state.audio_fifo) {
            ReadResult::Progressed => JobOutcome::MoreWork,
            ReadResult::NoSpace => JobOutcome::Idle,
            ReadResult::EndOfStream => JobOutcome::Finished,
        }
    }

    fn set_suspended(&self, suspended: bool) {
        self.suspended.store(suspended, Ordering::Release);
    }

    fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }
}

/// A file-backed source streaming through a [`MediaReader`] into its fifos.
pub struct MovieClip {
    name: String,
    state: Arc<MovieState>,
    job: Arc<MovieDecodeJob>,
}

impl MovieClip {
    /// Open a source through its reader. Returns `None` when the backend
    /// cannot open it; a missing clip contributes nothing rather than
    /// failing the composition.
    pub fn from_reader(
        name: impl Into<String>,
        mut reader: Box<dyn MediaReader>,
    ) -> Option<Arc<Self>> {
        let name = name.into();
        if !reader.open_from_source() {
            warn!(source = %name, "backend failed to open source");
            return None;
        }

        let audio_settings = reader.audio_settings();
        let video_settings = reader.video_settings();
        let num_channels = audio_settings.map(|a| a.num_channels).unwrap_or(2);
        let video_fifo = VideoFifo::new(
            video_settings.unwrap_or_default(),
            VIDEO_FIFO_SLOTS,
        );

        let state = Arc::new(MovieState {
            has_video: reader.has_video(),
            has_audio: reader.has_audio(),
            has_subtitle: reader.has_subtitle(),
            video_settings,
            total_length: AtomicI64::new(reader.total_length()),
            sample_rate: AtomicI64::new(
                audio_settings.map(|a| a.timebase).unwrap_or(48_000),
            ),
            reader: Mutex::new(reader),
            audio_fifo: AudioFifo::new(num_channels, AUDIO_FIFO_CAPACITY),
            video_fifo: Mutex::new(video_fifo),
            position: AtomicI64::new(0),
        });

        info!(source = %name, "opened movie clip");
        Some(Arc::new(Self {
            job: Arc::new(MovieDecodeJob {
                state: Arc::clone(&state),
                suspended: AtomicBool::new(false),
            }),
            state,
            name,
        }))
    }

    /// Extract a still for thumbnails, out of band of playback.
    pub fn still_image(&self, seconds: f64, size: (u32, u32)) -> Option<Image> {
        self.state.reader.lock().still_image(seconds, size)
    }
}

impl TimelineSource for MovieClip {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn prepare_to_play(&self, sample_rate: i64, _block_size: usize) {
        let mut reader = self.state.reader.lock();
        reader.set_output_sample_rate(sample_rate);
        self.state.sample_rate.store(sample_rate, Ordering::Release);
        self.state
            .total_length
            .store(reader.total_length(), Ordering::Release);
        self.job.set_suspended(false);
    }

    fn release_resources(&self) {
        self.job.set_suspended(true);
        self.state.audio_fifo.set_position(0);
        self.state.video_fifo.lock().clear();
        self.state.position.store(0, Ordering::Release);
    }

    fn read_audio_block(&self, dest: &mut SampleBuffer) {
        let count = dest.num_samples() as i64;
        if !self.state.has_audio {
            dest.clear();
            return;
        }

        let position = self.state.position.load(Ordering::Acquire);
        let fifo = &self.state.audio_fifo;

        // The decoder may have fallen behind and later caught up; data for
        // positions the timeline already passed is discarded, not played.
        let lag = position - fifo.read_position();
        if lag > 0 {
            fifo.skip_samples(lag as usize);
        }

        if fifo.read_position() == position && fifo.available_samples() >= count as usize {
            fifo.pull_samples(dest);
        } else {
            // Not ready within this callback: silence now, data resolves on
            // a later block.
            dest.clear();
        }
        self.state.position.store(position + count, Ordering::Release);
    }

    fn set_next_read_position(&self, sample: i64) {
        self.job.set_suspended(true);
        {
            let mut reader = self.state.reader.lock();
            reader.set_position(sample);
            self.state.audio_fifo.set_position(sample);
            self.state.video_fifo.lock().clear();
            self.state.position.store(sample, Ordering::Release);
        }
        self.job.set_suspended(false);
        debug!(source = %self.name, sample, "movie clip seeked");
    }

    fn next_read_position(&self) -> i64 {
        self.state.position.load(Ordering::Acquire)
    }

    fn total_length(&self) -> i64 {
        self.state.total_length.load(Ordering::Acquire)
    }

    fn sample_rate(&self) -> i64 {
        self.state.sample_rate.load(Ordering::Acquire)
    }

    fn frame_at(&self, seconds: f64) -> Option<VideoFrame> {
        let settings = self.state.video_settings?;
        let tick = settings.tick_for_seconds(seconds);
        let mut fifo = self.state.video_fifo.lock();
        let frame = if self.is_live() {
            fifo.latest_frame()
        } else {
            fifo.frame_for(tick)
        };
        if frame.is_empty() {
            None
        } else {
            Some(frame)
        }
    }

    fn frame_available(&self, seconds: f64) -> bool {
        match self.state.video_settings {
            Some(settings) => {
                let tick = settings.tick_for_seconds(seconds);
                self.state.video_fifo.lock().frame_available(tick)
            }
            None => false,
        }
    }

    fn has_video(&self) -> bool {
        self.state.has_video
    }

    fn has_audio(&self) -> bool {
        self.state.has_audio
    }

    fn has_subtitle(&self) -> bool {
        self.state.has_subtitle
    }

    fn video_settings(&self) -> Option<VideoStreamSettings> {
        self.state.video_settings
    }

    fn background_job(&self) -> Option<Arc<dyn BackgroundJob>> {
        Some(Arc::clone(&self.job) as Arc<dyn BackgroundJob>)
    }
}

// ── Still image clip ────────────────────────────────────────────

/// A still image shown for however long its descriptor lasts.
pub struct ImageClip {
    name: String,
    image: Arc<Image>,
    settings: VideoStreamSettings,
    position: AtomicI64,
    sample_rate: AtomicI64,
}

impl ImageClip {
    /// Wrap an image as a timeline source.
    pub fn new(name: impl Into<String>, image: Image) -> Arc<Self> {
        let settings = VideoStreamSettings {
            width: image.width(),
            height: image.height(),
            ..VideoStreamSettings::default()
        };
        Arc::new(Self {
            name: name.into(),
            image: Arc::new(image),
            settings,
            position: AtomicI64::new(0),
            sample_rate: AtomicI64::new(48_000),
        })
    }
}

impl TimelineSource for ImageClip {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn prepare_to_play(&self, sample_rate: i64, _block_size: usize) {
        self.sample_rate.store(sample_rate, Ordering::Release);
    }

    fn release_resources(&self) {
        self.position.store(0, Ordering::Release);
    }

    fn read_audio_block(&self, dest: &mut SampleBuffer) {
        dest.clear();
        self.position
            .fetch_add(dest.num_samples() as i64, Ordering::AcqRel);
    }

    fn set_next_read_position(&self, sample: i64) {
        self.position.store(sample, Ordering::Release);
    }

    fn next_read_position(&self) -> i64 {
        self.position.load(Ordering::Acquire)
    }

    fn total_length(&self) -> i64 {
        STILL_LENGTH
    }

    fn sample_rate(&self) -> i64 {
        self.sample_rate.load(Ordering::Acquire)
    }

    fn frame_at(&self, seconds: f64) -> Option<VideoFrame> {
        Some(VideoFrame::new(
            Arc::clone(&self.image),
            self.settings.tick_for_seconds(seconds),
        ))
    }

    fn frame_available(&self, _seconds: f64) -> bool {
        true
    }

    fn has_video(&self) -> bool {
        true
    }

    fn has_audio(&self) -> bool {
        false
    }

    fn video_settings(&self) -> Option<VideoStreamSettings> {
        Some(self.settings)
    }

    fn create_copy(&self) -> Option<Arc<dyn TimelineSource>> {
        // Stills are cheap and immutable: copies get value semantics.
        Some(Arc::new(Self {
            name: self.name.clone(),
            image: Arc::clone(&self.image),
            settings: self.settings,
            position: AtomicI64::new(0),
            sample_rate: AtomicI64::new(self.sample_rate.load(Ordering::Acquire)),
        }))
    }
}
