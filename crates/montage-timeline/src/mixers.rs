//! Mixer strategies: how per-clip contributions become one output.
//!
//! The compositor owns one audio and one video mixer and hands each the
//! active clips for the current block or frame; the strategies are
//! swappable without touching the timeline model.

use crate::descriptor::ClipDescriptor;
use crate::source::TimelineSource;
use montage_audio::SampleBuffer;
use montage_core::{Image, VideoStreamSettings};
use parking_lot::Mutex;
use rayon::prelude::*;
use smallvec::SmallVec;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

/// Combines the active clips' audio into one output block.
pub trait AudioMixer: Send + Sync {
    /// Mix one block. `position` is the timeline cursor in samples,
    /// `seconds` the same position in seconds; `active` is sorted by
    /// (start, insertion order) so summation is deterministic.
    fn mix_audio(
        &self,
        output: &mut SampleBuffer,
        position: i64,
        seconds: f64,
        active: &[Arc<ClipDescriptor>],
    );
}

/// Composites the active clips' frames into one output image.
pub trait VideoMixer: Send + Sync {
    /// Compose one frame. `active` is in z-order, first entry at the back.
    fn compose(
        &self,
        target: &mut Image,
        settings: &VideoStreamSettings,
        frame_count: i64,
        seconds: f64,
        active: &[Arc<ClipDescriptor>],
    );
}

// ── Default audio mixer ─────────────────────────────────────────

/// Per-clip read, gain/pan automation, processor chains, summation.
pub struct DefaultAudioMixer {
    scratch: Mutex<SampleBuffer>,
}

impl DefaultAudioMixer {
    /// Create a mixer; the scratch block grows to the first block size
    /// used and is reused afterwards.
    pub fn new() -> Self {
        Self {
            scratch: Mutex::new(SampleBuffer::new(2, 0)),
        }
    }

    /// Constant-power stereo gains for a gain/pan pair.
    fn stereo_gain(gain: f32, pan: f32) -> (f32, f32) {
        let angle = (pan + 1.0) * 0.25 * std::f32::consts::PI;
        (gain * angle.cos(), gain * angle.sin())
    }
}

impl Default for DefaultAudioMixer {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioMixer for DefaultAudioMixer {
    fn mix_audio(
        &self,
        output: &mut SampleBuffer,
        position: i64,
        seconds: f64,
        active: &[Arc<ClipDescriptor>],
    ) {
        let mut scratch = self.scratch.lock();
        if scratch.num_channels() != output.num_channels()
            || scratch.num_samples() != output.num_samples()
        {
            *scratch = SampleBuffer::new(output.num_channels(), output.num_samples());
        }

        for descriptor in active {
            let clip = descriptor.clip();
            if !clip.has_audio() {
                continue;
            }

            // Keep the child cursor on the mapped timeline position; a clip
            // that just became active (or was left behind by a seek) gets
            // resynchronized here.
            let expected = descriptor.clip_sample_in_descriptor_sample(position);
            if clip.next_read_position() != expected {
                clip.set_next_read_position(expected.max(0));
            }

            scratch.clear();
            clip.read_audio_block(&mut scratch);

            let local_seconds = descriptor.clip_time_in_descriptor_time(seconds);
            descriptor.with_audio_processors(|chain| {
                for controller in chain {
                    controller.update_automation(local_seconds);
                    controller.process_block(&mut scratch);
                }
            });

            let (gain, pan) = descriptor.clip_parameters().audio_levels_at(local_seconds);
            let (left, right) = Self::stereo_gain(gain, pan);
            let mut gains: SmallVec<[f32; 8]> = SmallVec::new();
            for ch in 0..output.num_channels() {
                gains.push(match ch {
                    0 => left,
                    1 => right,
                    _ => gain,
                });
            }
            output.add_from(&scratch, &gains);
        }
    }
}

// ── Default video mixer ─────────────────────────────────────────

/// Z-ordered alpha-over compositing with automated clip geometry and a
/// bounded per-frame readiness budget.
pub struct DefaultVideoMixer {
    readiness_budget: Duration,
}

impl DefaultVideoMixer {
    /// Create a mixer with the default 30 ms readiness budget.
    pub fn new() -> Self {
        Self::with_readiness_budget(Duration::from_millis(30))
    }

    /// Create a mixer with an explicit readiness budget. The budget is
    /// shared by all clips of one composed frame, measured from render
    /// start; a clip that is not ready in time is skipped for this frame.
    pub fn with_readiness_budget(readiness_budget: Duration) -> Self {
        Self { readiness_budget }
    }

    /// Wait until the clip has a frame for `seconds`, bounded by `deadline`.
    fn wait_for_frame_ready(
        descriptor: &ClipDescriptor,
        seconds: f64,
        deadline: Instant,
    ) -> bool {
        loop {
            if descriptor.clip().frame_available(seconds) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_micros(500));
        }
    }

    /// Paint `source` over `target` 1:1 with uniform opacity.
    fn overlay_direct(target: &mut Image, source: &Image, alpha: f32) {
        let height = target.height().min(source.height());
        let width_bytes =
            (target.width().min(source.width()) as usize) * 4;

        target
            .rows_mut()
            .into_par_iter()
            .take(height as usize)
            .enumerate()
            .for_each(|(y, dst_row)| {
                let src_row = source.row(y as u32);
                for x in (0..width_bytes).step_by(4) {
                    let src_alpha = alpha * src_row[x + 3] as f32 / 255.0;
                    if src_alpha <= 0.0 {
                        continue;
                    }
                    for c in 0..3 {
                        let dst = dst_row[x + c] as f32;
                        let src = src_row[x + c] as f32;
                        dst_row[x + c] = (src * src_alpha + dst * (1.0 - src_alpha)) as u8;
                    }
                    dst_row[x + 3] = 255;
                }
            });
    }

    /// Paint `source` over `target` through a placement transform,
    /// sampling source pixels through the inverse mapping.
    fn overlay_transformed(
        target: &mut Image,
        source: &Image,
        alpha: f32,
        placement: montage_core::PlacementTransform,
    ) {
        let src_width = source.width() as f32;
        let src_height = source.height() as f32;

        target
            .rows_mut()
            .into_par_iter()
            .enumerate()
            .for_each(|(y, dst_row)| {
                for x in (0..dst_row.len()).step_by(4) {
                    let canvas = glam::Vec2::new((x / 4) as f32 + 0.5, y as f32 + 0.5);
                    let src_pos = placement.source_point(canvas);
                    if src_pos.x < 0.0
                        || src_pos.y < 0.0
                        || src_pos.x >= src_width
                        || src_pos.y >= src_height
                    {
                        continue;
                    }
                    let src_row = source.row(src_pos.y as u32);
                    let sx = (src_pos.x as usize) * 4;
                    let src_alpha = alpha * src_row[sx + 3] as f32 / 255.0;
                    if src_alpha <= 0.0 {
                        continue;
                    }
                    for c in 0..3 {
                        let dst = dst_row[x + c] as f32;
                        let src = src_row[sx + c] as f32;
                        dst_row[x + c] = (src * src_alpha + dst * (1.0 - src_alpha)) as u8;
                    }
                    dst_row[x + 3] = 255;
                }
            });
    }
}

impl Default for DefaultVideoMixer {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoMixer for DefaultVideoMixer {
    fn compose(
        &self,
        target: &mut Image,
        settings: &VideoStreamSettings,
        _frame_count: i64,
        seconds: f64,
        active: &[Arc<ClipDescriptor>],
    ) {
        let deadline = Instant::now() + self.readiness_budget;

        for descriptor in active {
            let clip = descriptor.clip();
            if !clip.has_video() {
                continue;
            }
            let local_seconds = descriptor.clip_time_in_descriptor_time(seconds);

            if !clip.is_live() && !Self::wait_for_frame_ready(descriptor, local_seconds, deadline) {
                trace!(clip = %clip.name(), "frame not ready in budget, skipping");
                continue;
            }
            let Some(frame) = clip.frame_at(local_seconds) else {
                continue;
            };

            let geometry = descriptor.clip_parameters().geometry_at(local_seconds);
            if geometry.alpha <= 0.0 {
                continue;
            }

            let has_processing = descriptor.with_video_processors(|chain| {
                chain.iter().any(|c| c.is_active())
            });
            let source: Arc<Image> = if has_processing {
                let mut image = (*frame.image).clone();
                descriptor.with_video_processors(|chain| {
                    for controller in chain {
                        controller.update_automation(local_seconds);
                        controller.process_image(&mut image);
                    }
                });
                Arc::new(image)
            } else {
                frame.image
            };

            if geometry.is_neutral()
                && source.width() == target.width()
                && source.height() == target.height()
            {
                Self::overlay_direct(target, &source, 1.0);
            } else if geometry.is_neutral() {
                Self::overlay_direct(target, &source, geometry.alpha);
            } else {
                let placement =
                    geometry.placement(settings.width as f32, settings.height as f32);
                Self::overlay_transformed(target, &source, geometry.alpha, placement);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ImageClip;

    fn solid_descriptor(color: [u8; 4], start: f64) -> Arc<ClipDescriptor> {
        let clip = ImageClip::new("solid", Image::solid(8, 8, color));
        let desc = ClipDescriptor::new(clip, start, 10.0, 0.0);
        desc.update_sample_counts(48_000);
        Arc::new(desc)
    }

    #[test]
    fn test_stereo_gain_center_pan() {
        let (l, r) = DefaultAudioMixer::stereo_gain(1.0, 0.0);
        assert!((l - r).abs() < 0.01);
        assert!(l > 0.5);
    }

    #[test]
    fn test_stereo_gain_hard_left() {
        let (l, r) = DefaultAudioMixer::stereo_gain(1.0, -1.0);
        assert!(l > 0.99);
        assert!(r.abs() < 0.01);
    }

    #[test]
    fn test_compose_single_opaque_clip() {
        let mixer = DefaultVideoMixer::new();
        let settings = VideoStreamSettings::new(8, 8, 1001, 24_000);
        let mut target = Image::new(8, 8, montage_core::PixelFormat::Rgba8);

        let desc = solid_descriptor([200, 100, 50, 255], 0.0);
        mixer.compose(&mut target, &settings, 0, 1.0, &[desc]);

        let row = target.row(0);
        assert_eq!(&row[..4], &[200, 100, 50, 255]);
    }

    #[test]
    fn test_compose_z_order_and_alpha() {
        let mixer = DefaultVideoMixer::new();
        let settings = VideoStreamSettings::new(8, 8, 1001, 24_000);
        let mut target = Image::new(8, 8, montage_core::PixelFormat::Rgba8);

        let back = solid_descriptor([255, 0, 0, 255], 0.0);
        let front = solid_descriptor([0, 0, 255, 128], 0.0);
        mixer.compose(&mut target, &settings, 0, 1.0, &[back, front]);

        let row = target.row(0);
        // Half-transparent blue over red
        assert!(row[0] > 100 && row[0] < 150, "R = {}", row[0]);
        assert!(row[2] > 100 && row[2] < 150, "B = {}", row[2]);
    }

    #[test]
    fn test_compose_skips_invisible_alpha() {
        let mixer = DefaultVideoMixer::new();
        let settings = VideoStreamSettings::new(8, 8, 1001, 24_000);
        let mut target = Image::new(8, 8, montage_core::PixelFormat::Rgba8);

        let desc = solid_descriptor([255, 255, 255, 255], 0.0);
        desc.clip_parameters()
            .parameter("alpha")
            .unwrap()
            .with_automation(|auto| {
                auto.add_keyframe(0.0, 0.0);
                auto.add_keyframe(10.0, 0.0);
            });
        mixer.compose(&mut target, &settings, 0, 1.0, &[desc]);
        assert_eq!(target.row(0)[0], 0);
    }

    #[test]
    fn test_mix_audio_silent_clip_sums_nothing() {
        let mixer = DefaultAudioMixer::new();
        let desc = solid_descriptor([0, 0, 0, 255], 0.0); // image clip: no audio
        let mut output = SampleBuffer::new(2, 64);
        mixer.mix_audio(&mut output, 0, 0.0, &[desc]);
        assert_eq!(output.magnitude(), 0.0);
    }
}
