//! Integration tests for the compositor over real decoded sources.

use montage_audio::SampleBuffer;
use montage_core::{AudioStreamSettings, Image, PixelFormat, VideoStreamSettings};
use montage_media::SyntheticReader;
use montage_timeline::{ComposedClip, JobOutcome, MovieClip, TimelineSource};
use std::sync::Arc;

const RATE: i64 = 48_000;

fn small_video() -> VideoStreamSettings {
    VideoStreamSettings::new(64, 36, 1001, 24_000)
}

fn movie(name: &str, duration: f64) -> Arc<MovieClip> {
    let reader = SyntheticReader::new(duration).with_video_settings(small_video());
    MovieClip::from_reader(name, Box::new(reader)).unwrap()
}

/// A 48 kHz composition with the 24000/1001 video timebase, clip A
/// spanning [0s, 5s) and clip B spanning [3s, 8s).
fn two_clip_timeline() -> Arc<ComposedClip> {
    let composed = ComposedClip::new(
        "scenario",
        AudioStreamSettings::new(2, 1024, RATE),
        small_video(),
    );
    composed.add_clip(movie("a.mov", 5.0), 0.0, 5.0, 0.0);
    composed.add_clip(movie("b.mov", 8.0), 3.0, 5.0, 0.0);
    composed
}

/// Step every clip's decode job until no job has immediate work left.
fn decode_ahead(composed: &ComposedClip) {
    let jobs: Vec<_> = composed
        .descriptors()
        .iter()
        .filter_map(|d| d.clip().background_job())
        .collect();
    loop {
        let mut progressed = false;
        for job in &jobs {
            if job.step() == JobOutcome::MoreWork {
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }
}

#[test]
fn total_length_is_end_of_latest_clip() {
    crate::init_tracing();
    let composed = two_clip_timeline();
    assert_eq!(composed.total_length(), 8 * RATE);
}

#[test]
fn overlapping_clips_both_contribute_audio() {
    crate::init_tracing();
    let composed = two_clip_timeline();
    composed.prepare_to_play(RATE, 1024);

    // At 4s both A (local 4s) and B (local 1s) are active. The synthetic
    // tones align in phase there (440 Hz, whole seconds), so their sum is
    // twice one clip's contribution.
    composed.seek(4 * RATE);
    decode_ahead(&composed);

    let mut block = SampleBuffer::new(2, 1024);
    composed.get_next_audio_block(&mut block);
    let both = block.magnitude();
    assert!(both > 0.6, "expected two clips summed, got {both}");

    // At 6s only B is active
    composed.seek(6 * RATE);
    decode_ahead(&composed);
    composed.get_next_audio_block(&mut block);
    let single = block.magnitude();
    assert!(
        single > 0.2 && single < 0.5,
        "expected one clip's level, got {single}"
    );
}

#[test]
fn nothing_active_past_the_end() {
    crate::init_tracing();
    let composed = two_clip_timeline();
    composed.prepare_to_play(RATE, 1024);

    composed.seek(9 * RATE);
    decode_ahead(&composed);
    let mut block = SampleBuffer::new(2, 1024);
    composed.get_next_audio_block(&mut block);
    assert_eq!(block.magnitude(), 0.0);
}

#[test]
fn video_frames_composite_after_decode() {
    crate::init_tracing();
    let composed = two_clip_timeline();
    composed.prepare_to_play(RATE, 1024);

    composed.seek(4 * RATE);
    decode_ahead(&composed);

    let mut target = Image::new(64, 36, PixelFormat::Rgba8);
    composed.render_frame(&mut target);
    // Test pattern: leftmost bar is white
    assert_eq!(&target.row(0)[..4], &[255, 255, 255, 255]);
}

#[test]
fn seek_is_idempotent_across_children() {
    crate::init_tracing();
    let composed = two_clip_timeline();
    composed.prepare_to_play(RATE, 1024);

    composed.seek(4 * RATE);
    let first: Vec<i64> = composed
        .descriptors()
        .iter()
        .map(|d| d.clip().next_read_position())
        .collect();

    composed.seek(4 * RATE);
    let second: Vec<i64> = composed
        .descriptors()
        .iter()
        .map(|d| d.clip().next_read_position())
        .collect();

    assert_eq!(first, second);
    // Mapped local positions: A at 4s, B at 1s
    assert_eq!(first, vec![4 * RATE, RATE]);
}

#[test]
fn muted_clip_is_excluded_from_audio_but_not_video() {
    crate::init_tracing();
    let composed = two_clip_timeline();
    let descriptors = composed.descriptors();
    descriptors[0].set_audio_enabled(false);
    composed.prepare_to_play(RATE, 1024);

    composed.seek(4 * RATE);
    decode_ahead(&composed);

    let mut block = SampleBuffer::new(2, 1024);
    composed.get_next_audio_block(&mut block);
    // Only B sounds
    let level = block.magnitude();
    assert!(level > 0.2 && level < 0.5, "got {level}");

    // A still renders
    let mut target = Image::new(64, 36, PixelFormat::Rgba8);
    composed.render_frame(&mut target);
    assert_eq!(target.row(0)[0], 255);
}

#[test]
fn release_resources_returns_to_idle() {
    crate::init_tracing();
    let composed = two_clip_timeline();
    composed.prepare_to_play(RATE, 1024);
    decode_ahead(&composed);

    composed.release_resources();
    let mut block = SampleBuffer::new(2, 1024);
    let position = composed.position();
    composed.get_next_audio_block(&mut block);
    assert_eq!(block.magnitude(), 0.0);
    assert_eq!(composed.position(), position);
}
