//! Processor traits for clip effect chains, plus the built-in reference
//! processors.
//!
//! Plugin discovery and hosting are outside this engine; anything that can
//! implement these traits can sit in a chain, and only its parameter
//! automation is modeled here.

use crate::controllers::ParameterSpec;
use montage_audio::SampleBuffer;
use montage_core::Image;

/// An audio effect in a clip's processing chain.
pub trait AudioClipProcessor: Send {
    /// Stable identifier (persistence key).
    fn identifier(&self) -> &str;

    /// Human-readable name.
    fn display_name(&self) -> &str {
        self.identifier()
    }

    /// The parameters this processor exposes, in value order.
    fn parameter_specs(&self) -> Vec<ParameterSpec>;

    /// Process one block in place. `values` holds one real value per
    /// parameter, evaluated for this block's time.
    fn process(&mut self, block: &mut SampleBuffer, values: &[f64]);
}

/// A video effect in a clip's processing chain.
pub trait VideoClipProcessor: Send {
    /// Stable identifier (persistence key).
    fn identifier(&self) -> &str;

    /// Human-readable name.
    fn display_name(&self) -> &str {
        self.identifier()
    }

    /// The parameters this processor exposes, in value order.
    fn parameter_specs(&self) -> Vec<ParameterSpec>;

    /// Process one frame in place.
    fn process(&mut self, image: &mut Image, values: &[f64]);
}

// ── Built-ins ───────────────────────────────────────────────────

/// Plain gain stage.
pub struct GainProcessor;

impl GainProcessor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GainProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioClipProcessor for GainProcessor {
    fn identifier(&self) -> &str {
        "gain"
    }

    fn display_name(&self) -> &str {
        "Gain"
    }

    fn parameter_specs(&self) -> Vec<ParameterSpec> {
        vec![ParameterSpec::new("gain", "Gain", 0.0, 2.0, 1.0)]
    }

    fn process(&mut self, block: &mut SampleBuffer, values: &[f64]) {
        let gain = values.first().copied().unwrap_or(1.0) as f32;
        block.apply_gain(gain);
    }
}

/// Additive brightness adjustment.
pub struct BrightnessProcessor;

impl BrightnessProcessor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BrightnessProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoClipProcessor for BrightnessProcessor {
    fn identifier(&self) -> &str {
        "brightness"
    }

    fn display_name(&self) -> &str {
        "Brightness"
    }

    fn parameter_specs(&self) -> Vec<ParameterSpec> {
        vec![ParameterSpec::new("brightness", "Brightness", -1.0, 1.0, 0.0)]
    }

    fn process(&mut self, image: &mut Image, values: &[f64]) {
        let brightness = values.first().copied().unwrap_or(0.0);
        if brightness == 0.0 {
            return;
        }
        let offset = (brightness * 255.0) as i32;
        for y in 0..image.height() {
            let row = image.row_mut(y);
            for px in row.chunks_exact_mut(4) {
                for c in &mut px[..3] {
                    *c = (*c as i32 + offset).clamp(0, 255) as u8;
                }
            }
        }
    }
}

/// Instantiate a built-in audio processor by its persistence identifier.
pub fn builtin_audio_processor(identifier: &str) -> Option<Box<dyn AudioClipProcessor>> {
    match identifier {
        "gain" => Some(Box::new(GainProcessor::new())),
        _ => None,
    }
}

/// Instantiate a built-in video processor by its persistence identifier.
pub fn builtin_video_processor(identifier: &str) -> Option<Box<dyn VideoClipProcessor>> {
    match identifier {
        "brightness" => Some(Box::new(BrightnessProcessor::new())),
        _ => None,
    }
}
