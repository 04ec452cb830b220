//! Parameter controllers: the bridge between normalized automation
//! timelines and the real-valued parameters of clips and processors.

use crate::processors::{AudioClipProcessor, VideoClipProcessor};
use montage_audio::SampleBuffer;
use montage_core::{Image, ParameterAutomation, PlacementTransform};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

/// Static description of one automatable parameter: its identity and the
/// real-value range layered over the normalized automation domain.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    /// Stable identifier used in persistence.
    pub id: &'static str,
    /// Human-readable name.
    pub name: &'static str,
    /// Minimum real value (normalized 0).
    pub min: f64,
    /// Maximum real value (normalized 1).
    pub max: f64,
    /// Default real value.
    pub default: f64,
}

impl ParameterSpec {
    /// Create a parameter spec.
    pub const fn new(id: &'static str, name: &'static str, min: f64, max: f64, default: f64) -> Self {
        Self {
            id,
            name,
            min,
            max,
            default,
        }
    }

    /// Map a normalized value into the real range.
    #[inline]
    pub fn real_value(&self, normalized: f64) -> f64 {
        self.min + normalized.clamp(0.0, 1.0) * (self.max - self.min)
    }

    /// Map a real value into the normalized domain.
    #[inline]
    pub fn normalized(&self, real: f64) -> f64 {
        if self.max == self.min {
            return 0.0;
        }
        ((real - self.min) / (self.max - self.min)).clamp(0.0, 1.0)
    }
}

/// One parameter paired with its automation timeline.
pub struct AutomatedParameter {
    spec: ParameterSpec,
    automation: RwLock<ParameterAutomation>,
}

impl AutomatedParameter {
    /// Create a parameter at its default value with no keyframes.
    pub fn new(spec: ParameterSpec) -> Self {
        let default_normalized = spec.normalized(spec.default);
        Self {
            spec,
            automation: RwLock::new(ParameterAutomation::new(default_normalized)),
        }
    }

    /// The parameter's static description.
    pub fn spec(&self) -> &ParameterSpec {
        &self.spec
    }

    /// Real value at a clip-local time.
    pub fn real_value_at(&self, seconds: f64) -> f64 {
        self.spec.real_value(self.automation.read().value_for_time(seconds))
    }

    /// Normalized value at a clip-local time.
    pub fn normalized_at(&self, seconds: f64) -> f64 {
        self.automation.read().value_for_time(seconds)
    }

    /// Mutate the automation timeline (keyframe edits, gestures).
    pub fn with_automation<R>(&self, f: impl FnOnce(&mut ParameterAutomation) -> R) -> R {
        f(&mut self.automation.write())
    }

    /// Read the automation timeline.
    pub fn read_automation<R>(&self, f: impl FnOnce(&ParameterAutomation) -> R) -> R {
        f(&self.automation.read())
    }

    /// Replace the automation timeline wholesale (persistence restore).
    pub fn restore_automation(&self, automation: ParameterAutomation) {
        *self.automation.write() = automation;
    }
}

// ── Built-in clip parameters ────────────────────────────────────

const CLIP_PARAMS: [ParameterSpec; 7] = [
    ParameterSpec::new("alpha", "Alpha", 0.0, 1.0, 1.0),
    ParameterSpec::new("zoom", "Zoom", 0.0, 2.0, 1.0),
    ParameterSpec::new("pan_x", "Pan X", -1.0, 1.0, 0.0),
    ParameterSpec::new("pan_y", "Pan Y", -1.0, 1.0, 0.0),
    ParameterSpec::new("rotation", "Rotation", -180.0, 180.0, 0.0),
    ParameterSpec::new("gain", "Gain", 0.0, 2.0, 1.0),
    ParameterSpec::new("pan", "Pan", -1.0, 1.0, 0.0),
];

/// Evaluated geometry of a clip at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipGeometry {
    pub alpha: f32,
    pub zoom: f32,
    pub pan_x: f32,
    pub pan_y: f32,
    pub rotation: f32,
}

impl ClipGeometry {
    /// Whether the clip draws 1:1 with full opacity.
    pub fn is_neutral(&self) -> bool {
        self.alpha >= 1.0
            && (self.zoom - 1.0).abs() < 1e-6
            && self.pan_x.abs() < 1e-6
            && self.pan_y.abs() < 1e-6
            && self.rotation.abs() < 1e-6
    }

    /// Placement transform for a canvas of the given size.
    pub fn placement(&self, canvas_width: f32, canvas_height: f32) -> PlacementTransform {
        PlacementTransform::new(
            canvas_width,
            canvas_height,
            self.zoom,
            self.pan_x,
            self.pan_y,
            self.rotation,
        )
    }
}

/// Automation for a clip's built-in parameters (opacity and geometry).
pub struct ClipParameterController {
    parameters: Vec<AutomatedParameter>,
}

impl ClipParameterController {
    /// Create a controller with all built-in parameters at defaults.
    pub fn new() -> Self {
        Self {
            parameters: CLIP_PARAMS.iter().cloned().map(AutomatedParameter::new).collect(),
        }
    }

    /// All built-in parameters, in declaration order.
    pub fn parameters(&self) -> &[AutomatedParameter] {
        &self.parameters
    }

    /// Look up a parameter by its persistence id.
    pub fn parameter(&self, id: &str) -> Option<&AutomatedParameter> {
        self.parameters.iter().find(|p| p.spec().id == id)
    }

    /// Evaluate the clip geometry at a clip-local time.
    pub fn geometry_at(&self, seconds: f64) -> ClipGeometry {
        ClipGeometry {
            alpha: self.parameters[0].real_value_at(seconds) as f32,
            zoom: self.parameters[1].real_value_at(seconds) as f32,
            pan_x: self.parameters[2].real_value_at(seconds) as f32,
            pan_y: self.parameters[3].real_value_at(seconds) as f32,
            rotation: self.parameters[4].real_value_at(seconds) as f32,
        }
    }

    /// Evaluate the clip's audio gain and stereo pan at a clip-local time.
    pub fn audio_levels_at(&self, seconds: f64) -> (f32, f32) {
        (
            self.parameters[5].real_value_at(seconds) as f32,
            self.parameters[6].real_value_at(seconds) as f32,
        )
    }
}

impl Default for ClipParameterController {
    fn default() -> Self {
        Self::new()
    }
}

// ── Processor controllers ───────────────────────────────────────

/// Pairs one processor instance with the automation of its parameters.
///
/// The compositor calls [`update_automation`](Self::update_automation) once
/// per mix/render step, always before the processing entry point runs, so a
/// processor only ever sees values evaluated for the block it is processing.
pub struct ProcessorController<P: ?Sized> {
    id: Uuid,
    identifier: String,
    name: String,
    active: AtomicBool,
    parameters: Vec<AutomatedParameter>,
    values: Mutex<Vec<f64>>,
    processor: Mutex<Box<P>>,
}

/// Controller for an audio processor.
pub type AudioProcessorController = ProcessorController<dyn AudioClipProcessor>;
/// Controller for a video processor.
pub type VideoProcessorController = ProcessorController<dyn VideoClipProcessor>;

impl<P: ?Sized> ProcessorController<P> {
    fn build(identifier: String, name: String, specs: Vec<ParameterSpec>, processor: Box<P>) -> Self {
        let values = specs.iter().map(|s| s.default).collect();
        Self {
            id: Uuid::new_v4(),
            identifier,
            name,
            active: AtomicBool::new(true),
            parameters: specs.into_iter().map(AutomatedParameter::new).collect(),
            values: Mutex::new(values),
            processor: Mutex::new(processor),
        }
    }

    /// Unique controller id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Stable processor identifier (persistence key).
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the processor participates in processing.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Enable or bypass the processor.
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    /// The processor's automated parameters.
    pub fn parameters(&self) -> &[AutomatedParameter] {
        &self.parameters
    }

    /// Look up a parameter by its persistence id.
    pub fn parameter(&self, id: &str) -> Option<&AutomatedParameter> {
        self.parameters.iter().find(|p| p.spec().id == id)
    }

    /// Evaluate every parameter at a clip-local time. The values are held
    /// for the next processing call; the vector is reused, not reallocated.
    pub fn update_automation(&self, seconds: f64) {
        let mut values = self.values.lock();
        for (slot, param) in values.iter_mut().zip(&self.parameters) {
            *slot = param.real_value_at(seconds);
        }
    }
}

impl AudioProcessorController {
    /// Wrap an audio processor.
    pub fn from_audio(processor: Box<dyn AudioClipProcessor>) -> Self {
        let identifier = processor.identifier().to_string();
        let name = processor.display_name().to_string();
        let specs = processor.parameter_specs();
        Self::build(identifier, name, specs, processor)
    }

    /// Run the processor over one audio block with the values captured by
    /// the latest `update_automation`.
    pub fn process_block(&self, block: &mut SampleBuffer) {
        if !self.is_active() {
            return;
        }
        let values = self.values.lock();
        self.processor.lock().process(block, &values);
    }
}

impl VideoProcessorController {
    /// Wrap a video processor.
    pub fn from_video(processor: Box<dyn VideoClipProcessor>) -> Self {
        let identifier = processor.identifier().to_string();
        let name = processor.display_name().to_string();
        let specs = processor.parameter_specs();
        Self::build(identifier, name, specs, processor)
    }

    /// Run the processor over one frame with the values captured by the
    /// latest `update_automation`.
    pub fn process_image(&self, image: &mut Image) {
        if !self.is_active() {
            return;
        }
        let values = self.values.lock();
        self.processor.lock().process(image, &values);
    }
}
