//! Montage Timeline - The clip model and compositor
//!
//! Implements the timeline layer of the engine:
//! - `TimelineSource`: the polymorphic media-source interface, with
//!   `MovieClip` and `ImageClip` implementations
//! - `ClipDescriptor`: placement, flags, effect chains and automation for
//!   one placed clip
//! - `ComposedClip`: the compositor driving per-block audio mixing and
//!   per-frame video compositing
//! - Mixer strategy traits with default implementations
//! - The persisted-state model

pub mod compositor;
pub mod controllers;
pub mod descriptor;
pub mod job;
pub mod mixers;
pub mod persist;
pub mod processors;
pub mod source;

pub use compositor::{ComposedClip, JobScheduler, TimelineEvent};
pub use controllers::{
    AudioProcessorController, AutomatedParameter, ClipGeometry, ClipParameterController,
    ParameterSpec, VideoProcessorController,
};
pub use descriptor::ClipDescriptor;
pub use job::{BackgroundJob, JobOutcome};
pub use mixers::{AudioMixer, DefaultAudioMixer, DefaultVideoMixer, VideoMixer};
pub use persist::{CompositionFile, CompositionState, DescriptorState, ProcessorState};
pub use processors::{
    AudioClipProcessor, BrightnessProcessor, GainProcessor, VideoClipProcessor,
};
pub use source::{ImageClip, MovieClip, TimelineSource};
