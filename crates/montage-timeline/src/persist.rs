//! Typed persisted-state model with versioning.
//!
//! One node per clip descriptor, child nodes per processor, automation as
//! explicit keyframe lists. The same snapshot/restore pass also backs
//! [`ComposedClip::duplicate`](crate::ComposedClip::duplicate).
//!
//! Restoring needs a source resolver because opening media backends is
//! outside this engine: the caller maps each persisted source identity to
//! a live [`TimelineSource`].

use crate::compositor::{ComposedClip, JobScheduler};
use crate::controllers::AutomatedParameter;
use crate::descriptor::ClipDescriptor;
use crate::processors::{builtin_audio_processor, builtin_video_processor};
use crate::source::TimelineSource;
use montage_core::{
    AudioStreamSettings, Keyframe, MontageError, ParameterAutomation, Result, VideoStreamSettings,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use tracing::warn;

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// One parameter's persisted automation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationState {
    /// Parameter id within its owner.
    pub parameter: String,
    /// Scalar fallback value (normalized).
    pub value: f64,
    /// Keyframes, sorted by time.
    pub keyframes: Vec<Keyframe>,
}

/// One processor in a chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorState {
    /// Stable processor identifier.
    pub identifier: String,
    /// Display name.
    pub name: String,
    /// Whether the processor is active or bypassed.
    pub active: bool,
    /// Per-parameter automation.
    pub automation: Vec<AutomationState>,
}

/// One placed clip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptorState {
    /// Source identity (path, URL, or composition name).
    pub source: String,
    /// Timeline start in seconds.
    pub start: f64,
    /// Length in seconds.
    pub length: f64,
    /// Source offset in seconds.
    pub offset: f64,
    /// Whether the clip renders video.
    pub visible: bool,
    /// Whether the clip contributes audio.
    pub audio_enabled: bool,
    /// User-facing description.
    pub description: String,
    /// Automation of the clip's built-in parameters.
    pub clip_parameters: Vec<AutomationState>,
    /// Audio processor chain in order.
    pub audio_processors: Vec<ProcessorState>,
    /// Video processor chain in order.
    pub video_processors: Vec<ProcessorState>,
}

/// A whole composition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositionState {
    /// Composition name.
    pub name: String,
    /// Output audio format.
    pub audio_settings: AudioStreamSettings,
    /// Output video format.
    pub video_settings: VideoStreamSettings,
    /// Descriptors in z-order.
    pub descriptors: Vec<DescriptorState>,
}

/// Versioned file wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositionFile {
    /// Schema version for migration.
    pub version: u32,
    /// The composition data.
    pub composition: CompositionState,
    /// Application version that wrote this file.
    pub app_version: String,
}

impl CompositionFile {
    /// Wrap a composition state for writing.
    pub fn new(composition: CompositionState) -> Self {
        Self {
            version: CURRENT_VERSION,
            composition,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Serialize to JSON bytes.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| MontageError::Serialization(format!("Failed to serialize: {}", e)))
    }

    /// Deserialize from JSON bytes, rejecting newer schema versions.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let raw: serde_json::Value = serde_json::from_slice(data)
            .map_err(|e| MontageError::Serialization(format!("Invalid JSON: {}", e)))?;

        let version = raw.get("version").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
        if version > CURRENT_VERSION {
            return Err(MontageError::Serialization(format!(
                "File version {} is newer than supported version {}",
                version, CURRENT_VERSION
            )));
        }

        serde_json::from_value(raw)
            .map_err(|e| MontageError::Serialization(format!("Failed to parse: {}", e)))
    }

    /// Save to a file path.
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<()> {
        let data = self.to_json()?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Load from a file path.
    pub fn load_from_file(path: &std::path::Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_json(&data)
    }
}

// ── Snapshot ────────────────────────────────────────────────────

fn snapshot_parameter(parameter: &AutomatedParameter) -> AutomationState {
    parameter.read_automation(|automation| AutomationState {
        parameter: parameter.spec().id.to_string(),
        value: automation.value(),
        keyframes: automation.keyframes().to_vec(),
    })
}

fn snapshot_descriptor(descriptor: &ClipDescriptor) -> DescriptorState {
    DescriptorState {
        source: descriptor.clip().name(),
        start: descriptor.start(),
        length: descriptor.length(),
        offset: descriptor.offset(),
        visible: descriptor.is_visible(),
        audio_enabled: descriptor.is_audio_enabled(),
        description: descriptor.description(),
        clip_parameters: descriptor
            .clip_parameters()
            .parameters()
            .iter()
            .map(snapshot_parameter)
            .collect(),
        audio_processors: descriptor.with_audio_processors(|chain| {
            chain
                .iter()
                .map(|c| ProcessorState {
                    identifier: c.identifier().to_string(),
                    name: c.name().to_string(),
                    active: c.is_active(),
                    automation: c.parameters().iter().map(snapshot_parameter).collect(),
                })
                .collect()
        }),
        video_processors: descriptor.with_video_processors(|chain| {
            chain
                .iter()
                .map(|c| ProcessorState {
                    identifier: c.identifier().to_string(),
                    name: c.name().to_string(),
                    active: c.is_active(),
                    automation: c.parameters().iter().map(snapshot_parameter).collect(),
                })
                .collect()
        }),
    }
}

/// Capture the serializable placement/automation tree of a composition.
pub fn snapshot(composed: &ComposedClip) -> CompositionState {
    CompositionState {
        name: composed.name(),
        audio_settings: composed.audio_settings(),
        video_settings: composed.video_settings(),
        descriptors: composed
            .descriptors()
            .iter()
            .map(|d| snapshot_descriptor(d))
            .collect(),
    }
}

// ── Restore ─────────────────────────────────────────────────────

fn automation_from_state(state: &AutomationState) -> ParameterAutomation {
    let mut automation = ParameterAutomation::new(state.value);
    for keyframe in &state.keyframes {
        automation.add_keyframe(keyframe.time, keyframe.value);
    }
    automation
}

fn restore_parameters(parameters: &[AutomatedParameter], states: &[AutomationState]) {
    for state in states {
        match parameters.iter().find(|p| p.spec().id == state.parameter) {
            Some(parameter) => parameter.restore_automation(automation_from_state(state)),
            None => warn!(parameter = %state.parameter, "unknown parameter in persisted state"),
        }
    }
}

fn restore_processors(descriptor: &ClipDescriptor, state: &DescriptorState) {
    for processor_state in &state.audio_processors {
        let Some(processor) = builtin_audio_processor(&processor_state.identifier) else {
            warn!(identifier = %processor_state.identifier, "unknown audio processor, dropped");
            continue;
        };
        let id = descriptor.add_audio_processor(processor);
        descriptor.with_audio_processors(|chain| {
            if let Some(controller) = chain.iter().find(|c| c.id() == id) {
                controller.set_active(processor_state.active);
                restore_parameters(controller.parameters(), &processor_state.automation);
            }
        });
    }
    for processor_state in &state.video_processors {
        let Some(processor) = builtin_video_processor(&processor_state.identifier) else {
            warn!(identifier = %processor_state.identifier, "unknown video processor, dropped");
            continue;
        };
        let id = descriptor.add_video_processor(processor);
        descriptor.with_video_processors(|chain| {
            if let Some(controller) = chain.iter().find(|c| c.id() == id) {
                controller.set_active(processor_state.active);
                restore_parameters(controller.parameters(), &processor_state.automation);
            }
        });
    }
}

/// Rebuild a composition from persisted state.
///
/// `resolver` maps each persisted source identity to a live source; a
/// source it cannot resolve is skipped with a warning and the composition
/// plays without it.
pub fn restore(
    state: &CompositionState,
    scheduler: Option<Weak<dyn JobScheduler>>,
    resolver: impl Fn(&str) -> Option<Arc<dyn TimelineSource>>,
) -> Result<Arc<ComposedClip>> {
    let composed = ComposedClip::new(
        state.name.clone(),
        state.audio_settings,
        state.video_settings,
    );
    if let Some(scheduler) = scheduler {
        composed.connect_scheduler(scheduler);
    }

    for descriptor_state in &state.descriptors {
        let Some(source) = resolver(&descriptor_state.source) else {
            warn!(source = %descriptor_state.source, "unresolved source, clip skipped");
            continue;
        };
        let descriptor = composed.add_clip(
            source,
            descriptor_state.start,
            descriptor_state.length,
            descriptor_state.offset,
        );
        descriptor.set_visible(descriptor_state.visible);
        descriptor.set_audio_enabled(descriptor_state.audio_enabled);
        descriptor.set_description(descriptor_state.description.clone());
        restore_parameters(
            descriptor.clip_parameters().parameters(),
            &descriptor_state.clip_parameters,
        );
        restore_processors(&descriptor, descriptor_state);
    }

    Ok(composed)
}
