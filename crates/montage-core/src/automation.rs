//! Keyframe automation for a single normalized parameter.
//!
//! Values live in the normalized `[0, 1]` domain; mapping to a parameter's
//! real range is the owning controller's job. Interpolation is linear with
//! the boundary values clamped outside the keyframe range.
//!
//! Live edits go through a "gesture": while the user holds a control,
//! `set_value` records their input; outside a gesture it is ignored so that
//! automation playback cannot be overwritten by stray setter calls.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single automation keyframe: time in seconds, normalized value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    /// Time in seconds, relative to the owning clip.
    pub time: f64,
    /// Normalized value in `[0, 1]`.
    pub value: f64,
}

impl Keyframe {
    /// Create a keyframe, clamping the value to the normalized domain.
    pub fn new(time: f64, value: f64) -> Self {
        Self {
            time,
            value: value.clamp(0.0, 1.0),
        }
    }
}

/// Keyframe timeline for one parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterAutomation {
    /// Fallback value used while no keyframes exist.
    value: f64,
    /// Keyframes sorted by time.
    keyframes: Vec<Keyframe>,
    /// Whether a user gesture is currently accepting live values.
    #[serde(skip)]
    gesture_in_progress: bool,
}

impl ParameterAutomation {
    /// Create an automation timeline with the given default value.
    pub fn new(default_value: f64) -> Self {
        Self {
            value: default_value.clamp(0.0, 1.0),
            keyframes: Vec::new(),
            gesture_in_progress: false,
        }
    }

    /// Current scalar value (the fallback used when no keyframes exist).
    #[inline]
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Evaluate the automation at a point in time.
    pub fn value_for_time(&self, time: f64) -> f64 {
        let first = match self.keyframes.first() {
            Some(kf) => kf,
            None => return self.value,
        };
        if time <= first.time {
            return first.value;
        }
        let last = self.keyframes.last().unwrap();
        if time >= last.time {
            return last.value;
        }

        let idx = self.keyframes.partition_point(|kf| kf.time <= time);
        let a = self.keyframes[idx - 1];
        let b = self.keyframes[idx];

        let span = b.time - a.time;
        if span <= 0.0 {
            // Two keyframes at the same instant bracket this query
            return (a.value + b.value) * 0.5;
        }
        let t = ((time - a.time) / span).clamp(0.0, 1.0);
        a.value + (b.value - a.value) * t
    }

    /// Begin a user gesture. Subsequent `set_value` calls are accepted
    /// until [`finish_gesture`](Self::finish_gesture).
    pub fn start_gesture(&mut self) {
        self.gesture_in_progress = true;
    }

    /// End the current user gesture.
    pub fn finish_gesture(&mut self) {
        self.gesture_in_progress = false;
    }

    /// Whether a gesture is currently in progress.
    #[inline]
    pub fn is_gesture_in_progress(&self) -> bool {
        self.gesture_in_progress
    }

    /// Record a live value at `time`. Ignored outside a gesture. With no
    /// keyframes this sets the scalar value directly; otherwise it records
    /// a keyframe at `time`, replacing one already at that exact time.
    pub fn set_value(&mut self, time: f64, value: f64) {
        if !self.gesture_in_progress {
            return;
        }
        let value = value.clamp(0.0, 1.0);
        if self.keyframes.is_empty() {
            self.value = value;
        } else if !self.set_keyframe(time, value) {
            self.add_keyframe(time, value);
        }
    }

    /// Insert a keyframe, keeping the list sorted. Multiple keyframes may
    /// share a time; insertion order is preserved among equals.
    pub fn add_keyframe(&mut self, time: f64, value: f64) {
        let kf = Keyframe::new(time, value);
        let pos = self.keyframes.partition_point(|existing| existing.time <= time);
        self.keyframes.insert(pos, kf);
    }

    /// Update the value of the keyframe at exactly `time`.
    /// Returns false if no keyframe exists there.
    pub fn set_keyframe(&mut self, time: f64, value: f64) -> bool {
        match self.keyframes.iter_mut().find(|kf| kf.time == time) {
            Some(kf) => {
                kf.value = value.clamp(0.0, 1.0);
                self.keyframes.sort_by(|a, b| a.time.total_cmp(&b.time));
                true
            }
            None => false,
        }
    }

    /// Remove the first keyframe at exactly `time`. Returns whether one
    /// was removed.
    pub fn delete_keyframe(&mut self, time: f64) -> bool {
        match self.keyframes.iter().position(|kf| kf.time == time) {
            Some(pos) => {
                self.keyframes.remove(pos);
                self.keyframes.sort_by(|a, b| a.time.total_cmp(&b.time));
                true
            }
            None => false,
        }
    }

    /// All keyframes, sorted by time.
    pub fn keyframes(&self) -> &[Keyframe] {
        &self.keyframes
    }

    /// Number of keyframes.
    pub fn len(&self) -> usize {
        self.keyframes.len()
    }

    /// Whether the timeline has no keyframes.
    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }
}

impl Default for ParameterAutomation {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl fmt::Display for ParameterAutomation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ParameterAutomation({} keyframes, value {:.3})",
            self.keyframes.len(),
            self.value
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_returns_scalar_value() {
        let auto = ParameterAutomation::new(0.7);
        assert_eq!(auto.value_for_time(0.0), 0.7);
        assert_eq!(auto.value_for_time(1000.0), 0.7);
        assert_eq!(auto.value_for_time(-5.0), 0.7);
    }

    #[test]
    fn test_linear_interpolation() {
        let mut auto = ParameterAutomation::new(0.0);
        auto.add_keyframe(0.0, 0.0);
        auto.add_keyframe(10.0, 1.0);
        assert!((auto.value_for_time(5.0) - 0.5).abs() < 1e-9);
        assert!((auto.value_for_time(2.5) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_boundary_clamp_no_extrapolation() {
        let mut auto = ParameterAutomation::new(0.0);
        auto.add_keyframe(1.0, 0.2);
        auto.add_keyframe(3.0, 0.8);
        assert_eq!(auto.value_for_time(0.0), 0.2);
        assert_eq!(auto.value_for_time(5.0), 0.8);
    }

    #[test]
    fn test_same_time_keyframes() {
        let mut auto = ParameterAutomation::new(0.0);
        auto.add_keyframe(0.0, 0.0);
        auto.add_keyframe(2.0, 0.4);
        auto.add_keyframe(2.0, 0.8);
        auto.add_keyframe(4.0, 1.0);
        assert_eq!(auto.len(), 4);
        // Queries at the duplicated time continue from the later duplicate
        assert!((auto.value_for_time(2.0) - 0.8).abs() < 1e-9);
        assert!((auto.value_for_time(3.0) - 0.9).abs() < 1e-9);
        // Approaching from the left interpolates toward the earlier duplicate
        assert!((auto.value_for_time(1.0) - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_values_clamped_to_unit_range() {
        let mut auto = ParameterAutomation::new(2.0);
        assert_eq!(auto.value(), 1.0);
        auto.add_keyframe(0.0, -3.0);
        assert_eq!(auto.keyframes()[0].value, 0.0);
    }

    #[test]
    fn test_set_value_requires_gesture() {
        let mut auto = ParameterAutomation::new(0.5);
        auto.set_value(0.0, 0.9);
        assert_eq!(auto.value(), 0.5);

        auto.start_gesture();
        auto.set_value(0.0, 0.9);
        auto.finish_gesture();
        assert_eq!(auto.value(), 0.9);
        assert!(auto.is_empty());
    }

    #[test]
    fn test_set_value_records_keyframes_when_some_exist() {
        let mut auto = ParameterAutomation::new(0.0);
        auto.add_keyframe(0.0, 0.1);

        auto.start_gesture();
        auto.set_value(2.0, 0.6);
        auto.set_value(2.0, 0.7); // same time: replaces, no duplicate
        auto.finish_gesture();

        assert_eq!(auto.len(), 2);
        assert!((auto.value_for_time(2.0) - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_delete_keyframe() {
        let mut auto = ParameterAutomation::new(0.0);
        auto.add_keyframe(0.0, 0.1);
        auto.add_keyframe(1.0, 0.9);
        assert!(auto.delete_keyframe(1.0));
        assert!(!auto.delete_keyframe(1.0));
        assert_eq!(auto.len(), 1);
    }

    #[test]
    fn test_keyframes_stay_sorted() {
        let mut auto = ParameterAutomation::new(0.0);
        auto.add_keyframe(3.0, 0.3);
        auto.add_keyframe(1.0, 0.1);
        auto.add_keyframe(2.0, 0.2);
        let times: Vec<f64> = auto.keyframes().iter().map(|kf| kf.time).collect();
        assert_eq!(times, vec![1.0, 2.0, 3.0]);
    }
}
