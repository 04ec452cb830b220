//! Planar audio blocks passed between fifos, mixers and the compositor.

use montage_core::AudioStreamSettings;

/// An owned block of multichannel audio, one contiguous buffer per channel.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    channels: Vec<Vec<f32>>,
    num_samples: usize,
}

impl SampleBuffer {
    /// Create a zeroed buffer.
    pub fn new(num_channels: usize, num_samples: usize) -> Self {
        Self {
            channels: vec![vec![0.0; num_samples]; num_channels],
            num_samples,
        }
    }

    /// Create a zeroed buffer sized for one default block of a stream.
    pub fn for_settings(settings: &AudioStreamSettings) -> Self {
        Self::new(settings.num_channels, settings.default_num_samples)
    }

    /// Number of channels.
    #[inline]
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Number of samples per channel.
    #[inline]
    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    /// One channel's samples.
    #[inline]
    pub fn channel(&self, ch: usize) -> &[f32] {
        &self.channels[ch]
    }

    /// One channel's samples, mutably.
    #[inline]
    pub fn channel_mut(&mut self, ch: usize) -> &mut [f32] {
        &mut self.channels[ch]
    }

    /// Zero every channel.
    pub fn clear(&mut self) {
        for ch in &mut self.channels {
            ch.fill(0.0);
        }
    }

    /// Multiply every sample by a gain.
    pub fn apply_gain(&mut self, gain: f32) {
        for ch in &mut self.channels {
            for s in ch.iter_mut() {
                *s *= gain;
            }
        }
    }

    /// Accumulate another buffer into this one with a per-channel gain.
    ///
    /// Channel counts beyond `other`'s are left untouched; sample counts
    /// are clamped to the shorter of the two buffers.
    pub fn add_from(&mut self, other: &SampleBuffer, channel_gains: &[f32]) {
        let samples = self.num_samples.min(other.num_samples);
        for (ch, dest) in self.channels.iter_mut().enumerate() {
            if ch >= other.num_channels() {
                break;
            }
            let gain = channel_gains.get(ch).copied().unwrap_or(1.0);
            let src = other.channel(ch);
            for i in 0..samples {
                dest[i] += src[i] * gain;
            }
        }
    }

    /// Peak absolute sample value across all channels.
    pub fn magnitude(&self) -> f32 {
        self.channels
            .iter()
            .flat_map(|ch| ch.iter())
            .fold(0.0f32, |acc, s| acc.max(s.abs()))
    }
}
