//! Fixed pool of decoded video frames, randomly addressed by timecode.
//!
//! Unlike the audio fifo's linear counters this is a genuine ring of slots:
//! the consumer does not read strictly in order, it asks for "the frame
//! whose window contains this presentation time" and may land before or
//! after the last slot it viewed (small seeks, jitter between audio and
//! video clocks). A total miss falls back to the most recently written
//! frame — a stale frame is a renderable condition, not an error.

use montage_core::{VideoFrame, VideoStreamSettings};

/// Ring of frame slots written by a decoder and searched by timecode.
pub struct VideoFifo {
    settings: VideoStreamSettings,
    slots: Vec<VideoFrame>,
    read_index: usize,
    write_index: usize,
}

impl VideoFifo {
    /// Create a fifo with `num_slots` empty frame slots.
    pub fn new(settings: VideoStreamSettings, num_slots: usize) -> Self {
        assert!(num_slots >= 2, "VideoFifo needs at least two slots");
        // Empty slots share one placeholder image; pixel data is only
        // allocated by the producer as frames are written.
        let empty = VideoFrame::empty(settings.width, settings.height);
        Self {
            settings,
            slots: vec![empty; num_slots],
            read_index: 0,
            write_index: 0,
        }
    }

    /// Stream settings this fifo was configured with.
    #[inline]
    pub fn settings(&self) -> VideoStreamSettings {
        self.settings
    }

    /// Number of slots.
    #[inline]
    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }

    /// Exclusive access to the next slot in write order. The producer
    /// fills it, then commits with [`finish_writing`](Self::finish_writing).
    pub fn writing_frame(&mut self) -> &mut VideoFrame {
        &mut self.slots[self.write_index]
    }

    /// Commit the slot handed out by [`writing_frame`](Self::writing_frame).
    pub fn finish_writing(&mut self) {
        self.write_index = (self.write_index + 1) % self.slots.len();
    }

    /// Frames written but not yet viewed, the producer's backpressure
    /// signal. A producer must keep at least one slot free.
    pub fn available_frame_count(&self) -> usize {
        (self.write_index + self.slots.len() - self.read_index) % self.slots.len()
    }

    /// Whether the producer may write another frame without clobbering a
    /// slot the consumer has not viewed yet.
    pub fn has_free_slot(&self) -> bool {
        self.available_frame_count() + 1 < self.slots.len()
    }

    /// Find the frame whose window contains `tick` and commit the read
    /// cursor to it. On a total miss the most recently written frame is
    /// returned unchanged ("stale but best effort").
    pub fn frame_for(&mut self, tick: i64) -> VideoFrame {
        if let Some(idx) = self.find_slot(tick) {
            self.read_index = idx;
            return self.slots[idx].clone();
        }
        self.latest_frame()
    }

    /// Same search as [`frame_for`](Self::frame_for) without committing
    /// the read cursor; used to decide whether to wait before rendering.
    pub fn frame_available(&self, tick: i64) -> bool {
        self.find_slot(tick).is_some()
    }

    /// Most recent committed write, regardless of timecode. Live sources
    /// that cannot seek read only this.
    pub fn latest_frame(&self) -> VideoFrame {
        let idx = (self.write_index + self.slots.len() - 1) % self.slots.len();
        self.slots[idx].clone()
    }

    /// Reset both cursors and mark every slot as never written.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.timecode = VideoFrame::EMPTY_TIMECODE;
        }
        self.read_index = 0;
        self.write_index = 0;
    }

    /// Timecode-window search starting at the last-read slot, scanning the
    /// whole ring in write order. Frame windows are disjoint so the first
    /// hit is the only hit; empty slots never match.
    fn find_slot(&self, tick: i64) -> Option<usize> {
        let len = self.slots.len();
        for step in 0..len {
            let idx = (self.read_index + step) % len;
            let slot = &self.slots[idx];
            if slot.is_empty() {
                continue;
            }
            let delta = tick - slot.timecode;
            if delta >= 0 && delta < self.settings.default_duration {
                return Some(idx);
            }
        }
        None
    }
}
