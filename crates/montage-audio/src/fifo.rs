//! Lock-free single-producer single-consumer audio fifo addressed by
//! absolute sample position.
//!
//! The decoder thread (producer) pushes ahead of playback; the audio
//! callback (consumer) pulls. No mutexes — two atomic counters only. Unlike
//! an index-based ring, both counters are monotonically increasing absolute
//! positions on the clip's local sample timeline, so the consumer can tell
//! exactly which timeline range the buffered data covers and resynchronize
//! after an underrun.

use crate::buffer::SampleBuffer;
use std::sync::atomic::{AtomicI64, Ordering};

/// A SPSC fifo of planar f32 audio, addressed by absolute sample position.
///
/// Capacity checks are the producer's contract: callers poll
/// [`free_space`](Self::free_space) before pushing. `set_position` belongs
/// to the control thread and may only run while the producer is suspended.
pub struct AudioFifo {
    buffers: Vec<Box<[f32]>>,
    capacity: usize,
    read_position: AtomicI64,
    write_position: AtomicI64,
}

// SAFETY: Designed for SPSC use. Positions are accessed via atomics, and the
// sample ranges touched by reader and writer never overlap because the
// writer stays within free_space() and the reader within
// available_samples().
unsafe impl Send for AudioFifo {}
unsafe impl Sync for AudioFifo {}

impl AudioFifo {
    /// Create a fifo holding `capacity` samples per channel.
    pub fn new(num_channels: usize, capacity: usize) -> Self {
        Self {
            buffers: (0..num_channels)
                .map(|_| vec![0.0f32; capacity].into_boxed_slice())
                .collect(),
            capacity,
            read_position: AtomicI64::new(0),
            write_position: AtomicI64::new(0),
        }
    }

    /// Number of channels.
    #[inline]
    pub fn num_channels(&self) -> usize {
        self.buffers.len()
    }

    /// Capacity in samples per channel.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Absolute position the next pull will read from.
    #[inline]
    pub fn read_position(&self) -> i64 {
        self.read_position.load(Ordering::Acquire)
    }

    /// Absolute position the next push will write to.
    #[inline]
    pub fn write_position(&self) -> i64 {
        self.write_position.load(Ordering::Acquire)
    }

    /// Samples buffered and not yet pulled.
    pub fn available_samples(&self) -> usize {
        let w = self.write_position.load(Ordering::Acquire);
        let r = self.read_position.load(Ordering::Acquire);
        (w - r) as usize
    }

    /// Samples the producer may push without overtaking the reader.
    pub fn free_space(&self) -> usize {
        self.capacity - self.available_samples()
    }

    /// Push one block at the write cursor and advance it.
    ///
    /// The producer must have checked `free_space()`; pushing more than the
    /// free space is a scheduling bug, not a recoverable condition.
    pub fn push_samples(&self, buffer: &SampleBuffer) {
        let count = buffer.num_samples();
        debug_assert!(count <= self.free_space(), "AudioFifo overrun");
        debug_assert_eq!(buffer.num_channels(), self.num_channels());

        let w = self.write_position.load(Ordering::Relaxed);
        for (ch, ring) in self.buffers.iter().enumerate() {
            self.copy_in(ring, w, buffer.channel(ch));
        }
        self.write_position.store(w + count as i64, Ordering::Release);
    }

    /// Advance the write cursor by `count` samples of silence, used to
    /// cover gaps the decoder cannot fill.
    pub fn push_silence(&self, count: usize) {
        debug_assert!(count <= self.free_space(), "AudioFifo overrun");

        let w = self.write_position.load(Ordering::Relaxed);
        for ring in &self.buffers {
            let start = (w.rem_euclid(self.capacity as i64)) as usize;
            let first = (self.capacity - start).min(count);
            let second = count - first;

            // SAFETY: same SPSC write region as copy_in.
            let ring_ptr = ring.as_ptr() as *mut f32;
            unsafe {
                std::ptr::write_bytes(ring_ptr.add(start), 0, first);
                if second > 0 {
                    std::ptr::write_bytes(ring_ptr, 0, second);
                }
            }
        }
        self.write_position.store(w + count as i64, Ordering::Release);
    }

    /// Pull samples from the read cursor into `dest`, zero-filling any
    /// shortfall, and advance the cursor by the amount actually copied.
    /// Returns that amount. Never blocks, never allocates.
    pub fn pull_samples(&self, dest: &mut SampleBuffer) -> usize {
        let requested = dest.num_samples();
        let count = requested.min(self.available_samples());

        let r = self.read_position.load(Ordering::Relaxed);
        for ch in 0..self.num_channels().min(dest.num_channels()) {
            let ring = &self.buffers[ch];
            let out = dest.channel_mut(ch);
            Self::copy_out(ring, self.capacity, r, &mut out[..count]);
            out[count..requested].fill(0.0);
        }
        self.read_position.store(r + count as i64, Ordering::Release);
        count
    }

    /// Discard up to `count` buffered samples. Returns the number skipped.
    pub fn skip_samples(&self, count: usize) -> usize {
        let skipped = count.min(self.available_samples());
        self.read_position
            .fetch_add(skipped as i64, Ordering::AcqRel);
        skipped
    }

    /// Reset both cursors to an absolute position, emptying the fifo.
    /// Control-thread only: the producer must be suspended while seeking.
    pub fn set_position(&self, position: i64) {
        self.read_position.store(position, Ordering::Release);
        self.write_position.store(position, Ordering::Release);
    }

    /// Copy `data` into the ring starting at absolute position `pos`,
    /// wrapping at capacity.
    fn copy_in(&self, ring: &[f32], pos: i64, data: &[f32]) {
        let start = (pos.rem_euclid(self.capacity as i64)) as usize;
        let first = (self.capacity - start).min(data.len());
        let second = data.len() - first;

        // SAFETY: SPSC contract — only the producer writes, and only into
        // the free region the reader never touches.
        let ring_ptr = ring.as_ptr() as *mut f32;
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), ring_ptr.add(start), first);
            if second > 0 {
                std::ptr::copy_nonoverlapping(data[first..].as_ptr(), ring_ptr, second);
            }
        }
    }

    /// Copy out of the ring starting at absolute position `pos`.
    fn copy_out(ring: &[f32], capacity: usize, pos: i64, out: &mut [f32]) {
        let start = (pos.rem_euclid(capacity as i64)) as usize;
        let first = (capacity - start).min(out.len());
        let second = out.len() - first;

        out[..first].copy_from_slice(&ring[start..start + first]);
        if second > 0 {
            out[first..].copy_from_slice(&ring[..second]);
        }
    }
}
