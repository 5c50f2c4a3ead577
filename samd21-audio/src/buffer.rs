//! Owned mono PCM sample buffers.

use core::ops::{Deref, DerefMut};

use heapless::Vec;

use crate::constants::AUDIO_BUFFER_CAPACITY;
use crate::error::{Error, Result};

/// A length-bearing buffer of signed 16-bit mono samples.
///
/// Buffers move by value between stream stages. A zero-length buffer marks
/// end of stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioBuffer {
    samples: Vec<i16, AUDIO_BUFFER_CAPACITY>,
}

impl AudioBuffer {
    /// An empty buffer.
    pub const fn new() -> Self {
        AudioBuffer {
            samples: Vec::new(),
        }
    }

    /// Copy `samples` into a new buffer.
    pub fn from_slice(samples: &[i16]) -> Result<Self> {
        let samples = Vec::from_slice(samples).map_err(|_| Error::InvalidArgument)?;
        Ok(AudioBuffer { samples })
    }

    /// Append one sample. Fails when the buffer is full.
    pub fn push(&mut self, sample: i16) -> Result<()> {
        self.samples.push(sample).map_err(|_| Error::ResourceExhausted)
    }

    pub fn is_full(&self) -> bool {
        self.samples.is_full()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Maximum number of samples.
    pub const fn capacity() -> usize {
        AUDIO_BUFFER_CAPACITY
    }
}

impl Deref for AudioBuffer {
    type Target = [i16];

    fn deref(&self) -> &[i16] {
        &self.samples
    }
}

impl DerefMut for AudioBuffer {
    fn deref_mut(&mut self) -> &mut [i16] {
        &mut self.samples
    }
}
