//! Pooled interleaved audio buffers.

use std::fmt;
use std::sync::Arc;

use crate::error::{Result, StrataError};
use crate::format::AudioFormat;
use crate::pool::{MemoryPool, PoolBuffer};

/// Default sample rate of synthesized audio.
pub const DEFAULT_FREQUENCY: u32 = 48_000;

/// Default channel count of synthesized audio.
pub const DEFAULT_CHANNELS: u32 = 2;

/// What a caller asks of `Frame::get_audio`. Zero fields are left to the
/// producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AudioRequest {
    pub format: AudioFormat,
    pub frequency: u32,
    pub channels: u32,
    pub samples: u32,
}

impl AudioRequest {
    pub fn new(format: AudioFormat, frequency: u32, channels: u32, samples: u32) -> Self {
        Self {
            format,
            frequency,
            channels,
            samples,
        }
    }

    /// Signed 16-bit with every other parameter left open.
    pub fn s16() -> Self {
        Self {
            format: AudioFormat::S16,
            ..Self::default()
        }
    }
}

/// A block of interleaved samples.
#[derive(Clone)]
pub struct Audio {
    format: AudioFormat,
    frequency: u32,
    channels: u32,
    samples: u32,
    buffer: Arc<PoolBuffer>,
}

impl Audio {
    /// Allocate silence.
    pub fn silence(
        pool: &MemoryPool,
        format: AudioFormat,
        frequency: u32,
        channels: u32,
        samples: u32,
    ) -> Result<Self> {
        if format == AudioFormat::None || channels == 0 {
            return Err(StrataError::UnsupportedFormat(format!(
                "{} audio with {} channels",
                format, channels
            )));
        }
        let buffer = pool.alloc_zeroed(format.buffer_size(channels, samples))?;
        Ok(Self {
            format,
            frequency,
            channels,
            samples,
            buffer: Arc::new(buffer),
        })
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    /// Samples per channel.
    pub fn samples(&self) -> u32 {
        self.samples
    }

    pub fn data(&self) -> &[u8] {
        self.buffer.as_slice()
    }

    /// Interleaved 16-bit samples; empty for other formats.
    pub fn as_s16(&self) -> &[i16] {
        match self.format {
            AudioFormat::S16 => self.buffer.cast::<i16>(),
            _ => &[],
        }
    }

    /// Writable 16-bit samples, copying a shared block first.
    pub fn as_s16_mut(&mut self) -> Result<&mut [i16]> {
        if self.format != AudioFormat::S16 {
            return Err(StrataError::UnsupportedFormat(format!(
                "{} samples viewed as s16",
                self.format
            )));
        }
        self.unique_buffer().map(|buffer| buffer.cast_mut::<i16>())
    }

    pub fn as_f32(&self) -> &[f32] {
        match self.format {
            AudioFormat::Float => self.buffer.cast::<f32>(),
            _ => &[],
        }
    }

    pub fn as_f32_mut(&mut self) -> Result<&mut [f32]> {
        if self.format != AudioFormat::Float {
            return Err(StrataError::UnsupportedFormat(format!(
                "{} samples viewed as float",
                self.format
            )));
        }
        self.unique_buffer().map(|buffer| buffer.cast_mut::<f32>())
    }

    pub fn as_s32(&self) -> &[i32] {
        match self.format {
            AudioFormat::S32 => self.buffer.cast::<i32>(),
            _ => &[],
        }
    }

    fn unique_buffer(&mut self) -> Result<&mut PoolBuffer> {
        if Arc::get_mut(&mut self.buffer).is_none() {
            self.buffer = Arc::new(self.buffer.try_clone()?);
        }
        Arc::get_mut(&mut self.buffer)
            .ok_or_else(|| StrataError::Internal("audio buffer still shared".into()))
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.buffer.as_ptr()
    }

    /// Whether every sample is zero.
    pub fn is_silent(&self) -> bool {
        self.data().iter().all(|&b| b == 0)
    }
}

impl fmt::Debug for Audio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Audio")
            .field("format", &self.format)
            .field("frequency", &self.frequency)
            .field("channels", &self.channels)
            .field("samples", &self.samples)
            .finish()
    }
}
