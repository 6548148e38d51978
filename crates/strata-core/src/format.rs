//! Image and audio sample formats.

use serde::{Deserialize, Serialize};

/// Pixel layout of an image buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// No preference; the producer picks.
    #[default]
    None,
    /// Packed 8-bit R, G, B.
    Rgb24,
    /// Packed 8-bit R, G, B, A.
    Rgb24a,
    /// Packed 4:2:2 in Y0 U Y1 V order.
    Yuv422,
    /// Planar 4:2:0: full Y plane, then quarter-size U and V planes.
    Yuv420p,
}

impl ImageFormat {
    pub const ALL: [ImageFormat; 4] = [
        ImageFormat::Rgb24,
        ImageFormat::Rgb24a,
        ImageFormat::Yuv422,
        ImageFormat::Yuv420p,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Rgb24 => "rgb24",
            Self::Rgb24a => "rgb24a",
            Self::Yuv422 => "yuv422",
            Self::Yuv420p => "yuv420p",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "none" => Some(Self::None),
            "rgb24" => Some(Self::Rgb24),
            "rgb24a" | "rgba" => Some(Self::Rgb24a),
            "yuv422" => Some(Self::Yuv422),
            "yuv420p" => Some(Self::Yuv420p),
            _ => None,
        }
    }

    /// Integer code used when the format is stored as a property.
    pub fn to_int(self) -> i32 {
        match self {
            Self::None => 0,
            Self::Rgb24 => 1,
            Self::Rgb24a => 2,
            Self::Yuv422 => 3,
            Self::Yuv420p => 4,
        }
    }

    pub fn from_int(code: i32) -> Self {
        match code {
            1 => Self::Rgb24,
            2 => Self::Rgb24a,
            3 => Self::Yuv422,
            4 => Self::Yuv420p,
            _ => Self::None,
        }
    }

    /// Bytes per pixel for packed formats, 0 for planar and `None`.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgb24 => 3,
            Self::Rgb24a => 4,
            Self::Yuv422 => 2,
            Self::Yuv420p | Self::None => 0,
        }
    }

    /// Total bytes for an image of this format.
    pub fn buffer_size(self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            Self::Yuv420p => {
                let chroma = (width as usize).div_ceil(2) * (height as usize).div_ceil(2);
                pixels + 2 * chroma
            }
            other => pixels * other.bytes_per_pixel(),
        }
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Sample layout of an interleaved audio buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    None,
    /// Signed 16-bit integer.
    S16,
    /// Signed 32-bit integer.
    S32,
    /// 32-bit float in -1.0..=1.0.
    Float,
}

impl AudioFormat {
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::S16 => "s16",
            Self::S32 => "s32",
            Self::Float => "float",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "none" => Some(Self::None),
            "s16" => Some(Self::S16),
            "s32" => Some(Self::S32),
            "float" | "f32" => Some(Self::Float),
            _ => None,
        }
    }

    pub fn to_int(self) -> i32 {
        match self {
            Self::None => 0,
            Self::S16 => 1,
            Self::S32 => 2,
            Self::Float => 3,
        }
    }

    pub fn from_int(code: i32) -> Self {
        match code {
            1 => Self::S16,
            2 => Self::S32,
            3 => Self::Float,
            _ => Self::None,
        }
    }

    pub fn sample_size(self) -> usize {
        match self {
            Self::None => 0,
            Self::S16 => 2,
            Self::S32 | Self::Float => 4,
        }
    }

    pub fn buffer_size(self, channels: u32, samples: u32) -> usize {
        channels as usize * samples as usize * self.sample_size()
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_buffer_sizes() {
        assert_eq!(ImageFormat::Rgb24.buffer_size(64, 64), 64 * 64 * 3);
        assert_eq!(ImageFormat::Rgb24a.buffer_size(2, 2), 16);
        assert_eq!(ImageFormat::Yuv422.buffer_size(720, 576), 720 * 576 * 2);
        assert_eq!(ImageFormat::Yuv420p.buffer_size(4, 4), 16 + 8);
        assert_eq!(ImageFormat::Yuv420p.buffer_size(3, 3), 9 + 8);
        assert_eq!(ImageFormat::None.buffer_size(10, 10), 0);
    }

    #[test]
    fn test_names_and_codes() {
        for format in ImageFormat::ALL {
            assert_eq!(ImageFormat::from_name(format.name()), Some(format));
            assert_eq!(ImageFormat::from_int(format.to_int()), format);
        }
        assert_eq!(AudioFormat::from_name("float"), Some(AudioFormat::Float));
        assert_eq!(AudioFormat::from_int(AudioFormat::S32.to_int()), AudioFormat::S32);
        assert_eq!(AudioFormat::S16.buffer_size(2, 1920), 7680);
    }
}
