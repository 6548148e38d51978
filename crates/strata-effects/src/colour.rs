//! Flat colour producer.

use strata_core::audio::{DEFAULT_CHANNELS, DEFAULT_FREQUENCY};
use strata_core::time::sample_calculator;
use strata_core::{
    Audio, AudioFormat, Context, Frame, Image, ImageFormat, Position, Producer, ProducerImpl,
    Result, StrataError,
};

/// Parse a colour as `[r, g, b, a]`.
///
/// Accepts `0xRRGGBBAA`, `#RRGGBB`, `#AARRGGBB` and the names `black`,
/// `white`, `red`, `green` and `blue`.
pub fn parse_colour(text: &str) -> Option<[u8; 4]> {
    let text = text.trim();
    let named = match text.to_ascii_lowercase().as_str() {
        "black" => Some([0, 0, 0, 255]),
        "white" => Some([255, 255, 255, 255]),
        "red" => Some([255, 0, 0, 255]),
        "green" => Some([0, 255, 0, 255]),
        "blue" => Some([0, 0, 255, 255]),
        _ => None,
    };
    if named.is_some() {
        return named;
    }
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        let value = u32::from_str_radix(hex, 16).ok()?;
        return Some(value.to_be_bytes());
    }
    let hex = text.strip_prefix('#')?;
    let value = u32::from_str_radix(hex, 16).ok()?;
    match hex.len() {
        6 => {
            let [_, r, g, b] = value.to_be_bytes();
            Some([r, g, b, 255])
        }
        8 => {
            let [a, r, g, b] = value.to_be_bytes();
            Some([r, g, b, a])
        }
        _ => None,
    }
}

/// Produces frames of one colour with silent audio. The `colour` property
/// is read per frame; the constructor argument sets it.
pub struct ColourProducer;

impl ColourProducer {
    pub fn create(ctx: &Context, arg: Option<&str>) -> Result<Producer> {
        let producer = Producer::new(ctx, ColourProducer);
        producer.set("colour", arg.unwrap_or("black"))?;
        Ok(producer)
    }
}

impl ProducerImpl for ColourProducer {
    fn produce(&self, producer: &Producer, position: Position) -> Result<Frame> {
        let text = producer.get("colour").unwrap_or_else(|| "black".into());
        let [r, g, b, a] = parse_colour(&text)
            .ok_or_else(|| StrataError::InvalidParameter(format!("unrecognised colour {text:?}")))?;

        let frame = Frame::from_context(producer.context(), position);
        frame.set("colour", &text)?;
        frame.push_get_image(move |frame, request| {
            let format = match request.format {
                ImageFormat::None => ImageFormat::Rgb24a,
                other => other,
            };
            let width = if request.width > 0 { request.width } else { frame.get_int("width").max(1) as u32 };
            let height = if request.height > 0 { request.height } else { frame.get_int("height").max(1) as u32 };
            let mut image = Image::alloc(frame.pool(), format, width, height)?;
            image.fill_colour(r, g, b, a)?;
            Ok(image)
        });
        frame.push_get_audio(|frame, request| {
            let format = match request.format {
                AudioFormat::None => AudioFormat::S16,
                other => other,
            };
            let frequency = if request.frequency > 0 { request.frequency } else { DEFAULT_FREQUENCY };
            let channels = if request.channels > 0 { request.channels } else { DEFAULT_CHANNELS };
            let samples = if request.samples > 0 {
                request.samples
            } else {
                sample_calculator(frame.fps(), frequency, frame.position())
            };
            Audio::silence(frame.pool(), format, frequency, channels, samples)
        });
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{AudioRequest, ImageRequest};

    #[test]
    fn test_parse_colour() {
        assert_eq!(parse_colour("0xff000080"), Some([255, 0, 0, 128]));
        assert_eq!(parse_colour("#00ff00"), Some([0, 255, 0, 255]));
        assert_eq!(parse_colour("#800000ff"), Some([0, 0, 255, 128]));
        assert_eq!(parse_colour("White"), Some([255, 255, 255, 255]));
        assert_eq!(parse_colour("#12345"), None);
        assert_eq!(parse_colour("mauve"), None);
    }

    #[test]
    fn test_flat_image_and_silence() {
        let ctx = Context::default();
        let producer = ColourProducer::create(&ctx, Some("0x10203040")).unwrap();
        let frame = producer.get_frame(0);
        let image = frame.get_image(ImageRequest::new(ImageFormat::None, 4, 2)).unwrap();
        assert_eq!(image.format(), ImageFormat::Rgb24a);
        assert_eq!(&image.data()[..8], &[0x10, 0x20, 0x30, 0x40, 0x10, 0x20, 0x30, 0x40]);
        assert!(!frame.is_test_card());

        let audio = frame.get_audio(AudioRequest::s16()).unwrap();
        assert_eq!(audio.samples(), 1920);
        assert!(audio.is_silent());
        assert!(!frame.is_test_audio());
    }

    #[test]
    fn test_bad_colour_yields_test_card() {
        let ctx = Context::default();
        let producer = ColourProducer::create(&ctx, Some("mauve")).unwrap();
        assert!(producer.get_frame(0).is_test_card());
    }
}
