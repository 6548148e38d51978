//! The frame: one unit of audio and video in flight through a service graph.
//!
//! A frame is a property store with three stacks:
//!
//! - the **image stack** and **audio stack** hold deferred transforms pushed
//!   by producers and filters. Nothing is computed until a consumer asks for
//!   the image or audio; the request then pops the newest transform, which
//!   usually asks the frame again for the image beneath it before applying
//!   its own change.
//! - the **service stack** is scratch space shared by the services that
//!   touch one frame (a transition parks its b frame there, a filter its
//!   parameters).
//!
//! Results are cached on the frame (`image`, `audio` properties), so
//! repeated requests run each transform at most once.

use std::any::Any;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::trace;

use crate::audio::{Audio, AudioRequest, DEFAULT_CHANNELS, DEFAULT_FREQUENCY};
use crate::context::Context;
use crate::error::{Result, StrataError};
use crate::format::{AudioFormat, ImageFormat};
use crate::image::{Image, ImageRequest};
use crate::pool::MemoryPool;
use crate::properties::{AsProperties, Properties};
use crate::time::{self, Position};

/// A deferred image transform.
pub type GetImage = Box<dyn FnOnce(&Frame, ImageRequest) -> Result<Image> + Send>;

/// A deferred audio transform.
pub type GetAudio = Box<dyn FnOnce(&Frame, AudioRequest) -> Result<Audio> + Send>;

const DEFAULT_WIDTH: u32 = 720;
const DEFAULT_HEIGHT: u32 = 576;
const DEFAULT_FPS: f64 = 25.0;

struct FrameInner {
    properties: Properties,
    pool: MemoryPool,
    fps: f64,
    image_stack: Mutex<SmallVec<[GetImage; 4]>>,
    audio_stack: Mutex<SmallVec<[GetAudio; 4]>>,
    service_stack: Mutex<Vec<Box<dyn Any + Send>>>,
}

/// Shared handle on a frame. Clones refer to the same frame.
#[derive(Clone)]
pub struct Frame {
    inner: Arc<FrameInner>,
}

impl Frame {
    /// An empty frame at position 0, 25 fps.
    pub fn new(pool: &MemoryPool) -> Self {
        Self::build(pool.clone(), DEFAULT_FPS)
    }

    /// A frame carrying the profile's geometry, positioned at `position`.
    pub fn from_context(ctx: &Context, position: Position) -> Self {
        let profile = ctx.profile().get();
        let frame = Self::build(ctx.pool().clone(), profile.fps());
        let props = &frame.inner.properties;
        // Non-empty literal names; setting them cannot fail.
        let _ = props.set_int("width", profile.width as i32);
        let _ = props.set_int("height", profile.height as i32);
        let _ = props.set_double("aspect_ratio", profile.sar());
        let _ = props.set_int("progressive", profile.progressive as i32);
        frame.set_frame_position(position);
        frame
    }

    /// A placeholder frame: its image and audio will be synthesized.
    pub fn blank(ctx: &Context, position: Position) -> Self {
        let frame = Self::from_context(ctx, position);
        let _ = frame.set_int("test_image", 1);
        let _ = frame.set_int("test_audio", 1);
        frame
    }

    fn build(pool: MemoryPool, fps: f64) -> Self {
        Self {
            inner: Arc::new(FrameInner {
                properties: Properties::new(),
                pool,
                fps,
                image_stack: Mutex::new(SmallVec::new()),
                audio_stack: Mutex::new(SmallVec::new()),
                service_stack: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn properties(&self) -> &Properties {
        &self.inner.properties
    }

    pub fn pool(&self) -> &MemoryPool {
        &self.inner.pool
    }

    /// Frame rate used to size synthesized audio.
    pub fn fps(&self) -> f64 {
        self.inner.fps
    }

    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub fn ptr_eq(a: &Frame, b: &Frame) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    // ── Attributes ─────────────────────────────────────────────

    pub fn position(&self) -> Position {
        self.get_position("_position")
    }

    pub fn set_frame_position(&self, position: Position) {
        let _ = self.set_position("_position", position);
    }

    /// Pixel aspect ratio; 0 when unknown.
    pub fn aspect_ratio(&self) -> f64 {
        self.get_double("aspect_ratio")
    }

    pub fn set_aspect_ratio(&self, value: f64) {
        let _ = self.set_double("aspect_ratio", value);
    }

    /// The image is a synthesized placeholder.
    pub fn is_test_card(&self) -> bool {
        self.get_int("test_image") != 0
    }

    /// The audio is synthesized silence.
    pub fn is_test_audio(&self) -> bool {
        self.get_int("test_audio") != 0
    }

    // ── Stacks ─────────────────────────────────────────────────

    /// Push a deferred image transform; the last pushed runs first.
    pub fn push_get_image<F>(&self, get_image: F)
    where
        F: FnOnce(&Frame, ImageRequest) -> Result<Image> + Send + 'static,
    {
        self.inner.image_stack.lock().push(Box::new(get_image));
    }

    pub fn pop_get_image(&self) -> Option<GetImage> {
        self.inner.image_stack.lock().pop()
    }

    pub fn image_stack_len(&self) -> usize {
        self.inner.image_stack.lock().len()
    }

    pub fn push_get_audio<F>(&self, get_audio: F)
    where
        F: FnOnce(&Frame, AudioRequest) -> Result<Audio> + Send + 'static,
    {
        self.inner.audio_stack.lock().push(Box::new(get_audio));
    }

    pub fn pop_get_audio(&self) -> Option<GetAudio> {
        self.inner.audio_stack.lock().pop()
    }

    pub fn audio_stack_len(&self) -> usize {
        self.inner.audio_stack.lock().len()
    }

    /// Park another frame on the service stack.
    ///
    /// Pushing a frame onto itself creates a cycle that is never freed.
    pub fn push_frame(&self, frame: Frame) {
        self.push_service(frame);
    }

    pub fn pop_frame(&self) -> Option<Frame> {
        self.pop_service::<Frame>()
    }

    pub fn push_service<T: Any + Send>(&self, item: T) {
        self.inner.service_stack.lock().push(Box::new(item));
    }

    /// Pop the top of the service stack if it is a `T`.
    ///
    /// A top item of another type stays where it is.
    pub fn pop_service<T: Any + Send>(&self) -> Option<T> {
        let mut stack = self.inner.service_stack.lock();
        let top = stack.pop()?;
        match top.downcast::<T>() {
            Ok(item) => Some(*item),
            Err(other) => {
                stack.push(other);
                None
            }
        }
    }

    pub fn push_service_int(&self, value: i64) {
        self.push_service(value);
    }

    /// Pop an integer; 0 when the stack is empty or its top is not one.
    pub fn pop_service_int(&self) -> i64 {
        self.pop_service::<i64>().unwrap_or(0)
    }

    pub fn service_stack_len(&self) -> usize {
        self.inner.service_stack.lock().len()
    }

    // ── Image ──────────────────────────────────────────────────

    /// Replace the frame's image.
    pub fn set_image(&self, image: Image) -> Result<()> {
        let (format, width, height, len) = (image.format(), image.width(), image.height(), image.len());
        self.set_data("image", image, len)?;
        self.set_int("format", format.to_int())?;
        self.set_int("width", width as i32)?;
        self.set_int("height", height as i32)
    }

    /// The image computed so far, if any.
    pub fn cached_image(&self) -> Option<Image> {
        self.get_data::<Image>("image").map(|image| (*image).clone())
    }

    /// Resolve the frame's image.
    ///
    /// Pops and runs the newest image transform, caching what it returns.
    /// With an empty stack the cached image is returned when it matches the
    /// request (a `None` format or zero dimension matches anything). With
    /// neither, a flat white test card of the requested format and size is
    /// made and the frame is flagged `test_image`.
    ///
    /// A cached test card that does not match is redrawn to the request; a
    /// real image that does not match is `UnsupportedFormat`, as no
    /// conversion is performed. A transform's error is returned unchanged
    /// and nothing is cached.
    pub fn get_image(&self, request: ImageRequest) -> Result<Image> {
        let next = self.pop_get_image();
        let mut image = match next {
            Some(get_image) => {
                let image = get_image(self, request)?;
                self.set_image(image.clone())?;
                image
            }
            None => match self.cached_image() {
                Some(image) if image_matches(&image, request) => image,
                Some(_) if self.is_test_card() => self.test_card(request)?,
                Some(image) => {
                    return Err(StrataError::UnsupportedFormat(format!(
                        "cached {} {}x{} image cannot serve a {} {}x{} request",
                        image.format(),
                        image.width(),
                        image.height(),
                        request.format,
                        request.width,
                        request.height
                    )))
                }
                None => self.test_card(request)?,
            },
        };
        if request.writable {
            image.make_unique()?;
        }
        Ok(image)
    }

    fn test_card(&self, request: ImageRequest) -> Result<Image> {
        let format = match request.format {
            ImageFormat::None => ImageFormat::Rgb24,
            other => other,
        };
        let width = pick(request.width, self.get_int("width"), DEFAULT_WIDTH);
        let height = pick(request.height, self.get_int("height"), DEFAULT_HEIGHT);
        trace!(position = self.position(), %format, width, height, "synthesizing test card");

        let mut image = Image::alloc(self.pool(), format, width, height)?;
        image.fill_colour(255, 255, 255, 255)?;
        self.set_image(image.clone())?;
        self.set_int("test_image", 1)?;
        Ok(image)
    }

    // ── Audio ──────────────────────────────────────────────────

    pub fn set_audio(&self, audio: Audio) -> Result<()> {
        let (format, frequency, channels, samples) =
            (audio.format(), audio.frequency(), audio.channels(), audio.samples());
        let len = audio.data().len();
        self.set_data("audio", audio, len)?;
        self.set_int("audio_format", format.to_int())?;
        self.set_int("audio_frequency", frequency as i32)?;
        self.set_int("audio_channels", channels as i32)?;
        self.set_int("audio_samples", samples as i32)
    }

    pub fn cached_audio(&self) -> Option<Audio> {
        self.get_data::<Audio>("audio").map(|audio| (*audio).clone())
    }

    /// Resolve the frame's audio; the counterpart of [`Frame::get_image`]
    /// with silence as the placeholder (flagged `test_audio`). Cached audio
    /// must match a requested format; cached silence is regenerated.
    ///
    /// Silence without an explicit sample count gets exactly the number of
    /// samples owed to this frame's position, so consecutive frames add up
    /// to the nominal rate.
    pub fn get_audio(&self, request: AudioRequest) -> Result<Audio> {
        let next = self.pop_get_audio();
        match next {
            Some(get_audio) => {
                let audio = get_audio(self, request)?;
                self.set_audio(audio.clone())?;
                Ok(audio)
            }
            None => match self.cached_audio() {
                Some(audio) if audio_matches(&audio, request) => Ok(audio),
                Some(_) if self.is_test_audio() => self.silence(request),
                Some(audio) => Err(StrataError::UnsupportedFormat(format!(
                    "cached {} audio cannot serve a {} request",
                    audio.format(),
                    request.format
                ))),
                None => self.silence(request),
            },
        }
    }

    fn silence(&self, request: AudioRequest) -> Result<Audio> {
        let format = match request.format {
            AudioFormat::None => AudioFormat::S16,
            other => other,
        };
        let frequency = if request.frequency > 0 { request.frequency } else { DEFAULT_FREQUENCY };
        let channels = if request.channels > 0 { request.channels } else { DEFAULT_CHANNELS };
        let samples = if request.samples > 0 {
            request.samples
        } else {
            time::sample_calculator(self.fps(), frequency, self.position())
        };
        let audio = Audio::silence(self.pool(), format, frequency, channels, samples)?;
        self.set_audio(audio.clone())?;
        self.set_int("test_audio", 1)?;
        Ok(audio)
    }

    /// Mix `that` frame's audio into this frame's.
    ///
    /// The weight of `that` ramps linearly from `weight_start` on the first
    /// sample to `weight_end` on the last. Both frames are resolved as
    /// 16-bit audio; `that` is read at this frame's rate, channel count and
    /// sample count, and missing samples count as silence. The mix is
    /// cached as this frame's audio.
    pub fn mix_audio(
        &self,
        that: &Frame,
        weight_start: f32,
        weight_end: f32,
        request: AudioRequest,
    ) -> Result<Audio> {
        let ours = self.get_audio(AudioRequest {
            format: AudioFormat::S16,
            ..request
        })?;
        let theirs = that.get_audio(AudioRequest::new(
            AudioFormat::S16,
            ours.frequency(),
            ours.channels(),
            ours.samples(),
        ))?;
        if ours.format() != AudioFormat::S16 || theirs.format() != AudioFormat::S16 {
            return Err(StrataError::UnsupportedFormat(format!(
                "mixing {} with {}",
                ours.format(),
                theirs.format()
            )));
        }

        let channels = ours.channels() as usize;
        let their_channels = theirs.channels().max(1) as usize;
        let samples = ours.samples() as usize;
        let mut mixed = Audio::silence(
            self.pool(),
            AudioFormat::S16,
            ours.frequency(),
            ours.channels(),
            ours.samples(),
        )?;
        {
            let (a, b) = (ours.as_s16(), theirs.as_s16());
            let out = mixed.as_s16_mut()?;
            let step = if samples > 1 {
                (weight_end - weight_start) / (samples - 1) as f32
            } else {
                0.0
            };
            for i in 0..samples {
                let weight = weight_start + step * i as f32;
                for c in 0..channels {
                    let mine = a.get(i * channels + c).copied().unwrap_or(0) as f32;
                    let other = b
                        .get(i * their_channels + c.min(their_channels - 1))
                        .copied()
                        .unwrap_or(0) as f32;
                    let value = mine * (1.0 - weight) + other * weight;
                    out[i * channels + c] = value.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16;
                }
            }
        }
        self.set_audio(mixed.clone())?;
        Ok(mixed)
    }

    /// Draw the frame's audio as a grey-on-black rgb24 image, one band per
    /// channel, one column per slice of samples. The result is also kept
    /// as the `waveform` property.
    pub fn get_waveform(&self, width: u32, height: u32) -> Result<Image> {
        let audio = self.get_audio(AudioRequest::s16())?;
        let mut image = Image::alloc(self.pool(), ImageFormat::Rgb24, width, height)?;
        let channels = audio.channels().max(1) as usize;
        let samples = audio.samples() as usize;
        let pcm = audio.as_s16();
        let band = height as usize / channels;
        let stride = width as usize * 3;
        {
            let pixels = image.data_mut()?;
            pixels.fill(0);
            if band > 0 && samples > 0 {
                let half = (band / 2) as i64;
                for x in 0..width as usize {
                    let index = x * samples / width as usize;
                    for c in 0..channels {
                        let sample = pcm.get(index * channels + c).copied().unwrap_or(0) as i64;
                        let middle = (c * band) as i64 + half;
                        let peak = middle - sample * half / 32768;
                        let (top, bottom) = if peak < middle { (peak, middle) } else { (middle, peak) };
                        let last_row = ((c + 1) * band - 1) as i64;
                        for y in top.max(0)..=bottom.min(last_row) {
                            let at = y as usize * stride + x * 3;
                            pixels[at..at + 3].fill(255);
                        }
                    }
                }
            }
        }
        self.set_data("waveform", image.clone(), image.len())?;
        Ok(image)
    }
}

fn pick(requested: u32, fallback: i32, default: u32) -> u32 {
    if requested > 0 {
        requested
    } else if fallback > 0 {
        fallback as u32
    } else {
        default
    }
}

fn image_matches(image: &Image, request: ImageRequest) -> bool {
    (request.format == ImageFormat::None || request.format == image.format())
        && (request.width == 0 || request.width == image.width())
        && (request.height == 0 || request.height == image.height())
}

fn audio_matches(audio: &Audio, request: AudioRequest) -> bool {
    request.format == AudioFormat::None || request.format == audio.format()
}

impl Deref for Frame {
    type Target = Properties;

    fn deref(&self) -> &Properties {
        &self.inner.properties
    }
}

impl AsProperties for Frame {
    fn properties(&self) -> &Properties {
        &self.inner.properties
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("position", &self.position())
            .field("image_stack", &self.image_stack_len())
            .field("audio_stack", &self.audio_stack_len())
            .field("service_stack", &self.service_stack_len())
            .finish()
    }
}
