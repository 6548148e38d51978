//! Producers: services that originate frames.
//!
//! A producer keeps a play head (`_position`, relative to `in`), a speed
//! and an end-of-file policy. Each `get_frame` asks the implementation for
//! the frame at the play head, stamps it with the absolute position and
//! speed, then advances the play head by the speed.
//!
//! The play head is fractional (`_head`) so that speeds such as 0.5 or
//! -1.5 advance correctly; `_position` is its floor.

use std::any::Any;
use std::ops::Deref;

use crate::context::Context;
use crate::error::Result;
use crate::frame::Frame;
use crate::service::{FrameSource, Service, ServiceKind};
use crate::time::Position;

/// Default length of a producer that has not declared one.
pub const DEFAULT_LENGTH: Position = 15000;

/// Frame generation behind a [`Producer`].
pub trait ProducerImpl: Send + Sync + 'static {
    /// Build the frame for absolute position `position`.
    fn produce(&self, producer: &Producer, position: Position) -> Result<Frame>;

    fn close(&self) {}
}

struct ProducerSource<P> {
    imp: P,
}

impl<P: ProducerImpl> FrameSource for ProducerSource<P> {
    fn get_frame(&self, service: &Service, _track: usize) -> Result<Frame> {
        let producer = Producer {
            service: service.clone(),
        };
        let position = producer.frame();
        let speed = producer.speed();
        let produced = self.imp.produce(&producer, position);
        producer.advance();
        let frame = produced?;
        frame.set_frame_position(position);
        frame.set_double("_speed", speed)?;
        Ok(frame)
    }

    fn close(&self, _service: &Service) {
        self.imp.close();
    }

    fn as_any(&self) -> &dyn Any {
        &self.imp
    }
}

/// Handle on a producer service.
#[derive(Clone, Debug)]
pub struct Producer {
    service: Service,
}

impl Producer {
    pub fn new<P: ProducerImpl>(ctx: &Context, imp: P) -> Self {
        Self::with_kind(ServiceKind::Producer, ctx, imp)
    }

    /// A producer-like service of another kind (playlist, tractor).
    pub fn with_kind<P: ProducerImpl>(kind: ServiceKind, ctx: &Context, imp: P) -> Self {
        let service = Service::new(kind, ctx, ProducerSource { imp });
        let _ = service.set_position("_position", 0);
        let _ = service.set_double("_speed", 1.0);
        let _ = service.set_position("length", DEFAULT_LENGTH);
        let _ = service.set_position("in", 0);
        let _ = service.set_position("out", DEFAULT_LENGTH - 1);
        let _ = service.set("eof", "pause");
        Self { service }
    }

    /// View a service as a producer, if it is one.
    pub fn from_service(service: Service) -> Option<Self> {
        service.kind().is_producer().then_some(Self { service })
    }

    pub fn service(&self) -> &Service {
        &self.service
    }

    pub fn into_service(self) -> Service {
        self.service
    }

    /// The implementation, if it is a `P`.
    pub fn implementation<P: ProducerImpl>(&self) -> Option<&P> {
        self.service.source::<P>()
    }

    pub fn length(&self) -> Position {
        self.get_position("length")
    }

    /// Declare the length and reset `in`/`out` to cover all of it.
    ///
    /// A length of zero leaves `out` at -1, so nothing is playable.
    pub fn set_length(&self, length: Position) -> Result<()> {
        let length = length.max(0);
        self.set_position("length", length)?;
        self.set_position("in", 0)?;
        self.set_position("out", length - 1)
    }

    pub fn get_in(&self) -> Position {
        self.get_position("in")
    }

    pub fn get_out(&self) -> Position {
        self.get_position("out")
    }

    /// Restrict playback to `[in, out]`; a negative `out` means the end.
    pub fn set_in_and_out(&self, in_point: Position, out_point: Position) -> Result<()> {
        let last = self.length() - 1;
        let in_point = in_point.clamp(0, last.max(0));
        let out_point = if last < 0 || out_point < 0 {
            last
        } else {
            out_point.min(last).max(in_point)
        };
        self.set_position("in", in_point)?;
        self.set_position("out", out_point)?;
        self.seek(self.position())
    }

    /// Number of frames between `in` and `out` inclusive.
    pub fn playtime(&self) -> Position {
        self.get_out() - self.get_in() + 1
    }

    /// Play head relative to `in`.
    pub fn position(&self) -> Position {
        self.get_position("_position")
    }

    /// Play head as an absolute position.
    pub fn frame(&self) -> Position {
        self.get_in() + self.position()
    }

    /// Move the play head to `position` (relative to `in`).
    ///
    /// Past the end, `eof=pause` holds the last frame and stops playback,
    /// `eof=loop` wraps around, `eof=continue` lets the position run on.
    pub fn seek(&self, position: Position) -> Result<()> {
        self.place(position as f64)
    }

    fn place(&self, head: f64) -> Result<()> {
        let playtime = self.playtime();
        let mut head = head.max(0.0);
        if head.floor() as Position >= playtime {
            match self.get("eof").as_deref() {
                Some("loop") if playtime > 0 => head = head.rem_euclid(playtime as f64),
                Some("continue") => {}
                _ => {
                    head = (playtime - 1).max(0) as f64;
                    self.set_speed(0.0)?;
                }
            }
        }
        self.set_double("_head", head)?;
        self.set_position("_position", head.floor() as Position)
    }

    /// Seek to an absolute position.
    pub fn seek_frame(&self, frame: Position) -> Result<()> {
        self.seek(frame - self.get_in())
    }

    pub fn speed(&self) -> f64 {
        self.get_double("_speed")
    }

    pub fn set_speed(&self, speed: f64) -> Result<()> {
        self.set_double("_speed", speed)
    }

    fn advance(&self) {
        let speed = self.speed();
        if speed != 0.0 {
            let head = if self.exists("_head") {
                self.get_double("_head")
            } else {
                self.position() as f64
            };
            let _ = self.place(head + speed);
        }
    }
}

impl Deref for Producer {
    type Target = Service;

    fn deref(&self) -> &Service {
        &self.service
    }
}
