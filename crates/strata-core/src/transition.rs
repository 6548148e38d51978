//! Transitions: services that combine the frames of two tracks.

use std::any::Any;
use std::ops::Deref;

use crate::context::Context;
use crate::error::{Result, StrataError};
use crate::frame::Frame;
use crate::service::{FrameSource, Service, ServiceKind};

/// Frame combination behind a [`Transition`].
pub trait TransitionImpl: Send + Sync + 'static {
    /// Combine `b` into `a`, returning the frame that replaces `a`.
    fn process(&self, transition: &Transition, a: Frame, b: Frame) -> Result<Frame>;

    fn close(&self) {}
}

struct TransitionSource {
    imp: Box<dyn TransitionImpl>,
}

impl FrameSource for TransitionSource {
    fn get_frame(&self, service: &Service, track: usize) -> Result<Frame> {
        let input = service.input(0).ok_or(StrataError::NotConnected(0))?;
        let transition = Transition {
            service: service.clone(),
        };
        if track != transition.a_track() {
            return Ok(input.get_frame(track));
        }
        let a = input.get_frame(transition.a_track());
        let b = input.get_frame(transition.b_track());
        self.apply(&transition, a, b)
    }

    fn close(&self, _service: &Service) {
        self.imp.close();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl TransitionSource {
    fn apply(&self, transition: &Transition, a: Frame, b: Frame) -> Result<Frame> {
        if !transition.covers(a.position()) {
            return Ok(a);
        }
        self.imp.process(transition, a, b)
    }
}

/// Handle on a transition service.
#[derive(Clone, Debug)]
pub struct Transition {
    service: Service,
}

impl Transition {
    pub fn new<T: TransitionImpl>(ctx: &Context, imp: T) -> Self {
        let service = Service::new(
            ServiceKind::Transition,
            ctx,
            TransitionSource { imp: Box::new(imp) },
        );
        let _ = service.set_int("a_track", 0);
        let _ = service.set_int("b_track", 1);
        let _ = service.set_position("in", 0);
        let _ = service.set_position("out", 0);
        Self { service }
    }

    pub fn from_service(service: Service) -> Option<Self> {
        (service.kind() == ServiceKind::Transition).then_some(Self { service })
    }

    pub fn service(&self) -> &Service {
        &self.service
    }

    pub fn into_service(self) -> Service {
        self.service
    }

    /// Pull both tracks from `producer` (usually a multitrack).
    pub fn connect(&self, producer: &Service, a_track: usize, b_track: usize) -> Result<()> {
        self.set_tracks(a_track, b_track)?;
        self.service.connect_input(producer, 0)
    }

    pub fn a_track(&self) -> usize {
        self.get_int("a_track").max(0) as usize
    }

    pub fn b_track(&self) -> usize {
        self.get_int("b_track").max(0) as usize
    }

    pub fn set_tracks(&self, a_track: usize, b_track: usize) -> Result<()> {
        self.set_int("a_track", a_track as i32)?;
        self.set_int("b_track", b_track as i32)
    }

    /// Limit the transition to `[in, out]`. Both 0 means always.
    pub fn set_in_and_out(&self, in_point: i64, out_point: i64) -> Result<()> {
        self.set_position("in", in_point)?;
        self.set_position("out", out_point)
    }

    pub fn get_in(&self) -> i64 {
        self.get_position("in")
    }

    pub fn get_out(&self) -> i64 {
        self.get_position("out")
    }

    /// Whether `position` lies inside the transition's range.
    pub fn covers(&self, position: i64) -> bool {
        let (in_point, out_point) = (self.get_in(), self.get_out());
        (in_point == 0 && out_point == 0) || (position >= in_point && position <= out_point)
    }

    /// How far through the transition the frame lies, in `[0, 1]`.
    pub fn progress(&self, frame: &Frame) -> f64 {
        self.progress_at(frame.position())
    }

    pub fn progress_at(&self, position: i64) -> f64 {
        let (in_point, out_point) = (self.get_in(), self.get_out());
        if out_point <= in_point {
            return 0.0;
        }
        let span = (out_point - in_point) as f64;
        ((position - in_point) as f64 / span).clamp(0.0, 1.0)
    }

    /// Combine two frames directly, honouring the range.
    pub fn apply(&self, a: Frame, b: Frame) -> Result<Frame> {
        match self.service.source::<TransitionSource>() {
            Some(source) => source.apply(self, a, b),
            None => Err(StrataError::Internal("transition without transition source".into())),
        }
    }
}

impl Deref for Transition {
    type Target = Service;

    fn deref(&self) -> &Service {
        &self.service
    }
}
