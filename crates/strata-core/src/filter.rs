//! Filters: services that modify frames pulled from one input.

use std::any::Any;
use std::ops::Deref;

use crate::context::Context;
use crate::error::{Result, StrataError};
use crate::frame::Frame;
use crate::service::{FrameSource, Service, ServiceKind};

/// Frame processing behind a [`Filter`].
///
/// `process` usually records parameters on the frame and pushes a deferred
/// transform onto its image or audio stack rather than touching pixels.
pub trait FilterImpl: Send + Sync + 'static {
    fn process(&self, filter: &Filter, frame: Frame) -> Result<Frame>;

    fn close(&self) {}
}

struct FilterSource {
    imp: Box<dyn FilterImpl>,
}

impl FrameSource for FilterSource {
    fn get_frame(&self, service: &Service, track: usize) -> Result<Frame> {
        let input = service.input(0).ok_or(StrataError::NotConnected(0))?;
        let frame = input.get_frame(track);
        let filter = Filter {
            service: service.clone(),
        };
        if track as i64 == filter.track() {
            self.apply(&filter, frame)
        } else {
            Ok(frame)
        }
    }

    fn close(&self, _service: &Service) {
        self.imp.close();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl FilterSource {
    fn apply(&self, filter: &Filter, frame: Frame) -> Result<Frame> {
        if filter.is_disabled() || !filter.covers(frame.position()) {
            return Ok(frame);
        }
        self.imp.process(filter, frame)
    }
}

/// Handle on a filter service.
#[derive(Clone, Debug)]
pub struct Filter {
    service: Service,
}

impl Filter {
    pub fn new<F: FilterImpl>(ctx: &Context, imp: F) -> Self {
        let service = Service::new(ServiceKind::Filter, ctx, FilterSource { imp: Box::new(imp) });
        let _ = service.set_int("track", 0);
        let _ = service.set_position("in", 0);
        let _ = service.set_position("out", 0);
        Self { service }
    }

    pub fn from_service(service: Service) -> Option<Self> {
        (service.kind() == ServiceKind::Filter).then_some(Self { service })
    }

    pub fn service(&self) -> &Service {
        &self.service
    }

    pub fn into_service(self) -> Service {
        self.service
    }

    /// Pull frames from `producer`.
    pub fn connect(&self, producer: &Service) -> Result<()> {
        self.service.connect_input(producer, 0)
    }

    /// Only frames requested for this track are processed.
    pub fn track(&self) -> i64 {
        self.get_int64("track")
    }

    pub fn set_track(&self, track: usize) -> Result<()> {
        self.set_int64("track", track as i64)
    }

    /// Limit processing to `[in, out]`. `out == 0` means no upper bound.
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

    pub fn is_disabled(&self) -> bool {
        self.get_int("disable") != 0
    }

    /// Whether `position` lies inside the filter's range.
    pub fn covers(&self, position: i64) -> bool {
        let (in_point, out_point) = (self.get_in(), self.get_out());
        (in_point == 0 && out_point == 0)
            || (position >= in_point && (out_point == 0 || position <= out_point))
    }

    /// How far through the filter's range the frame lies, in `[0, 1)`.
    pub fn progress(&self, frame: &Frame) -> f64 {
        let (in_point, out_point) = (self.get_in(), self.get_out());
        if out_point <= in_point {
            return 0.0;
        }
        let span = (out_point - in_point + 1) as f64;
        ((frame.position() - in_point) as f64 / span).clamp(0.0, 1.0)
    }

    /// Process a frame directly, honouring `disable` and the range.
    /// Used by owners that route frames themselves (a tractor's field).
    pub fn apply(&self, frame: Frame) -> Result<Frame> {
        match self.service.source::<FilterSource>() {
            Some(source) => source.apply(self, frame),
            None => Err(StrataError::Internal("filter without filter source".into())),
        }
    }
}

impl Deref for Filter {
    type Target = Service;

    fn deref(&self) -> &Service {
        &self.service
    }
}
