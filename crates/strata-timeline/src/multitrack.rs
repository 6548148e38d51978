//! Multitracks: parallel tracks read at a common position.

use std::any::Any;
use std::ops::Deref;

use strata_core::{
    Context, Frame, FrameSource, Position, Producer, Result, Service, ServiceKind,
};

struct MultitrackSource;

impl FrameSource for MultitrackSource {
    fn get_frame(&self, service: &Service, track: usize) -> Result<Frame> {
        let position = service.get_position("_position");
        let producer = match service.input(track).and_then(Producer::from_service) {
            Some(producer) if position < producer.playtime() => producer,
            _ => return Ok(Frame::blank(service.context(), position)),
        };
        producer.seek(position)?;
        Ok(producer.get_frame(0))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Handle on a multitrack. Track `i` is the service's input `i`.
#[derive(Clone, Debug)]
pub struct Multitrack {
    service: Service,
}

impl Multitrack {
    pub fn new(ctx: &Context) -> Self {
        let service = Service::new(ServiceKind::Multitrack, ctx, MultitrackSource);
        let _ = service.set_position("_position", 0);
        let _ = service.set_position("length", 0);
        Self { service }
    }

    pub fn from_service(service: Service) -> Option<Self> {
        (service.kind() == ServiceKind::Multitrack).then_some(Self { service })
    }

    pub fn service(&self) -> &Service {
        &self.service
    }

    /// Place `producer` on `track`, replacing whatever was there.
    pub fn connect(&self, producer: &Producer, track: usize) -> Result<()> {
        self.service.connect_input(producer.service(), track)?;
        self.refresh();
        Ok(())
    }

    /// Number of track slots.
    pub fn count(&self) -> usize {
        self.service.input_count()
    }

    pub fn track(&self, index: usize) -> Option<Producer> {
        self.service.input(index).and_then(Producer::from_service)
    }

    /// Length of the longest track.
    pub fn length(&self) -> Position {
        self.get_position("length")
    }

    /// Recompute the length after a track changed.
    pub fn refresh(&self) {
        let length = (0..self.count())
            .filter_map(|i| self.track(i))
            .map(|producer| producer.playtime())
            .max()
            .unwrap_or(0);
        let _ = self.set_position("length", length);
    }

    pub fn position(&self) -> Position {
        self.get_position("_position")
    }

    /// Move every track to `position` on the next frame request.
    pub fn seek(&self, position: Position) -> Result<()> {
        self.set_position("_position", position.max(0))
    }
}

impl Deref for Multitrack {
    type Target = Service;

    fn deref(&self) -> &Service {
        &self.service
    }
}
