//! Fields: the filters and transitions planted on a multitrack.
//!
//! A field pulls one frame per track from its multitrack, then runs every
//! planted service over those frames in plant order. A transition writes
//! its result over the `a` track and marks the consumed `b` frame
//! `hide=1`, so a tractor reading the field skips it.

use std::any::Any;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use strata_core::{Context, Filter, Frame, FrameSource, Result, Service, ServiceKind, StrataError, Transition};

use crate::multitrack::Multitrack;

/// A service planted on a field.
#[derive(Debug, Clone)]
pub enum Planted {
    Filter(Filter),
    Transition(Transition),
}

impl Planted {
    pub fn service(&self) -> &Service {
        match self {
            Planted::Filter(filter) => filter.service(),
            Planted::Transition(transition) => transition.service(),
        }
    }
}

#[derive(Default)]
struct FieldState {
    planted: Mutex<Vec<Planted>>,
}

struct FieldSource {
    state: Arc<FieldState>,
}

impl FrameSource for FieldSource {
    fn get_frame(&self, service: &Service, track: usize) -> Result<Frame> {
        let field = Field {
            service: service.clone(),
            state: Arc::clone(&self.state),
        };
        let mut frames = field.frames()?;
        if track < frames.len() {
            Ok(frames.swap_remove(track))
        } else {
            Ok(Frame::blank(service.context(), service.get_position("_position")))
        }
    }

    fn close(&self, _service: &Service) {
        self.state.planted.lock().clear();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Handle on a field.
#[derive(Clone)]
pub struct Field {
    service: Service,
    state: Arc<FieldState>,
}

impl Field {
    /// A field reading `multitrack`.
    pub fn new(ctx: &Context, multitrack: &Multitrack) -> Result<Self> {
        let state = Arc::new(FieldState::default());
        let service = Service::new(
            ServiceKind::Field,
            ctx,
            FieldSource {
                state: Arc::clone(&state),
            },
        );
        service.connect_input(multitrack.service(), 0)?;
        Ok(Self { service, state })
    }

    pub fn from_service(service: Service) -> Option<Self> {
        let state = Arc::clone(&service.source::<FieldSource>()?.state);
        Some(Self { service, state })
    }

    pub fn service(&self) -> &Service {
        &self.service
    }

    pub fn multitrack(&self) -> Option<Multitrack> {
        self.service.input(0).and_then(Multitrack::from_service)
    }

    /// Run `filter` over the frames of `track`.
    pub fn plant_filter(&self, filter: &Filter, track: usize) -> Result<()> {
        filter.set_track(track)?;
        self.state.planted.lock().push(Planted::Filter(filter.clone()));
        Ok(())
    }

    /// Combine track `b_track` into `a_track` with `transition`.
    pub fn plant_transition(&self, transition: &Transition, a_track: usize, b_track: usize) -> Result<()> {
        if a_track == b_track {
            return Err(StrataError::InvalidParameter(format!(
                "transition needs two distinct tracks, got {a_track} twice"
            )));
        }
        transition.set_tracks(a_track, b_track)?;
        self.state
            .planted
            .lock()
            .push(Planted::Transition(transition.clone()));
        Ok(())
    }

    /// Remove a planted service. Returns whether it was planted.
    pub fn disconnect_service(&self, service: &Service) -> bool {
        let mut planted = self.state.planted.lock();
        let before = planted.len();
        planted.retain(|p| !Service::ptr_eq(p.service(), service));
        planted.len() != before
    }

    /// Planted services in plant order.
    pub fn planted(&self) -> Vec<Planted> {
        self.state.planted.lock().clone()
    }

    /// One frame per track at the multitrack's position, with every planted
    /// service applied.
    pub fn frames(&self) -> Result<Vec<Frame>> {
        let multitrack = self.multitrack().ok_or(StrataError::NotConnected(0))?;
        let mut frames: Vec<Frame> = (0..multitrack.count())
            .map(|track| multitrack.get_frame(track))
            .collect();

        for planted in self.planted() {
            match planted {
                Planted::Filter(filter) => {
                    let track = filter.track();
                    let Some(slot) = usize::try_from(track).ok().and_then(|t| frames.get_mut(t)) else {
                        continue;
                    };
                    match filter.apply(slot.clone()) {
                        Ok(frame) => *slot = frame,
                        Err(e) => warn!(track, error = %e, "planted filter failed"),
                    }
                }
                Planted::Transition(transition) => {
                    let (a_track, b_track) = (transition.a_track(), transition.b_track());
                    let (Some(a), Some(b)) = (frames.get(a_track).cloned(), frames.get(b_track).cloned())
                    else {
                        continue;
                    };
                    if !transition.covers(a.position()) {
                        continue;
                    }
                    match transition.apply(a, b.clone()) {
                        Ok(frame) => {
                            b.set_int("hide", 1)?;
                            frames[a_track] = frame;
                        }
                        Err(e) => warn!(a_track, b_track, error = %e, "planted transition failed"),
                    }
                }
            }
        }
        Ok(frames)
    }
}

impl Deref for Field {
    type Target = Service;

    fn deref(&self) -> &Service {
        &self.service
    }
}

impl std::fmt::Debug for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("planted", &self.state.planted.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{FilterImpl, Position, Producer, ProducerImpl, TransitionImpl};

    struct Named;

    impl ProducerImpl for Named {
        fn produce(&self, producer: &Producer, position: Position) -> Result<Frame> {
            let frame = Frame::from_context(producer.context(), position);
            frame.set("label", &producer.get("label").unwrap_or_default())?;
            Ok(frame)
        }
    }

    struct Append(&'static str);

    impl FilterImpl for Append {
        fn process(&self, _filter: &Filter, frame: Frame) -> Result<Frame> {
            let label = frame.get("label").unwrap_or_default();
            frame.set("label", &format!("{label}+{}", self.0))?;
            Ok(frame)
        }
    }

    struct Join;

    impl TransitionImpl for Join {
        fn process(&self, _transition: &Transition, a: Frame, b: Frame) -> Result<Frame> {
            let joined = format!(
                "{}|{}",
                a.get("label").unwrap_or_default(),
                b.get("label").unwrap_or_default()
            );
            a.set("label", &joined)?;
            Ok(a)
        }
    }

    fn setup(ctx: &Context) -> (Multitrack, Field) {
        let multitrack = Multitrack::new(ctx);
        for (track, label) in ["v0", "v1", "v2"].iter().enumerate() {
            let producer = Producer::new(ctx, Named);
            producer.set("label", label).unwrap();
            multitrack.connect(&producer, track).unwrap();
        }
        let field = Field::new(ctx, &multitrack).unwrap();
        (multitrack, field)
    }

    #[test]
    fn test_planted_services_run_in_order() {
        let ctx = Context::default();
        let (_multitrack, field) = setup(&ctx);
        field.plant_filter(&Filter::new(&ctx, Append("f")), 1).unwrap();
        field
            .plant_transition(&Transition::new(&ctx, Join), 0, 1)
            .unwrap();
        field.plant_filter(&Filter::new(&ctx, Append("g")), 0).unwrap();

        let frames = field.frames().unwrap();
        let labels: Vec<_> = frames.iter().map(|f| f.get("label").unwrap_or_default()).collect();
        assert_eq!(labels, ["v0|v1+f+g", "v1+f", "v2"]);
        assert_eq!(frames[1].get_int("hide"), 1);
        assert_eq!(frames[2].get_int("hide"), 0);
    }

    #[test]
    fn test_transition_outside_range_leaves_b_visible() {
        let ctx = Context::default();
        let (multitrack, field) = setup(&ctx);
        let transition = Transition::new(&ctx, Join);
        transition.set_in_and_out(10, 20).unwrap();
        field.plant_transition(&transition, 0, 2).unwrap();

        let frames = field.frames().unwrap();
        assert_eq!(frames[0].get("label").as_deref(), Some("v0"));
        assert_eq!(frames[2].get_int("hide"), 0);

        multitrack.seek(15).unwrap();
        let frames = field.frames().unwrap();
        assert_eq!(frames[0].get("label").as_deref(), Some("v0|v2"));
        assert_eq!(frames[2].get_int("hide"), 1);
    }

    #[test]
    fn test_disconnect_service() {
        let ctx = Context::default();
        let (_multitrack, field) = setup(&ctx);
        let filter = Filter::new(&ctx, Append("f"));
        field.plant_filter(&filter, 0).unwrap();
        assert!(field.plant_transition(&Transition::new(&ctx, Join), 1, 1).is_err());
        assert!(field.disconnect_service(filter.service()));
        assert!(!field.disconnect_service(filter.service()));
        assert_eq!(field.get_frame(0).get("label").as_deref(), Some("v0"));
        assert!(Field::from_service(field.service().clone()).is_some());
    }
}
