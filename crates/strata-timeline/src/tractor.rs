//! Tractors: producers that play a multitrack through its field.
//!
//! Each frame request seeks the multitrack, lets the field pull and
//! process one frame per track, and outputs the highest-indexed track
//! whose frame is neither hidden nor a test card (track 0 otherwise).

use std::ops::Deref;

use strata_core::{
    Context, Filter, Frame, Position, Producer, ProducerImpl, Result, Service, ServiceKind,
    Transition,
};

use crate::field::Field;
use crate::multitrack::Multitrack;

struct Assembly {
    multitrack: Multitrack,
    field: Field,
}

impl ProducerImpl for Assembly {
    fn produce(&self, tractor: &Producer, position: Position) -> Result<Frame> {
        self.multitrack.seek(position)?;
        let frames = self.field.frames()?;
        let visible = frames
            .iter()
            .rposition(|frame| frame.get_int("hide") == 0 && !frame.is_test_card());
        let chosen = visible.or(if frames.is_empty() { None } else { Some(0) });
        match chosen {
            Some(index) => Ok(frames[index].clone()),
            None => Ok(Frame::blank(tractor.context(), position)),
        }
    }

    fn close(&self) {
        self.field.close();
        self.multitrack.close();
    }
}

/// Handle on a tractor.
#[derive(Clone, Debug)]
pub struct Tractor {
    producer: Producer,
    multitrack: Multitrack,
    field: Field,
}

impl Tractor {
    pub fn new(ctx: &Context) -> Result<Self> {
        let multitrack = Multitrack::new(ctx);
        let field = Field::new(ctx, &multitrack)?;
        let producer = Producer::with_kind(
            ServiceKind::Tractor,
            ctx,
            Assembly {
                multitrack: multitrack.clone(),
                field: field.clone(),
            },
        );
        let tractor = Self {
            producer,
            multitrack,
            field,
        };
        tractor.refresh();
        Ok(tractor)
    }

    pub fn from_service(service: Service) -> Option<Self> {
        let producer = Producer::from_service(service)?;
        let assembly = producer.implementation::<Assembly>()?;
        let (multitrack, field) = (assembly.multitrack.clone(), assembly.field.clone());
        Some(Self {
            producer,
            multitrack,
            field,
        })
    }

    pub fn producer(&self) -> &Producer {
        &self.producer
    }

    pub fn multitrack(&self) -> &Multitrack {
        &self.multitrack
    }

    pub fn field(&self) -> &Field {
        &self.field
    }

    /// Place `producer` on `track` and extend the tractor to the longest track.
    pub fn set_track(&self, producer: &Producer, track: usize) -> Result<()> {
        if Service::ptr_eq(producer.service(), self.producer.service()) {
            return Err(strata_core::StrataError::InvalidParameter(
                "a tractor cannot be one of its own tracks".into(),
            ));
        }
        self.multitrack.connect(producer, track)?;
        self.refresh();
        Ok(())
    }

    pub fn track(&self, index: usize) -> Option<Producer> {
        self.multitrack.track(index)
    }

    pub fn count(&self) -> usize {
        self.multitrack.count()
    }

    pub fn plant_filter(&self, filter: &Filter, track: usize) -> Result<()> {
        self.field.plant_filter(filter, track)
    }

    pub fn plant_transition(&self, transition: &Transition, a_track: usize, b_track: usize) -> Result<()> {
        self.field.plant_transition(transition, a_track, b_track)
    }

    /// Recompute the length after a track's length changed.
    pub fn refresh(&self) {
        self.multitrack.refresh();
        let _ = self.producer.set_length(self.multitrack.length());
    }
}

impl Deref for Tractor {
    type Target = Producer;

    fn deref(&self) -> &Producer {
        &self.producer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playlist::Playlist;
    use strata_core::{FilterImpl, TransitionImpl};

    struct Labelled;

    impl ProducerImpl for Labelled {
        fn produce(&self, producer: &Producer, position: Position) -> Result<Frame> {
            let frame = Frame::from_context(producer.context(), position);
            frame.set("label", &producer.get("label").unwrap_or_default())?;
            Ok(frame)
        }
    }

    struct Over;

    impl TransitionImpl for Over {
        fn process(&self, transition: &Transition, a: Frame, _b: Frame) -> Result<Frame> {
            a.set_double("mix", transition.progress(&a))?;
            Ok(a)
        }
    }

    struct Mark;

    impl FilterImpl for Mark {
        fn process(&self, _filter: &Filter, frame: Frame) -> Result<Frame> {
            frame.set_int("marked", 1)?;
            Ok(frame)
        }
    }

    fn labelled(ctx: &Context, label: &str, length: Position) -> Producer {
        let producer = Producer::new(ctx, Labelled);
        producer.set_length(length).unwrap();
        producer.set("label", label).unwrap();
        producer
    }

    #[test]
    fn test_highest_visible_track_wins() {
        let ctx = Context::default();
        let tractor = Tractor::new(&ctx).unwrap();
        tractor.set_track(&labelled(&ctx, "background", 10), 0).unwrap();

        let overlay = Playlist::new(&ctx);
        overlay.blank(3).unwrap();
        overlay.append(&labelled(&ctx, "title", 100), 0, 2).unwrap();
        tractor.set_track(overlay.producer(), 1).unwrap();
        assert_eq!(tractor.length(), 10);

        let labels: Vec<_> = (0..8)
            .map(|_| tractor.get_frame(0).get("label").unwrap_or_default())
            .collect();
        assert_eq!(
            labels,
            ["background", "background", "background", "title", "title", "title", "background", "background"]
        );
    }

    #[test]
    fn test_transition_hides_b_and_filters_apply() {
        let ctx = Context::default();
        let tractor = Tractor::new(&ctx).unwrap();
        tractor.set_track(&labelled(&ctx, "a", 20), 0).unwrap();
        tractor.set_track(&labelled(&ctx, "b", 20), 1).unwrap();
        let transition = Transition::new(&ctx, Over);
        transition.set_in_and_out(0, 10).unwrap();
        tractor.plant_transition(&transition, 0, 1).unwrap();
        tractor.plant_filter(&Filter::new(&ctx, Mark), 0).unwrap();

        tractor.seek(5).unwrap();
        let frame = tractor.get_frame(0);
        assert_eq!(frame.get("label").as_deref(), Some("a"));
        assert_eq!(frame.get_double("mix"), 0.5);
        assert_eq!(frame.get_int("marked"), 1);
        assert_eq!(frame.position(), 5);

        tractor.seek(15).unwrap();
        assert_eq!(tractor.get_frame(0).get("label").as_deref(), Some("b"));
    }

    #[test]
    fn test_empty_tractor_yields_test_cards() {
        let ctx = Context::default();
        let tractor = Tractor::new(&ctx).unwrap();
        assert!(tractor.get_frame(0).is_test_card());
        assert!(tractor.set_track(tractor.producer(), 0).is_err());
        let again = Tractor::from_service(tractor.service().clone()).unwrap();
        assert_eq!(again.count(), 0);
    }
}
