//! The common base of producers, filters, transitions and consumers.
//!
//! A [`Service`] is a property store plus a [`FrameSource`], the object that
//! actually makes frames, plus links to the services it pulls from. The
//! typed wrappers in [`crate::producer`], [`crate::filter`],
//! [`crate::transition`] and [`crate::consumer`] layer their behaviour on
//! top of it.
//!
//! Production edges must not form a cycle: a service that transitively
//! pulls from itself recurses without bound. This is not detected.

use std::any::Any;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::context::Context;
use crate::error::{Result, StrataError};
use crate::frame::Frame;
use crate::pool::MemoryPool;
use crate::profile::ProfileHandle;
use crate::properties::{AsProperties, Properties};

/// What role a service plays in a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Producer,
    Filter,
    Transition,
    Consumer,
    Playlist,
    Multitrack,
    Tractor,
    Field,
}

impl ServiceKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Producer => "producer",
            Self::Filter => "filter",
            Self::Transition => "transition",
            Self::Consumer => "consumer",
            Self::Playlist => "playlist",
            Self::Multitrack => "multitrack",
            Self::Tractor => "tractor",
            Self::Field => "field",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "producer" => Some(Self::Producer),
            "filter" => Some(Self::Filter),
            "transition" => Some(Self::Transition),
            "consumer" => Some(Self::Consumer),
            "playlist" => Some(Self::Playlist),
            "multitrack" => Some(Self::Multitrack),
            "tractor" => Some(Self::Tractor),
            "field" => Some(Self::Field),
            _ => None,
        }
    }

    /// Kinds that carry producer state (`in`, `out`, position, speed).
    pub fn is_producer(self) -> bool {
        matches!(self, Self::Producer | Self::Playlist | Self::Tractor)
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The frame-making half of a service.
pub trait FrameSource: Send + Sync + 'static {
    /// Produce the frame for `track`.
    fn get_frame(&self, service: &Service, track: usize) -> Result<Frame>;

    /// Release resources; called once, by [`Service::close`].
    fn close(&self, _service: &Service) {}

    /// The concrete implementation, for typed access through
    /// [`Service::source`].
    fn as_any(&self) -> &dyn Any;
}

struct ServiceInner {
    kind: ServiceKind,
    properties: Properties,
    context: Context,
    source: Box<dyn FrameSource>,
    inputs: RwLock<Vec<Option<Service>>>,
    closed: AtomicBool,
}

/// Shared handle on a service.
#[derive(Clone)]
pub struct Service {
    inner: Arc<ServiceInner>,
}

impl Service {
    pub fn new<S: FrameSource>(kind: ServiceKind, ctx: &Context, source: S) -> Self {
        let properties = Properties::new();
        properties.init_events();
        // Literal, non-empty name.
        let _ = properties.set("type", kind.name());
        debug!(%kind, "service created");
        Self {
            inner: Arc::new(ServiceInner {
                kind,
                properties,
                context: ctx.clone(),
                source: Box::new(source),
                inputs: RwLock::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn kind(&self) -> ServiceKind {
        self.inner.kind
    }

    pub fn properties(&self) -> &Properties {
        &self.inner.properties
    }

    pub fn context(&self) -> &Context {
        &self.inner.context
    }

    pub fn profile(&self) -> &ProfileHandle {
        self.inner.context.profile()
    }

    pub fn pool(&self) -> &MemoryPool {
        self.inner.context.pool()
    }

    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub fn ptr_eq(a: &Service, b: &Service) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// The frame source, if it is a `T`.
    pub fn source<T: Any>(&self) -> Option<&T> {
        self.inner.source.as_any().downcast_ref::<T>()
    }

    /// Produce a frame, reporting failure.
    pub fn try_get_frame(&self, track: usize) -> Result<Frame> {
        if self.is_closed() {
            return Err(StrataError::Closed(self.kind().to_string()));
        }
        self.inner.source.get_frame(self, track)
    }

    /// Produce a frame. Never fails: a failing source yields a test-card
    /// frame at the service's current position.
    pub fn get_frame(&self, track: usize) -> Frame {
        let position = self.get_position("_position");
        match self.try_get_frame(track) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(
                    kind = %self.kind(),
                    service = self.get("service").unwrap_or_default(),
                    position,
                    error = %e,
                    "frame production failed, substituting a test card"
                );
                Frame::blank(self.context(), position)
            }
        }
    }

    // ── Connections ────────────────────────────────────────────

    /// Pull from `input` at slot `index`, replacing any previous input there.
    pub fn connect_input(&self, input: &Service, index: usize) -> Result<()> {
        if Service::ptr_eq(self, input) {
            return Err(StrataError::InvalidParameter(format!(
                "{} cannot pull from itself",
                self.kind()
            )));
        }
        let mut inputs = self.inner.inputs.write();
        if inputs.len() <= index {
            inputs.resize(index + 1, None);
        }
        inputs[index] = Some(input.clone());
        Ok(())
    }

    /// Drop the input at `index`, returning it.
    pub fn disconnect_input(&self, index: usize) -> Option<Service> {
        self.inner
            .inputs
            .write()
            .get_mut(index)
            .and_then(Option::take)
    }

    pub fn input(&self, index: usize) -> Option<Service> {
        self.inner.inputs.read().get(index).cloned().flatten()
    }

    /// Number of input slots (connected or not).
    pub fn input_count(&self) -> usize {
        self.inner.inputs.read().len()
    }

    // ── Lifecycle ──────────────────────────────────────────────

    /// Close the service. Later calls are no-ops; later frame requests
    /// yield test cards.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.source.close(self);
        let inputs = std::mem::take(&mut *self.inner.inputs.write());
        drop(inputs);
        debug!(kind = %self.kind(), "service closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

impl Deref for Service {
    type Target = Properties;

    fn deref(&self) -> &Properties {
        &self.inner.properties
    }
}

impl AsProperties for Service {
    fn properties(&self) -> &Properties {
        &self.inner.properties
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("kind", &self.inner.kind)
            .field("inputs", &self.input_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Builds services by kind and identifier.
///
/// Implemented by the plugin repository; the core only depends on this
/// interface.
pub trait ServiceFactory: Send + Sync {
    fn create(&self, kind: ServiceKind, id: &str, ctx: &Context, arg: Option<&str>) -> Result<Service>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ImageFormat;
    use crate::image::ImageRequest;
    use std::sync::atomic::AtomicUsize;

    struct Counting {
        calls: AtomicUsize,
        fail: bool,
    }

    impl FrameSource for Counting {
        fn get_frame(&self, service: &Service, track: usize) -> Result<Frame> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(StrataError::Service("broken".into()));
            }
            let frame = Frame::from_context(service.context(), track as i64);
            Ok(frame)
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn counting(ctx: &Context, fail: bool) -> Service {
        Service::new(
            ServiceKind::Producer,
            ctx,
            Counting {
                calls: AtomicUsize::new(0),
                fail,
            },
        )
    }

    #[test]
    fn test_failure_yields_test_card() {
        let ctx = Context::default();
        let service = counting(&ctx, true);
        service.set_position("_position", 9).unwrap();
        let frame = service.get_frame(0);
        assert!(frame.is_test_card());
        assert_eq!(frame.position(), 9);
        let image = frame.get_image(ImageRequest::new(ImageFormat::Rgb24, 0, 0)).unwrap();
        assert_eq!((image.width(), image.height()), (720, 576));
    }

    #[test]
    fn test_closed_service() {
        let ctx = Context::default();
        let service = counting(&ctx, false);
        assert!(!service.get_frame(3).is_test_card());
        service.close();
        service.close();
        assert!(service.is_closed());
        assert!(matches!(service.try_get_frame(0), Err(StrataError::Closed(_))));
        assert!(service.get_frame(0).is_test_card());
        assert_eq!(service.source::<Counting>().unwrap().calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_connections() {
        let ctx = Context::default();
        let a = counting(&ctx, false);
        let b = counting(&ctx, false);
        b.connect_input(&a, 2).unwrap();
        assert_eq!(b.input_count(), 3);
        assert!(b.input(0).is_none());
        assert!(Service::ptr_eq(&b.input(2).unwrap(), &a));
        assert_eq!(a.ref_count(), 2);
        assert!(b.connect_input(&b, 0).is_err());
        assert!(b.disconnect_input(2).is_some());
        assert!(b.disconnect_input(2).is_none());
        assert_eq!(a.ref_count(), 1);
    }

    #[test]
    fn test_kind_names() {
        for kind in [ServiceKind::Producer, ServiceKind::Tractor, ServiceKind::Field] {
            assert_eq!(ServiceKind::from_name(kind.name()), Some(kind));
        }
        assert!(ServiceKind::Playlist.is_producer());
        assert!(!ServiceKind::Filter.is_producer());
        let ctx = Context::default();
        assert_eq!(counting(&ctx, false).get("type").as_deref(), Some("producer"));
    }
}
