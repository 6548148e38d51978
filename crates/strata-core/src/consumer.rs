//! Consumers: services that pull finished frames and render them.
//!
//! A started consumer runs a render thread that pulls frames with
//! [`Consumer::rt_frame`] and hands each to its [`ConsumerImpl`]. With
//! `real_time > 0` a second, read-ahead thread keeps a bounded queue of
//! frames (`buffer`, default 25) filled so rendering never waits on
//! production; a reader waits at most two frame durations for the next
//! frame.
//!
//! Stopping is cooperative: the running flag is cleared, both queue
//! conditions are broadcast, then the threads are joined.

use std::any::Any;
use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::context::Context;
use crate::error::{Result, StrataError};
use crate::frame::Frame;
use crate::service::{FrameSource, Service, ServiceKind};
use crate::time::Position;
use crate::value::{DataValue, Value};

/// Fired after each rendered frame; the argument is the frame.
pub const CONSUMER_FRAME_SHOW: &str = "consumer-frame-show";

/// Fired once when a running consumer stops.
pub const CONSUMER_STOPPED: &str = "consumer-stopped";

/// Output behind a [`Consumer`].
pub trait ConsumerImpl: Send + Sync + 'static {
    /// Render one frame. Called on the consumer's render thread.
    fn render(&self, consumer: &Consumer, frame: &Frame) -> Result<()>;

    fn close(&self) {}
}

struct ConsumerState {
    imp: Box<dyn ConsumerImpl>,
    running: AtomicBool,
    reading: AtomicBool,
    queue: Mutex<VecDeque<Frame>>,
    ready: Condvar,
    space: Condvar,
    threads: Mutex<Vec<JoinHandle<()>>>,
    last: Mutex<Option<(Position, f64)>>,
}

struct ConsumerSource {
    state: Arc<ConsumerState>,
}

impl FrameSource for ConsumerSource {
    fn get_frame(&self, service: &Service, track: usize) -> Result<Frame> {
        let input = service.input(0).ok_or(StrataError::NotConnected(0))?;
        Ok(input.get_frame(track))
    }

    fn close(&self, service: &Service) {
        let consumer = Consumer {
            service: service.clone(),
            state: Arc::clone(&self.state),
        };
        consumer.stop();
        self.state.imp.close();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Handle on a consumer service.
#[derive(Clone)]
pub struct Consumer {
    service: Service,
    state: Arc<ConsumerState>,
}

impl Consumer {
    pub fn new<C: ConsumerImpl>(ctx: &Context, imp: C) -> Self {
        let state = Arc::new(ConsumerState {
            imp: Box::new(imp),
            running: AtomicBool::new(false),
            reading: AtomicBool::new(false),
            queue: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
            space: Condvar::new(),
            threads: Mutex::new(Vec::new()),
            last: Mutex::new(None),
        });
        let service = Service::new(
            ServiceKind::Consumer,
            ctx,
            ConsumerSource {
                state: Arc::clone(&state),
            },
        );
        let _ = service.register_event(CONSUMER_FRAME_SHOW);
        let _ = service.register_event(CONSUMER_STOPPED);
        let _ = service.set_int("real_time", 1);
        let _ = service.set_int("buffer", 25);
        let _ = service.set_int("terminate_on_pause", 0);
        Self { service, state }
    }

    pub fn from_service(service: Service) -> Option<Self> {
        let state = Arc::clone(&service.source::<ConsumerSource>()?.state);
        Some(Self { service, state })
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

    fn frame_duration(&self) -> Duration {
        self.profile().read().frame_rate.frame_duration()
    }

    /// Start the render thread (and read-ahead thread when `real_time > 0`).
    /// Starting a running consumer is a no-op.
    pub fn start(&self) -> Result<()> {
        if self.service.is_closed() {
            return Err(StrataError::Closed("consumer".into()));
        }
        let producer = self.input(0).ok_or(StrataError::NotConnected(0))?;
        if self.state.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.state.queue.lock().clear();
        *self.state.last.lock() = None;

        let real_time = self.get_int("real_time");
        if real_time > 0 {
            self.state.reading.store(true, Ordering::SeqCst);
            let consumer = self.clone();
            let spawned = thread::Builder::new()
                .name("strata-read-ahead".into())
                .spawn(move || consumer.read_ahead(producer));
            self.track_thread(spawned)?;
        }
        let consumer = self.clone();
        let spawned = thread::Builder::new()
            .name("strata-consumer".into())
            .spawn(move || consumer.render_loop());
        self.track_thread(spawned)?;
        info!(real_time, buffer = self.get_int("buffer"), "consumer started");
        Ok(())
    }

    fn track_thread(&self, spawned: std::io::Result<JoinHandle<()>>) -> Result<()> {
        match spawned {
            Ok(handle) => {
                self.state.threads.lock().push(handle);
                Ok(())
            }
            Err(e) => {
                self.stop();
                Err(e.into())
            }
        }
    }

    fn read_ahead(&self, producer: Service) {
        let capacity = self.get_int("buffer").max(1) as usize;
        let wait = self.frame_duration() * 2;
        debug!(capacity, "read-ahead running");
        while self.state.running.load(Ordering::SeqCst) {
            let frame = producer.get_frame(0);
            let mut queue = self.state.queue.lock();
            while queue.len() >= capacity && self.state.running.load(Ordering::SeqCst) {
                self.state.space.wait_for(&mut queue, wait);
            }
            if !self.state.running.load(Ordering::SeqCst) {
                break;
            }
            queue.push_back(frame);
            self.state.ready.notify_one();
        }
        self.state.reading.store(false, Ordering::SeqCst);
        self.state.ready.notify_all();
        debug!("read-ahead finished");
    }

    fn render_loop(&self) {
        while self.state.running.load(Ordering::SeqCst) {
            let Some(frame) = self.rt_frame() else {
                if !self.state.reading.load(Ordering::SeqCst) {
                    warn!("consumer lost its input");
                    self.halt();
                }
                continue;
            };
            if let Err(e) = self.state.imp.render(self, &frame) {
                warn!(position = frame.position(), error = %e, "render failed");
            }
            self.fire(
                CONSUMER_FRAME_SHOW,
                &[Value::Data(DataValue::new(frame.clone(), 0))],
            );
            if self.get_int("terminate_on_pause") != 0 && frame.get_double("_speed") == 0.0 {
                self.halt();
            }
        }
    }

    /// The next frame to render.
    ///
    /// Taken from the read-ahead queue while it runs, waiting at most two
    /// frame durations (`None` on timeout); pulled straight from the input
    /// otherwise. A frame whose position does not follow its predecessor's
    /// is marked `discontinuity`.
    pub fn rt_frame(&self) -> Option<Frame> {
        let frame = if self.state.reading.load(Ordering::SeqCst) {
            let mut queue = self.state.queue.lock();
            if queue.is_empty() && self.state.running.load(Ordering::SeqCst) {
                self.state.ready.wait_for(&mut queue, self.frame_duration() * 2);
            }
            let frame = queue.pop_front();
            self.state.space.notify_one();
            frame
        } else {
            self.input(0).map(|producer| producer.get_frame(0))
        };
        if let Some(frame) = &frame {
            self.mark_discontinuity(frame);
        }
        frame
    }

    fn mark_discontinuity(&self, frame: &Frame) {
        let position = frame.position();
        let speed = frame.get_double("_speed");
        let mut last = self.state.last.lock();
        if let Some((previous, previous_speed)) = *last {
            // A fractional speed lands on either neighbour of the exact head.
            let drift = (position - previous) as f64 - previous_speed;
            if position != previous && drift.abs() >= 1.0 {
                let _ = frame.set_int("discontinuity", 1);
            }
        }
        *last = Some((position, speed));
    }

    /// Clear the running flag and wake every waiter, without joining.
    fn halt(&self) {
        if !self.state.running.swap(false, Ordering::SeqCst) {
            return;
        }
        {
            let _queue = self.state.queue.lock();
            self.state.ready.notify_all();
            self.state.space.notify_all();
        }
        info!("consumer stopped");
        self.fire(CONSUMER_STOPPED, &[]);
    }

    /// Stop and join the consumer's threads. Safe to call repeatedly and
    /// from a `consumer-frame-show` listener.
    pub fn stop(&self) {
        self.halt();
        self.join_threads();
        self.state.queue.lock().clear();
    }

    /// Block until the consumer stops by itself (`terminate_on_pause`, lost
    /// input) and its threads have finished.
    pub fn wait(&self) {
        self.join_threads();
    }

    fn join_threads(&self) {
        let current = thread::current().id();
        let handles = std::mem::take(&mut *self.state.threads.lock());
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                warn!("consumer thread panicked");
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        !self.state.running.load(Ordering::SeqCst)
    }
}

impl Deref for Consumer {
    type Target = Service;

    fn deref(&self) -> &Service {
        &self.service
    }
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("service", &self.service)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
