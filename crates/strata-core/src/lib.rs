//! Strata Core - Foundation of the Strata media framework
//!
//! This crate provides the types every service and plugin builds on:
//! - Reference-counted property stores with typed coercion and events
//! - A size-classed memory pool for frame buffers
//! - Frames with deferred image/audio pipelines
//! - Service bases: producer, filter, transition, consumer
//! - Profiles, time helpers and logging setup

pub mod audio;
pub mod consumer;
pub mod context;
pub mod error;
pub mod events;
pub mod filter;
pub mod format;
pub mod frame;
pub mod image;
pub mod logging;
pub mod pool;
pub mod producer;
pub mod profile;
pub mod properties;
pub mod serialize;
pub mod service;
pub mod time;
pub mod transition;
pub mod value;

pub use audio::{Audio, AudioRequest};
pub use consumer::{Consumer, ConsumerImpl, CONSUMER_FRAME_SHOW, CONSUMER_STOPPED};
pub use context::Context;
pub use error::{Result, StrataError};
pub use events::{EventHandle, Events, Listener, Transmitter, PROPERTY_CHANGED};
pub use filter::{Filter, FilterImpl};
pub use format::{AudioFormat, ImageFormat};
pub use frame::{Frame, GetAudio, GetImage};
pub use image::{Image, ImageRequest};
pub use logging::{init_default_logging, init_logging, LoggingConfig};
pub use pool::{ClassStats, MemoryPool, PoolBuffer, PoolConfig};
pub use producer::{Producer, ProducerImpl};
pub use profile::{Profile, ProfileHandle, PROFILE_CHANGED};
pub use properties::{AsProperties, Properties};
pub use service::{FrameSource, Service, ServiceFactory, ServiceKind};
pub use time::{FrameRate, Position};
pub use transition::{Transition, TransitionImpl};
pub use value::{DataValue, Value};
