//! Strata Plugin: runtime registry of service constructors.

pub mod error;
pub mod metadata;
pub mod repository;

pub use error::PluginError;
pub use metadata::{ParameterMetadata, ParameterType, ServiceMetadata};
pub use repository::{Constructor, Repository};
